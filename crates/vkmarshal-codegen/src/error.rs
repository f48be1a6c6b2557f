use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    /// An extension dispatch call site did not say what its default branch does.
    #[error("extension dispatch in `{site}` has no default branch")]
    MissingDefaultEmit { site: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error(transparent)]
    Types(#[from] vkmarshal_types::TypeError),
}

impl GenError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GenError::Io {
            path: path.into(),
            source,
        }
    }
}
