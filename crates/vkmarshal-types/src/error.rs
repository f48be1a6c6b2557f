#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("malformed declaration `{decl}`: {reason}")]
    Declaration { decl: String, reason: String },

    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("registry load error: {0}")]
    Load(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
