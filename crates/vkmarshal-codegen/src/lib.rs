//! Generators for the guest/host Vulkan marshaling stack.
//!
//! Every artifact is produced the same way: a generator implements
//! [`Wrapper`], a [`Dispatcher`] walks the registry in feature order and
//! fires its hooks, and the generator hands back its header and source as
//! [`GeneratedFile`]s.

pub mod command;
pub mod config;
pub mod deepcopy;
pub mod decoder;
pub mod dispatch;
pub mod emitter;
pub mod encoder;
pub mod error;
pub mod extension;
pub mod functable;
pub mod handlemap;
pub mod iterator;
pub mod marshaling;
pub mod overrides;
pub mod protobuf;
pub mod sink;
pub mod transform;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::info;
use vkmarshal_types::TypeRegistry;

pub use config::{GenConfig, OutputNames};
pub use dispatch::{Dispatcher, Wrapper};
pub use emitter::CodeEmitter;
pub use error::GenError;
pub use overrides::{CommandOverride, OverrideTable};
pub use sink::GeneratedFile;

/// One emitted artifact family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    MarshalingGuest,
    MarshalingHost,
    HandleMap,
    DeepCopy,
    Transform,
    ExtensionStructs,
    Encoder,
    Decoder,
    FuncTable,
    Protobuf,
}

impl Target {
    pub const ALL: [Target; 10] = [
        Target::ExtensionStructs,
        Target::MarshalingGuest,
        Target::MarshalingHost,
        Target::HandleMap,
        Target::DeepCopy,
        Target::Transform,
        Target::Encoder,
        Target::Decoder,
        Target::FuncTable,
        Target::Protobuf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Target::MarshalingGuest => "marshaling-guest",
            Target::MarshalingHost => "marshaling-host",
            Target::HandleMap => "handlemap",
            Target::DeepCopy => "deepcopy",
            Target::Transform => "transform",
            Target::ExtensionStructs => "extension-structs",
            Target::Encoder => "encoder",
            Target::Decoder => "decoder",
            Target::FuncTable => "func-table",
            Target::Protobuf => "protobuf",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| GenError::UnknownTarget(s.to_string()))
    }
}

fn run<W: Wrapper>(registry: &TypeRegistry, config: &GenConfig, mut wrapper: W) -> Result<W, GenError> {
    Dispatcher::new(registry, config.opcode_base).run(&mut wrapper)?;
    Ok(wrapper)
}

/// Run one generator over the registry.
pub fn generate(registry: &TypeRegistry, config: &GenConfig, target: Target) -> Result<Vec<GeneratedFile>, GenError> {
    use marshaling::{MarshalingGenerator, Variant};

    let files = match target {
        Target::MarshalingGuest => {
            run(registry, config, MarshalingGenerator::new(registry, config, Variant::Guest))?.into_files()
        }
        Target::MarshalingHost => {
            run(registry, config, MarshalingGenerator::new(registry, config, Variant::Host))?.into_files()
        }
        Target::HandleMap => {
            run(registry, config, handlemap::HandleMapGenerator::new(registry, config))?.into_files()
        }
        Target::DeepCopy => run(registry, config, deepcopy::DeepCopyGenerator::new(registry, config))?.into_files(),
        Target::Transform => {
            run(registry, config, transform::TransformGenerator::new(registry, config))?.into_files()
        }
        Target::ExtensionStructs => {
            run(registry, config, extension::ExtensionStructsGenerator::new(registry, config))?.into_files()
        }
        Target::Encoder => run(registry, config, encoder::EncoderGenerator::new(registry, config))?.into_files(),
        Target::Decoder => run(registry, config, decoder::DecoderGenerator::new(registry, config))?.into_files(),
        Target::FuncTable => {
            run(registry, config, functable::FuncTableGenerator::new(registry, config))?.into_files()
        }
        Target::Protobuf => {
            run(registry, config, protobuf::ProtobufGenerator::new(registry, config))?.into_files()
        }
    };
    info!(target = %target, files = files.len(), "generated");
    Ok(files)
}

pub fn generate_all(registry: &TypeRegistry, config: &GenConfig) -> Result<Vec<GeneratedFile>, GenError> {
    let mut files = Vec::new();
    for target in Target::ALL {
        files.extend(generate(registry, config, target)?);
    }
    Ok(files)
}

/// Write generated files into `dir`, creating it if needed.
pub fn write_files(dir: &Path, files: &[GeneratedFile]) -> Result<(), GenError> {
    std::fs::create_dir_all(dir).map_err(|e| GenError::io(dir, e))?;
    for file in files {
        let path = dir.join(&file.name);
        std::fs::write(&path, &file.contents).map_err(|e| GenError::io(&path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_round_trip() {
        for target in Target::ALL {
            assert_eq!(target.name().parse::<Target>().unwrap(), target);
        }
        assert!(matches!("vulkan".parse::<Target>(), Err(GenError::UnknownTarget(_))));
    }
}
