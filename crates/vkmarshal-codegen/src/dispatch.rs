use std::collections::HashSet;

use tracing::debug;
use vkmarshal_types::{Feature, TypeRegistry, VulkanApi, VulkanCompoundType};

use crate::error::GenError;

/// Event hooks of one generator. The dispatcher calls them in registry
/// order; every hook defaults to doing nothing.
pub trait Wrapper {
    fn on_begin(&mut self) -> Result<(), GenError> {
        Ok(())
    }

    fn on_begin_feature(&mut self, _feature: &Feature) -> Result<(), GenError> {
        Ok(())
    }

    fn on_gen_type(&mut self, _compound: &VulkanCompoundType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_gen_cmd(&mut self, _api: &VulkanApi, _opcode: u32) -> Result<(), GenError> {
        Ok(())
    }

    fn on_end_feature(&mut self, _feature: &Feature) -> Result<(), GenError> {
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        Ok(())
    }
}

/// Walks a registry in feature order and fires the hooks of one wrapper.
pub struct Dispatcher<'r> {
    registry: &'r TypeRegistry,
    opcode_base: u32,
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r TypeRegistry, opcode_base: u32) -> Self {
        Self {
            registry,
            opcode_base,
        }
    }

    /// Types fire before commands within a feature. Aliases never fire and
    /// each name fires once. Items outside every feature come last with no
    /// feature bracket.
    pub fn run(&self, wrapper: &mut dyn Wrapper) -> Result<(), GenError> {
        let opcodes = self.registry.opcode_table(self.opcode_base);
        let mut seen_types: HashSet<&str> = HashSet::new();
        let mut seen_cmds: HashSet<&str> = HashSet::new();

        wrapper.on_begin()?;
        for feature in &self.registry.features {
            wrapper.on_begin_feature(feature)?;
            for name in &feature.types {
                if self.registry.is_alias(name) {
                    continue;
                }
                if let Some(compound) = self.registry.compound(name) {
                    if seen_types.insert(compound.name.as_str()) {
                        debug!(feature = %feature.name, name = %compound.name, "type");
                        wrapper.on_gen_type(compound)?;
                    }
                }
            }
            for name in &feature.commands {
                if self.registry.is_alias(name) {
                    continue;
                }
                if let Some(api) = self.registry.command(name) {
                    if seen_cmds.insert(api.name.as_str()) {
                        let opcode = opcodes.opcode(&api.name).unwrap_or_default();
                        debug!(feature = %feature.name, name = %api.name, opcode, "command");
                        wrapper.on_gen_cmd(api, opcode)?;
                    }
                }
            }
            wrapper.on_end_feature(feature)?;
        }

        for compound in &self.registry.compounds {
            if seen_types.insert(compound.name.as_str()) {
                wrapper.on_gen_type(compound)?;
            }
        }
        for api in &self.registry.commands {
            if seen_cmds.insert(api.name.as_str()) {
                let opcode = opcodes.opcode(&api.name).unwrap_or_default();
                wrapper.on_gen_cmd(api, opcode)?;
            }
        }
        wrapper.on_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::sample::sample_registry;

    #[derive(Default)]
    struct Events(Vec<String>);

    impl Wrapper for Events {
        fn on_begin(&mut self) -> Result<(), GenError> {
            self.0.push("begin".into());
            Ok(())
        }
        fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
            self.0.push(format!("feature {}", feature.name));
            Ok(())
        }
        fn on_gen_type(&mut self, compound: &VulkanCompoundType) -> Result<(), GenError> {
            self.0.push(format!("type {}", compound.name));
            Ok(())
        }
        fn on_gen_cmd(&mut self, api: &VulkanApi, opcode: u32) -> Result<(), GenError> {
            self.0.push(format!("cmd {} {opcode}", api.name));
            Ok(())
        }
        fn on_end(&mut self) -> Result<(), GenError> {
            self.0.push("end".into());
            Ok(())
        }
    }

    #[test]
    fn fires_each_name_once_in_feature_order() {
        let reg = sample_registry().unwrap();
        let mut events = Events::default();
        Dispatcher::new(&reg, 100).run(&mut events).unwrap();

        assert_eq!(events.0.first().map(String::as_str), Some("begin"));
        assert_eq!(events.0.last().map(String::as_str), Some("end"));
        assert_eq!(events.0[1], "feature VK_VERSION_1_0");
        assert!(events.0.contains(&"cmd vkCreateInstance 100".to_string()));
        assert!(!events.0.iter().any(|e| e.contains("vkBindBufferMemory2KHR")));

        let cmds: Vec<&String> = events.0.iter().filter(|e| e.starts_with("cmd ")).collect();
        let unique: HashSet<&String> = cmds.iter().copied().collect();
        assert_eq!(cmds.len(), unique.len());
        assert_eq!(cmds.len(), reg.opcode_table(100).len());
    }
}
