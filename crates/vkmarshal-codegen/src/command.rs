//! Per-command parameter roles shared by the encoder and decoder emitters.

use vkmarshal_types::{HandleCatalog, HandleRole, TypeRegistry, VulkanApi, VulkanType};

/// One command with every parameter classified once.
#[derive(Debug, Clone)]
pub struct CommandParams<'a> {
    pub api: &'a VulkanApi,
    pub roles: Vec<HandleRole>,
    pub destroys_dispatch: bool,
}

impl<'a> CommandParams<'a> {
    pub fn new(registry: &TypeRegistry, catalog: &HandleCatalog, api: &'a VulkanApi) -> Self {
        let roles = (0..api.parameters.len())
            .map(|i| catalog.classify(registry, api, i))
            .collect();
        Self {
            api,
            roles,
            destroys_dispatch: catalog.destroys_dispatch(registry, api),
        }
    }

    pub fn role(&self, index: usize) -> HandleRole {
        self.roles.get(index).copied().unwrap_or(HandleRole::Passthrough)
    }

    pub fn is_created(&self, index: usize) -> bool {
        self.role(index) == HandleRole::Create
    }

    /// Destroyed by this command, including a dispatch handle the command
    /// tears down itself.
    pub fn is_destroyed(&self, index: usize) -> bool {
        match self.role(index) {
            HandleRole::Destroy => true,
            HandleRole::Dispatch => self.destroys_dispatch,
            _ => false,
        }
    }

    pub fn dispatch(&self) -> Option<&'a VulkanType> {
        match self.roles.first() {
            Some(HandleRole::Dispatch) => self.api.parameters.first(),
            _ => None,
        }
    }

    /// Parameters the caller owns: everything but writable pointers.
    pub fn inputs(&self) -> impl Iterator<Item = (usize, &'a VulkanType)> {
        self.api
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_output())
    }

    pub fn outputs(&self) -> impl Iterator<Item = (usize, &'a VulkanType)> {
        self.api
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_output())
    }

    pub fn input_names(&self) -> Vec<&'a str> {
        self.inputs().map(|(_, p)| p.param_name.as_str()).collect()
    }

    /// Destroyed handles passed by value; a null one skips the driver call.
    pub fn destroyed_values(&self) -> Vec<&'a VulkanType> {
        self.api
            .parameters
            .iter()
            .enumerate()
            .filter(|(i, p)| self.is_destroyed(*i) && !p.is_pointer())
            .map(|(_, p)| p)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::sample::sample_registry;

    #[test]
    fn destroy_instance_tears_down_its_dispatch_handle() {
        let reg = sample_registry().unwrap();
        let catalog = reg.handle_catalog();
        let api = reg.command("vkDestroyInstance").unwrap();
        let params = CommandParams::new(&reg, &catalog, api);
        assert!(params.destroys_dispatch);
        assert!(params.is_destroyed(0));
        assert_eq!(params.destroyed_values().len(), 1);
    }

    #[test]
    fn create_buffer_outputs() {
        let reg = sample_registry().unwrap();
        let catalog = reg.handle_catalog();
        let api = reg.command("vkCreateBuffer").unwrap();
        let params = CommandParams::new(&reg, &catalog, api);
        assert_eq!(params.dispatch().map(|p| p.param_name.as_str()), Some("device"));
        assert_eq!(params.input_names(), vec!["device", "pCreateInfo", "pAllocator"]);
        let outputs: Vec<usize> = params.outputs().map(|(i, _)| i).collect();
        assert_eq!(outputs, vec![3]);
        assert!(params.is_created(3));
    }
}
