use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::TypeRegistry;
use crate::types::VulkanApi;

/// Handles whose first word is the driver dispatch table.
pub const DISPATCHABLE_HANDLE_TYPES: &[&str] = &[
    "VkInstance",
    "VkPhysicalDevice",
    "VkDevice",
    "VkQueue",
    "VkCommandBuffer",
];

pub const NON_DISPATCHABLE_HANDLE_TYPES: &[&str] = &[
    "VkDeviceMemory",
    "VkBuffer",
    "VkBufferView",
    "VkImage",
    "VkImageView",
    "VkShaderModule",
    "VkSampler",
    "VkSamplerYcbcrConversion",
    "VkFence",
    "VkSemaphore",
    "VkEvent",
    "VkQueryPool",
    "VkFramebuffer",
    "VkRenderPass",
    "VkPipelineCache",
    "VkPipelineLayout",
    "VkPipeline",
    "VkDescriptorUpdateTemplate",
    "VkDescriptorSetLayout",
    "VkDescriptorPool",
    "VkDescriptorSet",
    "VkCommandPool",
    "VkSurfaceKHR",
    "VkSwapchainKHR",
    "VkDisplayKHR",
    "VkDisplayModeKHR",
    "VkValidationCacheEXT",
    "VkDebugReportCallbackEXT",
    "VkDebugUtilsMessengerEXT",
    "VkAccelerationStructureKHR",
    "VkDeferredOperationKHR",
    "VkPrivateDataSlot",
];

/// Handle types whose create/destroy commands do not follow
/// `vkCreate<X>` / `vkDestroy<X>`.
pub const CUSTOM_HANDLE_CREATE_TYPES: &[&str] = &[
    "VkPhysicalDevice",
    "VkQueue",
    "VkPipeline",
    "VkDeviceMemory",
    "VkDescriptorSet",
    "VkCommandBuffer",
];

pub fn is_dispatchable(name: &str) -> bool {
    DISPATCHABLE_HANDLE_TYPES.contains(&name)
}

pub fn is_handle_type(name: &str) -> bool {
    is_dispatchable(name) || NON_DISPATCHABLE_HANDLE_TYPES.contains(&name)
}

/// Creating and destroying commands of one handle type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleInfo {
    pub create_apis: Vec<String>,
    pub destroy_apis: Vec<String>,
}

impl HandleInfo {
    fn new(create: &[&str], destroy: &[&str]) -> Self {
        Self {
            create_apis: create.iter().map(|s| s.to_string()).collect(),
            destroy_apis: destroy.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `vkCreate<X>` / `vkDestroy<X>` for a handle named `Vk<X>`.
    pub fn uniform(handle_type: &str) -> Self {
        let stem = handle_type.strip_prefix("Vk").unwrap_or(handle_type);
        Self {
            create_apis: vec![format!("vkCreate{stem}")],
            destroy_apis: vec![format!("vkDestroy{stem}")],
        }
    }

    fn custom(handle_type: &str) -> Option<Self> {
        let info = match handle_type {
            "VkPhysicalDevice" => Self::new(&["vkEnumeratePhysicalDevices"], &[]),
            "VkQueue" => Self::new(&["vkGetDeviceQueue", "vkGetDeviceQueue2"], &[]),
            "VkPipeline" => Self::new(
                &[
                    "vkCreateGraphicsPipelines",
                    "vkCreateComputePipelines",
                    "vkCreateRayTracingPipelinesKHR",
                ],
                &["vkDestroyPipeline"],
            ),
            "VkDeviceMemory" => Self::new(&["vkAllocateMemory"], &["vkFreeMemory"]),
            "VkDescriptorSet" => Self::new(&["vkAllocateDescriptorSets"], &["vkFreeDescriptorSets"]),
            "VkCommandBuffer" => Self::new(&["vkAllocateCommandBuffers"], &["vkFreeCommandBuffers"]),
            _ => return None,
        };
        Some(info)
    }
}

/// How a handle-typed parameter is translated within one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRole {
    /// First parameter and dispatchable: selects the driver dispatch table.
    Dispatch,
    Create,
    Destroy,
    Passthrough,
}

/// Per-registry table of [`HandleInfo`] entries.
#[derive(Debug, Clone, Default)]
pub struct HandleCatalog {
    infos: BTreeMap<String, HandleInfo>,
}

impl HandleCatalog {
    pub fn from_registry(registry: &TypeRegistry) -> Self {
        let mut infos = BTreeMap::new();
        for name in DISPATCHABLE_HANDLE_TYPES
            .iter()
            .chain(NON_DISPATCHABLE_HANDLE_TYPES.iter())
        {
            let info = registry
                .handle_info
                .get(*name)
                .cloned()
                .or_else(|| HandleInfo::custom(name))
                .unwrap_or_else(|| HandleInfo::uniform(name));
            infos.insert(name.to_string(), info);
        }
        Self { infos }
    }

    pub fn info(&self, handle_type: &str) -> Option<&HandleInfo> {
        self.infos.get(handle_type)
    }

    fn creates(&self, handle_type: &str, api: &str) -> bool {
        self.info(handle_type)
            .is_some_and(|i| i.create_apis.iter().any(|a| a == api))
    }

    fn destroys(&self, handle_type: &str, api: &str) -> bool {
        self.info(handle_type)
            .is_some_and(|i| i.destroy_apis.iter().any(|a| a == api))
    }

    /// Classify parameter `index` of `api`. Non-handle parameters are
    /// passthrough.
    pub fn classify(&self, registry: &TypeRegistry, api: &VulkanApi, index: usize) -> HandleRole {
        let Some(param) = api.parameters.get(index) else {
            return HandleRole::Passthrough;
        };
        let handle_type = registry.resolve_alias(&param.type_name);
        if !crate::handle::is_handle_type(handle_type) {
            return HandleRole::Passthrough;
        }
        if index == 0 && is_dispatchable(handle_type) {
            return HandleRole::Dispatch;
        }
        let api_name = registry.resolve_alias(&api.name);
        if param.is_output() && self.creates(handle_type, api_name) {
            HandleRole::Create
        } else if !param.is_output() && self.destroys(handle_type, api_name) {
            HandleRole::Destroy
        } else {
            HandleRole::Passthrough
        }
    }

    pub fn params_with_role(&self, registry: &TypeRegistry, api: &VulkanApi, role: HandleRole) -> Vec<usize> {
        (0..api.parameters.len())
            .filter(|&i| self.classify(registry, api, i) == role)
            .collect()
    }

    /// True when `api` destroys its own dispatch handle (`vkDestroyInstance`).
    pub fn destroys_dispatch(&self, registry: &TypeRegistry, api: &VulkanApi) -> bool {
        api.dispatch_param().is_some_and(|p| {
            self.destroys(
                registry.resolve_alias(&p.type_name),
                registry.resolve_alias(&api.name),
            )
        })
    }
}
