use std::path::Path;

use serde::{Deserialize, Serialize};
use vkmarshal_types::extension::default_root_type_mappings;
use vkmarshal_types::{RootTypeMapping, DEFAULT_OPCODE_BASE};

use crate::error::GenError;

/// Generator configuration, loaded from vkmarshal.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenConfig {
    /// First opcode; commands are numbered sequentially from here
    #[serde(default = "default_opcode_base")]
    pub opcode_base: u32,
    #[serde(default)]
    pub output: OutputNames,
    /// Package name of the emitted .proto
    #[serde(default = "default_proto_package")]
    pub proto_package: String,
    /// Commands the function table never resolves
    #[serde(default = "default_excluded_apis")]
    pub excluded_apis: Vec<String>,
    /// Disambiguation of reused sType values
    #[serde(default = "default_root_type_mappings")]
    pub root_type_mappings: Vec<RootTypeMapping>,
    /// External-memory structs with a dedicated resource tracker hook
    #[serde(default = "default_transformed_types")]
    pub transformed_types: Vec<String>,
    /// Emit the snapshot hook at the end of every decoded command
    #[serde(default = "default_true")]
    pub snapshot_hooks: bool,
}

/// File stems of the emitted artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputNames {
    #[serde(default = "default_marshaling_guest")]
    pub marshaling_guest: String,
    #[serde(default = "default_marshaling_host")]
    pub marshaling_host: String,
    #[serde(default = "default_handlemap")]
    pub handlemap: String,
    #[serde(default = "default_deepcopy")]
    pub deepcopy: String,
    #[serde(default = "default_transform")]
    pub transform: String,
    #[serde(default = "default_extension_structs")]
    pub extension_structs: String,
    #[serde(default = "default_encoder")]
    pub encoder: String,
    #[serde(default = "default_decoder")]
    pub decoder: String,
    #[serde(default = "default_func_table")]
    pub func_table: String,
    #[serde(default = "default_proto")]
    pub proto: String,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            opcode_base: default_opcode_base(),
            output: OutputNames::default(),
            proto_package: default_proto_package(),
            excluded_apis: default_excluded_apis(),
            root_type_mappings: default_root_type_mappings(),
            transformed_types: default_transformed_types(),
            snapshot_hooks: true,
        }
    }
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            marshaling_guest: default_marshaling_guest(),
            marshaling_host: default_marshaling_host(),
            handlemap: default_handlemap(),
            deepcopy: default_deepcopy(),
            transform: default_transform(),
            extension_structs: default_extension_structs(),
            encoder: default_encoder(),
            decoder: default_decoder(),
            func_table: default_func_table(),
            proto: default_proto(),
        }
    }
}

impl GenConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, GenError> {
        let content = std::fs::read_to_string(path).map_err(|e| GenError::io(path, e))?;
        toml::from_str(&content).map_err(|e| GenError::Config(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn is_excluded(&self, api: &str) -> bool {
        self.excluded_apis.iter().any(|a| a == api)
    }

    pub fn is_transformed(&self, type_name: &str) -> bool {
        self.transformed_types.iter().any(|t| t == type_name)
    }
}

fn default_opcode_base() -> u32 {
    DEFAULT_OPCODE_BASE
}

fn default_proto_package() -> String {
    "goldfish_vk".to_string()
}

fn default_excluded_apis() -> Vec<String> {
    [
        "vkEnumeratePhysicalDeviceGroups",
        "vkGetPhysicalDeviceExternalFenceProperties",
        "vkGetPhysicalDeviceExternalSemaphoreProperties",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_transformed_types() -> Vec<String> {
    [
        "VkExternalMemoryProperties",
        "VkExportMemoryAllocateInfo",
        "VkExternalMemoryBufferCreateInfo",
        "VkExternalMemoryImageCreateInfo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_marshaling_guest() -> String {
    "goldfish_vk_marshaling_guest".to_string()
}

fn default_marshaling_host() -> String {
    "goldfish_vk_marshaling".to_string()
}

fn default_handlemap() -> String {
    "goldfish_vk_handlemap".to_string()
}

fn default_deepcopy() -> String {
    "goldfish_vk_deepcopy".to_string()
}

fn default_transform() -> String {
    "goldfish_vk_transform".to_string()
}

fn default_extension_structs() -> String {
    "goldfish_vk_extension_structs".to_string()
}

fn default_encoder() -> String {
    "VkEncoder".to_string()
}

fn default_decoder() -> String {
    "VkDecoder".to_string()
}

fn default_func_table() -> String {
    "func_table".to_string()
}

fn default_proto() -> String {
    "goldfish_vk_proto".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: GenConfig = toml::from_str("").unwrap();
        assert_eq!(config.opcode_base, 20000);
        assert_eq!(config.output, OutputNames::default());
        assert!(config.snapshot_hooks);
        assert_eq!(config.root_type_mappings.len(), 1);
    }

    #[test]
    fn partial_override() {
        let config: GenConfig = toml::from_str(
            r#"
            opcode_base = 30000
            snapshot_hooks = false
            excluded_apis = ["vkCreateBuffer"]

            [output]
            encoder = "GuestEncoder"
            "#,
        )
        .unwrap();
        assert_eq!(config.opcode_base, 30000);
        assert!(!config.snapshot_hooks);
        assert!(config.is_excluded("vkCreateBuffer"));
        assert_eq!(config.output.encoder, "GuestEncoder");
        assert_eq!(config.output.decoder, "VkDecoder");
    }

    #[test]
    fn missing_file_falls_back() {
        let config = GenConfig::load_or_default(Path::new("/nonexistent/vkmarshal.toml"));
        assert_eq!(config.opcode_base, 20000);
    }
}
