use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TypeError;
use crate::handle::{HandleCatalog, HandleInfo};
use crate::types::{VulkanApi, VulkanCompoundType};

/// Non-compound registry types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TypeDef {
    Basetype { underlying: String },
    Bitmask { underlying: String },
    Enum,
    Handle,
    FuncPointer,
    Define,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Version { major: u32, minor: u32 },
    InstanceExtension,
    DeviceExtension,
}

/// A `<feature>` or `<extension>` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

impl Feature {
    pub fn version(name: impl Into<String>, major: u32, minor: u32) -> Self {
        Self::with_kind(name, FeatureKind::Version { major, minor })
    }

    pub fn with_kind(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
            types: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn is_core_1_0(&self) -> bool {
        matches!(self.kind, FeatureKind::Version { major: 1, minor: 0 })
    }

    /// `(major, minor)` for version features.
    pub fn api_version(&self) -> Option<(u32, u32)> {
        match self.kind {
            FeatureKind::Version { major, minor } => Some((major, minor)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeRegistry {
    pub features: Vec<Feature>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDef>,
    #[serde(default)]
    pub compounds: Vec<VulkanCompoundType>,
    #[serde(default)]
    pub commands: Vec<VulkanApi>,
    /// Alias name to target name, for both types and commands.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub constants: BTreeMap<String, u64>,
    #[serde(default)]
    pub enum_values: BTreeMap<String, i64>,
    /// Explicit entries overriding the built-in handle tables.
    #[serde(default)]
    pub handle_info: BTreeMap<String, HandleInfo>,

    #[serde(skip)]
    compound_index: HashMap<String, usize>,
    #[serde(skip)]
    command_index: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, TypeError> {
        let mut registry: TypeRegistry = serde_json::from_str(text)?;
        registry.reindex();
        debug!(
            compounds = registry.compounds.len(),
            commands = registry.commands.len(),
            "loaded registry"
        );
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, TypeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, TypeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild the name lookups after the public vectors changed.
    pub fn reindex(&mut self) {
        self.compound_index = self
            .compounds
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        self.command_index = self
            .commands
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
    }

    // ── Building ────────────────────────────────────────────────────────

    pub fn begin_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    fn current_feature(&mut self) -> Option<&mut Feature> {
        self.features.last_mut()
    }

    pub fn add_type(&mut self, name: &str, def: TypeDef) {
        self.types.insert(name.to_string(), def);
        if let Some(f) = self.current_feature() {
            f.types.push(name.to_string());
        }
    }

    pub fn add_compound(&mut self, mut compound: VulkanCompoundType) {
        if let Some(f) = self.current_feature() {
            f.types.push(compound.name.clone());
            compound.feature = Some(f.name.clone());
        }
        self.compound_index
            .insert(compound.name.clone(), self.compounds.len());
        self.compounds.push(compound);
    }

    pub fn add_command(&mut self, api: VulkanApi) {
        if let Some(f) = self.current_feature() {
            f.commands.push(api.name.clone());
        }
        self.command_index.insert(api.name.clone(), self.commands.len());
        self.commands.push(api);
    }

    /// Register `alias` for `target`; the alias is listed in the current
    /// feature but never emitted on its own.
    pub fn add_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
        let is_command = alias.starts_with("vk");
        if let Some(f) = self.current_feature() {
            if is_command {
                f.commands.push(alias.to_string());
            } else {
                f.types.push(alias.to_string());
            }
        }
    }

    pub fn add_constant(&mut self, name: &str, value: u64) {
        self.constants.insert(name.to_string(), value);
    }

    pub fn add_enum_value(&mut self, name: &str, value: i64) {
        self.enum_values.insert(name.to_string(), value);
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Follow alias links to the canonical name.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        for _ in 0..8 {
            match self.aliases.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    pub fn compound(&self, name: &str) -> Option<&VulkanCompoundType> {
        let name = self.resolve_alias(name);
        self.compound_index
            .get(name)
            .and_then(|&i| self.compounds.get(i))
    }

    pub fn command(&self, name: &str) -> Option<&VulkanApi> {
        let name = self.resolve_alias(name);
        self.command_index
            .get(name)
            .and_then(|&i| self.commands.get(i))
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(self.resolve_alias(name))
    }

    pub fn is_compound(&self, name: &str) -> bool {
        self.compound(name).is_some()
    }

    pub fn is_enum_like(&self, name: &str) -> bool {
        matches!(
            self.type_def(name),
            Some(TypeDef::Enum) | Some(TypeDef::Bitmask { .. })
        )
    }

    pub fn is_funcpointer(&self, name: &str) -> bool {
        matches!(self.type_def(name), Some(TypeDef::FuncPointer))
    }

    pub fn is_define(&self, name: &str) -> bool {
        matches!(self.type_def(name), Some(TypeDef::Define))
    }

    pub fn is_float(&self, name: &str) -> bool {
        matches!(name, "float" | "double")
    }

    /// Width in bytes of a scalar's wire encoding.
    pub fn encoding_size(&self, name: &str) -> Option<usize> {
        let size = match name {
            "char" | "uint8_t" | "int8_t" => 1,
            "uint16_t" | "int16_t" => 2,
            "uint32_t" | "int32_t" | "int" | "float" => 4,
            "uint64_t" | "int64_t" | "size_t" | "double" => 8,
            _ => match self.type_def(name)? {
                TypeDef::Basetype { underlying } | TypeDef::Bitmask { underlying } => {
                    return self.encoding_size(underlying)
                }
                TypeDef::Enum | TypeDef::Define => 4,
                TypeDef::Handle | TypeDef::FuncPointer => 8,
            },
        };
        Some(size)
    }

    /// Evaluate a static-array bound: a literal, a constant or `A * B`.
    pub fn eval_constant(&self, expr: &str) -> Option<u64> {
        if expr.contains('*') {
            return expr
                .split('*')
                .map(|part| self.eval_constant(part.trim()))
                .product();
        }
        expr.parse()
            .ok()
            .or_else(|| self.constants.get(expr).copied())
    }

    pub fn enum_value(&self, name: &str) -> Option<i64> {
        self.enum_values.get(name).copied()
    }

    pub fn structure_type_value(&self, compound: &VulkanCompoundType) -> Option<i64> {
        compound
            .structure_type
            .as_deref()
            .and_then(|s| self.enum_value(s))
    }

    /// Compound carrying a given `sType` value, first registered wins.
    pub fn compounds_with_structure_type(&self, value: i64) -> Vec<&VulkanCompoundType> {
        self.compounds
            .iter()
            .filter(|c| self.structure_type_value(c) == Some(value))
            .collect()
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn feature_of_type(&self, name: &str) -> Option<&Feature> {
        if let Some(tag) = self.compound(name).and_then(|c| c.feature.as_deref()) {
            return self.feature(tag);
        }
        self.features
            .iter()
            .find(|f| f.types.iter().any(|t| t == name))
    }

    pub fn feature_of_command(&self, name: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.commands.iter().any(|c| c == name))
    }

    /// Compounds in feature order, each once; compounds outside any feature
    /// come last.
    pub fn ordered_compounds(&self) -> Vec<(&VulkanCompoundType, Option<&Feature>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for feature in &self.features {
            for name in &feature.types {
                if self.is_alias(name) {
                    continue;
                }
                if let Some(c) = self.compound(name) {
                    if seen.insert(c.name.as_str()) {
                        out.push((c, Some(feature)));
                    }
                }
            }
        }
        for c in &self.compounds {
            if seen.insert(c.name.as_str()) {
                out.push((c, None));
            }
        }
        out
    }

    /// Commands in feature order, deduplicated, aliases skipped.
    pub fn ordered_commands(&self) -> Vec<(&VulkanApi, Option<&Feature>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for feature in &self.features {
            for name in &feature.commands {
                if self.is_alias(name) {
                    continue;
                }
                if let Some(api) = self.command(name) {
                    if seen.insert(api.name.as_str()) {
                        out.push((api, Some(feature)));
                    }
                }
            }
        }
        for api in &self.commands {
            if seen.insert(api.name.as_str()) {
                out.push((api, None));
            }
        }
        out
    }

    /// Extendable structs (legal `pNext` members) in feature order.
    pub fn extension_structs(&self) -> Vec<(&VulkanCompoundType, Option<&Feature>)> {
        self.ordered_compounds()
            .into_iter()
            .filter(|(c, _)| c.is_extendable())
            .collect()
    }

    pub fn handle_catalog(&self) -> HandleCatalog {
        HandleCatalog::from_registry(self)
    }

    pub fn opcode_table(&self, base: u32) -> OpcodeTable {
        OpcodeTable::build(self, base)
    }
}

/// Command name to opcode, assigned sequentially in registry order.
#[derive(Debug, Clone, Default)]
pub struct OpcodeTable {
    by_name: BTreeMap<String, u32>,
    by_opcode: BTreeMap<u32, String>,
}

impl OpcodeTable {
    pub fn build(registry: &TypeRegistry, base: u32) -> Self {
        let mut table = Self::default();
        for (i, (api, _)) in registry.ordered_commands().into_iter().enumerate() {
            let opcode = base + i as u32;
            table.by_name.insert(api.name.clone(), opcode);
            table.by_opcode.insert(opcode, api.name.clone());
        }
        table
    }

    pub fn opcode(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn command(&self, opcode: u32) -> Option<&str> {
        self.by_opcode.get(&opcode).map(String::as_str)
    }

    /// `(opcode, name)` pairs in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_opcode.iter().map(|(op, name)| (*op, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_opcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_opcode.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VulkanType;

    fn tiny() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.begin_feature(Feature::version("VK_VERSION_1_0", 1, 0));
        reg.add_type("VkFlags", TypeDef::Basetype { underlying: "uint32_t".into() });
        reg.add_type("VkBufferCreateFlags", TypeDef::Bitmask { underlying: "VkFlags".into() });
        reg.add_type("VkDevice", TypeDef::Handle);
        reg.add_command(VulkanApi::new(
            "vkDeviceWaitIdle",
            "VkResult",
            vec![VulkanType::new("VkDevice", "device")],
        ));
        reg.begin_feature(Feature::with_kind("VK_KHR_maintenance1", FeatureKind::DeviceExtension));
        reg.add_command(VulkanApi::new(
            "vkTrimCommandPool",
            "void",
            vec![VulkanType::new("VkDevice", "device")],
        ));
        reg.add_alias("vkTrimCommandPoolKHR", "vkTrimCommandPool");
        reg.add_constant("VK_UUID_SIZE", 16);
        reg
    }

    #[test]
    fn encoding_size_follows_underlying() {
        let reg = tiny();
        assert_eq!(reg.encoding_size("VkBufferCreateFlags"), Some(4));
        assert_eq!(reg.encoding_size("VkDevice"), Some(8));
        assert_eq!(reg.encoding_size("size_t"), Some(8));
        assert_eq!(reg.encoding_size("VkUnknown"), None);
    }

    #[test]
    fn eval_constant_products() {
        let reg = tiny();
        assert_eq!(reg.eval_constant("4"), Some(4));
        assert_eq!(reg.eval_constant("VK_UUID_SIZE"), Some(16));
        assert_eq!(reg.eval_constant("2 * VK_UUID_SIZE"), Some(32));
        assert_eq!(reg.eval_constant("VK_NOPE"), None);
    }

    #[test]
    fn opcodes_skip_aliases() {
        let reg = tiny();
        let ops = reg.opcode_table(100);
        assert_eq!(ops.opcode("vkDeviceWaitIdle"), Some(100));
        assert_eq!(ops.opcode("vkTrimCommandPool"), Some(101));
        assert_eq!(ops.opcode("vkTrimCommandPoolKHR"), None);
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn json_round_trip_reindexes() {
        let reg = tiny();
        let json = reg.to_json().unwrap();
        let back = TypeRegistry::from_json(&json).unwrap();
        assert!(back.command("vkTrimCommandPoolKHR").is_some());
        assert_eq!(back.features.len(), 2);
    }
}
