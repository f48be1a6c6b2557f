use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::decl;
use crate::error::TypeError;
use crate::handle;

/// Role a member or parameter plays in describing a device-memory range.
///
/// The transform layer hands the five roles to the resource tracker in the
/// order of [`DeviceMemoryRole::CANONICAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMemoryRole {
    Handle,
    Offset,
    Size,
    TypeIndex,
    TypeBits,
}

impl DeviceMemoryRole {
    pub const CANONICAL: [DeviceMemoryRole; 5] = [
        DeviceMemoryRole::Handle,
        DeviceMemoryRole::Offset,
        DeviceMemoryRole::Size,
        DeviceMemoryRole::TypeIndex,
        DeviceMemoryRole::TypeBits,
    ];

    pub fn flag(self) -> MemoryRoles {
        match self {
            DeviceMemoryRole::Handle => MemoryRoles::HANDLE,
            DeviceMemoryRole::Offset => MemoryRoles::OFFSET,
            DeviceMemoryRole::Size => MemoryRoles::SIZE,
            DeviceMemoryRole::TypeIndex => MemoryRoles::TYPE_INDEX,
            DeviceMemoryRole::TypeBits => MemoryRoles::TYPE_BITS,
        }
    }

    /// Element type used when a role is absent and a dummy pointer is passed.
    pub fn c_type(self) -> &'static str {
        match self {
            DeviceMemoryRole::Handle => "VkDeviceMemory",
            DeviceMemoryRole::Offset | DeviceMemoryRole::Size => "VkDeviceSize",
            DeviceMemoryRole::TypeIndex | DeviceMemoryRole::TypeBits => "uint32_t",
        }
    }
}

bitflags! {
    /// Set of device-memory roles present on a struct or command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryRoles: u8 {
        const HANDLE = 1 << 0;
        const OFFSET = 1 << 1;
        const SIZE = 1 << 2;
        const TYPE_INDEX = 1 << 3;
        const TYPE_BITS = 1 << 4;
    }
}

/// Marshal a member only when a sibling field holds one of `values`.
///
/// The sibling must be declared before the filtered member so the reader
/// has already seen it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFilter {
    pub field: String,
    pub values: Vec<u64>,
}

/// Stream feature bit that gates a member on both sides of the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFeature {
    pub name: String,
    /// Mask value of the feature, not a bit index.
    pub bit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_memory_role: Option<DeviceMemoryRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MemberFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_feature: Option<StreamFeature>,
    /// Extra name bindings consulted by length resolution.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        *self == Annotations::default()
    }
}

/// One occurrence of a type: a struct member or a command parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulkanType {
    pub type_name: String,
    pub param_name: String,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub pointer_indirection_levels: u8,
    #[serde(default)]
    pub is_pointer_to_const_pointer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_arr_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len_expr: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl VulkanType {
    pub fn new(type_name: impl Into<String>, param_name: impl Into<String>) -> Self {
        let param_name = param_name.into();
        Self {
            type_name: type_name.into(),
            is_optional: param_name == "pNext",
            param_name,
            is_const: false,
            pointer_indirection_levels: 0,
            is_pointer_to_const_pointer: false,
            static_arr_expr: None,
            len_expr: None,
            annotations: Annotations::default(),
        }
    }

    /// Parse a C declaration such as `const char* const* ppEnabledLayerNames`.
    pub fn from_decl(text: &str) -> Result<Self, TypeError> {
        decl::parse(text)
    }

    pub fn with_len(mut self, len: impl Into<String>) -> Self {
        self.len_expr = Some(len.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn with_role(mut self, role: DeviceMemoryRole) -> Self {
        self.annotations.device_memory_role = Some(role);
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, values: &[u64]) -> Self {
        self.annotations.filter = Some(MemberFilter {
            field: field.into(),
            values: values.to_vec(),
        });
        self
    }

    pub fn with_stream_feature(mut self, name: impl Into<String>, bit: u32) -> Self {
        self.annotations.stream_feature = Some(StreamFeature {
            name: name.into(),
            bit,
        });
        self
    }

    pub fn with_param_name(&self, name: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.param_name = name.into();
        copy
    }

    pub fn is_next_pointer(&self) -> bool {
        self.param_name == "pNext"
    }

    pub fn is_handle_type(&self) -> bool {
        handle::is_handle_type(&self.type_name)
    }

    pub fn is_dispatchable_handle(&self) -> bool {
        handle::is_dispatchable(&self.type_name)
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_indirection_levels > 0
    }

    pub fn is_static_array(&self) -> bool {
        self.static_arr_expr.is_some()
    }

    pub fn is_void(&self) -> bool {
        self.type_name == "void"
    }

    /// `null-terminated` length component, or a bare `char*` with no length.
    pub fn is_null_terminated(&self) -> bool {
        match &self.len_expr {
            None => true,
            Some(len) => len.split(',').any(|c| c.trim() == "null-terminated"),
        }
    }

    pub fn is_string(&self) -> bool {
        self.type_name == "char"
            && self.pointer_indirection_levels == 1
            && !self.is_static_array()
            && self.is_null_terminated()
    }

    pub fn is_string_array(&self) -> bool {
        self.type_name == "char"
            && self.pointer_indirection_levels == 2
            && self.is_pointer_to_const_pointer
    }

    /// A non-const pointer the callee writes through.
    pub fn is_output(&self) -> bool {
        self.is_pointer() && !self.is_const
    }

    pub fn is_allocation_callbacks(&self) -> bool {
        self.type_name == "VkAllocationCallbacks"
    }

    /// First length component that names an element count.
    pub fn count_expr(&self) -> Option<&str> {
        let len = self.len_expr.as_deref()?;
        len.split(',')
            .map(str::trim)
            .find(|c| !c.is_empty() && *c != "null-terminated" && *c != "1")
    }

    pub fn memory_role(&self) -> Option<DeviceMemoryRole> {
        self.annotations.device_memory_role
    }
}

/// A struct or union definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulkanCompoundType {
    pub name: String,
    pub members: Vec<VulkanType>,
    #[serde(default)]
    pub is_union: bool,
    /// `VK_STRUCTURE_TYPE_*` literal for structs that carry `sType`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub struct_extends: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl VulkanCompoundType {
    pub fn new(name: impl Into<String>, members: Vec<VulkanType>) -> Self {
        Self {
            name: name.into(),
            members,
            is_union: false,
            structure_type: None,
            struct_extends: Vec::new(),
            feature: None,
            environment: BTreeMap::new(),
        }
    }

    pub fn member(&self, name: &str) -> Option<&VulkanType> {
        self.members.iter().find(|m| m.param_name == name)
    }

    /// Members that go over the wire. Unions only carry their first member.
    pub fn marshaled_members(&self) -> &[VulkanType] {
        if self.is_union {
            &self.members[..self.members.len().min(1)]
        } else {
            &self.members
        }
    }

    pub fn is_extendable(&self) -> bool {
        !self.struct_extends.is_empty()
    }

    pub fn has_structure_type(&self) -> bool {
        self.member("sType").is_some()
    }

    pub fn memory_roles(&self) -> MemoryRoles {
        roles_of(&self.members)
    }

    /// Member name per device-memory role.
    pub fn role_members(&self) -> BTreeMap<DeviceMemoryRole, &VulkanType> {
        self.members
            .iter()
            .filter_map(|m| m.memory_role().map(|r| (r, m)))
            .collect()
    }
}

/// A command definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulkanApi {
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<VulkanType>,
    /// Set on commands whose arguments pass through the transform layer.
    #[serde(default)]
    pub transformed: bool,
}

impl VulkanApi {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>, parameters: Vec<VulkanType>) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            parameters,
            transformed: false,
        }
    }

    pub fn has_return(&self) -> bool {
        self.return_type != "void"
    }

    /// Return value as a type occurrence named `<api>_<type>_return`.
    pub fn return_value(&self) -> VulkanType {
        VulkanType::new(
            self.return_type.clone(),
            format!("{}_{}_return", self.name, self.return_type),
        )
    }

    pub fn parameter(&self, name: &str) -> Option<&VulkanType> {
        self.parameters.iter().find(|p| p.param_name == name)
    }

    pub fn memory_roles(&self) -> MemoryRoles {
        roles_of(&self.parameters)
    }

    /// Parameter index per device-memory role.
    pub fn role_params(&self) -> BTreeMap<DeviceMemoryRole, usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.memory_role().map(|r| (r, i)))
            .collect()
    }

    pub fn dispatch_param(&self) -> Option<&VulkanType> {
        self.parameters.first().filter(|p| p.is_dispatchable_handle())
    }
}

fn roles_of(types: &[VulkanType]) -> MemoryRoles {
    types
        .iter()
        .filter_map(VulkanType::memory_role)
        .fold(MemoryRoles::empty(), |acc, r| acc | r.flag())
}
