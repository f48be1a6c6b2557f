//! Vulkan type model for the vkmarshal generator.
//!
//! The registry arrives here already parsed (from JSON produced by an
//! upstream registry parser, or from the built-in sample). Everything the
//! generator and the reference wire runtime need to agree on lives in this
//! crate: how an occurrence is classified, how its element count is
//! resolved, which handles a command creates or destroys, and how extension
//! structs are dispatched.

pub mod decl;
pub mod error;
pub mod extension;
pub mod handle;
pub mod length;
pub mod registry;
pub mod sample;
pub mod shape;
pub mod types;

pub use error::TypeError;
pub use extension::{CaseTarget, ExtensionCase, ExtensionDispatch, RootTypeMapping};
pub use handle::{HandleCatalog, HandleInfo, HandleRole};
pub use length::{LengthExpr, LengthScope};
pub use registry::{Feature, FeatureKind, OpcodeTable, TypeDef, TypeRegistry};
pub use shape::{classify, needs_presence_check, Shape};
pub use types::{
    Annotations, DeviceMemoryRole, MemberFilter, MemoryRoles, StreamFeature, VulkanApi,
    VulkanCompoundType, VulkanType,
};

/// First opcode handed out when the configuration does not override it.
pub const DEFAULT_OPCODE_BASE: u32 = 20000;

/// `VK_STRUCTURE_TYPE_MAX_ENUM`, used as the "no root yet" sentinel.
pub const STRUCTURE_TYPE_MAX_ENUM: i64 = 0x7FFF_FFFF;
