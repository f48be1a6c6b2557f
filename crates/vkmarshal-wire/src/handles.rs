use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{trace, warn};
use vkmarshal_types::{HandleCatalog, HandleRole, TypeRegistry, VulkanApi};

use crate::error::WireError;
use crate::value::Value;

/// Bidirectional handle table between the ids one side hands out and the
/// ids it forwards.
///
/// On the guest, `local` is the handle the application sees and `remote` is
/// the wire id the host assigned. On the host, `local` is the boxed wire id
/// and `remote` is the real driver handle.
pub struct HandleTable {
    /// Local handle -> remote handle
    local_to_remote: DashMap<u64, u64>,
    /// Remote handle -> local handle
    remote_to_local: DashMap<u64, u64>,
    /// Counter for generating unique local handles
    next_local: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Hand out local ids from `first` upward. Zero stays reserved for
    /// `VK_NULL_HANDLE`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            local_to_remote: DashMap::new(),
            remote_to_local: DashMap::new(),
            next_local: AtomicU64::new(first.max(1)),
        }
    }

    /// Register a remote handle and return a new local handle.
    pub fn create(&self, remote: u64) -> u64 {
        let local = self.next_local.fetch_add(1, Ordering::Relaxed);
        self.local_to_remote.insert(local, remote);
        self.remote_to_local.insert(remote, local);
        local
    }

    pub fn unwrap(&self, local: u64) -> Option<u64> {
        self.local_to_remote.get(&local).map(|v| *v)
    }

    /// [`HandleTable::unwrap`] for callers that treat a miss as an error.
    pub fn resolve(&self, local: u64) -> Result<u64, WireError> {
        self.unwrap(local).ok_or(WireError::HandleNotFound(local))
    }

    pub fn to_local(&self, remote: u64) -> Option<u64> {
        self.remote_to_local.get(&remote).map(|v| *v)
    }

    /// Remove a handle pair by local handle.
    pub fn remove(&self, local: u64) -> Option<u64> {
        let (_, remote) = self.local_to_remote.remove(&local)?;
        self.remote_to_local.remove(&remote);
        Some(remote)
    }

    pub fn len(&self) -> usize {
        self.local_to_remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_to_remote.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// How handle values are translated while a stream walks a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    None,
    Unwrap,
    Create,
    UnwrapAndDelete,
}

#[derive(Clone, Copy)]
pub struct HandleMapping<'a> {
    table: Option<&'a HandleTable>,
    mode: MappingMode,
}

impl<'a> HandleMapping<'a> {
    pub fn new(table: &'a HandleTable, mode: MappingMode) -> Self {
        Self {
            table: Some(table),
            mode,
        }
    }

    pub fn none() -> Self {
        Self {
            table: None,
            mode: MappingMode::None,
        }
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    /// Translate one id. `VK_NULL_HANDLE` always maps to itself; an id the
    /// table does not know maps to `VK_NULL_HANDLE`.
    pub fn map(&self, id: u64) -> u64 {
        let table = match self.table {
            Some(table) if id != 0 => table,
            _ => return id,
        };
        let mapped = match self.mode {
            MappingMode::None => Some(id),
            MappingMode::Unwrap => table.unwrap(id),
            MappingMode::Create => Some(table.create(id)),
            MappingMode::UnwrapAndDelete => table.remove(id),
        };
        match mapped {
            Some(out) => {
                trace!(mode = ?self.mode, id, out, "handle mapped");
                out
            }
            None => {
                warn!(mode = ?self.mode, id, "handle not in table");
                0
            }
        }
    }
}

/// Parameter `index` of `api` is destroyed by the call, including a
/// dispatch handle the command tears down itself.
pub fn is_destroyed(catalog: &HandleCatalog, registry: &TypeRegistry, api: &VulkanApi, index: usize) -> bool {
    match catalog.classify(registry, api, index) {
        HandleRole::Destroy => true,
        HandleRole::Dispatch => catalog.destroys_dispatch(registry, api),
        _ => false,
    }
}

/// Handle ids held by a single handle or an array of handles.
pub fn handle_ids(value: &Value) -> Vec<u64> {
    match value {
        Value::Handle(h) => vec![*h],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::Handle(h) => Some(*h),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_unwrap() {
        let table = HandleTable::new();
        let a = table.create(0xA000);
        let b = table.create(0xB000);
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_eq!(table.unwrap(a), Some(0xA000));
        assert_eq!(table.to_local(0xB000), Some(b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_forgets_both_directions() {
        let table = HandleTable::new();
        let a = table.create(0xA000);
        assert_eq!(table.remove(a), Some(0xA000));
        assert_eq!(table.unwrap(a), None);
        assert_eq!(table.to_local(0xA000), None);
        assert!(table.is_empty());
        assert_eq!(table.remove(a), None);
    }

    #[test]
    fn mapping_modes() {
        let table = HandleTable::starting_at(100);
        let created = HandleMapping::new(&table, MappingMode::Create).map(0xD0);
        assert_eq!(created, 100);
        assert_eq!(HandleMapping::new(&table, MappingMode::Unwrap).map(created), 0xD0);
        assert_eq!(HandleMapping::new(&table, MappingMode::None).map(created), created);
        assert_eq!(HandleMapping::new(&table, MappingMode::UnwrapAndDelete).map(created), 0xD0);
        assert_eq!(HandleMapping::new(&table, MappingMode::Unwrap).map(created), 0);
        assert_eq!(HandleMapping::new(&table, MappingMode::Create).map(0), 0);
        assert_eq!(HandleMapping::none().map(42), 42);
    }
}
