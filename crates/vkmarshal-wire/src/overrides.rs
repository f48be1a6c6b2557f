//! Per-command hooks around the default encode/decode walk, and the
//! mapped-memory coherence protocol built on them.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use vkmarshal_types::VulkanApi;

use crate::error::WireError;
use crate::stream::{WireReader, WireSink};
use crate::value::{StructValue, Value};

/// `VK_WHOLE_SIZE`
pub const WHOLE_SIZE: u64 = u64::MAX;

/// Host-visible memory mapped on one side, keyed by that side's
/// `VkDeviceMemory` handle.
#[derive(Default)]
pub struct MappedRegions {
    regions: DashMap<u64, Vec<u8>>,
}

impl MappedRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self, memory: u64, bytes: Vec<u8>) {
        self.regions.insert(memory, bytes);
    }

    pub fn unmap(&self, memory: u64) -> Option<Vec<u8>> {
        self.regions.remove(&memory).map(|(_, v)| v)
    }

    pub fn size(&self, memory: u64) -> Option<u64> {
        self.regions.get(&memory).map(|r| r.len() as u64)
    }

    pub fn read(&self, memory: u64, offset: u64, len: u64) -> Option<Vec<u8>> {
        let region = self.regions.get(&memory)?;
        let start = offset as usize;
        let end = start.checked_add(len as usize)?;
        region.get(start..end).map(<[u8]>::to_vec)
    }

    /// Copy `bytes` to `offset`. Returns false when the range falls outside
    /// the region or the memory is not mapped.
    pub fn write(&self, memory: u64, offset: u64, bytes: &[u8]) -> bool {
        let Some(mut region) = self.regions.get_mut(&memory) else {
            return false;
        };
        let start = offset as usize;
        match region.get_mut(start..start + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

/// What an override sees of the call in flight.
pub struct OverrideContext<'a> {
    pub api: &'a VulkanApi,
    /// Parameter values as this side holds them: application handles on
    /// the guest, driver handles on the host.
    pub params: &'a [(String, Value)],
    pub memory: &'a MappedRegions,
}

/// Replaces slots of the default body for one command. `write_payload` and
/// `read_payload` run right after the parameters; `write_response` and
/// `read_response` run after the outputs and before the return value.
pub trait CommandOverride: Send + Sync {
    fn write_payload(&self, _ctx: &OverrideContext<'_>, _out: &mut dyn WireSink) -> Result<(), WireError> {
        Ok(())
    }

    fn read_payload(&self, _ctx: &OverrideContext<'_>, _input: &mut WireReader<'_>) -> Result<(), WireError> {
        Ok(())
    }

    fn write_response(&self, _ctx: &OverrideContext<'_>, _out: &mut dyn WireSink) -> Result<(), WireError> {
        Ok(())
    }

    fn read_response(&self, _ctx: &OverrideContext<'_>, _input: &mut WireReader<'_>) -> Result<(), WireError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, Arc<dyn CommandOverride>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The flush and invalidate payloads.
    pub fn defaults() -> Self {
        let mut table = Self::new();
        table.insert("vkFlushMappedMemoryRanges", Arc::new(FlushMappedRanges));
        table.insert("vkInvalidateMappedMemoryRanges", Arc::new(InvalidateMappedRanges));
        table
    }

    pub fn insert(&mut self, api: impl Into<String>, entry: Arc<dyn CommandOverride>) {
        self.entries.insert(api.into(), entry);
    }

    pub fn get(&self, api: &str) -> Option<&Arc<dyn CommandOverride>> {
        self.entries.get(api)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Mapped memory payloads ──────────────────────────────────────────────

struct Range {
    memory: u64,
    offset: u64,
    size: u64,
}

fn field(range: &StructValue, name: &str) -> Result<u64, WireError> {
    range
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| WireError::ValueShape(format!("VkMappedMemoryRange.{name} missing")))
}

fn mapped_ranges(ctx: &OverrideContext<'_>) -> Result<Vec<Range>, WireError> {
    let param = ctx
        .api
        .parameters
        .iter()
        .find(|p| p.type_name == "VkMappedMemoryRange" && p.is_pointer())
        .ok_or_else(|| WireError::ValueShape(format!("{} has no VkMappedMemoryRange parameter", ctx.api.name)))?;
    let value = crate::value::lookup(ctx.params, &param.param_name).unwrap_or(&Value::Null);
    value
        .structs()
        .into_iter()
        .map(|r| {
            Ok(Range {
                memory: field(r, "memory")?,
                offset: field(r, "offset")?,
                size: field(r, "size")?,
            })
        })
        .collect()
}

/// Stream each range as a 64-bit length followed by its bytes; zero means
/// no mapping on the sending side.
fn send_ranges(ctx: &OverrideContext<'_>, out: &mut dyn WireSink) -> Result<(), WireError> {
    for range in mapped_ranges(ctx)? {
        let bytes = ctx.memory.size(range.memory).and_then(|total| {
            let len = if range.size == WHOLE_SIZE {
                total.saturating_sub(range.offset)
            } else {
                range.size
            };
            ctx.memory.read(range.memory, range.offset, len)
        });
        match bytes {
            Some(bytes) => {
                out.put_be64(bytes.len() as u64);
                out.put_bytes(&bytes);
            }
            None => out.put_be64(0),
        }
    }
    Ok(())
}

/// Land each streamed range in this side's mapping, or skip it.
fn receive_ranges(ctx: &OverrideContext<'_>, input: &mut WireReader<'_>) -> Result<(), WireError> {
    for range in mapped_ranges(ctx)? {
        let len = input.get_be64()?;
        if len == 0 {
            continue;
        }
        let bytes = input.read_bytes(len as usize)?;
        if !ctx.memory.write(range.memory, range.offset, bytes) {
            warn!(memory = range.memory, len, "range not mapped on this side; skipped");
        } else {
            debug!(memory = range.memory, offset = range.offset, len, "mapped range updated");
        }
    }
    Ok(())
}

/// Guest writes flushed ranges after the parameters; the host copies them
/// into its mapping before the driver call.
pub struct FlushMappedRanges;

impl CommandOverride for FlushMappedRanges {
    fn write_payload(&self, ctx: &OverrideContext<'_>, out: &mut dyn WireSink) -> Result<(), WireError> {
        send_ranges(ctx, out)
    }

    fn read_payload(&self, ctx: &OverrideContext<'_>, input: &mut WireReader<'_>) -> Result<(), WireError> {
        receive_ranges(ctx, input)
    }
}

/// Host sends invalidated ranges after the outputs; the guest copies them
/// into its mapping.
pub struct InvalidateMappedRanges;

impl CommandOverride for InvalidateMappedRanges {
    fn write_response(&self, ctx: &OverrideContext<'_>, out: &mut dyn WireSink) -> Result<(), WireError> {
        send_ranges(ctx, out)
    }

    fn read_response(&self, ctx: &OverrideContext<'_>, input: &mut WireReader<'_>) -> Result<(), WireError> {
        receive_ranges(ctx, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_bound_reads_and_writes() {
        let regions = MappedRegions::new();
        regions.map(7, vec![0; 16]);
        assert!(regions.write(7, 4, &[1, 2, 3]));
        assert_eq!(regions.read(7, 4, 3), Some(vec![1, 2, 3]));
        assert!(!regions.write(7, 15, &[1, 2]));
        assert_eq!(regions.read(7, 10, 10), None);
        assert!(!regions.write(8, 0, &[1]));
        assert_eq!(regions.size(7), Some(16));
        assert_eq!(regions.unmap(7).map(|r| r.len()), Some(16));
        assert_eq!(regions.size(7), None);
    }

    #[test]
    fn defaults_cover_flush_and_invalidate() {
        let table = OverrideTable::defaults();
        assert_eq!(table.len(), 2);
        assert!(table.get("vkFlushMappedMemoryRanges").is_some());
        assert!(table.get("vkInvalidateMappedMemoryRanges").is_some());
        assert!(table.get("vkCreateBuffer").is_none());
    }
}
