//! Per-command replacements for parts of the default encoder and decoder
//! bodies.
//!
//! An override fills one or more slots of a command. `payload` runs right
//! after the parameters have been marshaled (encoder, once per stream) or
//! unmarshaled (decoder). `response` runs after the outputs and before the
//! return value. `body` replaces the whole default body.

use std::collections::BTreeMap;

use vkmarshal_types::{TypeRegistry, VulkanApi, VulkanType};

use crate::emitter::CodeEmitter;
use crate::error::GenError;

/// Names an override emitter may reference in the surrounding body.
#[derive(Debug, Clone, Copy)]
pub struct OverrideSite<'a> {
    pub registry: &'a TypeRegistry,
    pub api: &'a VulkanApi,
    /// Stream the slot writes to or reads from.
    pub stream: &'a str,
    /// Resource tracker or decoder state.
    pub tracker: &'a str,
}

pub type OverrideFn = fn(&mut CodeEmitter, &OverrideSite<'_>) -> Result<(), GenError>;

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandOverride {
    pub payload: Option<OverrideFn>,
    pub response: Option<OverrideFn>,
    pub body: Option<OverrideFn>,
}

#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: BTreeMap<String, CommandOverride>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Guest side of the mapped-memory coherence protocol.
    pub fn encoder_defaults() -> Self {
        let mut table = Self::new();
        table.insert(
            "vkFlushMappedMemoryRanges",
            CommandOverride {
                payload: Some(encode_flush_payload),
                ..Default::default()
            },
        );
        table.insert(
            "vkInvalidateMappedMemoryRanges",
            CommandOverride {
                response: Some(encode_invalidate_response),
                ..Default::default()
            },
        );
        table
    }

    /// Host side of the mapped-memory coherence protocol.
    pub fn decoder_defaults() -> Self {
        let mut table = Self::new();
        table.insert(
            "vkFlushMappedMemoryRanges",
            CommandOverride {
                payload: Some(decode_flush_payload),
                ..Default::default()
            },
        );
        table.insert(
            "vkInvalidateMappedMemoryRanges",
            CommandOverride {
                response: Some(decode_invalidate_response),
                ..Default::default()
            },
        );
        table
    }

    pub fn insert(&mut self, api: impl Into<String>, entry: CommandOverride) {
        self.entries.insert(api.into(), entry);
    }

    pub fn get(&self, api: &str) -> Option<&CommandOverride> {
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

/// The `VkMappedMemoryRange` array parameter and its count parameter.
fn mapped_ranges<'a>(api: &'a VulkanApi) -> Result<(&'a VulkanType, &'a str), GenError> {
    let ranges = api
        .parameters
        .iter()
        .find(|p| p.type_name == "VkMappedMemoryRange" && p.is_pointer())
        .ok_or_else(|| {
            GenError::Config(format!(
                "{} has no VkMappedMemoryRange parameter for its payload override",
                api.name
            ))
        })?;
    let count = ranges.count_expr().ok_or_else(|| {
        GenError::Config(format!("{}.{} has no element count", api.name, ranges.param_name))
    })?;
    Ok((ranges, count))
}

fn begin_range_loop(cgen: &mut CodeEmitter, api: &VulkanApi) -> Result<(), GenError> {
    let (ranges, count) = mapped_ranges(api)?;
    let r = &ranges.param_name;
    cgen.begin_for("uint32_t i = 0", format!("i < {count}"), "++i");
    cgen.stmt(format!("auto range = {r}[i]"));
    cgen.stmt("auto memory = range.memory");
    cgen.stmt("auto size = range.size");
    cgen.stmt("auto offset = range.offset");
    Ok(())
}

/// Guest: a 64-bit length and the mapped bytes of every range, zero for
/// ranges without a host pointer.
fn encode_flush_payload(cgen: &mut CodeEmitter, site: &OverrideSite<'_>) -> Result<(), GenError> {
    let (s, res) = (site.stream, site.tracker);
    begin_range_loop(cgen, site.api)?;
    cgen.stmt("uint64_t streamSize = 0");
    cgen.begin_if("!memory");
    cgen.stmt(format!("{s}->putBe64(streamSize)"));
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt(format!("auto hostPtr = {res}->getMappedPointer(memory)"));
    cgen.stmt(format!(
        "auto actualSize = size == VK_WHOLE_SIZE ? {res}->getMappedSize(memory) - offset : size"
    ));
    cgen.begin_if("!hostPtr");
    cgen.stmt(format!("{s}->putBe64(streamSize)"));
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt("streamSize = actualSize");
    cgen.stmt(format!("{s}->putBe64(streamSize)"));
    cgen.stmt("uint8_t* targetRange = hostPtr + offset");
    cgen.stmt(format!("{s}->write(targetRange, actualSize)"));
    cgen.end_for();
    Ok(())
}

/// Guest: copy the bytes the host sent back into the mapped ranges.
fn encode_invalidate_response(cgen: &mut CodeEmitter, site: &OverrideSite<'_>) -> Result<(), GenError> {
    let (s, res) = (site.stream, site.tracker);
    begin_range_loop(cgen, site.api)?;
    cgen.stmt("(void)size");
    cgen.stmt(format!("uint64_t readStream = {s}->getBe64()"));
    cgen.begin_if("!readStream");
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt(format!(
        "auto hostPtr = memory ? {res}->getMappedPointer(memory) : nullptr"
    ));
    cgen.begin_if("!hostPtr");
    cgen.stmt(format!("{s}->skip(readStream)"));
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt("uint8_t* targetRange = hostPtr + offset");
    cgen.stmt(format!("{s}->read(targetRange, readStream)"));
    cgen.end_for();
    Ok(())
}

/// Host: land the guest's bytes in the host mapping before the driver call.
fn decode_flush_payload(cgen: &mut CodeEmitter, site: &OverrideSite<'_>) -> Result<(), GenError> {
    let (s, state) = (site.stream, site.tracker);
    begin_range_loop(cgen, site.api)?;
    cgen.stmt("(void)size");
    cgen.stmt(format!("uint64_t readStream = {s}->getBe64()"));
    cgen.begin_if("!readStream");
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt(format!("auto hostPtr = {state}->getMappedHostPointer(memory)"));
    cgen.begin_if("!hostPtr");
    cgen.stmt(format!("{s}->skip(readStream)"));
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt("uint8_t* targetRange = hostPtr + offset");
    cgen.stmt(format!("{s}->read(targetRange, readStream)"));
    cgen.end_for();
    Ok(())
}

/// Host: send the invalidated bytes after the outputs.
fn decode_invalidate_response(cgen: &mut CodeEmitter, site: &OverrideSite<'_>) -> Result<(), GenError> {
    let (s, state) = (site.stream, site.tracker);
    begin_range_loop(cgen, site.api)?;
    cgen.stmt("uint64_t writeStream = 0");
    cgen.stmt(format!("auto hostPtr = {state}->getMappedHostPointer(memory)"));
    cgen.stmt(format!(
        "auto actualSize = size == VK_WHOLE_SIZE ? {state}->getDeviceMemorySize(memory) - offset : size"
    ));
    cgen.begin_if("!hostPtr");
    cgen.stmt(format!("{s}->putBe64(writeStream)"));
    cgen.stmt("continue");
    cgen.end_if();
    cgen.stmt("writeStream = actualSize");
    cgen.stmt(format!("{s}->putBe64(writeStream)"));
    cgen.stmt("uint8_t* targetRange = hostPtr + offset");
    cgen.stmt(format!("{s}->write(targetRange, actualSize)"));
    cgen.end_for();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::sample::sample_registry;

    #[test]
    fn default_tables_cover_both_coherence_commands() {
        let enc = OverrideTable::encoder_defaults();
        assert!(enc.get("vkFlushMappedMemoryRanges").and_then(|o| o.payload).is_some());
        assert!(enc.get("vkInvalidateMappedMemoryRanges").and_then(|o| o.response).is_some());
        let dec = OverrideTable::decoder_defaults();
        assert_eq!(dec.len(), 2);
        assert!(dec.get("vkCreateBuffer").is_none());
    }

    #[test]
    fn flush_payload_prefixes_length() {
        let reg = sample_registry().unwrap();
        let api = reg.command("vkFlushMappedMemoryRanges").unwrap();
        let site = OverrideSite {
            registry: &reg,
            api,
            stream: "countingStream",
            tracker: "resources",
        };
        let mut cgen = CodeEmitter::new();
        encode_flush_payload(&mut cgen, &site).unwrap();
        let text = cgen.into_string();
        assert!(text.starts_with("for (uint32_t i = 0; i < memoryRangeCount; ++i) {\n    auto range = pMemoryRanges[i];"));
        assert!(text.contains("countingStream->putBe64(streamSize);"));
        assert!(text.contains("countingStream->write(targetRange, actualSize);"));
    }

    #[test]
    fn payload_needs_a_range_parameter() {
        let reg = sample_registry().unwrap();
        let api = reg.command("vkCreateBuffer").unwrap();
        let site = OverrideSite {
            registry: &reg,
            api,
            stream: "vkStream",
            tracker: "m_state",
        };
        let mut cgen = CodeEmitter::new();
        assert!(matches!(
            decode_invalidate_response(&mut cgen, &site),
            Err(GenError::Config(_))
        ));
    }
}
