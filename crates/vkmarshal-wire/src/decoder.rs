//! Host side: walk a command stream, call the driver, and write responses.

use tracing::{debug, trace, warn};
use vkmarshal_types::extension::default_root_type_mappings;
use vkmarshal_types::{
    HandleCatalog, HandleRole, OpcodeTable, TypeRegistry, VulkanApi, DEFAULT_OPCODE_BASE, STRUCTURE_TYPE_MAX_ENUM,
};

use crate::codec::{Codec, Frame};
use crate::error::WireError;
use crate::handles::{is_destroyed, HandleMapping, HandleTable, MappingMode};
use crate::overrides::{MappedRegions, OverrideContext, OverrideTable};
use crate::packet::{PacketHeader, HEADER_SIZE};
use crate::stream::{WireReader, WireSink, WireWriter};
use crate::value::{Fields, Value};

/// The real driver behind the decoder.
pub trait HostDriver: Send {
    /// Run `api` with driver handles in `params` and write outputs back into
    /// them. Returns [`Value::Null`] for `void` commands.
    fn call(&mut self, api: &VulkanApi, params: &mut Fields) -> Value;
}

/// Observes every committed call, after its response is written.
pub trait SnapshotHook: Send {
    fn record(&mut self, api: &VulkanApi, params: &[(String, Value)], ret: &Value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    WaitingForHeader,
    /// A header arrived but its body has not.
    ReadingBody,
    Dispatching,
}

pub struct Decoder<'r, D> {
    codec: Codec<'r>,
    catalog: HandleCatalog,
    opcodes: OpcodeTable,
    /// Boxed wire id -> driver handle
    handles: HandleTable,
    /// Host mappings, keyed by driver `VkDeviceMemory` handle.
    memory: MappedRegions,
    overrides: OverrideTable,
    driver: D,
    snapshot: Option<Box<dyn SnapshotHook>>,
    state: DecoderState,
}

impl<'r, D: HostDriver> Decoder<'r, D> {
    pub fn new(registry: &'r TypeRegistry, driver: D) -> Self {
        Self::with_codec(
            Codec::new(registry, &default_root_type_mappings()),
            DEFAULT_OPCODE_BASE,
            driver,
        )
    }

    pub fn with_codec(codec: Codec<'r>, opcode_base: u32, driver: D) -> Self {
        let registry = codec.registry();
        Self {
            catalog: registry.handle_catalog(),
            opcodes: registry.opcode_table(opcode_base),
            codec,
            handles: HandleTable::new(),
            memory: MappedRegions::new(),
            overrides: OverrideTable::defaults(),
            driver,
            snapshot: None,
            state: DecoderState::WaitingForHeader,
        }
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_snapshot(mut self, hook: Box<dyn SnapshotHook>) -> Self {
        self.snapshot = Some(hook);
        self
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn memory(&self) -> &MappedRegions {
        &self.memory
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Driver handle behind a boxed wire id.
    pub fn driver_handle(&self, boxed: u64) -> Result<u64, WireError> {
        self.handles.resolve(boxed)
    }

    /// Process every whole packet in `buf`, appending responses to `out`.
    /// Returns the bytes consumed. Decoding stops at a partial packet, a
    /// header claiming fewer than [`HEADER_SIZE`] bytes, or an opcode with
    /// no command behind it.
    ///
    /// A packet whose body fails to decode is an error only when it is the
    /// first one in `buf`. Otherwise decoding stops in front of it and the
    /// count so far is returned, so the error surfaces on the next call.
    pub fn decode(&mut self, buf: &[u8], out: &mut Vec<u8>) -> Result<usize, WireError> {
        let registry = self.codec.registry();
        let mut pos = 0;
        loop {
            self.state = DecoderState::WaitingForHeader;
            if buf.len() - pos < HEADER_SIZE {
                return Ok(pos);
            }
            let header = PacketHeader::parse(&buf[pos..])?;
            let len = header.length as usize;
            if len < HEADER_SIZE {
                warn!(opcode = header.opcode, len, "packet length below header size; stopping");
                return Ok(pos);
            }
            if buf.len() - pos < len {
                self.state = DecoderState::ReadingBody;
                trace!(opcode = header.opcode, len, available = buf.len() - pos, "partial packet");
                return Ok(pos);
            }
            let api = match self.opcodes.command(header.opcode) {
                Some(name) => registry
                    .command(name)
                    .ok_or_else(|| WireError::UnknownCommand(name.to_string()))?,
                None => {
                    warn!(opcode = header.opcode, "unknown opcode; stopping");
                    return Ok(pos);
                }
            };
            self.state = DecoderState::Dispatching;
            if let Err(err) = self.dispatch(api, &buf[pos + HEADER_SIZE..pos + len], out) {
                if pos == 0 {
                    return Err(err);
                }
                warn!(api = %api.name, offset = pos, error = %err, "packet failed to decode; stopping");
                return Ok(pos);
            }
            pos += len;
        }
    }

    fn dispatch(&mut self, api: &'r VulkanApi, body: &[u8], out: &mut Vec<u8>) -> Result<(), WireError> {
        let registry = self.codec.registry();
        let mut input = WireReader::new(body);
        let mut params = Fields::with_capacity(api.parameters.len());

        for (i, param) in api.parameters.iter().enumerate() {
            let role = self.catalog.classify(registry, api, i);
            let mode = if role == HandleRole::Dispatch || param.is_output() {
                MappingMode::None
            } else if is_destroyed(&self.catalog, registry, api, i) {
                MappingMode::UnwrapAndDelete
            } else {
                MappingMode::Unwrap
            };
            let mut root = STRUCTURE_TYPE_MAX_ENUM;
            let value = self.codec.read(
                &mut input,
                param,
                Frame::of_api(api, &params),
                &mut root,
                HandleMapping::new(&self.handles, mode),
            )?;
            params.push((param.param_name.clone(), value));
        }

        // The dispatch handle keeps its boxed id until the call completes.
        let boxed_dispatch = match (self.catalog.classify(registry, api, 0), params.first_mut()) {
            (HandleRole::Dispatch, Some((_, value))) => {
                let boxed = value.as_u64().unwrap_or(0);
                *value = Value::Handle(HandleMapping::new(&self.handles, MappingMode::Unwrap).map(boxed));
                Some(boxed)
            }
            _ => None,
        };

        if let Some(hook) = self.overrides.get(&api.name) {
            let ctx = OverrideContext {
                api,
                params: &params,
                memory: &self.memory,
            };
            hook.read_payload(&ctx, &mut input)?;
        }
        if input.remaining() > 0 {
            warn!(api = %api.name, trailing = input.remaining(), "packet has trailing bytes");
        }

        let skip = api.parameters.iter().enumerate().any(|(i, param)| {
            !param.is_pointer()
                && is_destroyed(&self.catalog, registry, api, i)
                && params[i].1.as_u64() == Some(0)
        });
        let ret = if skip {
            debug!(api = %api.name, "destroyed handle is null; driver call skipped");
            if api.has_return() {
                Value::Int(0)
            } else {
                Value::Null
            }
        } else {
            self.driver.call(api, &mut params)
        };

        if self.catalog.destroys_dispatch(registry, api) {
            if let Some(boxed) = boxed_dispatch.filter(|b| *b != 0) {
                self.handles.remove(boxed);
            }
        }

        let mut response = WireWriter::new();
        for (i, param) in api.parameters.iter().enumerate() {
            if !param.is_output() {
                continue;
            }
            let map = if self.catalog.classify(registry, api, i) == HandleRole::Create {
                HandleMapping::new(&self.handles, MappingMode::Create)
            } else {
                HandleMapping::none()
            };
            let mut root = STRUCTURE_TYPE_MAX_ENUM;
            self.codec
                .write(&mut response, param, &params[i].1, Frame::of_api(api, &params), &mut root, map)?;
        }
        if let Some(hook) = self.overrides.get(&api.name) {
            let ctx = OverrideContext {
                api,
                params: &params,
                memory: &self.memory,
            };
            hook.write_response(&ctx, &mut response)?;
        }
        if api.has_return() {
            let mut root = STRUCTURE_TYPE_MAX_ENUM;
            self.codec.write(
                &mut response,
                &api.return_value(),
                &ret,
                Frame::of_api(api, &params),
                &mut root,
                HandleMapping::none(),
            )?;
        }

        debug!(api = %api.name, response = response.bytes_written(), skipped = skip, "dispatched");
        out.extend_from_slice(response.as_slice());
        if let Some(hook) = self.snapshot.as_mut() {
            hook.record(api, &params, &ret);
        }
        Ok(())
    }
}
