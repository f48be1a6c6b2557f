//! Guest side: turn a call into a packet and apply the host's response.

use tracing::{debug, trace, warn};
use vkmarshal_types::extension::default_root_type_mappings;
use vkmarshal_types::{
    HandleCatalog, HandleRole, OpcodeTable, TypeRegistry, VulkanApi, DEFAULT_OPCODE_BASE, STRUCTURE_TYPE_MAX_ENUM,
};

use crate::codec::{Codec, Frame};
use crate::error::WireError;
use crate::handles::{handle_ids, is_destroyed, HandleMapping, HandleTable, MappingMode};
use crate::overrides::{MappedRegions, OverrideContext, OverrideTable};
use crate::packet::{PacketHeader, HEADER_SIZE};
use crate::stream::{CountingStream, WireReader, WireSink, WireWriter};
use crate::value::{lookup, set_field, Fields, Value};

/// Carries one packet to the host and returns the response bytes.
pub trait Transport {
    fn round_trip(&self, packet: &[u8]) -> Result<Vec<u8>, WireError>;
}

/// Parameters after the response was applied, plus the return value
/// ([`Value::Null`] for `void` commands).
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub params: Fields,
    pub ret: Value,
}

impl CallResult {
    pub fn param(&self, name: &str) -> Option<&Value> {
        lookup(&self.params, name)
    }
}

pub struct Encoder<'r> {
    codec: Codec<'r>,
    catalog: HandleCatalog,
    opcodes: OpcodeTable,
    /// Application handle -> host wire id
    handles: HandleTable,
    memory: MappedRegions,
    overrides: OverrideTable,
}

impl<'r> Encoder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self::with_codec(Codec::new(registry, &default_root_type_mappings()), DEFAULT_OPCODE_BASE)
    }

    pub fn with_codec(codec: Codec<'r>, opcode_base: u32) -> Self {
        let registry = codec.registry();
        Self {
            catalog: registry.handle_catalog(),
            opcodes: registry.opcode_table(opcode_base),
            codec,
            handles: HandleTable::new(),
            memory: MappedRegions::new(),
            overrides: OverrideTable::defaults(),
        }
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn codec(&self) -> &Codec<'r> {
        &self.codec
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Guest-side mappings, keyed by application `VkDeviceMemory` handle.
    pub fn memory(&self) -> &MappedRegions {
        &self.memory
    }

    pub fn opcodes(&self) -> &OpcodeTable {
        &self.opcodes
    }

    fn command(&self, name: &str) -> Result<(&'r VulkanApi, u32), WireError> {
        let registry = self.codec.registry();
        let api = registry
            .command(name)
            .ok_or_else(|| WireError::UnknownCommand(name.to_string()))?;
        let opcode = self
            .opcodes
            .opcode(&api.name)
            .ok_or_else(|| WireError::UnknownCommand(api.name.clone()))?;
        Ok((api, opcode))
    }

    /// Parameters for `name` with every occurrence at its zero value.
    pub fn zeroed_params(&self, name: &str) -> Result<Fields, WireError> {
        let (api, _) = self.command(name)?;
        let mut params = Fields::with_capacity(api.parameters.len());
        for param in &api.parameters {
            let value = self.codec.zeroed(param, Frame::of_api(api, &params))?;
            params.push((param.param_name.clone(), value));
        }
        Ok(params)
    }

    /// Allocation callbacks never cross the wire; they are sent as absent.
    fn locals(api: &VulkanApi, params: &[(String, Value)]) -> Fields {
        let mut locals = params.to_vec();
        for param in api.parameters.iter().filter(|p| p.is_allocation_callbacks()) {
            set_field(&mut locals, &param.param_name, Value::Null);
        }
        locals
    }

    fn marshal(
        &self,
        out: &mut dyn WireSink,
        api: &VulkanApi,
        locals: &[(String, Value)],
        params: &[(String, Value)],
    ) -> Result<(), WireError> {
        let frame = Frame::of_api(api, locals);
        for param in &api.parameters {
            let value = lookup(locals, &param.param_name).unwrap_or(&Value::Null);
            let map = if param.is_output() {
                HandleMapping::none()
            } else {
                HandleMapping::new(&self.handles, MappingMode::Unwrap)
            };
            let mut root = STRUCTURE_TYPE_MAX_ENUM;
            self.codec.write(out, param, value, frame, &mut root, map)?;
        }
        if let Some(hook) = self.overrides.get(&api.name) {
            let ctx = OverrideContext {
                api,
                params,
                memory: &self.memory,
            };
            hook.write_payload(&ctx, out)?;
        }
        Ok(())
    }

    /// Body size of the packet [`Encoder::encode`] would produce.
    pub fn body_size(&self, name: &str, params: &[(String, Value)]) -> Result<usize, WireError> {
        let (api, _) = self.command(name)?;
        let locals = Self::locals(api, params);
        let mut counter = CountingStream::new();
        self.marshal(&mut counter, api, &locals, params)?;
        Ok(counter.bytes_written())
    }

    /// Size the body with a counting pass, then write header and body.
    pub fn encode(&self, name: &str, params: &[(String, Value)]) -> Result<Vec<u8>, WireError> {
        let (api, opcode) = self.command(name)?;
        let locals = Self::locals(api, params);
        let mut counter = CountingStream::new();
        self.marshal(&mut counter, api, &locals, params)?;
        let length = HEADER_SIZE + counter.bytes_written();

        let mut out = WireWriter::with_capacity(length);
        PacketHeader {
            opcode,
            length: length as u32,
        }
        .write(&mut out);
        self.marshal(&mut out, api, &locals, params)?;
        debug!(api = %api.name, opcode, length, "encoded");
        Ok(out.into_inner())
    }

    /// Read outputs, the response payload and the return value, then forget
    /// handles the call destroyed.
    pub fn decode_response(
        &self,
        name: &str,
        params: Fields,
        response: &[u8],
    ) -> Result<CallResult, WireError> {
        let (api, _) = self.command(name)?;
        let registry = self.codec.registry();
        let mut params = params;
        let mut input = WireReader::new(response);

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
            let value = self
                .codec
                .read(&mut input, param, Frame::of_api(api, &params), &mut root, map)?;
            set_field(&mut params, &param.param_name, value);
        }

        if let Some(hook) = self.overrides.get(&api.name) {
            let ctx = OverrideContext {
                api,
                params: &params,
                memory: &self.memory,
            };
            hook.read_response(&ctx, &mut input)?;
        }

        let ret = if api.has_return() {
            let mut root = STRUCTURE_TYPE_MAX_ENUM;
            self.codec.read(
                &mut input,
                &api.return_value(),
                Frame::of_api(api, &params),
                &mut root,
                HandleMapping::none(),
            )?
        } else {
            Value::Null
        };

        for (i, param) in api.parameters.iter().enumerate() {
            if !is_destroyed(&self.catalog, registry, api, i) {
                continue;
            }
            for id in handle_ids(lookup(&params, &param.param_name).unwrap_or(&Value::Null)) {
                if id != 0 && self.handles.remove(id).is_some() {
                    trace!(api = %api.name, id, "handle released");
                }
            }
        }

        if input.remaining() > 0 {
            warn!(api = %api.name, trailing = input.remaining(), "response has trailing bytes");
        }
        Ok(CallResult { params, ret })
    }

    /// Encode, send, and apply the response.
    pub fn call(
        &self,
        transport: &dyn Transport,
        name: &str,
        params: Fields,
    ) -> Result<CallResult, WireError> {
        let packet = self.encode(name, &params)?;
        let response = transport.round_trip(&packet)?;
        self.decode_response(name, params, &response)
    }
}
