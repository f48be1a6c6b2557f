//! The guest-side `VkEncoder`: one method per command that serializes the
//! call, sends it and reads the response back into the caller's memory.

use tracing::{debug, info};
use vkmarshal_types::{Feature, HandleCatalog, TypeRegistry, VulkanApi, VulkanType};

use crate::command::CommandParams;
use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::{CodeEmitter, Direction, Scope};
use crate::error::GenError;
use crate::marshaling::{MarshalingVisitor, Variant, MAX_ENUM_ROOT};
use crate::overrides::{OverrideSite, OverrideTable};
use crate::sink::{GeneratedFile, OutputSink};
use crate::transform::{device_memory_args, transform_fn, TransformDirection};

const LOCAL: &str = "local_";

pub struct EncoderGenerator<'r> {
    registry: &'r TypeRegistry,
    config: GenConfig,
    catalog: HandleCatalog,
    overrides: OverrideTable,
    sink: OutputSink,
    commands: usize,
}

impl<'r> EncoderGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self::with_overrides(registry, config, OverrideTable::encoder_defaults())
    }

    pub fn with_overrides(registry: &'r TypeRegistry, config: &GenConfig, overrides: OverrideTable) -> Self {
        Self {
            registry,
            config: config.clone(),
            catalog: registry.handle_catalog(),
            overrides,
            sink: OutputSink::new(config.output.encoder.clone()),
            commands: 0,
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        info!(commands = self.commands, stem = self.sink.stem(), "encoder");
        self.sink.into_files()
    }

    fn emit_command(&mut self, api: &VulkanApi) -> Result<(), GenError> {
        let registry = self.registry;
        let params = CommandParams::new(registry, &self.catalog, api);
        let over = self.overrides.get(&api.name).copied().unwrap_or_default();
        let qualified = format!("{}::{}", self.config.output.encoder, api.name);
        let site = |stream: &'static str| OverrideSite {
            registry,
            api,
            stream,
            tracker: "resources",
        };

        let header = &mut self.sink.header;
        let proto = header.func_proto(api, true);
        header.stmt(proto);

        let cgen = &mut self.sink.imp;
        let proto = cgen.func_proto_named(api, &qualified, true);
        cgen.begin_function(proto);
        cgen.stmt("auto stream = mImpl->stream()");
        cgen.stmt("auto countingStream = mImpl->countingStream()");
        cgen.stmt("auto resources = mImpl->resources()");
        cgen.stmt("auto pool = mImpl->pool()");

        if let Some(body) = over.body {
            body(cgen, &site("stream"))?;
            cgen.end_function();
            return Ok(());
        }

        // Inputs are copied so unwrapping never touches caller memory.
        let original = Scope::of_api(api);
        for (_, param) in params.inputs() {
            declare_local(registry, cgen, &original, param);
        }
        for (_, param) in params.inputs() {
            transform_param(registry, cgen, &original, param, LOCAL, "resources", TransformDirection::ToHost);
        }
        if !api.memory_roles().is_empty() {
            let roles = api.role_params();
            let args = device_memory_args(&mut |role| {
                roles
                    .get(&role)
                    .and_then(|&i| api.parameters.get(i))
                    .map(|p| format!("{LOCAL}{}", p.param_name))
            });
            cgen.stmt(format!("resources->deviceMemoryTransform_tohost({args})"));
        }
        let locals = Scope::of_api_prefixed(api, LOCAL, params.input_names());
        for (_, param) in params.inputs() {
            unwrap_local(registry, cgen, &locals, param);
        }

        // Counting pass sizes the body ahead of the header.
        let packet_size = format!("packetSize_{}", api.name);
        let opcode = format!("opcode_{}", api.name);
        cgen.stmt("countingStream->rewind()");
        cgen.begin_block();
        marshal_params(registry, cgen, api, &locals, "countingStream")?;
        if let Some(payload) = over.payload {
            payload(cgen, &site("countingStream"))?;
        }
        cgen.end_block();
        cgen.stmt(format!(
            "uint32_t {packet_size} = 4 + 4 + (uint32_t)countingStream->bytesWritten()"
        ));
        cgen.stmt("countingStream->rewind()");
        cgen.stmt(format!("uint32_t {opcode} = OP_{}", api.name));
        cgen.stmt(format!("stream->putBe32({opcode})"));
        cgen.stmt(format!("stream->putBe32({packet_size})"));
        marshal_params(registry, cgen, api, &locals, "stream")?;
        if let Some(payload) = over.payload {
            payload(cgen, &site("stream"))?;
        }

        for (i, param) in params.outputs() {
            let created = params.is_created(i);
            if created {
                cgen.stmt("stream->setHandleMapping(resources->createMapping())");
            }
            let mut visitor = MarshalingVisitor::new(
                registry,
                cgen,
                original.clone(),
                Direction::Read,
                Variant::Guest,
                "stream",
                MAX_ENUM_ROOT,
            );
            visitor.visit(param)?;
            if created {
                cgen.stmt("stream->unsetHandleMapping()");
            }
        }
        for (_, param) in params.outputs() {
            transform_param(registry, cgen, &original, param, "", "resources", TransformDirection::FromHost);
        }
        if let Some(response) = over.response {
            response(cgen, &site("stream"))?;
        }
        for (i, param) in api.parameters.iter().enumerate() {
            if params.is_destroyed(i) {
                release_destroyed(cgen, &original, param);
            }
        }
        cgen.stmt("pool->freeAll()");
        if api.has_return() {
            let ret = api.return_value();
            cgen.stmt(format!("{t} {} = ({t})0", ret.param_name, t = ret.type_name));
            cgen.stream_primitive(registry, "stream", &ret.param_name, &ret, Direction::Read)?;
            cgen.stmt("countingStream->clearPool()");
            cgen.stmt("stream->clearPool()");
            cgen.stmt(format!("return {}", ret.param_name));
        } else {
            cgen.stmt("countingStream->clearPool()");
            cgen.stmt("stream->clearPool()");
        }
        cgen.end_function();
        self.commands += 1;
        Ok(())
    }
}

fn local_decl(param: &VulkanType) -> VulkanType {
    let mut local = param.with_param_name(format!("{LOCAL}{}", param.param_name));
    local.is_const = false;
    local.is_pointer_to_const_pointer = false;
    local
}

/// Declare `local_<name>` and fill it from the caller's argument.
fn declare_local(registry: &TypeRegistry, cgen: &mut CodeEmitter, original: &Scope<'_>, param: &VulkanType) {
    let local = local_decl(param);
    let decl = cgen.type_decl(&local, true);
    let (src, dst) = (param.param_name.as_str(), local.param_name.as_str());
    let name = param.type_name.as_str();
    cgen.stmt(decl);

    if param.is_allocation_callbacks() {
        cgen.stmt(format!("{dst} = nullptr"));
        return;
    }
    if let Some(n) = &param.static_arr_expr {
        cgen.stmt(format!("memcpy({dst}, {src}, {n} * sizeof({name}))"));
        return;
    }
    if !param.is_pointer() {
        cgen.stmt(format!("{dst} = {src}"));
        return;
    }
    if (param.pointer_indirection_levels > 1 && !param.is_string_array())
        || (param.is_void() && param.count_expr().is_none())
    {
        let cast = cgen.type_decl(&local, false);
        cgen.stmt(format!("{dst} = ({cast}){src}"));
        return;
    }

    cgen.stmt(format!("{dst} = nullptr"));
    if param.is_string() {
        cgen.begin_if(src);
        cgen.stmt(format!("{dst} = pool->strDup({src})"));
        cgen.end_if();
        return;
    }
    let count = cgen.length_expr(original, param);
    if param.is_string_array() {
        cgen.begin_if(format!("{src} && {count}"));
        cgen.stmt(format!("{dst} = pool->strDupArray({src}, {count})"));
        cgen.end_if();
        return;
    }
    cgen.begin_if(src);
    if registry.is_compound(name) {
        cgen.stmt(format!(
            "{dst} = ({name}*)pool->alloc({count} * sizeof(const {name}))"
        ));
        let i = cgen.begin_index_loop(&count);
        cgen.stmt(format!(
            "deepcopy_{name}(pool, {MAX_ENUM_ROOT}, {src} + {i}, ({name}*)({dst} + {i}))"
        ));
        cgen.end_for();
    } else if param.is_void() {
        cgen.stmt(format!(
            "{dst} = (void*)pool->dupArray({src}, {count} * sizeof(const uint8_t))"
        ));
    } else {
        cgen.stmt(format!(
            "{dst} = ({name}*)pool->dupArray({src}, {count} * sizeof(const {name}))"
        ));
    }
    cgen.end_if();
}

/// One transform call per compound parameter.
pub(crate) fn transform_param(
    registry: &TypeRegistry,
    cgen: &mut CodeEmitter,
    scope: &Scope<'_>,
    param: &VulkanType,
    prefix: &str,
    tracker: &str,
    dir: TransformDirection,
) {
    if !registry.is_compound(&param.type_name) || param.is_allocation_callbacks() {
        return;
    }
    transform_call(cgen, scope, param, &format!("{prefix}{}", param.param_name), tracker, dir);
}

pub(crate) fn transform_call(
    cgen: &mut CodeEmitter,
    scope: &Scope<'_>,
    param: &VulkanType,
    access: &str,
    tracker: &str,
    dir: TransformDirection,
) {
    let name = &param.type_name;
    let f = transform_fn(dir, name);
    if !param.is_pointer() {
        cgen.stmt(format!("{f}({tracker}, {MAX_ENUM_ROOT}, ({name}*)(&{access}))"));
        return;
    }
    let count = cgen.length_expr(scope, param);
    cgen.begin_if(access);
    let i = cgen.begin_index_loop(&count);
    cgen.stmt(format!("{f}({tracker}, {MAX_ENUM_ROOT}, ({name}*)({access} + {i}))"));
    cgen.end_for();
    cgen.end_if();
}

/// Swap guest handles for wire ids in the local copies.
fn unwrap_local(registry: &TypeRegistry, cgen: &mut CodeEmitter, locals: &Scope<'_>, param: &VulkanType) {
    let access = locals.access(param);
    let name = &param.type_name;
    if registry.is_compound(name) {
        if param.is_allocation_callbacks() {
            return;
        }
        let target = if param.is_pointer() {
            access.clone()
        } else {
            format!("&{access}")
        };
        if !param.is_pointer() {
            cgen.stmt(format!(
                "handlemap_{name}(resources->unwrapMapping(), {MAX_ENUM_ROOT}, ({name}*)({target}))"
            ));
            return;
        }
        let count = cgen.length_expr(locals, param);
        cgen.begin_if(&access);
        let i = cgen.begin_index_loop(&count);
        cgen.stmt(format!(
            "handlemap_{name}(resources->unwrapMapping(), {MAX_ENUM_ROOT}, ({name}*)({target} + {i}))"
        ));
        cgen.end_for();
        cgen.end_if();
        return;
    }
    if !param.is_handle_type() {
        return;
    }
    if let Some(n) = &param.static_arr_expr {
        cgen.stmt(format!(
            "resources->unwrapMapping()->mapHandles_{name}(({name}*){access}, {n})"
        ));
    } else if param.is_pointer() {
        let count = cgen.length_expr(locals, param);
        cgen.begin_if(&access);
        cgen.stmt(format!(
            "resources->unwrapMapping()->mapHandles_{name}(({name}*){access}, {count})"
        ));
        cgen.end_if();
    } else {
        cgen.stmt(format!(
            "resources->unwrapMapping()->mapHandles_{name}(({name}*)&{access})"
        ));
    }
}

fn marshal_params(
    registry: &TypeRegistry,
    cgen: &mut CodeEmitter,
    api: &VulkanApi,
    scope: &Scope<'_>,
    stream: &str,
) -> Result<(), GenError> {
    let mut visitor = MarshalingVisitor::new(
        registry,
        cgen,
        scope.clone(),
        Direction::Write,
        Variant::Guest,
        stream,
        MAX_ENUM_ROOT,
    );
    for param in &api.parameters {
        visitor.visit(param)?;
    }
    Ok(())
}

fn release_destroyed(cgen: &mut CodeEmitter, original: &Scope<'_>, param: &VulkanType) {
    let name = &param.type_name;
    let access = &param.param_name;
    if param.is_pointer() {
        let count = cgen.length_expr(original, param);
        cgen.begin_if(access);
        cgen.stmt(format!(
            "resources->destroyMapping()->mapHandles_{name}(({name}*){access}, {count})"
        ));
        cgen.end_if();
    } else {
        cgen.stmt(format!(
            "resources->destroyMapping()->mapHandles_{name}(({name}*)&{access})"
        ));
    }
}

impl Wrapper for EncoderGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        let class = self.config.output.encoder.clone();
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include_system("memory");
        self.sink.include("ResourceTracker.h");
        self.sink.include("IOStream.h");
        self.sink.header.blank();

        let guest = format!("{}.h", self.config.output.marshaling_guest);
        let deepcopy = format!("{}.h", self.config.output.deepcopy);
        let handlemap = format!("{}.h", self.config.output.handlemap);
        let transform = format!("{}.h", self.config.output.transform);
        let imp = &mut self.sink.imp;
        for file in [
            "VulkanStreamGuest.h",
            "Allocator.h",
            guest.as_str(),
            deepcopy.as_str(),
            handlemap.as_str(),
            transform.as_str(),
        ] {
            imp.raw(format!("#include \"{file}\""));
        }
        imp.blank();
        imp.raw("using namespace goldfish_vk;");
        imp.blank();
        imp.raw(format!("class {class}::Impl {{"));
        imp.raw("public:");
        imp.line(
            "Impl(IOStream* stream, ResourceTracker* resources) : m_stream(stream), m_countingStream(), m_resources(resources) { }",
        );
        imp.line("VulkanCountingStream* countingStream() { return &m_countingStream; }");
        imp.line("VulkanStreamGuest* stream() { return &m_stream; }");
        imp.line("ResourceTracker* resources() { return m_resources; }");
        imp.line("Allocator* pool() { return &m_pool; }");
        imp.raw("private:");
        imp.line("VulkanStreamGuest m_stream;");
        imp.line("VulkanCountingStream m_countingStream;");
        imp.line("ResourceTracker* m_resources;");
        imp.line("Allocator m_pool;");
        imp.raw("};");
        imp.blank();
        imp.raw(format!(
            "{class}::{class}(IOStream* stream, ResourceTracker* resources) : mImpl(new {class}::Impl(stream, resources)) {{ }}"
        ));
        imp.blank();
        imp.raw(format!("{class}::~{class}() {{ }}"));
        imp.blank();
        imp.raw(format!(
            "ResourceTracker* {class}::resources() {{ return mImpl->resources(); }}"
        ));
        imp.blank();

        let header = &mut self.sink.header;
        header.raw(format!("class {class} {{"));
        header.raw("public:");
        header.stmt(format!("{class}(IOStream* stream, ResourceTracker* resources)"));
        header.stmt(format!("~{class}()"));
        header.stmt("ResourceTracker* resources()");
        Ok(())
    }

    fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.begin_guard(feature);
        Ok(())
    }

    fn on_gen_cmd(&mut self, api: &VulkanApi, opcode: u32) -> Result<(), GenError> {
        debug!(name = %api.name, opcode, "encode");
        self.emit_command(api)
    }

    fn on_end_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.end_guard(feature);
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        let header = &mut self.sink.header;
        header.raw("private:");
        header.line("class Impl;");
        header.line("std::unique_ptr<Impl> mImpl;");
        header.raw("};");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::sample::sample_registry;

    fn command_text(name: &str) -> String {
        let reg = sample_registry().unwrap();
        let config = GenConfig::default();
        let mut gen = EncoderGenerator::new(&reg, &config);
        let api = reg.command(name).unwrap();
        gen.emit_command(api).unwrap();
        gen.into_files().remove(1).contents
    }

    fn position(text: &str, needle: &str) -> usize {
        text.find(needle)
            .unwrap_or_else(|| panic!("`{needle}` missing from:\n{text}"))
    }

    #[test]
    fn create_instance_orders_copy_count_send_read() {
        let text = command_text("vkCreateInstance");
        let copy = position(&text, "deepcopy_VkInstanceCreateInfo(pool, VK_STRUCTURE_TYPE_MAX_ENUM, pCreateInfo + i_2_0, (VkInstanceCreateInfo*)(local_pCreateInfo + i_2_0));");
        let alloc_null = position(&text, "local_pAllocator = nullptr;");
        let count = position(&text, "countingStream->rewind();");
        let size = position(&text, "uint32_t packetSize_vkCreateInstance = 4 + 4 + (uint32_t)countingStream->bytesWritten();");
        let header = position(&text, "stream->putBe32(opcode_vkCreateInstance);");
        let create = position(&text, "stream->setHandleMapping(resources->createMapping());");
        let free = position(&text, "pool->freeAll();");
        let ret = position(&text, "vkCreateInstance_VkResult_return = (VkResult)stream->getBe32();");
        assert!(copy < alloc_null && alloc_null < count);
        assert!(copy < count && count < size && size < header);
        assert!(header < create && create < free && free < ret);
        assert!(text.contains("stream->putBe32(packetSize_vkCreateInstance);"));
        assert!(text.contains("return vkCreateInstance_VkResult_return;"));
    }

    #[test]
    fn destroy_unregisters_after_the_call() {
        let text = command_text("vkDestroyBuffer");
        let unwrap = position(&text, "resources->unwrapMapping()->mapHandles_VkBuffer((VkBuffer*)&local_buffer);");
        let send = position(&text, "stream->putBe32(opcode_vkDestroyBuffer);");
        let destroy = position(&text, "resources->destroyMapping()->mapHandles_VkBuffer((VkBuffer*)&buffer);");
        assert!(unwrap < send && send < destroy);
        assert!(!text.contains("return "));
    }

    #[test]
    fn flush_streams_payload_in_both_passes() {
        let text = command_text("vkFlushMappedMemoryRanges");
        assert!(text.contains("countingStream->putBe64(streamSize);"));
        assert!(text.contains("stream->write(targetRange, actualSize);"));
        let counted = position(&text, "countingStream->write(targetRange, actualSize);");
        let size = position(&text, "uint32_t packetSize_vkFlushMappedMemoryRanges");
        assert!(counted < size);
    }

    #[test]
    fn bind_memory_transforms_roles() {
        let text = command_text("vkBindBufferMemory");
        assert!(text.contains(
            "resources->deviceMemoryTransform_tohost((VkDeviceMemory*)&local_memory, 1, (VkDeviceSize*)&local_memoryOffset, 1, (VkDeviceSize*)nullptr, 1, (uint32_t*)nullptr, 1, (uint32_t*)nullptr, 1);"
        ));
    }

    #[test]
    fn body_override_replaces_the_default() {
        fn stub(cgen: &mut CodeEmitter, site: &OverrideSite<'_>) -> Result<(), GenError> {
            cgen.stmt(format!("{}->flush()", site.stream));
            Ok(())
        }
        let reg = sample_registry().unwrap();
        let config = GenConfig::default();
        let mut table = OverrideTable::new();
        table.insert(
            "vkGetDeviceQueue",
            crate::overrides::CommandOverride {
                body: Some(stub),
                ..Default::default()
            },
        );
        let mut gen = EncoderGenerator::with_overrides(&reg, &config, table);
        gen.emit_command(reg.command("vkGetDeviceQueue").unwrap()).unwrap();
        let text = gen.into_files().remove(1).contents;
        assert!(text.contains("stream->flush();"));
        assert!(!text.contains("countingStream->rewind();"));
    }
}
