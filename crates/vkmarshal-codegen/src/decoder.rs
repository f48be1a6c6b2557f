//! The host-side `VkDecoder`: walks a buffer of packets, replays each
//! command against the driver and writes the response.

use tracing::{debug, info};
use vkmarshal_types::{Feature, HandleCatalog, TypeRegistry, VulkanApi, VulkanType};

use crate::command::CommandParams;
use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::{CodeEmitter, Direction, Scope};
use crate::encoder::transform_param;
use crate::error::GenError;
use crate::marshaling::{MarshalingVisitor, Variant, MAX_ENUM_ROOT};
use crate::overrides::{OverrideSite, OverrideTable};
use crate::sink::{GeneratedFile, OutputSink};
use crate::transform::{device_memory_args, TransformDirection};

const UNWRAP: &str = "&m_boxedHandleUnwrapMapping";
const CREATE: &str = "&m_boxedHandleCreateMapping";
const UNWRAP_AND_DELETE: &str = "&m_boxedHandleUnwrapAndDeleteMapping";

/// Handle mapping the read stream uses for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMapping {
    Off,
    Unwrap,
    UnwrapAndDelete,
}

pub struct DecoderGenerator<'r> {
    registry: &'r TypeRegistry,
    config: GenConfig,
    catalog: HandleCatalog,
    overrides: OverrideTable,
    sink: OutputSink,
    cases: CodeEmitter,
    commands: usize,
}

impl<'r> DecoderGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self::with_overrides(registry, config, OverrideTable::decoder_defaults())
    }

    pub fn with_overrides(registry: &'r TypeRegistry, config: &GenConfig, overrides: OverrideTable) -> Self {
        Self {
            registry,
            config: config.clone(),
            catalog: registry.handle_catalog(),
            overrides,
            sink: OutputSink::new(config.output.decoder.clone()),
            cases: CodeEmitter::new(),
            commands: 0,
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        info!(commands = self.commands, stem = self.sink.stem(), "decoder");
        self.sink.into_files()
    }

    fn emit_case(&mut self, api: &VulkanApi) -> Result<(), GenError> {
        let registry = self.registry;
        let params = CommandParams::new(registry, &self.catalog, api);
        let over = self.overrides.get(&api.name).copied().unwrap_or_default();
        let snapshot = self.config.snapshot_hooks;
        let site = |stream: &'static str| OverrideSite {
            registry,
            api,
            stream,
            tracker: "m_state",
        };
        let cgen = &mut self.cases;
        cgen.case(format!("OP_{}", api.name));

        if let Some(body) = over.body {
            body(cgen, &site("vkReadStream"))?;
            cgen.stmt("vkReadStream->clearPool()");
            cgen.stmt("break");
            cgen.end_case();
            return Ok(());
        }

        let scope = Scope::of_api(api);
        for param in &api.parameters {
            let decl = cgen.type_decl(param, true);
            cgen.stmt(decl);
        }

        // Parameters in declaration order, each under its own mapping.
        let mut current = None;
        for (i, param) in api.parameters.iter().enumerate() {
            let mapping = if (i == 0 && params.dispatch().is_some()) || param.is_output() {
                ReadMapping::Off
            } else if params.is_destroyed(i) {
                ReadMapping::UnwrapAndDelete
            } else {
                ReadMapping::Unwrap
            };
            if current != Some(mapping) {
                match mapping {
                    ReadMapping::Off => cgen.stmt("vkReadStream->unsetHandleMapping()"),
                    ReadMapping::Unwrap => cgen.stmt(format!("vkReadStream->setHandleMapping({UNWRAP})")),
                    ReadMapping::UnwrapAndDelete => {
                        cgen.stmt(format!("vkReadStream->setHandleMapping({UNWRAP_AND_DELETE})"))
                    }
                };
                current = Some(mapping);
            }
            read_param(registry, cgen, &scope, param)?;
        }
        if let Some(dispatch) = params.dispatch() {
            let (t, name) = (&dispatch.type_name, &dispatch.param_name);
            cgen.stmt(format!("auto unboxed_{name} = m_state->unbox_{t}({name})"));
            cgen.stmt(format!("auto vk = m_state->dispatch_{t}({name})"));
        }
        if let Some(payload) = over.payload {
            payload(cgen, &site("vkReadStream"))?;
        }

        for param in &api.parameters {
            if !param.is_output() {
                transform_param(registry, cgen, &scope, param, "", "m_state", TransformDirection::ToHost);
            }
        }
        emit_role_transform(cgen, api, TransformDirection::ToHost);

        // Driver call.
        let table = if params.dispatch().is_some() { "vk" } else { "m_vk" };
        let args: Vec<String> = api
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if i == 0 && params.dispatch().is_some() {
                    format!("unboxed_{}", p.param_name)
                } else {
                    p.param_name.clone()
                }
            })
            .collect();
        let call = format!("{table}->{}({})", api.name, args.join(", "));
        let ret = api.return_value();
        if api.has_return() {
            cgen.stmt(format!("{t} {} = ({t})0", ret.param_name, t = ret.type_name));
        }
        let guard = skip_guard(&params);
        if let Some(cond) = &guard {
            cgen.begin_if(cond);
        }
        if api.has_return() {
            cgen.stmt(format!("{} = {call}", ret.param_name));
        } else {
            cgen.stmt(&call);
        }
        if guard.is_some() {
            cgen.end_if();
        }
        if params.destroys_dispatch {
            if let Some(dispatch) = params.dispatch() {
                cgen.stmt(format!(
                    "m_boxedHandleUnwrapAndDeleteMapping.mapHandles_{t}(({t}*)&{n})",
                    t = dispatch.type_name,
                    n = dispatch.param_name
                ));
            }
        }

        for param in &api.parameters {
            if param.is_output() {
                transform_param(registry, cgen, &scope, param, "", "m_state", TransformDirection::FromHost);
            }
        }
        emit_role_transform(cgen, api, TransformDirection::FromHost);

        // Response: outputs, coherence payload, return value.
        cgen.stmt("vkStream->unsetHandleMapping()");
        for (i, param) in params.outputs() {
            let created = params.is_created(i);
            if created {
                cgen.stmt(format!("vkStream->setHandleMapping({CREATE})"));
            }
            let mut visitor = MarshalingVisitor::new(
                registry,
                cgen,
                scope.clone(),
                Direction::Write,
                Variant::Host,
                "vkStream",
                MAX_ENUM_ROOT,
            );
            visitor.visit(param)?;
            if created {
                cgen.stmt("vkStream->unsetHandleMapping()");
            }
        }
        if let Some(response) = over.response {
            response(cgen, &site("vkStream"))?;
        }
        if api.has_return() {
            cgen.stream_primitive(registry, "vkStream", &ret.param_name, &ret, Direction::Write)?;
        }
        cgen.stmt("vkStream->commitWrite()");
        if snapshot {
            let mut snapshot_args = vec!["&m_pool".to_string()];
            if api.has_return() {
                snapshot_args.push(ret.param_name.clone());
            }
            snapshot_args.extend(api.parameters.iter().map(|p| p.param_name.clone()));
            cgen.begin_if("m_state->snapshotsEnabled()");
            cgen.stmt(format!(
                "m_state->snapshot()->{}({})",
                api.name,
                snapshot_args.join(", ")
            ));
            cgen.end_if();
        }
        cgen.stmt("vkReadStream->clearPool()");
        cgen.stmt("break");
        cgen.end_case();
        Ok(())
    }
}

fn read_param(
    registry: &TypeRegistry,
    cgen: &mut CodeEmitter,
    scope: &Scope<'_>,
    param: &VulkanType,
) -> Result<(), GenError> {
    let mut visitor = MarshalingVisitor::new(
        registry,
        cgen,
        scope.clone(),
        Direction::Read,
        Variant::Host,
        "vkReadStream",
        MAX_ENUM_ROOT,
    );
    visitor.visit(param)
}

/// A destroyed handle that no longer resolves skips the driver call.
fn skip_guard(params: &CommandParams<'_>) -> Option<String> {
    let conds: Vec<String> = params
        .destroyed_values()
        .iter()
        .map(|p| {
            if params.dispatch().is_some_and(|d| d.param_name == p.param_name) {
                format!("unboxed_{} != VK_NULL_HANDLE", p.param_name)
            } else {
                format!("{} != VK_NULL_HANDLE", p.param_name)
            }
        })
        .collect();
    if conds.is_empty() {
        None
    } else {
        Some(conds.join(" && "))
    }
}

fn emit_role_transform(cgen: &mut CodeEmitter, api: &VulkanApi, dir: TransformDirection) {
    if api.memory_roles().is_empty() {
        return;
    }
    let roles = api.role_params();
    let args = device_memory_args(&mut |role| {
        roles
            .get(&role)
            .and_then(|&i| api.parameters.get(i))
            .map(|p| p.param_name.clone())
    });
    cgen.stmt(format!("m_state->deviceMemoryTransform_{}({args})", dir.suffix()));
}

impl DecoderGenerator<'_> {
    fn emit_decode_loop(&mut self) -> Result<(), GenError> {
        let registry = self.registry;
        let class = self.config.output.decoder.clone();
        let cases = std::mem::take(&mut self.cases);
        let cgen = &mut self.sink.imp;
        cgen.begin_function(format!(
            "size_t {class}::Impl::decode(void* buf, size_t len, IOStream* ioStream)"
        ));
        cgen.begin_if("len < 8");
        cgen.stmt("return 0");
        cgen.end_if();
        cgen.stmt("unsigned char* ptr = (unsigned char*)buf");
        cgen.stmt("const unsigned char* const end = (const unsigned char*)buf + len");
        cgen.begin_while("end - ptr >= 8");
        cgen.stmt("uint32_t opcode = 0");
        cgen.stmt("uint32_t packetLen = 0");
        let word = VulkanType::new("uint32_t", "opcode");
        cgen.memcpy_primitive(registry, "ptr", "0", "opcode", &word, Direction::Read)?;
        let word = VulkanType::new("uint32_t", "packetLen");
        cgen.memcpy_primitive(registry, "ptr", "4", "packetLen", &word, Direction::Read)?;
        cgen.begin_if("packetLen < 8 || end - ptr < packetLen");
        cgen.stmt("return ptr - (unsigned char*)buf");
        cgen.end_if();
        cgen.stmt("stream()->setStream(ioStream)");
        cgen.stmt("VulkanStream* vkStream = stream()");
        cgen.stmt("VulkanMemReadingStream* vkReadStream = readStream()");
        cgen.stmt("vkReadStream->setBuf((uint8_t*)(ptr + 8))");
        cgen.begin_switch("opcode");
        cgen.splice(&cases);
        cgen.default_case();
        cgen.stmt("return ptr - (unsigned char*)buf");
        cgen.end_case();
        cgen.end_switch();
        cgen.stmt("ptr += packetLen");
        cgen.end_while();
        cgen.stmt("return ptr - (unsigned char*)buf");
        cgen.end_function();
        Ok(())
    }
}

impl Wrapper for DecoderGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        let class = self.config.output.decoder.clone();
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include_system("memory");
        self.sink.include("IOStream.h");
        self.sink.header.blank();
        let header = &mut self.sink.header;
        header.raw(format!("class {class} {{"));
        header.raw("public:");
        header.stmt(format!("{class}(VulkanDispatch* vk, VkDecoderGlobalState* state)"));
        header.stmt(format!("~{class}()"));
        header.stmt("size_t decode(void* buf, size_t bufsize, IOStream* stream)");
        header.raw("private:");
        header.line("class Impl;");
        header.line("std::unique_ptr<Impl> mImpl;");
        header.raw("};");

        let host = format!("{}.h", self.config.output.marshaling_host);
        let transform = format!("{}.h", self.config.output.transform);
        let imp = &mut self.sink.imp;
        for file in [
            "VkDecoderGlobalState.h",
            "VulkanStream.h",
            "VulkanDispatch.h",
            "BoxedHandleMapping.h",
            "Allocator.h",
            host.as_str(),
            transform.as_str(),
        ] {
            imp.raw(format!("#include \"{file}\""));
        }
        imp.raw("#include <string.h>");
        imp.blank();
        imp.raw("using namespace goldfish_vk;");
        imp.blank();
        imp.raw(format!("class {class}::Impl {{"));
        imp.raw("public:");
        imp.line(
            "Impl(VulkanDispatch* vk, VkDecoderGlobalState* state) : m_vk(vk), m_state(state), \
             m_vkStream(nullptr), m_vkMemReadingStream(nullptr), m_boxedHandleUnwrapMapping(state), \
             m_boxedHandleCreateMapping(state), m_boxedHandleUnwrapAndDeleteMapping(state) { }",
        );
        imp.line("VulkanStream* stream() { return &m_vkStream; }");
        imp.line("VulkanMemReadingStream* readStream() { return &m_vkMemReadingStream; }");
        imp.line("size_t decode(void* buf, size_t bufsize, IOStream* stream);");
        imp.raw("private:");
        imp.line("VulkanDispatch* m_vk;");
        imp.line("VkDecoderGlobalState* m_state;");
        imp.line("VulkanStream m_vkStream;");
        imp.line("VulkanMemReadingStream m_vkMemReadingStream;");
        imp.line("Allocator m_pool;");
        imp.line("BoxedHandleUnwrapMapping m_boxedHandleUnwrapMapping;");
        imp.line("BoxedHandleCreateMapping m_boxedHandleCreateMapping;");
        imp.line("BoxedHandleUnwrapAndDeleteMapping m_boxedHandleUnwrapAndDeleteMapping;");
        imp.raw("};");
        imp.blank();
        imp.raw(format!(
            "{class}::{class}(VulkanDispatch* vk, VkDecoderGlobalState* state) : mImpl(new {class}::Impl(vk, state)) {{ }}"
        ));
        imp.blank();
        imp.raw(format!("{class}::~{class}() {{ }}"));
        imp.blank();
        imp.begin_function(format!(
            "size_t {class}::decode(void* buf, size_t bufsize, IOStream* stream)"
        ));
        imp.stmt("return mImpl->decode(buf, bufsize, stream)");
        imp.end_function();
        Ok(())
    }

    fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.cases.raw(format!("#ifdef {}", feature.name));
        Ok(())
    }

    fn on_gen_cmd(&mut self, api: &VulkanApi, opcode: u32) -> Result<(), GenError> {
        debug!(name = %api.name, opcode, "decode");
        self.commands += 1;
        self.emit_case(api)
    }

    fn on_end_feature(&mut self, _feature: &Feature) -> Result<(), GenError> {
        self.cases.raw("#endif");
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        self.emit_decode_loop()
    }
}
