//! `marshal_<T>` / `unmarshal_<T>` for every compound type, the extension
//! chain marshalers and the `OP_<cmd>` opcode constants.
//!
//! The guest variant reads outputs into memory the caller already owns; the
//! host variant allocates every pointee from the stream's arena.

use tracing::{debug, info};
use vkmarshal_types::{
    ExtensionDispatch, Feature, LengthExpr, TypeRegistry, VulkanApi, VulkanCompoundType, VulkanType,
};

use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::{CodeEmitter, Direction, Scope};
use crate::error::GenError;
use crate::extension::emit_extension_switch;
use crate::iterator::{iterate_type, unsupported_comment, TypeVisitor};
use crate::sink::{GeneratedFile, OutputSink};

pub const MAX_ENUM_ROOT: &str = "VK_STRUCTURE_TYPE_MAX_ENUM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Guest,
    Host,
}

impl Variant {
    pub fn stream_type(self) -> &'static str {
        match self {
            Variant::Guest => "VulkanStreamGuest",
            Variant::Host => "VulkanStream",
        }
    }
}

pub fn marshal_fn(type_name: &str) -> String {
    format!("marshal_{type_name}")
}

pub fn unmarshal_fn(type_name: &str) -> String {
    format!("unmarshal_{type_name}")
}

/// Emits the wire walk of one struct or one parameter list.
pub struct MarshalingVisitor<'a, 'r> {
    registry: &'r TypeRegistry,
    cgen: &'a mut CodeEmitter,
    scope: Scope<'a>,
    dir: Direction,
    variant: Variant,
    stream: &'a str,
    root: &'a str,
}

impl<'a, 'r> MarshalingVisitor<'a, 'r> {
    pub fn new(
        registry: &'r TypeRegistry,
        cgen: &'a mut CodeEmitter,
        scope: Scope<'a>,
        dir: Direction,
        variant: Variant,
        stream: &'a str,
        root: &'a str,
    ) -> Self {
        Self {
            registry,
            cgen,
            scope,
            dir,
            variant,
            stream,
            root,
        }
    }

    /// Walk `ty` with member filters and stream-feature gates applied.
    pub fn visit(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let mut opened = 0;
        if let Some(filter) = &ty.annotations.filter {
            let field = self.scope.access_name(&filter.field);
            let cond: Vec<String> = filter
                .values
                .iter()
                .map(|v| format!("({field} == {v})"))
                .collect();
            self.cgen.begin_if(cond.join(" || "));
            opened += 1;
        }
        if let Some(feature) = &ty.annotations.stream_feature {
            self.cgen
                .begin_if(format!("{}->getFeatureBits() & {}", self.stream, feature.name));
            opened += 1;
        }
        let registry = self.registry;
        iterate_type(self, registry, ty)?;
        for _ in 0..opened {
            self.cgen.end_if();
        }
        if ty.param_name == "sType" && self.scope.struct_var().is_some() {
            self.cgen.begin_if(format!("rootType == {MAX_ENUM_ROOT}"));
            self.cgen.stmt(format!("rootType = {}", self.scope.access(ty)));
            self.cgen.end_if();
        }
        Ok(())
    }

    fn access(&self, ty: &VulkanType) -> String {
        self.scope.access(ty)
    }

    fn is_single(&self, ty: &VulkanType) -> bool {
        LengthExpr::resolve(ty, self.scope.length_scope()) == LengthExpr::One
    }

    fn host_alloc(&mut self, access: &str, bytes: &str) {
        if self.variant == Variant::Host {
            self.cgen
                .stmt(format!("{}->alloc((void**)&{access}, {bytes})", self.stream));
        }
    }

    fn handle_value(&mut self, ty: &VulkanType, access: &str) {
        let stream = self.stream;
        let var = self.cgen.var("cgen_var");
        self.cgen.stmt(format!("uint64_t {var}"));
        match self.dir {
            Direction::Write => {
                self.cgen.stmt(format!(
                    "{stream}->handleMapping()->mapHandles_{}_u64(&{access}, &{var}, 1)",
                    ty.type_name
                ));
                self.cgen.stmt(format!("{stream}->putBe64({var})"));
            }
            Direction::Read => {
                self.cgen.stmt(format!("{var} = {stream}->getBe64()"));
                self.cgen.stmt(format!(
                    "{stream}->handleMapping()->mapHandles_u64_{t}(&{var}, ({t}*)&{access}, 1)",
                    t = ty.type_name
                ));
            }
        }
    }

    fn scalar(&mut self, ty: &VulkanType, access: &str) -> Result<(), GenError> {
        let elem = VulkanType::new(ty.type_name.clone(), ty.param_name.clone());
        if elem.is_handle_type() {
            self.handle_value(&elem, access);
            return Ok(());
        }
        if self.registry.is_funcpointer(&elem.type_name) {
            match self.dir {
                Direction::Write => self
                    .cgen
                    .stmt(format!("{}->putBe64((uint64_t)(uintptr_t){access})", self.stream)),
                Direction::Read => self.cgen.stmt(format!(
                    "{access} = ({})(uintptr_t){}->getBe64()",
                    elem.type_name, self.stream
                )),
            };
            return Ok(());
        }
        self.cgen
            .stream_primitive(self.registry, self.stream, access, &elem, self.dir)
    }

    /// `count` bytes of `void*` or byte-sized elements.
    fn raw_bytes(&mut self, access: &str, bytes: &str) {
        match self.dir {
            Direction::Write => {
                self.cgen
                    .stmt(format!("{}->write((const void*)({access}), {bytes})", self.stream));
            }
            Direction::Read => {
                self.host_alloc(access, bytes);
                self.cgen
                    .stmt(format!("{}->read((void*)({access}), {bytes})", self.stream));
            }
        }
    }
}

impl TypeVisitor for MarshalingVisitor<'_, '_> {
    fn on_check(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        match self.dir {
            Direction::Write => {
                self.cgen
                    .stmt(format!("{}->putBe8((uint8_t)({access} != nullptr))", self.stream));
                self.cgen.begin_if(&access);
            }
            Direction::Read => {
                let var = self.cgen.var("check");
                self.cgen
                    .stmt(format!("const uint8_t {var} = {}->getBe8()", self.stream));
                self.cgen.begin_if(var);
            }
        }
        Ok(())
    }

    fn end_check(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        if self.dir == Direction::Read && self.variant == Variant::Host {
            let access = self.access(ty);
            self.cgen.begin_else();
            self.cgen.stmt(format!("{access} = nullptr"));
        }
        self.cgen.end_if();
        Ok(())
    }

    fn on_value(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        self.scalar(ty, &access)
    }

    fn on_pointer(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        if ty.pointer_indirection_levels > 1 || (ty.is_void() && ty.count_expr().is_none()) {
            // Opaque addresses travel as 8-byte ids.
            return self
                .cgen
                .stream_primitive(self.registry, self.stream, &access, ty, self.dir);
        }
        let count = self.cgen.length_expr(&self.scope, ty);
        if ty.is_void() {
            let bytes = format!("{count} * sizeof(const uint8_t)");
            self.raw_bytes(&access, &bytes);
            return Ok(());
        }
        let elem = ty.type_name.as_str();
        let size = if ty.is_handle_type() {
            Some(8)
        } else {
            self.registry.encoding_size(elem)
        };
        if self.dir == Direction::Read {
            self.host_alloc(&access, &format!("{count} * sizeof({elem})"));
        }
        if size == Some(1) {
            match self.dir {
                Direction::Write => self.cgen.stmt(format!(
                    "{}->write((const {elem}*)({access}), {count} * sizeof(const {elem}))",
                    self.stream
                )),
                Direction::Read => self.cgen.stmt(format!(
                    "{}->read(({elem}*)({access}), {count} * sizeof({elem}))",
                    self.stream
                )),
            };
            return Ok(());
        }
        if self.is_single(ty) {
            return self.scalar(ty, &format!("(*(({elem}*)({access})))"));
        }
        let i = self.cgen.begin_index_loop(&count);
        let item = format!("(({elem}*)({access}))[{i}]");
        self.scalar(ty, &item)?;
        self.cgen.end_for();
        Ok(())
    }

    fn on_string(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        let stream = self.stream;
        match self.dir {
            Direction::Write => {
                let len = self.cgen.var("len");
                self.cgen
                    .stmt(format!("uint32_t {len} = (uint32_t)strlen({access}) + 1"));
                self.cgen.stmt(format!("{stream}->putBe32({len})"));
                self.cgen
                    .stmt(format!("{stream}->write((const char*)({access}), {len})"));
            }
            Direction::Read if self.variant == Variant::Guest => {
                self.cgen
                    .stmt(format!("{stream}->loadStringInPlace((char**)&{access})"));
            }
            Direction::Read => {
                let len = self.cgen.var("len");
                self.cgen.stmt(format!("uint32_t {len} = {stream}->getBe32()"));
                self.cgen
                    .stmt(format!("{stream}->alloc((void**)&{access}, {len})"));
                self.cgen.stmt(format!("{stream}->read((char*)({access}), {len})"));
            }
        }
        Ok(())
    }

    fn on_string_array(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        let stream = self.stream;
        match self.dir {
            Direction::Write => {
                let count = self.cgen.length_expr(&self.scope, ty);
                self.cgen.stmt(format!("{stream}->putBe32((uint32_t){count})"));
                let i = self.cgen.begin_index_loop(&count);
                let len = self.cgen.var("len");
                self.cgen.stmt(format!(
                    "uint32_t {len} = (uint32_t)strlen({access}[{i}]) + 1"
                ));
                self.cgen.stmt(format!("{stream}->putBe32({len})"));
                self.cgen
                    .stmt(format!("{stream}->write((const char*)({access}[{i}]), {len})"));
                self.cgen.end_for();
            }
            Direction::Read if self.variant == Variant::Guest => {
                self.cgen
                    .stmt(format!("{stream}->loadStringArrayInPlace((char***)&{access})"));
            }
            Direction::Read => {
                let count = self.cgen.var("count");
                self.cgen.stmt(format!("uint32_t {count} = {stream}->getBe32()"));
                self.cgen.stmt(format!(
                    "{stream}->alloc((void**)&{access}, {count} * sizeof(char*))"
                ));
                let i = self.cgen.begin_index_loop(&count);
                let len = self.cgen.var("len");
                let slot = format!("((char**)({access}))[{i}]");
                self.cgen.stmt(format!("uint32_t {len} = {stream}->getBe32()"));
                self.cgen.stmt(format!("{stream}->alloc((void**)&{slot}, {len})"));
                self.cgen.stmt(format!("{stream}->read({slot}, {len})"));
                self.cgen.end_for();
            }
        }
        Ok(())
    }

    fn on_static_arr(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        let n = ty.static_arr_expr.clone().unwrap_or_else(|| "1".to_string());
        let stream = self.stream;
        if ty.type_name == "char" {
            match self.dir {
                Direction::Write => {
                    let len = self.cgen.var("len");
                    self.cgen
                        .stmt(format!("size_t {len} = strnlen({access}, {n})"));
                    self.cgen.stmt(format!("{stream}->write({access}, {len})"));
                    self.cgen.begin_for(
                        format!("size_t pad = {len}"),
                        format!("pad < {n}"),
                        "++pad",
                    );
                    self.cgen.stmt(format!("{stream}->putBe8(0)"));
                    self.cgen.end_for();
                }
                Direction::Read => {
                    self.cgen
                        .stmt(format!("{stream}->read((char*){access}, {n} * sizeof(char))"));
                    self.cgen.stmt(format!("{access}[{n} - 1] = '\\0'"));
                }
            }
            return Ok(());
        }
        if self.registry.encoding_size(&ty.type_name) == Some(1) {
            let bytes = format!("{n} * sizeof({})", ty.type_name);
            match self.dir {
                Direction::Write => self
                    .cgen
                    .stmt(format!("{stream}->write((const void*){access}, {bytes})")),
                Direction::Read => self
                    .cgen
                    .stmt(format!("{stream}->read((void*){access}, {bytes})")),
            };
            return Ok(());
        }
        let i = self.cgen.begin_index_loop(&n);
        self.scalar(ty, &format!("{access}[{i}]"))?;
        self.cgen.end_for();
        Ok(())
    }

    fn on_compound_type(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        let name = ty.type_name.as_str();
        let (stream, root) = (self.stream, self.root);
        let call = |cgen: &mut CodeEmitter, dir: Direction, target: String| {
            let line = match dir {
                Direction::Write => format!(
                    "{}({stream}, {root}, (const {name}*)({target}))",
                    marshal_fn(name)
                ),
                Direction::Read => format!(
                    "{}({stream}, {root}, ({name}*)({target}))",
                    unmarshal_fn(name)
                ),
            };
            cgen.stmt(line);
        };

        if let Some(n) = ty.static_arr_expr.clone() {
            let i = self.cgen.begin_index_loop(&n);
            call(self.cgen, self.dir, format!("{access} + {i}"));
            self.cgen.end_for();
            return Ok(());
        }
        if !ty.is_pointer() {
            call(self.cgen, self.dir, format!("&{access}"));
            return Ok(());
        }
        let count = self.cgen.length_expr(&self.scope, ty);
        if self.dir == Direction::Read {
            self.host_alloc(&access, &format!("{count} * sizeof(const {name})"));
        }
        if self.is_single(ty) {
            call(self.cgen, self.dir, access);
            return Ok(());
        }
        let i = self.cgen.begin_index_loop(&count);
        call(self.cgen, self.dir, format!("{access} + {i}"));
        self.cgen.end_for();
        Ok(())
    }

    fn on_struct_extension(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.access(ty);
        let (stream, root) = (self.stream, self.root);
        match (self.dir, self.variant) {
            (Direction::Write, _) => self
                .cgen
                .stmt(format!("marshal_extension_struct({stream}, {root}, {access})")),
            (Direction::Read, Variant::Guest) => self.cgen.stmt(format!(
                "unmarshal_extension_struct({stream}, {root}, (void*)({access}))"
            )),
            (Direction::Read, Variant::Host) => self.cgen.stmt(format!(
                "unmarshal_extension_struct({stream}, {root}, (void*)(&{access}))"
            )),
        };
        Ok(())
    }

    fn on_unsupported(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        unsupported_comment(self.cgen, ty);
        Ok(())
    }
}

// ── Generator ───────────────────────────────────────────────────────────

pub struct MarshalingGenerator<'r> {
    registry: &'r TypeRegistry,
    dispatch: ExtensionDispatch<'r>,
    variant: Variant,
    extension_header: String,
    sink: OutputSink,
    opcodes: Vec<(String, u32)>,
}

impl<'r> MarshalingGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig, variant: Variant) -> Self {
        let stem = match variant {
            Variant::Guest => config.output.marshaling_guest.clone(),
            Variant::Host => config.output.marshaling_host.clone(),
        };
        Self {
            registry,
            dispatch: ExtensionDispatch::build(registry, &config.root_type_mappings),
            variant,
            extension_header: format!("{}.h", config.output.extension_structs),
            sink: OutputSink::new(stem),
            opcodes: Vec::new(),
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        info!(variant = ?self.variant, stem = self.sink.stem(), "marshaling");
        self.sink.into_files()
    }

    fn marshal_proto(&self, name: &str) -> String {
        format!(
            "void {}({}* vkStream, VkStructureType rootType, const {name}* forMarshaling)",
            marshal_fn(name),
            self.variant.stream_type()
        )
    }

    fn unmarshal_proto(&self, name: &str) -> String {
        format!(
            "void {}({}* vkStream, VkStructureType rootType, {name}* forUnmarshaling)",
            unmarshal_fn(name),
            self.variant.stream_type()
        )
    }

    fn emit_struct(&mut self, compound: &VulkanCompoundType, dir: Direction) -> Result<(), GenError> {
        let (proto, var) = match dir {
            Direction::Write => (self.marshal_proto(&compound.name), "forMarshaling"),
            Direction::Read => (self.unmarshal_proto(&compound.name), "forUnmarshaling"),
        };
        self.sink.header.stmt(&proto);
        self.sink.header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(&proto);
        cgen.stmt("(void)rootType");
        let scope = Scope::of_struct(compound, var);
        let mut visitor =
            MarshalingVisitor::new(self.registry, cgen, scope, dir, self.variant, "vkStream", "rootType");
        for member in compound.marshaled_members() {
            visitor.visit(member)?;
        }
        cgen.end_function();
        Ok(())
    }

    fn emit_extension_marshalers(&mut self) -> Result<(), GenError> {
        let stream_type = self.variant.stream_type();
        let header = &mut self.sink.header;
        header.stmt(format!(
            "void marshal_extension_struct({stream_type}* vkStream, VkStructureType rootType, const void* structExtension)"
        ));
        header.blank();
        header.stmt(format!(
            "void unmarshal_extension_struct({stream_type}* vkStream, VkStructureType rootType, void* structExtension_out)"
        ));
        header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(format!(
            "void marshal_extension_struct({stream_type}* vkStream, VkStructureType rootType, const void* structExtension)"
        ));
        cgen.stmt("const void* cur = structExtension");
        cgen.begin_while("cur && !goldfish_vk_extension_struct_size(rootType, cur)");
        cgen.stmt("cur = ((const VkBaseInStructure*)cur)->pNext");
        cgen.end_while();
        cgen.begin_if("!cur");
        cgen.stmt("vkStream->putBe8(0)");
        cgen.stmt("return");
        cgen.end_if();
        cgen.stmt("vkStream->putBe8(1)");
        cgen.stmt("uint32_t structType = (uint32_t)goldfish_vk_struct_type(cur)");
        cgen.stmt("vkStream->putBe32(structType)");
        emit_extension_switch(
            cgen,
            &self.dispatch,
            "structType",
            "rootType",
            "marshal_extension_struct",
            &mut |cgen, target| {
                cgen.stmt(format!(
                    "{}(vkStream, rootType, reinterpret_cast<const {t}*>(cur))",
                    marshal_fn(&target.name),
                    t = target.name
                ));
                Ok(())
            },
            Some(&mut |cgen| {
                cgen.line("// unknown structs were skipped above");
                cgen.stmt("break");
                Ok(())
            }),
        )?;
        cgen.end_function();

        cgen.begin_function(format!(
            "void unmarshal_extension_struct({stream_type}* vkStream, VkStructureType rootType, void* structExtension_out)"
        ));
        match self.variant {
            Variant::Host => {
                cgen.stmt("void** out = (void**)structExtension_out");
                cgen.begin_if("!vkStream->getBe8()");
                cgen.stmt("*out = nullptr");
                cgen.stmt("return");
                cgen.end_if();
                cgen.stmt("uint32_t structType = vkStream->getBe32()");
                emit_extension_switch(
                    cgen,
                    &self.dispatch,
                    "structType",
                    "rootType",
                    "unmarshal_extension_struct",
                    &mut |cgen, target| {
                        cgen.stmt(format!("vkStream->alloc(out, sizeof({}))", target.name));
                        cgen.stmt(format!(
                            "{}(vkStream, rootType, reinterpret_cast<{t}*>(*out))",
                            unmarshal_fn(&target.name),
                            t = target.name
                        ));
                        Ok(())
                    },
                    Some(&mut |cgen| {
                        cgen.stmt("*out = nullptr");
                        cgen.stmt("break");
                        Ok(())
                    }),
                )?;
            }
            Variant::Guest => {
                cgen.stmt("void* cur = structExtension_out");
                cgen.begin_while("cur && !goldfish_vk_extension_struct_size(rootType, cur)");
                cgen.stmt("cur = ((VkBaseOutStructure*)cur)->pNext");
                cgen.end_while();
                cgen.begin_if("!vkStream->getBe8()");
                cgen.stmt("return");
                cgen.end_if();
                cgen.stmt("uint32_t structType = vkStream->getBe32()");
                emit_extension_switch(
                    cgen,
                    &self.dispatch,
                    "structType",
                    "rootType",
                    "unmarshal_extension_struct",
                    &mut |cgen, target| {
                        cgen.stmt(format!(
                            "{}(vkStream, rootType, reinterpret_cast<{t}*>(cur))",
                            unmarshal_fn(&target.name),
                            t = target.name
                        ));
                        Ok(())
                    },
                    Some(&mut |cgen| {
                        cgen.stmt("break");
                        Ok(())
                    }),
                )?;
            }
        }
        cgen.end_function();
        Ok(())
    }

    fn emit_opcode_names(&mut self) {
        self.sink
            .header
            .stmt("const char* api_opcode_to_string(const uint32_t opcode)");
        self.sink.header.blank();
        let cgen = &mut self.sink.imp;
        cgen.begin_function("const char* api_opcode_to_string(const uint32_t opcode)");
        cgen.begin_switch("opcode");
        for (name, _) in &self.opcodes {
            cgen.case(format!("OP_{name}"));
            cgen.stmt(format!("return \"OP_{name}\""));
            cgen.end_case();
        }
        cgen.default_case();
        cgen.stmt("return \"OP_UNKNOWN_API_CALL\"");
        cgen.end_case();
        cgen.end_switch();
        cgen.end_function();
    }
}

impl Wrapper for MarshalingGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.sink.include_system("vulkan/vulkan.h");
        let stream_header = format!("{}.h", self.variant.stream_type());
        self.sink.include(&stream_header);
        let extension_header = self.extension_header.clone();
        self.sink.include(&extension_header);
        self.sink.begin_namespace("goldfish_vk");
        Ok(())
    }

    fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.begin_guard(feature);
        Ok(())
    }

    fn on_gen_type(&mut self, compound: &VulkanCompoundType) -> Result<(), GenError> {
        debug!(name = %compound.name, "marshal");
        self.emit_struct(compound, Direction::Write)?;
        self.emit_struct(compound, Direction::Read)
    }

    fn on_gen_cmd(&mut self, api: &VulkanApi, opcode: u32) -> Result<(), GenError> {
        self.sink.header.raw(format!("#define OP_{} {opcode}", api.name));
        self.opcodes.push((api.name.clone(), opcode));
        Ok(())
    }

    fn on_end_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.end_guard(feature);
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        self.emit_extension_marshalers()?;
        self.emit_opcode_names();
        self.sink.end_namespace("goldfish_vk");
        Ok(())
    }
}
