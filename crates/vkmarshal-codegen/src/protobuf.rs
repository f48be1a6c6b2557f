//! proto2 schema for every compound type and command, plus the C++
//! converters between Vulkan structs and the generated messages.

use tracing::{debug, info};
use vkmarshal_types::handle::is_handle_type;
use vkmarshal_types::{
    ExtensionDispatch, Feature, TypeRegistry, VulkanApi, VulkanCompoundType, VulkanType,
};

use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::{CodeEmitter, Scope};
use crate::error::GenError;
use crate::extension::emit_extension_switch;
use crate::iterator::{iterate_type, unsupported_comment, TypeVisitor};
use crate::marshaling::MAX_ENUM_ROOT;
use crate::sink::{GeneratedFile, OutputSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Repeated,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Repeated => "repeated",
        }
    }
}

/// Label and type of one message field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoField {
    pub label: Label,
    pub ty: String,
}

impl ProtoField {
    fn optional(ty: impl Into<String>) -> Self {
        Self {
            label: Label::Optional,
            ty: ty.into(),
        }
    }

    fn repeated(ty: impl Into<String>) -> Self {
        Self {
            label: Label::Repeated,
            ty: ty.into(),
        }
    }

    pub fn is_bytes(&self) -> bool {
        self.ty == "bytes"
    }
}

/// Scalar protobuf type of a non-compound Vulkan type.
pub fn proto_scalar(registry: &TypeRegistry, name: &str) -> &'static str {
    match name {
        "VkBool32" | "VkSampleMask" => "uint32",
        "VkDeviceSize" | "VkDeviceAddress" => "uint64",
        "float" => "float",
        "double" => "double",
        "int8_t" | "int16_t" | "int32_t" | "int" => "int32",
        "int64_t" => "int64",
        "uint64_t" | "size_t" => "uint64",
        _ if is_handle_type(name) || registry.is_funcpointer(name) || registry.is_define(name) => "uint64",
        _ if registry.is_enum_like(name) => "uint32",
        _ => match registry.encoding_size(name) {
            Some(8) => "uint64",
            _ => "uint32",
        },
    }
}

fn c_of_scalar(scalar: &str) -> &'static str {
    match scalar {
        "uint64" => "uint64_t",
        "int32" => "int32_t",
        "int64" => "int64_t",
        "float" => "float",
        "double" => "double",
        _ => "uint32_t",
    }
}

fn is_byte_sized(registry: &TypeRegistry, name: &str) -> bool {
    name == "char" || name == "void" || registry.encoding_size(name) == Some(1)
}

/// Field for one member or parameter.
pub fn proto_field(registry: &TypeRegistry, ty: &VulkanType) -> ProtoField {
    let name = ty.type_name.as_str();
    if ty.is_next_pointer() {
        return ProtoField::optional("VkExtensionStruct");
    }
    if ty.is_string() {
        return ProtoField::optional("string");
    }
    if ty.is_string_array() {
        return ProtoField::repeated("string");
    }
    let compound = registry.is_compound(name);
    if ty.is_static_array() {
        return if compound {
            ProtoField::repeated(name)
        } else if is_byte_sized(registry, name) {
            ProtoField::optional("bytes")
        } else {
            ProtoField::repeated(proto_scalar(registry, name))
        };
    }
    let counted = ty.count_expr().is_some();
    if compound {
        return if ty.is_pointer() && counted {
            ProtoField::repeated(name)
        } else {
            ProtoField::optional(name)
        };
    }
    if ty.is_pointer() {
        if ty.pointer_indirection_levels > 1 || (ty.is_void() && !counted) {
            return ProtoField::optional("uint64");
        }
        if counted && is_byte_sized(registry, name) {
            return ProtoField::optional("bytes");
        }
        if counted {
            return ProtoField::repeated(proto_scalar(registry, name));
        }
    }
    ProtoField::optional(proto_scalar(registry, name))
}

/// Accessor stem protoc derives from a field name.
fn accessor(field: &str) -> String {
    field.to_lowercase()
}

fn oneof_field(type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn oneof_case(type_name: &str) -> String {
    format!("k{type_name}")
}

pub fn call_message(api: &VulkanApi) -> String {
    format!("Call_{}", api.name)
}

// ── Converters ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoDirection {
    ToProto,
    FromProto,
}

/// Walks one struct and emits either direction of the conversion.
pub struct ProtoVisitor<'a, 'r> {
    registry: &'r TypeRegistry,
    cgen: &'a mut CodeEmitter,
    scope: Scope<'a>,
    dir: ProtoDirection,
}

impl<'a, 'r> ProtoVisitor<'a, 'r> {
    pub fn new(
        registry: &'r TypeRegistry,
        cgen: &'a mut CodeEmitter,
        compound: &'a VulkanCompoundType,
        dir: ProtoDirection,
    ) -> Self {
        let var = match dir {
            ProtoDirection::ToProto => "from",
            ProtoDirection::FromProto => "to",
        };
        Self {
            registry,
            cgen,
            scope: Scope::of_struct(compound, var),
            dir,
        }
    }

    pub fn visit(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let registry = self.registry;
        iterate_type(self, registry, ty)?;
        if ty.param_name == "sType" {
            let access = self.scope.access(ty);
            self.cgen.begin_if(format!("rootType == {MAX_ENUM_ROOT}"));
            self.cgen.stmt(format!("rootType = {access}"));
            self.cgen.end_if();
        }
        Ok(())
    }

    fn field(&self, ty: &VulkanType) -> ProtoField {
        proto_field(self.registry, ty)
    }

    /// Element count on the proto side of a repeated field.
    fn proto_count(&self, ty: &VulkanType) -> String {
        format!("proto.{}_size()", accessor(&ty.param_name))
    }

    fn scalar_to(&mut self, ty: &VulkanType, value: &str, repeated: bool) {
        let f = accessor(&ty.param_name);
        let c = c_of_scalar(proto_scalar(self.registry, &ty.type_name));
        let verb = if repeated { "add" } else { "set" };
        self.cgen.stmt(format!("proto->{verb}_{f}(({c}){value})"));
    }

    fn scalar_from(&mut self, ty: &VulkanType, target: &str, index: Option<&str>) {
        let f = accessor(&ty.param_name);
        let getter = match index {
            Some(i) => format!("proto.{f}({i})"),
            None => format!("proto.{f}()"),
        };
        self.cgen.stmt(format!("{target} = ({}){getter}", ty.type_name));
    }
}

impl TypeVisitor for ProtoVisitor<'_, '_> {
    fn on_check(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        match self.dir {
            ProtoDirection::ToProto => self.cgen.begin_if(&access),
            ProtoDirection::FromProto => {
                self.cgen.stmt(format!("{access} = nullptr"));
                let f = accessor(&ty.param_name);
                let cond = match self.field(ty).label {
                    Label::Repeated => format!("proto.{f}_size() > 0"),
                    Label::Optional => format!("proto.has_{f}()"),
                };
                self.cgen.begin_if(cond);
            }
        }
        Ok(())
    }

    fn end_check(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        self.cgen.end_if();
        Ok(())
    }

    fn on_value(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        match self.dir {
            ProtoDirection::ToProto => self.scalar_to(ty, &access, false),
            ProtoDirection::FromProto => self.scalar_from(ty, &access, None),
        }
        Ok(())
    }

    fn on_pointer(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let field = self.field(ty);
        let f = accessor(&ty.param_name);
        let elem = ty.type_name.as_str();
        if field.ty == "uint64" && (ty.pointer_indirection_levels > 1 || ty.is_void()) {
            match self.dir {
                ProtoDirection::ToProto => self
                    .cgen
                    .stmt(format!("proto->set_{f}((uint64_t)(uintptr_t){access})")),
                ProtoDirection::FromProto => {
                    let decl = self.cgen.type_decl(ty, false);
                    self.cgen
                        .stmt(format!("{access} = ({decl})(uintptr_t)proto.{f}()"))
                }
            };
            return Ok(());
        }
        if field.is_bytes() {
            match self.dir {
                ProtoDirection::ToProto => {
                    let count = self.cgen.length_expr(&self.scope, ty);
                    let unit = if ty.is_void() { "uint8_t" } else { elem };
                    self.cgen.stmt(format!(
                        "proto->set_{f}((const char*){access}, {count} * sizeof({unit}))"
                    ));
                }
                ProtoDirection::FromProto => {
                    let unit = if ty.is_void() { "void" } else { elem };
                    self.cgen.stmt(format!(
                        "{access} = ({unit}*)alloc->dupArray(proto.{f}().data(), proto.{f}().size())"
                    ));
                }
            }
            return Ok(());
        }
        match (self.dir, field.label) {
            (ProtoDirection::ToProto, Label::Repeated) => {
                let count = self.cgen.length_expr(&self.scope, ty);
                let i = self.cgen.begin_index_loop(&count);
                self.scalar_to(ty, &format!("{access}[{i}]"), true);
                self.cgen.end_for();
            }
            (ProtoDirection::ToProto, Label::Optional) => {
                self.scalar_to(ty, &format!("*{access}"), false);
            }
            (ProtoDirection::FromProto, Label::Repeated) => {
                let count = self.proto_count(ty);
                let buf = self.cgen.var("values");
                self.cgen.stmt(format!(
                    "{elem}* {buf} = ({elem}*)alloc->alloc({count} * sizeof({elem}))"
                ));
                let i = self.cgen.begin_index_loop(&count);
                self.scalar_from(ty, &format!("{buf}[{i}]"), Some(&i));
                self.cgen.end_for();
                self.cgen.stmt(format!("{access} = {buf}"));
            }
            (ProtoDirection::FromProto, Label::Optional) => {
                let buf = self.cgen.var("value");
                self.cgen
                    .stmt(format!("{elem}* {buf} = ({elem}*)alloc->alloc(sizeof({elem}))"));
                self.scalar_from(ty, &format!("*{buf}"), None);
                self.cgen.stmt(format!("{access} = {buf}"));
            }
        }
        Ok(())
    }

    fn on_string(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let f = accessor(&ty.param_name);
        match self.dir {
            ProtoDirection::ToProto => self.cgen.stmt(format!("proto->set_{f}({access})")),
            ProtoDirection::FromProto => self
                .cgen
                .stmt(format!("{access} = alloc->strDup(proto.{f}().c_str())")),
        };
        Ok(())
    }

    fn on_string_array(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let f = accessor(&ty.param_name);
        match self.dir {
            ProtoDirection::ToProto => {
                let count = self.cgen.length_expr(&self.scope, ty);
                let i = self.cgen.begin_index_loop(&count);
                self.cgen.stmt(format!("proto->add_{f}({access}[{i}])"));
                self.cgen.end_for();
            }
            ProtoDirection::FromProto => {
                let count = self.proto_count(ty);
                let names = self.cgen.var("names");
                self.cgen.stmt(format!(
                    "char** {names} = (char**)alloc->alloc({count} * sizeof(char*))"
                ));
                let i = self.cgen.begin_index_loop(&count);
                self.cgen
                    .stmt(format!("{names}[{i}] = alloc->strDup(proto.{f}({i}).c_str())"));
                self.cgen.end_for();
                self.cgen.stmt(format!("{access} = {names}"));
            }
        }
        Ok(())
    }

    fn on_static_arr(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let f = accessor(&ty.param_name);
        let n = ty.static_arr_expr.clone().unwrap_or_else(|| "1".to_string());
        if self.field(ty).is_bytes() {
            let elem = &ty.type_name;
            match self.dir {
                ProtoDirection::ToProto if elem == "char" => {
                    self.cgen
                        .stmt(format!("proto->set_{f}({access}, strnlen({access}, {n}))"));
                }
                ProtoDirection::ToProto => {
                    self.cgen.stmt(format!(
                        "proto->set_{f}((const char*){access}, {n} * sizeof({elem}))"
                    ));
                }
                ProtoDirection::FromProto => {
                    self.cgen
                        .stmt(format!("memset({access}, 0, {n} * sizeof({elem}))"));
                    let len = self.cgen.var("len");
                    let max = if elem == "char" {
                        format!("{n} - 1")
                    } else {
                        n.clone()
                    };
                    self.cgen.stmt(format!(
                        "size_t {len} = proto.{f}().size() < (size_t)({max}) ? proto.{f}().size() : (size_t)({max})"
                    ));
                    self.cgen
                        .stmt(format!("memcpy({access}, proto.{f}().data(), {len})"));
                }
            }
            return Ok(());
        }
        match self.dir {
            ProtoDirection::ToProto => {
                let i = self.cgen.begin_index_loop(&n);
                self.scalar_to(ty, &format!("{access}[{i}]"), true);
                self.cgen.end_for();
            }
            ProtoDirection::FromProto => {
                let count = self.proto_count(ty);
                let i = self.cgen.begin_index_loop(&n);
                self.cgen.begin_if(format!("{i} < (uint32_t){count}"));
                self.scalar_from(ty, &format!("{access}[{i}]"), Some(&i));
                self.cgen.end_if();
                self.cgen.end_for();
            }
        }
        Ok(())
    }

    fn on_compound_type(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let f = accessor(&ty.param_name);
        let name = ty.type_name.as_str();
        let label = self.field(ty).label;
        match self.dir {
            ProtoDirection::ToProto => {
                if let Some(n) = ty.static_arr_expr.clone() {
                    let i = self.cgen.begin_index_loop(&n);
                    self.cgen.stmt(format!(
                        "to_proto_{name}(proto->add_{f}(), rootType, {access} + {i})"
                    ));
                    self.cgen.end_for();
                } else if !ty.is_pointer() {
                    self.cgen
                        .stmt(format!("to_proto_{name}(proto->mutable_{f}(), rootType, &{access})"));
                } else if label == Label::Repeated {
                    let count = self.cgen.length_expr(&self.scope, ty);
                    let i = self.cgen.begin_index_loop(&count);
                    self.cgen.stmt(format!(
                        "to_proto_{name}(proto->add_{f}(), rootType, {access} + {i})"
                    ));
                    self.cgen.end_for();
                } else {
                    self.cgen
                        .stmt(format!("to_proto_{name}(proto->mutable_{f}(), rootType, {access})"));
                }
            }
            ProtoDirection::FromProto => {
                if let Some(n) = ty.static_arr_expr.clone() {
                    let count = self.proto_count(ty);
                    let i = self.cgen.begin_index_loop(&n);
                    self.cgen.begin_if(format!("{i} < (uint32_t){count}"));
                    self.cgen.stmt(format!(
                        "from_proto_{name}(alloc, rootType, proto.{f}({i}), {access} + {i})"
                    ));
                    self.cgen.end_if();
                    self.cgen.end_for();
                } else if !ty.is_pointer() {
                    self.cgen
                        .stmt(format!("from_proto_{name}(alloc, rootType, proto.{f}(), &{access})"));
                } else if label == Label::Repeated {
                    let count = self.proto_count(ty);
                    let items = self.cgen.var("items");
                    self.cgen.stmt(format!(
                        "{name}* {items} = ({name}*)alloc->alloc({count} * sizeof({name}))"
                    ));
                    let i = self.cgen.begin_index_loop(&count);
                    self.cgen.stmt(format!(
                        "from_proto_{name}(alloc, rootType, proto.{f}({i}), {items} + {i})"
                    ));
                    self.cgen.end_for();
                    self.cgen.stmt(format!("{access} = {items}"));
                } else {
                    let item = self.cgen.var("item");
                    self.cgen.stmt(format!(
                        "{name}* {item} = ({name}*)alloc->alloc(sizeof({name}))"
                    ));
                    self.cgen
                        .stmt(format!("from_proto_{name}(alloc, rootType, proto.{f}(), {item})"));
                    self.cgen.stmt(format!("{access} = {item}"));
                }
            }
        }
        Ok(())
    }

    fn on_struct_extension(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let f = accessor(&ty.param_name);
        match self.dir {
            ProtoDirection::ToProto => {
                self.cgen.begin_if(&access);
                self.cgen.stmt(format!(
                    "to_proto_extension_struct(proto->mutable_{f}(), rootType, {access})"
                ));
                self.cgen.end_if();
            }
            ProtoDirection::FromProto => {
                self.cgen.stmt(format!("{access} = nullptr"));
                self.cgen.begin_if(format!("proto.has_{f}()"));
                self.cgen.stmt(format!(
                    "from_proto_extension_struct(alloc, rootType, proto.{f}(), (void**)&{access})"
                ));
                self.cgen.end_if();
            }
        }
        Ok(())
    }

    fn on_unsupported(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        unsupported_comment(self.cgen, ty);
        Ok(())
    }
}

// ── Generator ───────────────────────────────────────────────────────────

pub struct ProtobufGenerator<'r> {
    registry: &'r TypeRegistry,
    config: GenConfig,
    dispatch: ExtensionDispatch<'r>,
    schema: CodeEmitter,
    calls: Vec<String>,
    sink: OutputSink,
}

impl<'r> ProtobufGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self {
            registry,
            config: config.clone(),
            dispatch: ExtensionDispatch::build(registry, &config.root_type_mappings),
            schema: CodeEmitter::new(),
            calls: Vec::new(),
            sink: OutputSink::new(format!("{}_convert", config.output.proto)),
        }
    }

    /// The `.proto` schema followed by the converter header and source.
    pub fn into_files(self) -> Vec<GeneratedFile> {
        info!(messages = self.calls.len(), package = %self.config.proto_package, "protobuf");
        let mut files = vec![GeneratedFile {
            name: format!("{}.proto", self.config.output.proto),
            contents: self.schema.into_string(),
        }];
        files.extend(self.sink.into_files());
        files
    }

    fn message(&mut self, name: &str, fields: &[VulkanType]) {
        self.schema.line(format!("message {name} {{"));
        for (tag, ty) in fields.iter().enumerate() {
            let field = proto_field(self.registry, ty);
            self.schema.line(format!(
                "    {} {} {} = {};",
                field.label.as_str(),
                field.ty,
                ty.param_name,
                tag + 1
            ));
        }
    }

    fn emit_converters(&mut self, compound: &VulkanCompoundType) -> Result<(), GenError> {
        let pkg = self.config.proto_package.clone();
        let name = &compound.name;
        let to = format!(
            "void to_proto_{name}({pkg}::{name}* proto, VkStructureType rootType, const {name}* from)"
        );
        let from = format!(
            "void from_proto_{name}(Allocator* alloc, VkStructureType rootType, const {pkg}::{name}& proto, {name}* to)"
        );
        for proto in [&to, &from] {
            self.sink.header.stmt(proto);
        }
        self.sink.header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(&to);
        cgen.stmt("(void)rootType");
        let mut visitor = ProtoVisitor::new(self.registry, cgen, compound, ProtoDirection::ToProto);
        for member in compound.marshaled_members() {
            visitor.visit(member)?;
        }
        cgen.end_function();

        cgen.begin_function(&from);
        cgen.stmt("(void)alloc");
        cgen.stmt("(void)rootType");
        let mut visitor = ProtoVisitor::new(self.registry, cgen, compound, ProtoDirection::FromProto);
        for member in compound.marshaled_members() {
            visitor.visit(member)?;
        }
        cgen.end_function();
        Ok(())
    }

    fn emit_extension_converters(&mut self) -> Result<(), GenError> {
        let pkg = self.config.proto_package.clone();
        let to = format!(
            "void to_proto_extension_struct({pkg}::VkExtensionStruct* proto, VkStructureType rootType, const void* structExtension)"
        );
        let from = format!(
            "void from_proto_extension_struct(Allocator* alloc, VkStructureType rootType, const {pkg}::VkExtensionStruct& proto, void** structExtension_out)"
        );
        self.sink.header.stmt(&to);
        self.sink.header.stmt(&from);
        self.sink.header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(&to);
        cgen.stmt("const void* cur = structExtension");
        cgen.begin_while("cur && !goldfish_vk_extension_struct_size(rootType, cur)");
        cgen.stmt("cur = ((const VkBaseInStructure*)cur)->pNext");
        cgen.end_while();
        cgen.begin_if("!cur");
        cgen.stmt("return");
        cgen.end_if();
        cgen.stmt("uint32_t structType = (uint32_t)goldfish_vk_struct_type(cur)");
        emit_extension_switch(
            cgen,
            &self.dispatch,
            "structType",
            "rootType",
            "to_proto_extension_struct",
            &mut |cgen, target| {
                cgen.stmt(format!(
                    "to_proto_{t}(proto->mutable_{f}(), rootType, reinterpret_cast<const {t}*>(cur))",
                    t = target.name,
                    f = accessor(&oneof_field(&target.name))
                ));
                Ok(())
            },
            Some(&mut |cgen| {
                cgen.stmt("break");
                Ok(())
            }),
        )?;
        cgen.end_function();

        cgen.begin_function(&from);
        cgen.stmt("*structExtension_out = nullptr");
        cgen.begin_switch("proto.ext_case()");
        for (compound, feature) in self.registry.extension_structs() {
            if let Some(f) = feature {
                cgen.raw(format!("#ifdef {}", f.name));
            }
            let t = &compound.name;
            cgen.case(format!("{pkg}::VkExtensionStruct::{}", oneof_case(t)));
            cgen.stmt(format!("{t}* ext = ({t}*)alloc->alloc(sizeof({t}))"));
            cgen.stmt(format!(
                "from_proto_{t}(alloc, rootType, proto.{}(), ext)",
                accessor(&oneof_field(t))
            ));
            cgen.stmt("*structExtension_out = ext");
            cgen.stmt("break");
            cgen.end_case();
            if feature.is_some() {
                cgen.raw("#endif");
            }
        }
        cgen.default_case();
        cgen.stmt("break");
        cgen.end_case();
        cgen.end_switch();
        cgen.end_function();
        Ok(())
    }

    fn emit_oneofs(&mut self) {
        let extensions: Vec<String> = self
            .registry
            .extension_structs()
            .iter()
            .map(|(c, _)| c.name.clone())
            .collect();
        self.schema.line("message VkExtensionStruct {").line("    oneof ext {");
        for (tag, name) in extensions.iter().enumerate() {
            self.schema
                .line(format!("        {name} {} = {};", oneof_field(name), tag + 1));
        }
        self.schema.line("    }").line("}").blank();

        self.schema.line("message VkApiCall {").line("    oneof call {");
        for (tag, api) in self.calls.iter().enumerate() {
            self.schema.line(format!("        Call_{api} {api} = {};", tag + 1));
        }
        self.schema.line("    }").line("}");
    }
}

impl Wrapper for ProtobufGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.schema.raw(vkmarshal_common::text::generated_banner(
            "//",
            &format!("{}.proto", self.config.output.proto),
        ));
        self.schema.line("syntax = \"proto2\";").blank();
        self.schema
            .line(format!("package {};", self.config.proto_package))
            .blank();

        self.sink.include_system("vulkan/vulkan.h");
        let pb = format!("{}.pb.h", self.config.output.proto);
        self.sink.include(&pb);
        self.sink.include("Allocator.h");
        let ext = format!("{}.h", self.config.output.extension_structs);
        self.sink.include(&ext);
        self.sink.header.blank();
        self.sink.imp.raw("#include <string.h>");
        self.sink.imp.blank();
        Ok(())
    }

    fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.schema.line(format!("// {}", feature.name)).blank();
        self.sink.begin_guard(feature);
        Ok(())
    }

    fn on_gen_type(&mut self, compound: &VulkanCompoundType) -> Result<(), GenError> {
        debug!(name = %compound.name, "proto message");
        self.message(&compound.name, compound.marshaled_members());
        self.schema.line("}").blank();
        self.emit_converters(compound)
    }

    fn on_gen_cmd(&mut self, api: &VulkanApi, _opcode: u32) -> Result<(), GenError> {
        let name = call_message(api);
        self.message(&name, &api.parameters);
        if api.has_return() {
            let ret = api.return_value();
            let field = proto_field(self.registry, &ret);
            self.schema.line(format!(
                "    {} {} ret = {};",
                field.label.as_str(),
                field.ty,
                api.parameters.len() + 1
            ));
        }
        self.schema.line("}").blank();
        self.calls.push(api.name.clone());
        Ok(())
    }

    fn on_end_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.end_guard(feature);
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        self.emit_oneofs();
        self.emit_extension_converters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::sample::sample_registry;

    #[test]
    fn field_table() {
        let reg = sample_registry().unwrap();
        let info = reg.compound("VkInstanceCreateInfo").unwrap();
        let field = |name: &str| proto_field(&reg, info.member(name).unwrap());
        assert_eq!(field("pNext"), ProtoField::optional("VkExtensionStruct"));
        assert_eq!(field("sType"), ProtoField::optional("uint32"));
        assert_eq!(field("ppEnabledLayerNames"), ProtoField::repeated("string"));
        assert_eq!(field("pApplicationInfo"), ProtoField::optional("VkApplicationInfo"));
        assert_eq!(field("enabledLayerCount"), ProtoField::optional("uint32"));

        let props = reg.compound("VkExtensionProperties").unwrap();
        assert_eq!(
            proto_field(&reg, props.member("extensionName").unwrap()),
            ProtoField::optional("bytes")
        );
        let shader = reg.compound("VkShaderModuleCreateInfo").unwrap();
        assert_eq!(
            proto_field(&reg, shader.member("pCode").unwrap()),
            ProtoField::repeated("uint32")
        );
        assert_eq!(
            proto_field(&reg, shader.member("codeSize").unwrap()),
            ProtoField::optional("uint64")
        );
    }

    #[test]
    fn scalars() {
        let reg = sample_registry().unwrap();
        assert_eq!(proto_scalar(&reg, "VkBool32"), "uint32");
        assert_eq!(proto_scalar(&reg, "VkDeviceSize"), "uint64");
        assert_eq!(proto_scalar(&reg, "VkBuffer"), "uint64");
        assert_eq!(proto_scalar(&reg, "VkStructureType"), "uint32");
        assert_eq!(proto_scalar(&reg, "int32_t"), "int32");
        assert_eq!(proto_scalar(&reg, "float"), "float");
    }

    #[test]
    fn oneof_names() {
        assert_eq!(oneof_field("VkPhysicalDeviceFeatures2"), "vkPhysicalDeviceFeatures2");
        assert_eq!(oneof_case("VkPhysicalDeviceFeatures2"), "kVkPhysicalDeviceFeatures2");
    }
}
