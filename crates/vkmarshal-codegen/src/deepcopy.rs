use tracing::debug;
use vkmarshal_types::{ExtensionDispatch, Feature, TypeRegistry, VulkanCompoundType, VulkanType};

use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::{CodeEmitter, Scope};
use crate::error::GenError;
use crate::extension::emit_extension_switch;
use crate::iterator::{iterate_type, unsupported_comment, TypeVisitor};
use crate::marshaling::MAX_ENUM_ROOT;
use crate::sink::{GeneratedFile, OutputSink};

pub fn deepcopy_fn(type_name: &str) -> String {
    format!("deepcopy_{type_name}")
}

/// Copies every pointee of `from` into arena storage owned by `to`.
/// Plain members are covered by the leading `*to = *from`.
pub struct DeepCopyVisitor<'a, 'r> {
    registry: &'r TypeRegistry,
    cgen: &'a mut CodeEmitter,
    from: Scope<'a>,
    to: Scope<'a>,
}

impl<'a, 'r> DeepCopyVisitor<'a, 'r> {
    pub fn new(
        registry: &'r TypeRegistry,
        cgen: &'a mut CodeEmitter,
        compound: &'a VulkanCompoundType,
    ) -> Self {
        Self {
            registry,
            cgen,
            from: Scope::of_struct(compound, "from"),
            to: Scope::of_struct(compound, "to"),
        }
    }

    pub fn visit(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let registry = self.registry;
        iterate_type(self, registry, ty)?;
        if ty.param_name == "sType" {
            self.cgen.begin_if(format!("rootType == {MAX_ENUM_ROOT}"));
            self.cgen.stmt(format!("rootType = {}", self.from.access(ty)));
            self.cgen.end_if();
        }
        Ok(())
    }

    fn copy_call(&mut self, name: &str, from: &str, to: &str) {
        self.cgen.stmt(format!(
            "{}(alloc, rootType, {from}, ({name}*)({to}))",
            deepcopy_fn(name)
        ));
    }
}

impl TypeVisitor for DeepCopyVisitor<'_, '_> {
    fn on_value(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_pointer(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        if ty.pointer_indirection_levels > 1 || (ty.is_void() && ty.count_expr().is_none()) {
            return Ok(());
        }
        let (from, to) = (self.from.access(ty), self.to.access(ty));
        let count = self.cgen.length_expr(&self.from, ty);
        let elem = if ty.is_void() { "uint8_t" } else { ty.type_name.as_str() };
        let cast = if ty.is_void() {
            "void".to_string()
        } else {
            ty.type_name.clone()
        };
        self.cgen.stmt(format!("{to} = nullptr"));
        self.cgen.begin_if(&from);
        self.cgen.stmt(format!(
            "{to} = ({cast}*)alloc->dupArray({from}, {count} * sizeof(const {elem}))"
        ));
        self.cgen.end_if();
        Ok(())
    }

    fn on_string(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let (from, to) = (self.from.access(ty), self.to.access(ty));
        self.cgen.stmt(format!("{to} = nullptr"));
        self.cgen.begin_if(&from);
        self.cgen.stmt(format!("{to} = alloc->strDup({from})"));
        self.cgen.end_if();
        Ok(())
    }

    fn on_string_array(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let (from, to) = (self.from.access(ty), self.to.access(ty));
        let count = self.cgen.length_expr(&self.from, ty);
        self.cgen.stmt(format!("{to} = nullptr"));
        self.cgen.begin_if(format!("{from} && {count}"));
        self.cgen
            .stmt(format!("{to} = alloc->strDupArray({from}, {count})"));
        self.cgen.end_if();
        Ok(())
    }

    fn on_static_arr(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_compound_type(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let (from, to) = (self.from.access(ty), self.to.access(ty));
        let name = ty.type_name.clone();
        if let Some(n) = ty.static_arr_expr.clone() {
            let i = self.cgen.begin_index_loop(&n);
            self.copy_call(&name, &format!("{from} + {i}"), &format!("{to} + {i}"));
            self.cgen.end_for();
            return Ok(());
        }
        if !ty.is_pointer() {
            self.copy_call(&name, &format!("&{from}"), &format!("&{to}"));
            return Ok(());
        }
        let count = self.cgen.length_expr(&self.from, ty);
        self.cgen.stmt(format!("{to} = nullptr"));
        self.cgen.begin_if(&from);
        self.cgen.stmt(format!(
            "{to} = ({name}*)alloc->alloc({count} * sizeof(const {name}))"
        ));
        let i = self.cgen.begin_index_loop(&count);
        self.copy_call(&name, &format!("{from} + {i}"), &format!("{to} + {i}"));
        self.cgen.end_for();
        self.cgen.end_if();
        Ok(())
    }

    fn on_struct_extension(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let to = self.to.access(ty);
        let next = self.cgen.var("from_pNext");
        let size = self.cgen.var("pNext_size");
        self.cgen.stmt(format!("const void* {next} = from"));
        self.cgen.stmt(format!("size_t {size} = 0u"));
        self.cgen.begin_while(format!("!{size} && {next}"));
        self.cgen
            .stmt(format!("{next} = static_cast<const VkBaseInStructure*>({next})->pNext"));
        self.cgen.stmt(format!(
            "{size} = goldfish_vk_extension_struct_size(rootType, {next})"
        ));
        self.cgen.end_while();
        self.cgen.stmt(format!("{to} = nullptr"));
        self.cgen.begin_if(&size);
        self.cgen.stmt(format!("{to} = (void*)alloc->alloc({size})"));
        self.cgen.stmt(format!(
            "deepcopy_extension_struct(alloc, rootType, {next}, (void*)({to}))"
        ));
        self.cgen.end_if();
        Ok(())
    }

    fn on_unsupported(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        unsupported_comment(self.cgen, ty);
        Ok(())
    }
}

// ── Generator ───────────────────────────────────────────────────────────

pub struct DeepCopyGenerator<'r> {
    registry: &'r TypeRegistry,
    dispatch: ExtensionDispatch<'r>,
    extension_header: String,
    sink: OutputSink,
}

fn proto(name: &str) -> String {
    format!(
        "void {}(Allocator* alloc, VkStructureType rootType, const {name}* from, {name}* to)",
        deepcopy_fn(name)
    )
}

const EXTENSION_PROTO: &str = "void deepcopy_extension_struct(Allocator* alloc, VkStructureType rootType, const void* structExtension, void* structExtension_out)";

impl<'r> DeepCopyGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self {
            registry,
            dispatch: ExtensionDispatch::build(registry, &config.root_type_mappings),
            extension_header: format!("{}.h", config.output.extension_structs),
            sink: OutputSink::new(config.output.deepcopy.clone()),
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        self.sink.into_files()
    }
}

impl Wrapper for DeepCopyGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include("Allocator.h");
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
        debug!(name = %compound.name, "deepcopy");
        let proto = proto(&compound.name);
        self.sink.header.stmt(&proto);
        self.sink.header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(&proto);
        cgen.stmt("(void)alloc");
        cgen.stmt("(void)rootType");
        cgen.stmt("*to = *from");
        let mut visitor = DeepCopyVisitor::new(self.registry, cgen, compound);
        for member in compound.marshaled_members() {
            visitor.visit(member)?;
        }
        cgen.end_function();
        Ok(())
    }

    fn on_end_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.end_guard(feature);
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        self.sink.header.stmt(EXTENSION_PROTO);
        self.sink.header.blank();
        let cgen = &mut self.sink.imp;
        cgen.begin_function(EXTENSION_PROTO);
        cgen.begin_if("!structExtension");
        cgen.stmt("return");
        cgen.end_if();
        cgen.stmt("uint32_t structType = (uint32_t)goldfish_vk_struct_type(structExtension)");
        emit_extension_switch(
            cgen,
            &self.dispatch,
            "structType",
            "rootType",
            "deepcopy_extension_struct",
            &mut |cgen, target| {
                cgen.stmt(format!(
                    "{}(alloc, rootType, reinterpret_cast<const {t}*>(structExtension), reinterpret_cast<{t}*>(structExtension_out))",
                    deepcopy_fn(&target.name),
                    t = target.name
                ));
                Ok(())
            },
            Some(&mut |cgen| {
                cgen.stmt("return");
                Ok(())
            }),
        )?;
        cgen.end_function();
        self.sink.end_namespace("goldfish_vk");
        Ok(())
    }
}
