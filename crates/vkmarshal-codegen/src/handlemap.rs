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

pub fn handlemap_fn(type_name: &str) -> String {
    format!("handlemap_{type_name}")
}

/// Rewrites every handle reachable from a struct or parameter in place.
pub struct HandleMapVisitor<'a, 'r> {
    registry: &'r TypeRegistry,
    cgen: &'a mut CodeEmitter,
    scope: Scope<'a>,
    mapping: &'a str,
    root: &'a str,
}

impl<'a, 'r> HandleMapVisitor<'a, 'r> {
    pub fn new(
        registry: &'r TypeRegistry,
        cgen: &'a mut CodeEmitter,
        scope: Scope<'a>,
        mapping: &'a str,
        root: &'a str,
    ) -> Self {
        Self {
            registry,
            cgen,
            scope,
            mapping,
            root,
        }
    }

    pub fn visit(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let registry = self.registry;
        iterate_type(self, registry, ty)?;
        if ty.param_name == "sType" && self.scope.struct_var().is_some() {
            self.cgen.begin_if(format!("rootType == {MAX_ENUM_ROOT}"));
            self.cgen.stmt(format!("rootType = {}", self.scope.access(ty)));
            self.cgen.end_if();
        }
        Ok(())
    }

    fn call(&mut self, name: &str, target: &str) {
        self.cgen.stmt(format!(
            "{}({}, {}, ({name}*)({target}))",
            handlemap_fn(name),
            self.mapping,
            self.root
        ));
    }
}

impl TypeVisitor for HandleMapVisitor<'_, '_> {
    fn on_value(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        if ty.is_handle_type() {
            let access = self.scope.access(ty);
            self.cgen.stmt(format!(
                "{}->mapHandles_{t}(({t}*)&{access})",
                self.mapping,
                t = ty.type_name
            ));
        }
        Ok(())
    }

    fn on_pointer(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        if !ty.is_handle_type() || ty.pointer_indirection_levels > 1 {
            return Ok(());
        }
        let access = self.scope.access(ty);
        let count = self.cgen.length_expr(&self.scope, ty);
        self.cgen.begin_if(&access);
        self.cgen.stmt(format!(
            "{}->mapHandles_{t}(({t}*){access}, {count})",
            self.mapping,
            t = ty.type_name
        ));
        self.cgen.end_if();
        Ok(())
    }

    fn on_string(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_string_array(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_static_arr(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        if ty.is_handle_type() {
            let access = self.scope.access(ty);
            let n = ty.static_arr_expr.clone().unwrap_or_else(|| "1".to_string());
            self.cgen.stmt(format!(
                "{}->mapHandles_{t}(({t}*){access}, {n})",
                self.mapping,
                t = ty.type_name
            ));
        }
        Ok(())
    }

    fn on_compound_type(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        let name = ty.type_name.clone();
        if let Some(n) = ty.static_arr_expr.clone() {
            let i = self.cgen.begin_index_loop(&n);
            self.call(&name, &format!("{access} + {i}"));
            self.cgen.end_for();
        } else if !ty.is_pointer() {
            self.call(&name, &format!("&{access}"));
        } else {
            self.cgen.begin_if(&access);
            let count = self.cgen.length_expr(&self.scope, ty);
            let i = self.cgen.begin_index_loop(&count);
            self.call(&name, &format!("{access} + {i}"));
            self.cgen.end_for();
            self.cgen.end_if();
        }
        Ok(())
    }

    fn on_struct_extension(&mut self, ty: &VulkanType) -> Result<(), GenError> {
        let access = self.scope.access(ty);
        self.cgen.begin_if(&access);
        self.cgen.stmt(format!(
            "handlemap_extension_struct({}, {}, (void*)({access}))",
            self.mapping, self.root
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

pub struct HandleMapGenerator<'r> {
    registry: &'r TypeRegistry,
    dispatch: ExtensionDispatch<'r>,
    extension_header: String,
    sink: OutputSink,
}

impl<'r> HandleMapGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self {
            registry,
            dispatch: ExtensionDispatch::build(registry, &config.root_type_mappings),
            extension_header: format!("{}.h", config.output.extension_structs),
            sink: OutputSink::new(config.output.handlemap.clone()),
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        self.sink.into_files()
    }
}

fn proto(name: &str) -> String {
    format!(
        "void {}(VulkanHandleMapping* handlemap, VkStructureType rootType, {name}* toMap)",
        handlemap_fn(name)
    )
}

const EXTENSION_PROTO: &str =
    "void handlemap_extension_struct(VulkanHandleMapping* handlemap, VkStructureType rootType, void* structExtension_out)";

impl Wrapper for HandleMapGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include("VulkanHandleMapping.h");
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
        debug!(name = %compound.name, "handlemap");
        let proto = proto(&compound.name);
        self.sink.header.stmt(&proto);
        self.sink.header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(&proto);
        cgen.stmt("(void)handlemap");
        cgen.stmt("(void)rootType");
        cgen.stmt("(void)toMap");
        let mut visitor = HandleMapVisitor::new(
            self.registry,
            cgen,
            Scope::of_struct(compound, "toMap"),
            "handlemap",
            "rootType",
        );
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
        cgen.begin_if("!structExtension_out");
        cgen.stmt("return");
        cgen.end_if();
        cgen.stmt("uint32_t structType = (uint32_t)goldfish_vk_struct_type(structExtension_out)");
        emit_extension_switch(
            cgen,
            &self.dispatch,
            "structType",
            "rootType",
            "handlemap_extension_struct",
            &mut |cgen, target| {
                cgen.stmt(format!(
                    "{}(handlemap, rootType, reinterpret_cast<{t}*>(structExtension_out))",
                    handlemap_fn(&target.name),
                    t = target.name
                ));
                Ok(())
            },
            Some(&mut |cgen| {
                cgen.stmt(
                    "handlemap_extension_struct(handlemap, rootType, ((VkBaseOutStructure*)structExtension_out)->pNext)",
                );
                cgen.stmt("return");
                Ok(())
            }),
        )?;
        cgen.end_function();
        self.sink.end_namespace("goldfish_vk");
        Ok(())
    }
}
