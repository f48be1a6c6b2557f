//! Host/guest rewriting of device-memory descriptors and external-memory
//! structs, applied once per direction.

use tracing::debug;
use vkmarshal_types::{
    DeviceMemoryRole, ExtensionDispatch, Feature, TypeRegistry, VulkanCompoundType, VulkanType,
};

use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::{CodeEmitter, Scope};
use crate::error::GenError;
use crate::extension::emit_extension_switch;
use crate::iterator::{iterate_type, TypeVisitor};
use crate::marshaling::MAX_ENUM_ROOT;
use crate::sink::{GeneratedFile, OutputSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDirection {
    ToHost,
    FromHost,
}

impl TransformDirection {
    pub fn suffix(self) -> &'static str {
        match self {
            TransformDirection::ToHost => "tohost",
            TransformDirection::FromHost => "fromhost",
        }
    }

    pub const BOTH: [TransformDirection; 2] = [TransformDirection::ToHost, TransformDirection::FromHost];
}

pub fn transform_fn(dir: TransformDirection, type_name: &str) -> String {
    format!("transform_{}_{type_name}", dir.suffix())
}

/// The five `(pointer, count)` pairs of a device-memory transform call, in
/// canonical role order. `access` yields the lvalue of the member or
/// parameter carrying a role.
pub fn device_memory_args(access: &mut dyn FnMut(DeviceMemoryRole) -> Option<String>) -> String {
    DeviceMemoryRole::CANONICAL
        .iter()
        .map(|role| match access(*role) {
            Some(lvalue) => format!("({}*)&{lvalue}, 1", role.c_type()),
            None => format!("({}*)nullptr, 1", role.c_type()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct TransformVisitor<'a, 'r> {
    registry: &'r TypeRegistry,
    cgen: &'a mut CodeEmitter,
    scope: Scope<'a>,
    dir: TransformDirection,
    tracker: &'a str,
    root: &'a str,
}

impl<'a, 'r> TransformVisitor<'a, 'r> {
    pub fn new(
        registry: &'r TypeRegistry,
        cgen: &'a mut CodeEmitter,
        scope: Scope<'a>,
        dir: TransformDirection,
        tracker: &'a str,
        root: &'a str,
    ) -> Self {
        Self {
            registry,
            cgen,
            scope,
            dir,
            tracker,
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
            transform_fn(self.dir, name),
            self.tracker,
            self.root
        ));
    }
}

impl TypeVisitor for TransformVisitor<'_, '_> {
    fn on_value(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_pointer(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_string(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_string_array(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_static_arr(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
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
            "transform_{}_extension_struct({}, {}, (void*)({access}))",
            self.dir.suffix(),
            self.tracker,
            self.root
        ));
        self.cgen.end_if();
        Ok(())
    }
}

// ── Generator ───────────────────────────────────────────────────────────

pub struct TransformGenerator<'r> {
    registry: &'r TypeRegistry,
    config: GenConfig,
    dispatch: ExtensionDispatch<'r>,
    sink: OutputSink,
}

fn proto(dir: TransformDirection, name: &str) -> String {
    format!(
        "void {}(ResourceTracker* resourceTracker, VkStructureType rootType, {name}* toTransform)",
        transform_fn(dir, name)
    )
}

fn extension_proto(dir: TransformDirection) -> String {
    format!(
        "void transform_{}_extension_struct(ResourceTracker* resourceTracker, VkStructureType rootType, void* structExtension_out)",
        dir.suffix()
    )
}

impl<'r> TransformGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self {
            registry,
            config: config.clone(),
            dispatch: ExtensionDispatch::build(registry, &config.root_type_mappings),
            sink: OutputSink::new(config.output.transform.clone()),
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        self.sink.into_files()
    }

    fn emit_struct(&mut self, compound: &VulkanCompoundType, dir: TransformDirection) -> Result<(), GenError> {
        let proto = proto(dir, &compound.name);
        self.sink.header.stmt(&proto);
        self.sink.header.blank();

        let cgen = &mut self.sink.imp;
        cgen.begin_function(&proto);
        cgen.stmt("(void)resourceTracker");
        cgen.stmt("(void)rootType");
        cgen.stmt("(void)toTransform");
        if self.config.is_transformed(&compound.name) {
            cgen.stmt(format!(
                "resourceTracker->transformImpl_{}_{}(toTransform, 1)",
                compound.name,
                dir.suffix()
            ));
        }
        if !compound.memory_roles().is_empty() {
            let roles = compound.role_members();
            let args = device_memory_args(&mut |role| {
                roles.get(&role).map(|m| format!("toTransform->{}", m.param_name))
            });
            cgen.stmt(format!(
                "resourceTracker->deviceMemoryTransform_{}({args})",
                dir.suffix()
            ));
        }
        let mut visitor = TransformVisitor::new(
            self.registry,
            cgen,
            Scope::of_struct(compound, "toTransform"),
            dir,
            "resourceTracker",
            "rootType",
        );
        for member in compound.marshaled_members() {
            visitor.visit(member)?;
        }
        cgen.end_function();
        Ok(())
    }

    fn emit_extension(&mut self, dir: TransformDirection) -> Result<(), GenError> {
        let proto = extension_proto(dir);
        self.sink.header.stmt(&proto);
        self.sink.header.blank();
        let cgen = &mut self.sink.imp;
        cgen.begin_function(&proto);
        cgen.begin_if("!structExtension_out");
        cgen.stmt("return");
        cgen.end_if();
        cgen.stmt("uint32_t structType = (uint32_t)goldfish_vk_struct_type(structExtension_out)");
        let site = format!("transform_{}_extension_struct", dir.suffix());
        emit_extension_switch(
            cgen,
            &self.dispatch,
            "structType",
            "rootType",
            &site,
            &mut |cgen, target| {
                cgen.stmt(format!(
                    "{}(resourceTracker, rootType, reinterpret_cast<{t}*>(structExtension_out))",
                    transform_fn(dir, &target.name),
                    t = target.name
                ));
                Ok(())
            },
            Some(&mut |cgen| {
                cgen.stmt(format!(
                    "transform_{}_extension_struct(resourceTracker, rootType, ((VkBaseOutStructure*)structExtension_out)->pNext)",
                    dir.suffix()
                ));
                cgen.stmt("return");
                Ok(())
            }),
        )?;
        cgen.end_function();
        Ok(())
    }
}

impl Wrapper for TransformGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include("ResourceTracker.h");
        let extension_header = format!("{}.h", self.config.output.extension_structs);
        self.sink.include(&extension_header);
        self.sink.begin_namespace("goldfish_vk");
        Ok(())
    }

    fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.begin_guard(feature);
        Ok(())
    }

    fn on_gen_type(&mut self, compound: &VulkanCompoundType) -> Result<(), GenError> {
        debug!(name = %compound.name, "transform");
        for dir in TransformDirection::BOTH {
            self.emit_struct(compound, dir)?;
        }
        Ok(())
    }

    fn on_end_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.end_guard(feature);
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        for dir in TransformDirection::BOTH {
            self.emit_extension(dir)?;
        }
        self.sink.end_namespace("goldfish_vk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::sample::sample_registry;

    #[test]
    fn roles_fill_five_pairs_in_order() {
        let reg = sample_registry().unwrap();
        let range = reg.compound("VkMappedMemoryRange").unwrap();
        let roles = range.role_members();
        let args = device_memory_args(&mut |role| {
            roles.get(&role).map(|m| format!("toTransform->{}", m.param_name))
        });
        assert_eq!(
            args,
            "(VkDeviceMemory*)&toTransform->memory, 1, (VkDeviceSize*)&toTransform->offset, 1, \
             (VkDeviceSize*)&toTransform->size, 1, (uint32_t*)nullptr, 1, (uint32_t*)nullptr, 1"
        );
    }

    #[test]
    fn transformed_types_get_the_tracker_hook() {
        let reg = sample_registry().unwrap();
        let config = GenConfig::default();
        let mut gen = TransformGenerator::new(&reg, &config);
        let compound = reg.compound("VkExportMemoryAllocateInfo").unwrap();
        gen.emit_struct(compound, TransformDirection::ToHost).unwrap();
        let files = gen.into_files();
        assert!(files[1]
            .contents
            .contains("resourceTracker->transformImpl_VkExportMemoryAllocateInfo_tohost(toTransform, 1);"));
    }
}
