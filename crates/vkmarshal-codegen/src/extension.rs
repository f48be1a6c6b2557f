//! The `sType` switch shared by every generator that walks `pNext` chains,
//! and the standalone struct-type/size helpers.

use vkmarshal_types::{CaseTarget, ExtensionDispatch, TypeRegistry, VulkanCompoundType};

use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::emitter::CodeEmitter;
use crate::error::GenError;
use crate::sink::{GeneratedFile, OutputSink};

pub type CaseEmit<'a> = dyn FnMut(&mut CodeEmitter, &VulkanCompoundType) -> Result<(), GenError> + 'a;
pub type DefaultEmit<'a> = dyn FnMut(&mut CodeEmitter) -> Result<(), GenError> + 'a;

/// Emit `switch (type_expr)` over every extendable struct.
///
/// Cases are grouped per feature under `#ifdef` guards. Reused `sType`
/// values get a nested `switch (root_expr)`. `default_emit` fills the outer
/// default branch and must be given by every call site.
pub fn emit_extension_switch(
    cgen: &mut CodeEmitter,
    dispatch: &ExtensionDispatch<'_>,
    type_expr: &str,
    root_expr: &str,
    site: &str,
    on_case: &mut CaseEmit<'_>,
    default_emit: Option<&mut DefaultEmit<'_>>,
) -> Result<(), GenError> {
    let default_emit = default_emit.ok_or_else(|| GenError::MissingDefaultEmit {
        site: site.to_string(),
    })?;

    cgen.begin_switch(type_expr);
    for (feature, cases) in dispatch.grouped_by_feature() {
        if let Some(f) = feature {
            cgen.raw(format!("#ifdef {}", f.name));
        }
        for case in cases {
            cgen.case(&case.label);
            match &case.target {
                CaseTarget::Single(target) => on_case(cgen, target)?,
                CaseTarget::ByRoot { roots, default } => {
                    cgen.begin_switch(root_expr);
                    for root in roots {
                        let guard = root
                            .feature
                            .filter(|rf| feature.map(|f| f.name.as_str()) != Some(rf.name.as_str()));
                        if let Some(g) = guard {
                            cgen.raw(format!("#ifdef {}", g.name));
                        }
                        cgen.case(&root.root_label);
                        on_case(cgen, root.target)?;
                        cgen.stmt("break");
                        cgen.end_case();
                        if guard.is_some() {
                            cgen.raw("#endif");
                        }
                    }
                    cgen.default_case();
                    on_case(cgen, default)?;
                    cgen.stmt("break");
                    cgen.end_case();
                    cgen.end_switch();
                }
            }
            cgen.stmt("break");
            cgen.end_case();
        }
        if feature.is_some() {
            cgen.raw("#endif");
        }
    }
    cgen.default_case();
    default_emit(cgen)?;
    cgen.end_case();
    cgen.end_switch();
    Ok(())
}

// ── Struct type and size helpers ────────────────────────────────────────

pub struct ExtensionStructsGenerator<'r> {
    registry: &'r TypeRegistry,
    dispatch: ExtensionDispatch<'r>,
    sink: OutputSink,
}

impl<'r> ExtensionStructsGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self {
            registry,
            dispatch: ExtensionDispatch::build(registry, &config.root_type_mappings),
            sink: OutputSink::new(config.output.extension_structs.clone()),
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        self.sink.into_files()
    }
}

impl Wrapper for ExtensionStructsGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include_system("stddef.h");
        self.sink.header.blank();
        self.sink.imp.raw("#include <string.h>");
        self.sink.imp.blank();
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        let header = &mut self.sink.header;
        header.stmt("VkStructureType goldfish_vk_struct_type(const void* structExtension)");
        header.blank();
        header.stmt(
            "size_t goldfish_vk_extension_struct_size(VkStructureType rootType, const void* structExtension)",
        );

        let cgen = &mut self.sink.imp;
        cgen.begin_function("VkStructureType goldfish_vk_struct_type(const void* structExtension)");
        cgen.stmt("const uint32_t asStructType = *(reinterpret_cast<const uint32_t*>(structExtension))");
        cgen.stmt("return (VkStructureType)asStructType");
        cgen.end_function();

        cgen.begin_function(
            "size_t goldfish_vk_extension_struct_size(VkStructureType rootType, const void* structExtension)",
        );
        cgen.begin_if("!structExtension");
        cgen.stmt("return (size_t)0");
        cgen.end_if();
        cgen.stmt("uint32_t structType = (uint32_t)goldfish_vk_struct_type(structExtension)");
        emit_extension_switch(
            cgen,
            &self.dispatch,
            "structType",
            "rootType",
            "goldfish_vk_extension_struct_size",
            &mut |cgen, target| {
                cgen.stmt(format!("return sizeof({})", target.name));
                Ok(())
            },
            Some(&mut |cgen| {
                cgen.stmt("return (size_t)0");
                Ok(())
            }),
        )?;
        cgen.end_function();
        tracing::debug!(
            cases = self.dispatch.cases.len(),
            extendable = self.registry.extension_structs().len(),
            "extension struct helpers"
        );
        Ok(())
    }
}
