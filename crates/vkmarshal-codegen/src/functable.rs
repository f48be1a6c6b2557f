//! Loader-facing entry points and the global, instance and device
//! `vkGet*ProcAddr` resolvers.

use itertools::Itertools;
use tracing::{debug, info};
use vkmarshal_types::{Feature, FeatureKind, TypeRegistry, VulkanApi};

use crate::config::GenConfig;
use crate::dispatch::Wrapper;
use crate::error::GenError;
use crate::sink::{GeneratedFile, OutputSink};

const DEVICE_LEVEL_DISPATCH: &[&str] = &["VkDevice", "VkQueue", "VkCommandBuffer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolver {
    Global,
    Instance,
    Device,
}

impl Resolver {
    fn proto(self) -> &'static str {
        match self {
            Resolver::Global => "void* goldfish_vulkan_get_proc_address(const char* name)",
            Resolver::Instance => {
                "void* goldfish_vulkan_get_instance_proc_address(ResourceTracker* resources, VkInstance instance, const char* name)"
            }
            Resolver::Device => {
                "void* goldfish_vulkan_get_device_proc_address(ResourceTracker* resources, VkDevice device, const char* name)"
            }
        }
    }
}

pub fn entry_fn(api: &str) -> String {
    format!("entry_{api}")
}

pub fn dyn_check_fn(api: &str) -> String {
    format!("dynCheck_entry_{api}")
}

fn is_device_level(api: &VulkanApi) -> bool {
    api.parameters
        .first()
        .is_some_and(|p| p.pointer_indirection_levels == 0 && DEVICE_LEVEL_DISPATCH.contains(&p.type_name.as_str()))
}

fn takes_device(api: &VulkanApi) -> bool {
    api.parameters
        .first()
        .is_some_and(|p| p.pointer_indirection_levels == 0 && p.type_name == "VkDevice")
}

fn version_macro(major: u32, minor: u32) -> String {
    format!("VK_MAKE_VERSION({major}, {minor}, 0)")
}

pub struct FuncTableGenerator<'r> {
    registry: &'r TypeRegistry,
    config: GenConfig,
    sink: OutputSink,
    entries: usize,
}

impl<'r> FuncTableGenerator<'r> {
    pub fn new(registry: &'r TypeRegistry, config: &GenConfig) -> Self {
        Self {
            registry,
            config: config.clone(),
            sink: OutputSink::new(config.output.func_table.clone()),
            entries: 0,
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        info!(entries = self.entries, stem = self.sink.stem(), "function table");
        self.sink.into_files()
    }

    fn forward(&mut self, api: &VulkanApi) {
        let cgen = &mut self.sink.imp;
        let args = api.parameters.iter().map(|p| p.param_name.as_str()).join(", ");
        let call = format!("vkEnc->{}({args})", api.name);
        if api.has_return() {
            let ret = api.return_value();
            cgen.stmt(format!("{t} {} = ({t})0", ret.param_name, t = ret.type_name));
            cgen.stmt(format!("{} = {call}", ret.param_name));
            cgen.stmt(format!("return {}", ret.param_name));
        } else {
            cgen.stmt(call);
        }
    }

    fn emit_entry(&mut self, api: &VulkanApi) {
        let proto = self.sink.imp.func_proto_named(api, &entry_fn(&api.name), true);
        self.sink.imp.begin_function(format!("static {proto}"));
        self.sink.imp.stmt("auto vkEnc = ResourceTracker::getThreadLocalEncoder()");
        self.forward(api);
        self.sink.imp.end_function();
    }

    /// Device extension entry that reports calls made without the
    /// extension enabled on the device, then forwards.
    fn emit_dyn_check(&mut self, api: &VulkanApi, extension: &str) {
        let proto = self.sink.imp.func_proto_named(api, &dyn_check_fn(&api.name), true);
        let device = api
            .parameters
            .first()
            .map(|p| p.param_name.clone())
            .unwrap_or_default();
        let cgen = &mut self.sink.imp;
        cgen.begin_function(format!("static {proto}"));
        cgen.stmt("auto vkEnc = ResourceTracker::getThreadLocalEncoder()");
        cgen.stmt("auto resources = vkEnc->resources()");
        cgen.begin_if(format!("!resources->hasDeviceExtension({device}, \"{extension}\")"));
        cgen.stmt(format!(
            "sOnInvalidDynamicallyCheckedCall(\"{}\", \"{extension}\")",
            api.name
        ));
        cgen.end_if();
        self.forward(api);
        self.sink.imp.end_function();
    }

    fn has_dyn_check(&self, api: &VulkanApi) -> bool {
        takes_device(api)
            && self
                .registry
                .feature_of_command(&api.name)
                .is_some_and(|f| f.kind == FeatureKind::DeviceExtension)
    }

    /// Returned expression for one name in one resolver, or `None` when the
    /// resolver does not list it.
    fn resolved(&self, resolver: Resolver, api: &VulkanApi, feature: Option<&Feature>) -> Option<String> {
        let entry = format!("(void*){}", entry_fn(&api.name));
        let kind = match feature {
            None => return Some(entry),
            Some(f) if f.is_core_1_0() => {
                return match resolver {
                    Resolver::Device if !is_device_level(api) => None,
                    _ => Some(entry),
                }
            }
            Some(f) => &f.kind,
        };
        let ext = feature.map(|f| f.name.as_str()).unwrap_or_default();
        match (resolver, kind) {
            (Resolver::Global, _) => Some(entry),
            (Resolver::Instance, FeatureKind::Version { major, minor }) => Some(format!(
                "resources->getApiVersionFromInstance(instance) >= {} ? {entry} : nullptr",
                version_macro(*major, *minor)
            )),
            (Resolver::Instance, FeatureKind::InstanceExtension) => Some(format!(
                "resources->hasInstanceExtension(instance, \"{ext}\") ? {entry} : nullptr"
            )),
            (Resolver::Instance, FeatureKind::DeviceExtension) if self.has_dyn_check(api) => {
                Some(format!("(void*){}", dyn_check_fn(&api.name)))
            }
            (Resolver::Instance, FeatureKind::DeviceExtension) => Some(entry),
            (Resolver::Device, _) if !is_device_level(api) => None,
            (Resolver::Device, FeatureKind::Version { major, minor }) => Some(format!(
                "resources->getApiVersionFromDevice(device) >= {} ? {entry} : nullptr",
                version_macro(*major, *minor)
            )),
            (Resolver::Device, _) => Some(format!(
                "resources->hasDeviceExtension(device, \"{ext}\") ? {entry} : nullptr"
            )),
        }
    }

    fn emit_name(&mut self, resolver: Resolver, name: &str, api: &VulkanApi, feature: Option<&Feature>) {
        let value = if self.config.is_excluded(&api.name) || self.config.is_excluded(name) {
            Some("nullptr".to_string())
        } else {
            self.resolved(resolver, api, feature)
        };
        if let Some(value) = value {
            let cgen = &mut self.sink.imp;
            cgen.begin_if(format!("!strcmp(name, \"{name}\")"));
            cgen.stmt(format!("return {value}"));
            cgen.end_if();
        }
    }

    fn emit_resolver(&mut self, resolver: Resolver) {
        let registry = self.registry;
        self.sink.header.stmt(resolver.proto());
        self.sink.imp.begin_function(resolver.proto());
        match resolver {
            Resolver::Global => {}
            Resolver::Instance => {
                self.sink.imp.stmt("(void)resources");
                self.sink.imp.stmt("(void)instance");
            }
            Resolver::Device => {
                self.sink.imp.stmt("(void)resources");
                self.sink.imp.stmt("(void)device");
            }
        }

        let mut listed = std::collections::HashSet::new();
        for feature in &registry.features {
            let names: Vec<(&str, &VulkanApi)> = feature
                .commands
                .iter()
                .filter_map(|name| {
                    let target = registry.resolve_alias(name);
                    registry.command(target).map(|api| (name.as_str(), api))
                })
                .filter(|(name, _)| listed.insert(name.to_string()))
                .collect();
            if names.is_empty() {
                continue;
            }
            self.sink.imp.raw(format!("#ifdef {}", feature.name));
            for (name, api) in names {
                self.emit_name(resolver, name, api, Some(feature));
            }
            self.sink.imp.raw("#endif");
        }
        for (api, feature) in registry.ordered_commands() {
            if feature.is_none() && listed.insert(api.name.clone()) {
                self.emit_name(resolver, &api.name, api, None);
            }
        }
        self.sink.imp.stmt("return nullptr");
        self.sink.imp.end_function();
    }
}

impl Wrapper for FuncTableGenerator<'_> {
    fn on_begin(&mut self) -> Result<(), GenError> {
        self.sink.include_system("vulkan/vulkan.h");
        self.sink.include("ResourceTracker.h");
        self.sink.header.blank();

        let encoder = format!("{}.h", self.config.output.encoder);
        let imp = &mut self.sink.imp;
        imp.raw(format!("#include \"{encoder}\""));
        imp.raw("#include <log/log.h>");
        imp.raw("#include <string.h>");
        imp.blank();
        imp.begin_function("[[noreturn]] static void sOnInvalidDynamicallyCheckedCall(const char* apiname, const char* neededFeature)");
        imp.stmt("ALOGE(\"invalid call to %s: %s not supported\", apiname, neededFeature)");
        imp.stmt("abort()");
        imp.end_function();
        Ok(())
    }

    fn on_begin_feature(&mut self, feature: &Feature) -> Result<(), GenError> {
        self.sink.imp.raw(format!("#ifdef {}", feature.name));
        Ok(())
    }

    fn on_gen_cmd(&mut self, api: &VulkanApi, _opcode: u32) -> Result<(), GenError> {
        debug!(name = %api.name, "function table entry");
        self.emit_entry(api);
        self.entries += 1;
        if self.has_dyn_check(api) {
            let extension = self
                .registry
                .feature_of_command(&api.name)
                .map(|f| f.name.clone())
                .unwrap_or_default();
            self.emit_dyn_check(api, &extension);
        }
        Ok(())
    }

    fn on_end_feature(&mut self, _feature: &Feature) -> Result<(), GenError> {
        self.sink.imp.raw("#endif");
        Ok(())
    }

    fn on_end(&mut self) -> Result<(), GenError> {
        for resolver in [Resolver::Global, Resolver::Instance, Resolver::Device] {
            self.emit_resolver(resolver);
        }
        Ok(())
    }
}
