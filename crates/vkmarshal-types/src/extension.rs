//! `sType` dispatch over every extendable struct.
//!
//! A handful of `sType` values are shared between structs that never meet in
//! the same chain. For those, a [`RootTypeMapping`] picks the concrete struct
//! from the `sType` of the chain's root struct.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::registry::{Feature, TypeRegistry};
use crate::types::VulkanCompoundType;

/// Disambiguation entry for one reused `sType` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootTypeMapping {
    /// The `sType` literal used as the outer case label.
    pub structure_type: String,
    /// Root `sType` literal to concrete struct name.
    #[serde(default)]
    pub by_root: BTreeMap<String, String>,
    /// Struct used when the root matches no entry.
    pub default: String,
}

/// The fragment-density-map `sType` values are reused by the gfxstream
/// import structs on `VkMemoryAllocateInfo` chains.
pub fn default_root_type_mappings() -> Vec<RootTypeMapping> {
    vec![RootTypeMapping {
        structure_type: "VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FRAGMENT_DENSITY_MAP_FEATURES_EXT".into(),
        by_root: BTreeMap::from([
            (
                "VK_STRUCTURE_TYPE_MEMORY_ALLOCATE_INFO".to_string(),
                "VkImportColorBufferGOOGLE".to_string(),
            ),
            (
                "VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FEATURES_2".to_string(),
                "VkPhysicalDeviceFragmentDensityMapFeaturesEXT".to_string(),
            ),
            (
                "VK_STRUCTURE_TYPE_DEVICE_CREATE_INFO".to_string(),
                "VkPhysicalDeviceFragmentDensityMapFeaturesEXT".to_string(),
            ),
        ]),
        default: "VkPhysicalDeviceFragmentDensityMapFeaturesEXT".into(),
    }]
}

#[derive(Debug, Clone)]
pub struct RootCase<'r> {
    pub root_label: String,
    pub root_value: Option<i64>,
    pub target: &'r VulkanCompoundType,
    pub feature: Option<&'r Feature>,
}

#[derive(Debug, Clone)]
pub enum CaseTarget<'r> {
    Single(&'r VulkanCompoundType),
    ByRoot {
        roots: Vec<RootCase<'r>>,
        default: &'r VulkanCompoundType,
    },
}

#[derive(Debug, Clone)]
pub struct ExtensionCase<'r> {
    /// `sType` literal of the case label.
    pub label: String,
    pub value: i64,
    pub feature: Option<&'r Feature>,
    pub target: CaseTarget<'r>,
}

impl<'r> ExtensionCase<'r> {
    /// Every struct this case can produce.
    pub fn targets(&self) -> Vec<&'r VulkanCompoundType> {
        match &self.target {
            CaseTarget::Single(c) => vec![*c],
            CaseTarget::ByRoot { roots, default } => {
                let mut out: Vec<&VulkanCompoundType> = Vec::new();
                for c in roots.iter().map(|r| r.target).chain(std::iter::once(*default)) {
                    if !out.iter().any(|o| o.name == c.name) {
                        out.push(c);
                    }
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtensionDispatch<'r> {
    pub cases: Vec<ExtensionCase<'r>>,
}

impl<'r> ExtensionDispatch<'r> {
    pub fn build(registry: &'r TypeRegistry, mappings: &[RootTypeMapping]) -> Self {
        let mut cases: Vec<ExtensionCase<'r>> = Vec::new();
        for (compound, feature) in registry.extension_structs() {
            let Some(value) = registry.structure_type_value(compound) else {
                warn!(name = %compound.name, "extendable struct without a known sType value");
                continue;
            };
            if let Some(existing) = cases.iter().find(|c| c.value == value) {
                if matches!(existing.target, CaseTarget::Single(_)) {
                    warn!(
                        name = %compound.name,
                        label = %existing.label,
                        "sType value reused without a root mapping; first struct wins"
                    );
                }
                continue;
            }
            let mapping = mappings
                .iter()
                .find(|m| registry.enum_value(&m.structure_type) == Some(value));
            let case = match mapping {
                Some(m) => ExtensionCase {
                    label: m.structure_type.clone(),
                    value,
                    feature,
                    target: Self::by_root(registry, m, compound),
                },
                None => ExtensionCase {
                    label: compound.structure_type.clone().unwrap_or_default(),
                    value,
                    feature,
                    target: CaseTarget::Single(compound),
                },
            };
            cases.push(case);
        }
        Self { cases }
    }

    fn by_root(
        registry: &'r TypeRegistry,
        mapping: &RootTypeMapping,
        fallback: &'r VulkanCompoundType,
    ) -> CaseTarget<'r> {
        let roots = mapping
            .by_root
            .iter()
            .filter_map(|(root, name)| {
                let target = registry.compound(name);
                if target.is_none() {
                    warn!(root = %root, name = %name, "root type mapping names an unknown struct");
                }
                target.map(|target| RootCase {
                    root_label: root.clone(),
                    root_value: registry.enum_value(root),
                    target,
                    feature: registry.feature_of_type(&target.name),
                })
            })
            .collect();
        let default = registry.compound(&mapping.default).unwrap_or(fallback);
        CaseTarget::ByRoot { roots, default }
    }

    pub fn case(&self, value: i64) -> Option<&ExtensionCase<'r>> {
        self.cases.iter().find(|c| c.value == value)
    }

    /// Concrete struct for an `sType` value inside a chain rooted at `root`.
    pub fn lookup(&self, value: i64, root: i64) -> Option<&'r VulkanCompoundType> {
        match &self.case(value)?.target {
            CaseTarget::Single(c) => Some(*c),
            CaseTarget::ByRoot { roots, default } => Some(
                roots
                    .iter()
                    .find(|r| r.root_value == Some(root))
                    .map(|r| r.target)
                    .unwrap_or(*default),
            ),
        }
    }

    /// Consecutive runs of cases sharing a feature, in registry order.
    pub fn grouped_by_feature(&self) -> Vec<(Option<&'r Feature>, Vec<&ExtensionCase<'r>>)> {
        let mut groups: Vec<(Option<&'r Feature>, Vec<&ExtensionCase<'r>>)> = Vec::new();
        for case in &self.cases {
            let same = groups.last().is_some_and(|(f, _)| {
                f.map(|f| f.name.as_str()) == case.feature.map(|f| f.name.as_str())
            });
            if same {
                if let Some((_, cases)) = groups.last_mut() {
                    cases.push(case);
                }
            } else {
                groups.push((case.feature, vec![case]));
            }
        }
        groups
    }
}
