//! Element-count resolution for pointer members and parameters.
//!
//! The generator renders a [`LengthExpr`] into C and the wire runtime
//! evaluates the same expression against live values, so both sides agree
//! on how many elements follow on the wire.

use tracing::warn;

use crate::registry::TypeRegistry;
use crate::types::{VulkanApi, VulkanCompoundType, VulkanType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthExpr {
    /// No length information: a single pointee.
    One,
    Literal(u64),
    /// A sibling member or parameter.
    Field(String),
    /// `owner->field` or `owner::field`.
    CrossRef { owner: String, field: String },
    /// `VkShaderModuleCreateInfo::pCode`: `codeSize / 4`.
    CodeWords { code_size: String },
    /// `VkPipelineMultisampleStateCreateInfo::pSampleMask`.
    SampleMaskWords { samples: String },
    /// `factor * CONSTANT`.
    Scaled { factor: u64, constant: String },
    /// Names nothing known in scope; passed through verbatim.
    Unresolved(String),
}

/// Where sibling names in a length expression are looked up.
#[derive(Debug, Clone, Copy)]
pub enum LengthScope<'a> {
    Struct(&'a VulkanCompoundType),
    Api(&'a VulkanApi),
}

impl<'a> LengthScope<'a> {
    fn name(&self) -> &'a str {
        match *self {
            LengthScope::Struct(c) => &c.name,
            LengthScope::Api(a) => &a.name,
        }
    }

    fn has_field(&self, name: &str) -> bool {
        match self {
            LengthScope::Struct(c) => c.member(name).is_some(),
            LengthScope::Api(a) => a.parameter(name).is_some(),
        }
    }

    fn binding(&self, ty: &VulkanType, name: &str) -> Option<String> {
        if let Some(b) = ty.annotations.bindings.get(name) {
            return Some(b.clone());
        }
        match *self {
            LengthScope::Struct(c) => c.environment.get(name).cloned(),
            LengthScope::Api(_) => None,
        }
    }
}

fn special_case(scope: &str, member: &str) -> Option<LengthExpr> {
    match (scope, member) {
        ("VkShaderModuleCreateInfo", "pCode") => Some(LengthExpr::CodeWords {
            code_size: "codeSize".into(),
        }),
        ("VkPipelineMultisampleStateCreateInfo", "pSampleMask") => {
            Some(LengthExpr::SampleMaskWords {
                samples: "rasterizationSamples".into(),
            })
        }
        ("VkAccelerationStructureVersionInfoKHR", "pVersionData") => Some(LengthExpr::Scaled {
            factor: 2,
            constant: "VK_UUID_SIZE".into(),
        }),
        _ => None,
    }
}

impl LengthExpr {
    pub fn resolve(ty: &VulkanType, scope: LengthScope<'_>) -> LengthExpr {
        if let Some(special) = special_case(scope.name(), &ty.param_name) {
            return special;
        }
        match ty.count_expr() {
            None => LengthExpr::One,
            Some(expr) => Self::resolve_name(ty, expr, scope, 0),
        }
    }

    fn resolve_name(ty: &VulkanType, expr: &str, scope: LengthScope<'_>, depth: u8) -> LengthExpr {
        if let Ok(n) = expr.parse::<u64>() {
            return LengthExpr::Literal(n);
        }
        if let Some((owner, field)) = expr.split_once("->").or_else(|| expr.split_once("::")) {
            let (owner, field) = (owner.trim(), field.trim());
            if scope.has_field(owner) {
                return LengthExpr::CrossRef {
                    owner: owner.to_string(),
                    field: field.to_string(),
                };
            }
        }
        if scope.has_field(expr) {
            return LengthExpr::Field(expr.to_string());
        }
        if depth == 0 {
            if let Some(bound) = scope.binding(ty, expr) {
                return Self::resolve_name(ty, &bound, scope, depth + 1);
            }
        }
        warn!(
            scope = scope.name(),
            member = %ty.param_name,
            expr,
            "length expression names no known field"
        );
        LengthExpr::Unresolved(expr.to_string())
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, LengthExpr::Unresolved(_))
    }

    /// Render as a C expression; `access` maps a sibling name to the
    /// expression that reads its value.
    pub fn render(&self, access: &mut dyn FnMut(&str) -> String) -> String {
        match self {
            LengthExpr::One => "1".to_string(),
            LengthExpr::Literal(n) => n.to_string(),
            LengthExpr::Field(name) => access(name),
            LengthExpr::CrossRef { owner, field } => format!("{}->{}", access(owner), field),
            LengthExpr::CodeWords { code_size } => format!("({} / 4)", access(code_size)),
            LengthExpr::SampleMaskWords { samples } => {
                format!("(({} + 31) / 32)", access(samples))
            }
            LengthExpr::Scaled { factor, constant } => format!("({factor} * {constant})"),
            LengthExpr::Unresolved(raw) => raw.clone(),
        }
    }

    /// Evaluate against live values. `lookup(name, None)` reads a sibling,
    /// `lookup(owner, Some(field))` reads through a cross reference.
    pub fn evaluate(
        &self,
        registry: &TypeRegistry,
        lookup: &mut dyn FnMut(&str, Option<&str>) -> Option<u64>,
    ) -> Option<u64> {
        match self {
            LengthExpr::One => Some(1),
            LengthExpr::Literal(n) => Some(*n),
            LengthExpr::Field(name) => lookup(name, None),
            LengthExpr::CrossRef { owner, field } => lookup(owner, Some(field)),
            LengthExpr::CodeWords { code_size } => lookup(code_size, None).map(|n| n / 4),
            LengthExpr::SampleMaskWords { samples } => {
                lookup(samples, None).map(|n| (n + 31) / 32)
            }
            LengthExpr::Scaled { factor, constant } => {
                registry.eval_constant(constant).map(|c| factor * c)
            }
            LengthExpr::Unresolved(raw) => registry.eval_constant(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shader_module() -> VulkanCompoundType {
        VulkanCompoundType::new(
            "VkShaderModuleCreateInfo",
            vec![
                VulkanType::new("size_t", "codeSize"),
                VulkanType::from_decl("const uint32_t* pCode")
                    .unwrap()
                    .with_len("codeSize / 4"),
            ],
        )
    }

    #[test]
    fn shader_code_words() {
        let c = shader_module();
        let len = LengthExpr::resolve(&c.members[1], LengthScope::Struct(&c));
        assert_eq!(len, LengthExpr::CodeWords { code_size: "codeSize".into() });
        let rendered = len.render(&mut |n| format!("forMarshaling->{n}"));
        assert_eq!(rendered, "(forMarshaling->codeSize / 4)");
        let reg = TypeRegistry::new();
        assert_eq!(len.evaluate(&reg, &mut |_, _| Some(16)), Some(4));
    }

    #[test]
    fn sample_mask_rounds_up() {
        let len = LengthExpr::SampleMaskWords { samples: "rasterizationSamples".into() };
        let reg = TypeRegistry::new();
        assert_eq!(len.evaluate(&reg, &mut |_, _| Some(1)), Some(1));
        assert_eq!(len.evaluate(&reg, &mut |_, _| Some(64)), Some(2));
    }

    #[test]
    fn cross_reference_in_api_scope() {
        let api = VulkanApi::new(
            "vkAllocateDescriptorSets",
            "VkResult",
            vec![
                VulkanType::new("VkDevice", "device"),
                VulkanType::from_decl("const VkDescriptorSetAllocateInfo* pAllocateInfo").unwrap(),
                VulkanType::from_decl("VkDescriptorSet* pDescriptorSets")
                    .unwrap()
                    .with_len("pAllocateInfo->descriptorSetCount"),
            ],
        );
        let len = LengthExpr::resolve(&api.parameters[2], LengthScope::Api(&api));
        assert_eq!(
            len,
            LengthExpr::CrossRef {
                owner: "pAllocateInfo".into(),
                field: "descriptorSetCount".into()
            }
        );
        assert_eq!(len.render(&mut |n| n.to_string()), "pAllocateInfo->descriptorSetCount");
    }

    #[test]
    fn missing_field_is_unresolved() {
        let c = VulkanCompoundType::new(
            "VkBroken",
            vec![VulkanType::from_decl("const uint32_t* pData")
                .unwrap()
                .with_len("dataWords")],
        );
        let len = LengthExpr::resolve(&c.members[0], LengthScope::Struct(&c));
        assert_eq!(len, LengthExpr::Unresolved("dataWords".into()));
        assert!(!len.is_resolved());
    }

    #[test]
    fn environment_binding_redirects() {
        let mut c = VulkanCompoundType::new(
            "VkBound",
            vec![
                VulkanType::new("uint32_t", "count"),
                VulkanType::from_decl("const uint32_t* pData")
                    .unwrap()
                    .with_len("elements"),
            ],
        );
        c.environment.insert("elements".into(), "count".into());
        let len = LengthExpr::resolve(&c.members[1], LengthScope::Struct(&c));
        assert_eq!(len, LengthExpr::Field("count".into()));
    }
}
