//! Shape-directed walk over one type occurrence.

use tracing::warn;
use vkmarshal_types::{classify, needs_presence_check, Shape, TypeRegistry, VulkanType};

use crate::emitter::CodeEmitter;
use crate::error::GenError;

/// Capabilities a generator provides per shape. Exactly one terminal fires
/// per visit; `on_check`/`end_check` bracket it for optional pointers.
pub trait TypeVisitor {
    fn on_check(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn end_check(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }

    fn on_value(&mut self, ty: &VulkanType) -> Result<(), GenError>;
    fn on_pointer(&mut self, ty: &VulkanType) -> Result<(), GenError>;
    fn on_string(&mut self, ty: &VulkanType) -> Result<(), GenError>;
    fn on_string_array(&mut self, ty: &VulkanType) -> Result<(), GenError>;
    fn on_static_arr(&mut self, ty: &VulkanType) -> Result<(), GenError>;
    fn on_compound_type(&mut self, ty: &VulkanType) -> Result<(), GenError>;
    fn on_struct_extension(&mut self, ty: &VulkanType) -> Result<(), GenError>;

    fn on_unsupported(&mut self, _ty: &VulkanType) -> Result<(), GenError> {
        Ok(())
    }
}

pub fn iterate_type(
    visitor: &mut dyn TypeVisitor,
    registry: &TypeRegistry,
    ty: &VulkanType,
) -> Result<(), GenError> {
    let shape = classify(ty, registry);
    if shape == Shape::Unsupported {
        warn!(name = %ty.param_name, ty = %ty.type_name, "unsupported pointer shape skipped");
        return visitor.on_unsupported(ty);
    }
    let check = needs_presence_check(ty, shape);
    if check {
        visitor.on_check(ty)?;
    }
    match shape {
        Shape::StructExtension => visitor.on_struct_extension(ty)?,
        Shape::Compound => visitor.on_compound_type(ty)?,
        Shape::String => visitor.on_string(ty)?,
        Shape::StringArray => visitor.on_string_array(ty)?,
        Shape::StaticArray => visitor.on_static_arr(ty)?,
        Shape::Pointer => visitor.on_pointer(ty)?,
        Shape::Value => visitor.on_value(ty)?,
        Shape::Unsupported => {}
    }
    if check {
        visitor.end_check(ty)?;
    }
    Ok(())
}

pub fn unsupported_comment(cgen: &mut CodeEmitter, ty: &VulkanType) {
    cgen.line(format!(
        "// unsupported pointer-to-const-pointer {} {} skipped",
        cgen.type_decl(ty, false),
        ty.param_name
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkmarshal_types::{TypeDef, VulkanCompoundType};

    #[derive(Default)]
    struct Trace(Vec<String>);

    impl TypeVisitor for Trace {
        fn on_check(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("check {}", ty.param_name));
            Ok(())
        }
        fn end_check(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("end {}", ty.param_name));
            Ok(())
        }
        fn on_value(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("value {}", ty.param_name));
            Ok(())
        }
        fn on_pointer(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("pointer {}", ty.param_name));
            Ok(())
        }
        fn on_string(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("string {}", ty.param_name));
            Ok(())
        }
        fn on_string_array(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("strings {}", ty.param_name));
            Ok(())
        }
        fn on_static_arr(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("array {}", ty.param_name));
            Ok(())
        }
        fn on_compound_type(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("compound {}", ty.param_name));
            Ok(())
        }
        fn on_struct_extension(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("ext {}", ty.param_name));
            Ok(())
        }
        fn on_unsupported(&mut self, ty: &VulkanType) -> Result<(), GenError> {
            self.0.push(format!("unsupported {}", ty.param_name));
            Ok(())
        }
    }

    #[test]
    fn presence_bracket_and_priority() {
        let mut reg = TypeRegistry::new();
        reg.add_type("VkFlags", TypeDef::Basetype { underlying: "uint32_t".into() });
        reg.add_compound(VulkanCompoundType::new("VkApplicationInfo", vec![]));

        let members = [
            VulkanType::from_decl("const void* pNext").unwrap(),
            VulkanType::from_decl("const VkApplicationInfo* pApplicationInfo")
                .unwrap()
                .optional(),
            VulkanType::from_decl("const char* pName").unwrap().with_len("null-terminated"),
            VulkanType::from_decl("const char* const* ppNames").unwrap(),
            VulkanType::from_decl("float c[4]").unwrap(),
            VulkanType::from_decl("const uint32_t* pCode").unwrap(),
            VulkanType::new("VkFlags", "flags"),
            VulkanType::from_decl("const float* const* pp").unwrap(),
        ];
        let mut trace = Trace::default();
        for m in &members {
            iterate_type(&mut trace, &reg, m).unwrap();
        }
        assert_eq!(
            trace.0,
            vec![
                "ext pNext",
                "check pApplicationInfo",
                "compound pApplicationInfo",
                "end pApplicationInfo",
                "string pName",
                "strings ppNames",
                "array c",
                "pointer pCode",
                "value flags",
                "unsupported pp",
            ]
        );
    }
}
