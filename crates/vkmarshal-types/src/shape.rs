use crate::registry::TypeRegistry;
use crate::types::VulkanType;

/// How one type occurrence is walked. Exactly one shape applies per visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// The `pNext` chain pointer.
    StructExtension,
    Compound,
    String,
    StringArray,
    StaticArray,
    Pointer,
    Value,
    /// Pointer-to-const-pointer of anything but `char`.
    Unsupported,
}

/// Select the shape in priority order: extension pointer, compound, string,
/// string array, static array, pointer, value.
pub fn classify(ty: &VulkanType, registry: &TypeRegistry) -> Shape {
    if ty.is_next_pointer() {
        return Shape::StructExtension;
    }
    if ty.is_pointer_to_const_pointer && !ty.is_string_array() {
        return Shape::Unsupported;
    }
    if registry.is_compound(&ty.type_name) {
        Shape::Compound
    } else if ty.is_string() {
        Shape::String
    } else if ty.is_string_array() {
        Shape::StringArray
    } else if ty.is_static_array() {
        Shape::StaticArray
    } else if ty.is_pointer() {
        Shape::Pointer
    } else {
        Shape::Value
    }
}

/// Whether a one-byte presence flag brackets the occurrence.
pub fn needs_presence_check(ty: &VulkanType, shape: Shape) -> bool {
    ty.is_optional
        && ty.is_pointer()
        && !ty.is_next_pointer()
        && shape != Shape::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeDef;
    use crate::types::VulkanCompoundType;

    fn reg() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.add_type("VkBuffer", TypeDef::Handle);
        reg.add_compound(VulkanCompoundType::new(
            "VkExtent2D",
            vec![
                VulkanType::new("uint32_t", "width"),
                VulkanType::new("uint32_t", "height"),
            ],
        ));
        reg
    }

    fn decl(text: &str) -> VulkanType {
        VulkanType::from_decl(text).unwrap()
    }

    #[test]
    fn priority_order() {
        let reg = reg();
        assert_eq!(classify(&decl("const void* pNext"), &reg), Shape::StructExtension);
        assert_eq!(classify(&decl("const VkExtent2D* pExtent"), &reg), Shape::Compound);
        assert_eq!(classify(&decl("VkExtent2D extents[4]"), &reg), Shape::Compound);
        assert_eq!(
            classify(&decl("const char* pName").with_len("null-terminated"), &reg),
            Shape::String
        );
        assert_eq!(classify(&decl("const char* const* ppNames"), &reg), Shape::StringArray);
        assert_eq!(classify(&decl("char name[256]"), &reg), Shape::StaticArray);
        assert_eq!(classify(&decl("const VkBuffer* pBuffers"), &reg), Shape::Pointer);
        assert_eq!(classify(&decl("VkBuffer buffer"), &reg), Shape::Value);
    }

    #[test]
    fn const_pointer_pointer_is_unsupported() {
        let reg = reg();
        let ty = decl("const VkExtent2D* const* ppExtents");
        assert_eq!(classify(&ty, &reg), Shape::Unsupported);
        assert!(!needs_presence_check(&ty.clone().optional(), Shape::Unsupported));
    }

    #[test]
    fn presence_check_rules() {
        let reg = reg();
        let opt = decl("const VkExtent2D* pExtent").optional();
        assert!(needs_presence_check(&opt, classify(&opt, &reg)));
        let value = decl("uint32_t count").optional();
        assert!(!needs_presence_check(&value, classify(&value, &reg)));
        let next = decl("const void* pNext");
        assert!(!needs_presence_check(&next, classify(&next, &reg)));
    }
}
