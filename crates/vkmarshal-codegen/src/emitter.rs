//! Indented C++ text buffer with block-scoped unique names.

use std::collections::BTreeMap;

use itertools::Itertools;
use vkmarshal_types::{LengthExpr, LengthScope, TypeRegistry, VulkanApi, VulkanCompoundType, VulkanType};

use crate::error::GenError;

const INDENT: &str = "    ";

/// Which way bytes flow through a generated body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

#[derive(Debug, Clone)]
pub struct CodeEmitter {
    buf: String,
    indent: usize,
    /// One gensym counter per open block.
    scopes: Vec<usize>,
}

impl Default for CodeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeEmitter {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            indent: 0,
            scopes: vec![0],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.buf.push_str(INDENT);
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
        self
    }

    /// Append text at column zero (preprocessor lines, banners).
    pub fn raw(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.buf.push_str(text.as_ref());
        if !self.buf.ends_with('\n') {
            self.buf.push('\n');
        }
        self
    }

    pub fn stmt(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.line(format!("{};", text.as_ref()))
    }

    pub fn blank(&mut self) -> &mut Self {
        self.buf.push('\n');
        self
    }

    /// Insert another buffer at the current indentation.
    pub fn splice(&mut self, other: &CodeEmitter) {
        for line in other.buf.lines() {
            if line.starts_with('#') {
                self.raw(line);
            } else {
                self.line(line);
            }
        }
    }

    fn open(&mut self, header: String) {
        self.line(header);
        self.indent += 1;
        self.scopes.push(0);
    }

    fn close(&mut self, trailer: &str) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
        self.indent = self.indent.saturating_sub(1);
        self.line(trailer);
    }

    fn reopen(&mut self, header: String) {
        self.close(&header);
        self.indent += 1;
        self.scopes.push(0);
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    pub fn begin_block(&mut self) {
        self.open("{".to_string());
    }

    pub fn end_block(&mut self) {
        self.close("}");
    }

    pub fn begin_function(&mut self, proto: impl AsRef<str>) {
        self.line(proto);
        self.open("{".to_string());
    }

    pub fn end_function(&mut self) {
        self.close("}");
        self.blank();
    }

    pub fn begin_if(&mut self, cond: impl AsRef<str>) {
        self.open(format!("if ({})", cond.as_ref()) + " {");
    }

    pub fn begin_else_if(&mut self, cond: impl AsRef<str>) {
        self.reopen(format!("}} else if ({}) {{", cond.as_ref()));
    }

    pub fn begin_else(&mut self) {
        self.reopen("} else {".to_string());
    }

    pub fn end_if(&mut self) {
        self.close("}");
    }

    pub fn begin_for(&mut self, init: impl AsRef<str>, cond: impl AsRef<str>, step: impl AsRef<str>) {
        self.open(format!(
            "for ({}; {}; {}) {{",
            init.as_ref(),
            cond.as_ref(),
            step.as_ref()
        ));
    }

    pub fn end_for(&mut self) {
        self.close("}");
    }

    pub fn begin_while(&mut self, cond: impl AsRef<str>) {
        self.open(format!("while ({}) {{", cond.as_ref()));
    }

    pub fn end_while(&mut self) {
        self.close("}");
    }

    pub fn begin_switch(&mut self, expr: impl AsRef<str>) {
        self.open(format!("switch ({}) {{", expr.as_ref()));
    }

    pub fn case(&mut self, label: impl AsRef<str>) {
        self.open(format!("case {}: {{", label.as_ref()));
    }

    pub fn default_case(&mut self) {
        self.open("default: {".to_string());
    }

    pub fn end_case(&mut self) {
        self.close("}");
    }

    pub fn end_switch(&mut self) {
        self.close("}");
    }

    /// `for (uint32_t i = 0; i < (uint32_t)count; ++i) {`, returning `i`.
    pub fn begin_index_loop(&mut self, count: &str) -> String {
        let i = self.var("i");
        self.begin_for(
            format!("uint32_t {i} = 0"),
            format!("{i} < (uint32_t){count}"),
            format!("++{i}"),
        );
        i
    }

    /// A name unique within the current block and every block nested in it.
    pub fn var(&mut self, prefix: &str) -> String {
        let depth = self.depth();
        let counter = self.scopes.last_mut();
        let n = match counter {
            Some(c) => {
                let n = *c;
                *c += 1;
                n
            }
            None => 0,
        };
        format!("{prefix}_{depth}_{n}")
    }

    // ── Declarations ────────────────────────────────────────────────────

    pub fn type_decl(&self, ty: &VulkanType, with_name: bool) -> String {
        let mut out = String::new();
        if ty.is_const {
            out.push_str("const ");
        }
        out.push_str(&ty.type_name);
        match ty.pointer_indirection_levels {
            0 => {}
            1 => out.push('*'),
            _ if ty.is_pointer_to_const_pointer => out.push_str("* const*"),
            _ => out.push_str("**"),
        }
        if with_name {
            out.push(' ');
            out.push_str(&ty.param_name);
            if let Some(n) = &ty.static_arr_expr {
                out.push_str(&format!("[{n}]"));
            }
        }
        out
    }

    /// Mutable pointer to the element type, for casts on the read side.
    pub fn mut_pointer_decl(&self, ty: &VulkanType) -> String {
        match ty.pointer_indirection_levels {
            2 => format!("{}**", ty.type_name),
            _ => format!("{}*", ty.type_name),
        }
    }

    pub fn func_proto(&self, api: &VulkanApi, with_param_names: bool) -> String {
        self.func_proto_named(api, &api.name, with_param_names)
    }

    pub fn func_proto_named(&self, api: &VulkanApi, name: &str, with_param_names: bool) -> String {
        let params = api
            .parameters
            .iter()
            .map(|p| self.type_decl(p, with_param_names))
            .join(", ");
        format!("{} {}({params})", api.return_type, name)
    }

    /// `sizeof` of one pointee element.
    pub fn sizeof_expr(&self, ty: &VulkanType) -> String {
        let konst = if ty.is_const { "const " } else { "" };
        match ty.pointer_indirection_levels {
            2 => format!("sizeof({konst}{}*)", ty.type_name),
            _ => format!("sizeof({konst}{})", ty.type_name),
        }
    }

    // ── Primitive streaming ─────────────────────────────────────────────

    /// Fixed-width big-endian read or write of one scalar. Pointer values
    /// travel as 8-byte ids.
    pub fn stream_primitive(
        &mut self,
        registry: &TypeRegistry,
        stream: &str,
        access: &str,
        ty: &VulkanType,
        dir: Direction,
    ) -> Result<(), GenError> {
        if ty.is_pointer() {
            match dir {
                Direction::Write => self.stmt(format!("{stream}->putBe64((uint64_t)(uintptr_t){access})")),
                Direction::Read => {
                    let decl = self.type_decl(ty, false);
                    self.stmt(format!("{access} = ({decl})(uintptr_t){stream}->getBe64()"))
                }
            };
            return Ok(());
        }
        let size = registry
            .encoding_size(&ty.type_name)
            .ok_or_else(|| GenError::UnknownType(ty.type_name.clone()))?;
        let bits = size * 8;
        let float = registry.is_float(&ty.type_name);
        match (dir, float) {
            (Direction::Write, true) => {
                self.stmt(format!("{stream}->putBe{bits}(*(const uint{bits}_t*)&{access})"))
            }
            (Direction::Write, false) => {
                self.stmt(format!("{stream}->putBe{bits}((uint{bits}_t){access})"))
            }
            (Direction::Read, true) => {
                self.stmt(format!("*(uint{bits}_t*)&{access} = {stream}->getBe{bits}()"))
            }
            (Direction::Read, false) => self.stmt(format!(
                "{access} = ({}){stream}->getBe{bits}()",
                ty.type_name
            )),
        };
        Ok(())
    }

    /// Same encoding against a raw byte buffer; the swap to or from big
    /// endian happens after the copy.
    pub fn memcpy_primitive(
        &mut self,
        registry: &TypeRegistry,
        buffer: &str,
        offset: &str,
        access: &str,
        ty: &VulkanType,
        dir: Direction,
    ) -> Result<(), GenError> {
        let size = if ty.is_pointer() {
            8
        } else {
            registry
                .encoding_size(&ty.type_name)
                .ok_or_else(|| GenError::UnknownType(ty.type_name.clone()))?
        };
        let bits = size * 8;
        match dir {
            Direction::Write => {
                self.stmt(format!("memcpy({buffer} + {offset}, &{access}, {size})"));
                if size > 1 {
                    self.stmt(format!("vkmarshal_swap_be{bits}((uint8_t*)({buffer} + {offset}))"));
                }
            }
            Direction::Read => {
                self.stmt(format!("memcpy((uint8_t*)&{access}, {buffer} + {offset}, {size})"));
                if size > 1 {
                    self.stmt(format!("vkmarshal_swap_be{bits}((uint8_t*)&{access})"));
                }
            }
        }
        Ok(())
    }

    /// Render the element count of `ty`, noting unresolved expressions.
    pub fn length_expr(&mut self, scope: &Scope<'_>, ty: &VulkanType) -> String {
        let access = length_access(scope, ty);
        if let Some(raw) = &access.unresolved {
            self.line(format!(
                "// length `{raw}` of {} names no known field; emitted verbatim",
                ty.param_name
            ));
        }
        access.expr
    }
}

/// Names that a generated body reads members or parameters through.
#[derive(Debug, Clone)]
pub enum Scope<'a> {
    Struct {
        compound: &'a VulkanCompoundType,
        var: String,
    },
    Api {
        api: &'a VulkanApi,
        renames: BTreeMap<String, String>,
    },
}

impl<'a> Scope<'a> {
    pub fn of_struct(compound: &'a VulkanCompoundType, var: impl Into<String>) -> Self {
        Scope::Struct {
            compound,
            var: var.into(),
        }
    }

    pub fn of_api(api: &'a VulkanApi) -> Self {
        Scope::Api {
            api,
            renames: BTreeMap::new(),
        }
    }

    /// Api scope where every parameter in `names` reads through `prefix<name>`.
    pub fn of_api_prefixed<'n>(api: &'a VulkanApi, prefix: &str, names: impl IntoIterator<Item = &'n str>) -> Self {
        Scope::Api {
            api,
            renames: names
                .into_iter()
                .map(|n| (n.to_string(), format!("{prefix}{n}")))
                .collect(),
        }
    }

    pub fn access(&self, ty: &VulkanType) -> String {
        self.access_name(&ty.param_name)
    }

    pub fn access_name(&self, name: &str) -> String {
        match self {
            Scope::Struct { var, .. } => format!("{var}->{name}"),
            Scope::Api { renames, .. } => renames
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_string()),
        }
    }

    /// Value of a sibling, dereferencing count pointers in parameter lists.
    pub fn value_of(&self, name: &str) -> String {
        let access = self.access_name(name);
        match self {
            Scope::Api { api, .. } if api.parameter(name).is_some_and(|p| p.is_pointer()) => {
                format!("(*({access}))")
            }
            _ => access,
        }
    }

    pub fn length_scope(&self) -> LengthScope<'a> {
        match self {
            Scope::Struct { compound, .. } => LengthScope::Struct(compound),
            Scope::Api { api, .. } => LengthScope::Api(api),
        }
    }

    pub fn struct_var(&self) -> Option<&str> {
        match self {
            Scope::Struct { var, .. } => Some(var),
            Scope::Api { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthAccess {
    pub expr: String,
    pub unresolved: Option<String>,
}

pub fn length_access(scope: &Scope<'_>, ty: &VulkanType) -> LengthAccess {
    let len = LengthExpr::resolve(ty, scope.length_scope());
    let expr = len.render(&mut |name| scope.value_of(name));
    let unresolved = match len {
        LengthExpr::Unresolved(raw) => Some(raw),
        _ => None,
    };
    LengthAccess { expr, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gensym_is_unique_per_block() {
        let mut cgen = CodeEmitter::new();
        cgen.begin_function("void f()");
        let a = cgen.var("cgen_var");
        let b = cgen.var("cgen_var");
        assert_ne!(a, b);
        cgen.begin_if("x");
        let inner = cgen.var("cgen_var");
        assert_ne!(inner, a);
        assert_ne!(inner, b);
        cgen.end_if();
        cgen.begin_if("y");
        let sibling = cgen.var("cgen_var");
        cgen.end_if();
        assert_eq!(inner, sibling);
        let after = cgen.var("cgen_var");
        assert_ne!(after, a);
        assert_ne!(after, b);
        cgen.end_function();
    }

    #[test]
    fn blocks_indent_and_close() {
        let mut cgen = CodeEmitter::new();
        cgen.begin_if("a");
        cgen.stmt("f()");
        cgen.begin_else();
        cgen.stmt("g()");
        cgen.end_if();
        assert_eq!(cgen.as_str(), "if (a) {\n    f();\n} else {\n    g();\n}\n");
    }

    #[test]
    fn switch_cases() {
        let mut cgen = CodeEmitter::new();
        cgen.begin_switch("t");
        cgen.case("1");
        cgen.stmt("break");
        cgen.end_case();
        cgen.default_case();
        cgen.stmt("return");
        cgen.end_case();
        cgen.end_switch();
        assert_eq!(
            cgen.as_str(),
            "switch (t) {\n    case 1: {\n        break;\n    }\n    default: {\n        return;\n    }\n}\n"
        );
    }

    #[test]
    fn type_decls() {
        let cgen = CodeEmitter::new();
        let names = VulkanType::from_decl("const char* const* ppEnabledLayerNames").unwrap();
        assert_eq!(cgen.type_decl(&names, true), "const char* const* ppEnabledLayerNames");
        let arr = VulkanType::from_decl("float blendConstants[4]").unwrap();
        assert_eq!(cgen.type_decl(&arr, true), "float blendConstants[4]");
        assert_eq!(cgen.sizeof_expr(&names), "sizeof(const char*)");
    }

    #[test]
    fn primitives_are_big_endian_fixed_width() {
        let reg = TypeRegistry::new();
        let mut cgen = CodeEmitter::new();
        let f = VulkanType::new("float", "lineWidth");
        cgen.stream_primitive(&reg, "vkStream", "forMarshaling->lineWidth", &f, Direction::Write)
            .unwrap();
        let u = VulkanType::new("uint16_t", "x");
        cgen.stream_primitive(&reg, "vkStream", "forUnmarshaling->x", &u, Direction::Read)
            .unwrap();
        assert_eq!(
            cgen.as_str(),
            "vkStream->putBe32(*(const uint32_t*)&forMarshaling->lineWidth);\n\
             forUnmarshaling->x = (uint16_t)vkStream->getBe16();\n"
        );
        let unknown = VulkanType::new("VkMystery", "m");
        assert!(cgen
            .stream_primitive(&reg, "s", "m", &unknown, Direction::Write)
            .is_err());
    }

    #[test]
    fn memcpy_swaps_after_copy() {
        let reg = TypeRegistry::new();
        let mut cgen = CodeEmitter::new();
        let op = VulkanType::new("uint32_t", "opcode");
        cgen.memcpy_primitive(&reg, "ptr", "0", "opcode", &op, Direction::Read)
            .unwrap();
        assert_eq!(
            cgen.as_str(),
            "memcpy((uint8_t*)&opcode, ptr + 0, 4);\nvkmarshal_swap_be32((uint8_t*)&opcode);\n"
        );
    }

    #[test]
    fn api_lengths_dereference_count_pointers() {
        let api = VulkanApi::new(
            "vkEnumeratePhysicalDevices",
            "VkResult",
            vec![
                VulkanType::new("VkInstance", "instance"),
                VulkanType::from_decl("uint32_t* pPhysicalDeviceCount").unwrap(),
                VulkanType::from_decl("VkPhysicalDevice* pPhysicalDevices")
                    .unwrap()
                    .with_len("pPhysicalDeviceCount"),
            ],
        );
        let scope = Scope::of_api(&api);
        let len = length_access(&scope, &api.parameters[2]);
        assert_eq!(len.expr, "(*(pPhysicalDeviceCount))");
        assert!(len.unresolved.is_none());
    }
}
