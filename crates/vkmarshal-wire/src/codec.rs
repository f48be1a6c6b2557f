//! Value walk over the wire encoding.
//!
//! Every occurrence is classified with the same [`classify`] the generator
//! uses and counted with the same [`LengthExpr`], so a packet produced here
//! is byte-for-byte what the emitted `marshal_*` functions produce.

use tracing::{debug, warn};
use vkmarshal_types::handle::is_handle_type;
use vkmarshal_types::{
    classify, needs_presence_check, ExtensionDispatch, LengthExpr, LengthScope, RootTypeMapping, Shape,
    TypeRegistry, VulkanApi, VulkanCompoundType, VulkanType, STRUCTURE_TYPE_MAX_ENUM,
};

use crate::error::WireError;
use crate::handles::HandleMapping;
use crate::stream::{WireReader, WireSink};
use crate::value::{lookup_count, StructValue, Value};

/// Values in scope while one occurrence is walked: the enclosing struct's
/// fields or the command's parameters.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    pub scope: LengthScope<'a>,
    pub values: &'a [(String, Value)],
}

impl<'a> Frame<'a> {
    pub fn of_struct(compound: &'a VulkanCompoundType, values: &'a [(String, Value)]) -> Self {
        Self {
            scope: LengthScope::Struct(compound),
            values,
        }
    }

    pub fn of_api(api: &'a VulkanApi, values: &'a [(String, Value)]) -> Self {
        Self {
            scope: LengthScope::Api(api),
            values,
        }
    }

    fn is_struct(&self) -> bool {
        matches!(self.scope, LengthScope::Struct(_))
    }
}

fn mismatch(ty: &VulkanType, expected: &str, got: &Value) -> WireError {
    WireError::ValueShape(format!(
        "{} ({}): expected {expected}, got {}",
        ty.param_name,
        ty.type_name,
        got.kind()
    ))
}

/// Elements behind a counted pointer. A null pointer stands for an empty
/// array when the count is zero.
fn counted_items<'v>(ty: &VulkanType, value: &'v Value, count: usize) -> Result<&'v [Value], WireError> {
    match value {
        Value::Array(items) => {
            check_len(ty, count, items.len())?;
            Ok(items)
        }
        Value::Null if count == 0 => Ok(&[]),
        other => Err(mismatch(ty, "array", other)),
    }
}

fn counted_bytes<'v>(ty: &VulkanType, value: &'v Value, count: usize) -> Result<&'v [u8], WireError> {
    match value {
        Value::Bytes(bytes) => {
            check_len(ty, count, bytes.len())?;
            Ok(bytes)
        }
        Value::Null if count == 0 => Ok(&[]),
        other => Err(mismatch(ty, "bytes", other)),
    }
}

fn check_len(ty: &VulkanType, expected: usize, got: usize) -> Result<(), WireError> {
    if expected == got {
        Ok(())
    } else {
        Err(WireError::ValueShape(format!(
            "{}: element count is {expected}, value holds {got}",
            ty.param_name
        )))
    }
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

pub struct Codec<'r> {
    registry: &'r TypeRegistry,
    dispatch: ExtensionDispatch<'r>,
    features: u32,
}

impl<'r> Codec<'r> {
    pub fn new(registry: &'r TypeRegistry, mappings: &[RootTypeMapping]) -> Self {
        Self {
            registry,
            dispatch: ExtensionDispatch::build(registry, mappings),
            features: 0,
        }
    }

    /// Stream feature mask both sides agreed on.
    pub fn with_features(mut self, features: u32) -> Self {
        self.features = features;
        self
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    pub fn dispatch(&self) -> &ExtensionDispatch<'r> {
        &self.dispatch
    }

    pub fn features(&self) -> u32 {
        self.features
    }

    // ── Counts ──────────────────────────────────────────────────────────

    fn length(&self, ty: &VulkanType, frame: Frame<'_>) -> LengthExpr {
        LengthExpr::resolve(ty, frame.scope)
    }

    fn count(&self, ty: &VulkanType, frame: Frame<'_>) -> Result<usize, WireError> {
        self.length(ty, frame)
            .evaluate(self.registry, &mut |name, field| lookup_count(frame.values, name, field))
            .map(|n| n as usize)
            .ok_or_else(|| WireError::ValueShape(format!("no element count for {}", ty.param_name)))
    }

    fn static_len(&self, ty: &VulkanType) -> Result<usize, WireError> {
        let expr = ty.static_arr_expr.as_deref().unwrap_or("1");
        self.registry
            .eval_constant(expr)
            .map(|n| n as usize)
            .ok_or_else(|| WireError::ValueShape(format!("unknown array bound {expr}")))
    }

    fn element_size(&self, ty: &VulkanType) -> Option<usize> {
        if is_handle_type(self.registry.resolve_alias(&ty.type_name)) {
            Some(8)
        } else {
            self.registry.encoding_size(&ty.type_name)
        }
    }

    /// Member filters and stream-feature gates.
    fn is_marshaled(&self, ty: &VulkanType, frame: Frame<'_>) -> bool {
        if let Some(filter) = &ty.annotations.filter {
            let value = lookup_count(frame.values, &filter.field, None);
            if !value.is_some_and(|v| filter.values.contains(&v)) {
                return false;
            }
        }
        if let Some(feature) = &ty.annotations.stream_feature {
            if self.features & feature.bit == 0 {
                return false;
            }
        }
        true
    }

    fn update_root(ty: &VulkanType, value: &Value, frame: Frame<'_>, root: &mut i64) {
        if ty.param_name == "sType" && frame.is_struct() && *root == STRUCTURE_TYPE_MAX_ENUM {
            if let Some(v) = value.as_u64() {
                *root = v as i64;
            }
        }
    }

    // ── Write ───────────────────────────────────────────────────────────

    /// Write one occurrence. `root` is the `sType` of the chain's root struct
    /// and is set by the first `sType` met while it is still unset.
    pub fn write(
        &self,
        out: &mut dyn WireSink,
        ty: &VulkanType,
        value: &Value,
        frame: Frame<'_>,
        root: &mut i64,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        if !self.is_marshaled(ty, frame) {
            return Ok(());
        }
        let shape = classify(ty, self.registry);
        if needs_presence_check(ty, shape) {
            out.put_u8(u8::from(!value.is_null()));
            if value.is_null() {
                return Ok(());
            }
        }
        match shape {
            Shape::Unsupported => {
                warn!(name = %ty.param_name, ty = %ty.type_name, "unsupported pointer shape skipped");
            }
            Shape::StructExtension => self.write_extension(out, value, *root, map)?,
            Shape::Compound => self.write_compound(out, ty, value, frame, *root, map)?,
            Shape::String => match value {
                Value::Str(s) => Self::write_string(out, s),
                other => return Err(mismatch(ty, "string", other)),
            },
            Shape::StringArray => {
                let count = self.count(ty, frame)?;
                let empty = Vec::new();
                let strings = match value {
                    Value::StrArray(v) => v,
                    Value::Null => &empty,
                    other => return Err(mismatch(ty, "string array", other)),
                };
                check_len(ty, count, strings.len())?;
                out.put_be32(count as u32);
                for s in strings {
                    Self::write_string(out, s);
                }
            }
            Shape::StaticArray => self.write_static_array(out, ty, value, map)?,
            Shape::Pointer => self.write_pointer(out, ty, value, frame, map)?,
            Shape::Value => self.write_scalar(out, ty, value, map)?,
        }
        Self::update_root(ty, value, frame, root);
        Ok(())
    }

    fn write_string(out: &mut dyn WireSink, s: &str) {
        out.put_be32(s.len() as u32 + 1);
        out.put_bytes(s.as_bytes());
        out.put_u8(0);
    }

    fn write_scalar(
        &self,
        out: &mut dyn WireSink,
        ty: &VulkanType,
        value: &Value,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        let name = self.registry.resolve_alias(&ty.type_name);
        if is_handle_type(name) {
            let id = match value {
                Value::Handle(h) => *h,
                Value::Null => 0,
                other => return Err(mismatch(ty, "handle", other)),
            };
            out.put_be64(map.map(id));
            return Ok(());
        }
        if self.registry.is_funcpointer(name) {
            let addr = match value {
                Value::Address(a) | Value::Int(a) => *a,
                Value::Null => 0,
                other => return Err(mismatch(ty, "address", other)),
            };
            out.put_be64(addr);
            return Ok(());
        }
        match (name, value) {
            ("float", Value::F32(f)) => out.put_be32(f.to_bits()),
            ("double", Value::F64(f)) => out.put_be64(f.to_bits()),
            ("float", other) => return Err(mismatch(ty, "f32", other)),
            ("double", other) => return Err(mismatch(ty, "f64", other)),
            _ => {
                let n = match value {
                    Value::Int(n) => *n,
                    other => return Err(mismatch(ty, "int", other)),
                };
                match self.registry.encoding_size(name) {
                    Some(1) => out.put_u8(n as u8),
                    Some(2) => out.put_be16(n as u16),
                    Some(4) => out.put_be32(n as u32),
                    Some(8) => out.put_be64(n),
                    _ => {
                        return Err(WireError::ValueShape(format!(
                            "no wire encoding for {}",
                            ty.type_name
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn write_static_array(
        &self,
        out: &mut dyn WireSink,
        ty: &VulkanType,
        value: &Value,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        let n = self.static_len(ty)?;
        if ty.type_name == "char" {
            let s = match value {
                Value::Str(s) => s.as_bytes(),
                other => return Err(mismatch(ty, "string", other)),
            };
            let len = s.len().min(n);
            out.put_bytes(&s[..len]);
            for _ in len..n {
                out.put_u8(0);
            }
            return Ok(());
        }
        if self.registry.encoding_size(&ty.type_name) == Some(1) {
            let Value::Bytes(bytes) = value else {
                return Err(mismatch(ty, "bytes", value));
            };
            check_len(ty, n, bytes.len())?;
            out.put_bytes(bytes);
            return Ok(());
        }
        let Value::Array(items) = value else {
            return Err(mismatch(ty, "array", value));
        };
        check_len(ty, n, items.len())?;
        for item in items {
            self.write_scalar(out, ty, item, map)?;
        }
        Ok(())
    }

    fn write_pointer(
        &self,
        out: &mut dyn WireSink,
        ty: &VulkanType,
        value: &Value,
        frame: Frame<'_>,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        if ty.pointer_indirection_levels > 1 || (ty.is_void() && ty.count_expr().is_none()) {
            let addr = match value {
                Value::Address(a) | Value::Int(a) => *a,
                Value::Null => 0,
                other => return Err(mismatch(ty, "address", other)),
            };
            out.put_be64(addr);
            return Ok(());
        }
        let count = self.count(ty, frame)?;
        if ty.is_void() || self.element_size(ty) == Some(1) {
            out.put_bytes(counted_bytes(ty, value, count)?);
            return Ok(());
        }
        if self.length(ty, frame) == LengthExpr::One {
            return self.write_scalar(out, ty, value, map);
        }
        for item in counted_items(ty, value, count)? {
            self.write_scalar(out, ty, item, map)?;
        }
        Ok(())
    }

    fn write_compound(
        &self,
        out: &mut dyn WireSink,
        ty: &VulkanType,
        value: &Value,
        frame: Frame<'_>,
        root: i64,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        let compound = self
            .registry
            .compound(&ty.type_name)
            .ok_or_else(|| WireError::ValueShape(format!("unknown struct {}", ty.type_name)))?;
        let single = !ty.is_static_array()
            && (!ty.is_pointer() || self.length(ty, frame) == LengthExpr::One);
        if single {
            let Value::Struct(s) = value else {
                return Err(mismatch(ty, "struct", value));
            };
            return self.write_struct(out, compound, s, root, map);
        }
        let count = if ty.is_static_array() {
            self.static_len(ty)?
        } else {
            self.count(ty, frame)?
        };
        for item in counted_items(ty, value, count)? {
            let Value::Struct(s) = item else {
                return Err(mismatch(ty, "struct", item));
            };
            self.write_struct(out, compound, s, root, map)?;
        }
        Ok(())
    }

    /// Members in declaration order. A missing field is written as
    /// [`Value::Null`].
    pub fn write_struct(
        &self,
        out: &mut dyn WireSink,
        compound: &VulkanCompoundType,
        value: &StructValue,
        root: i64,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        let mut root = root;
        let frame = Frame::of_struct(compound, &value.fields);
        for member in compound.marshaled_members() {
            let field = value.get(&member.param_name).unwrap_or(&Value::Null);
            self.write(out, member, field, frame, &mut root, map)?;
        }
        Ok(())
    }

    /// Presence byte, `sType`, then the struct body. Chain elements this
    /// side cannot size are skipped.
    pub fn write_extension(
        &self,
        out: &mut dyn WireSink,
        value: &Value,
        root: i64,
        map: HandleMapping<'_>,
    ) -> Result<(), WireError> {
        let mut cur = value;
        loop {
            let s = match cur {
                Value::Null => {
                    out.put_u8(0);
                    return Ok(());
                }
                Value::Struct(s) => s,
                other => {
                    return Err(WireError::ValueShape(format!(
                        "pNext: expected struct or null, got {}",
                        other.kind()
                    )))
                }
            };
            let s_type = s.get("sType").and_then(Value::as_u64).map(|v| v as i64);
            if let Some(target) = s_type.and_then(|v| self.dispatch.lookup(v, root)) {
                out.put_u8(1);
                out.put_be32(s_type.unwrap_or_default() as u32);
                return self.write_struct(out, target, s, root, map);
            }
            debug!(name = %s.type_name, "unknown extension struct skipped");
            cur = s.get("pNext").unwrap_or(&Value::Null);
        }
    }

    // ── Read ────────────────────────────────────────────────────────────

    /// Read one occurrence. Members a filter or feature gate excludes come
    /// back as [`Value::Null`].
    pub fn read(
        &self,
        input: &mut WireReader<'_>,
        ty: &VulkanType,
        frame: Frame<'_>,
        root: &mut i64,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        if !self.is_marshaled(ty, frame) {
            return Ok(Value::Null);
        }
        let shape = classify(ty, self.registry);
        if needs_presence_check(ty, shape) && input.get_u8()? == 0 {
            return Ok(Value::Null);
        }
        let value = match shape {
            Shape::Unsupported => Value::Null,
            Shape::StructExtension => self.read_extension(input, *root, map)?,
            Shape::Compound => self.read_compound(input, ty, frame, *root, map)?,
            Shape::String => Value::Str(Self::read_string(input)?),
            Shape::StringArray => {
                let count = input.get_be32()? as usize;
                let mut strings = Vec::with_capacity(count.min(input.remaining()));
                for _ in 0..count {
                    strings.push(Self::read_string(input)?);
                }
                Value::StrArray(strings)
            }
            Shape::StaticArray => self.read_static_array(input, ty, map)?,
            Shape::Pointer => self.read_pointer(input, ty, frame, map)?,
            Shape::Value => self.read_scalar(input, ty, map)?,
        };
        Self::update_root(ty, &value, frame, root);
        Ok(value)
    }

    fn read_string(input: &mut WireReader<'_>) -> Result<String, WireError> {
        let len = input.get_be32()? as usize;
        Ok(c_string(input.read_bytes(len)?))
    }

    fn read_scalar(
        &self,
        input: &mut WireReader<'_>,
        ty: &VulkanType,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        let name = self.registry.resolve_alias(&ty.type_name);
        if is_handle_type(name) {
            return Ok(Value::Handle(map.map(input.get_be64()?)));
        }
        if self.registry.is_funcpointer(name) {
            return Ok(Value::Address(input.get_be64()?));
        }
        let value = match name {
            "float" => Value::F32(f32::from_bits(input.get_be32()?)),
            "double" => Value::F64(f64::from_bits(input.get_be64()?)),
            _ => match self.registry.encoding_size(name) {
                Some(1) => Value::Int(u64::from(input.get_u8()?)),
                Some(2) => Value::Int(u64::from(input.get_be16()?)),
                Some(4) => Value::Int(u64::from(input.get_be32()?)),
                Some(8) => Value::Int(input.get_be64()?),
                _ => {
                    return Err(WireError::ValueShape(format!(
                        "no wire encoding for {}",
                        ty.type_name
                    )))
                }
            },
        };
        Ok(value)
    }

    fn read_scalars(
        &self,
        input: &mut WireReader<'_>,
        ty: &VulkanType,
        n: usize,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        let mut items = Vec::with_capacity(n.min(input.remaining()));
        for _ in 0..n {
            items.push(self.read_scalar(input, ty, map)?);
        }
        Ok(Value::Array(items))
    }

    fn read_static_array(
        &self,
        input: &mut WireReader<'_>,
        ty: &VulkanType,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        let n = self.static_len(ty)?;
        if ty.type_name == "char" {
            let bytes = input.read_bytes(n)?;
            // The last byte is forced to NUL on read.
            return Ok(Value::Str(c_string(&bytes[..n.saturating_sub(1)])));
        }
        if self.registry.encoding_size(&ty.type_name) == Some(1) {
            return Ok(Value::Bytes(input.read_bytes(n)?.to_vec()));
        }
        self.read_scalars(input, ty, n, map)
    }

    fn read_pointer(
        &self,
        input: &mut WireReader<'_>,
        ty: &VulkanType,
        frame: Frame<'_>,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        if ty.pointer_indirection_levels > 1 || (ty.is_void() && ty.count_expr().is_none()) {
            return Ok(Value::Address(input.get_be64()?));
        }
        let count = self.count(ty, frame)?;
        if ty.is_void() || self.element_size(ty) == Some(1) {
            return Ok(Value::Bytes(input.read_bytes(count)?.to_vec()));
        }
        if self.length(ty, frame) == LengthExpr::One {
            return self.read_scalar(input, ty, map);
        }
        self.read_scalars(input, ty, count, map)
    }

    fn read_compound(
        &self,
        input: &mut WireReader<'_>,
        ty: &VulkanType,
        frame: Frame<'_>,
        root: i64,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        let compound = self
            .registry
            .compound(&ty.type_name)
            .ok_or_else(|| WireError::ValueShape(format!("unknown struct {}", ty.type_name)))?;
        let single = !ty.is_static_array()
            && (!ty.is_pointer() || self.length(ty, frame) == LengthExpr::One);
        if single {
            return Ok(Value::Struct(self.read_struct(input, compound, root, map)?));
        }
        let count = if ty.is_static_array() {
            self.static_len(ty)?
        } else {
            self.count(ty, frame)?
        };
        let mut items = Vec::with_capacity(count.min(input.remaining()));
        for _ in 0..count {
            items.push(Value::Struct(self.read_struct(input, compound, root, map)?));
        }
        Ok(Value::Array(items))
    }

    pub fn read_struct(
        &self,
        input: &mut WireReader<'_>,
        compound: &VulkanCompoundType,
        root: i64,
        map: HandleMapping<'_>,
    ) -> Result<StructValue, WireError> {
        let mut root = root;
        let mut out = StructValue::new(compound.name.clone());
        for member in compound.marshaled_members() {
            let value = self.read(input, member, Frame::of_struct(compound, &out.fields), &mut root, map)?;
            out.fields.push((member.param_name.clone(), value));
        }
        Ok(out)
    }

    pub fn read_extension(
        &self,
        input: &mut WireReader<'_>,
        root: i64,
        map: HandleMapping<'_>,
    ) -> Result<Value, WireError> {
        if input.get_u8()? == 0 {
            return Ok(Value::Null);
        }
        let s_type = i64::from(input.get_be32()?);
        let target = self
            .dispatch
            .lookup(s_type, root)
            .ok_or(WireError::UnknownExtension(s_type))?;
        Ok(Value::Struct(self.read_struct(input, target, root, map)?))
    }

    // ── Defaults ────────────────────────────────────────────────────────

    /// A struct with every member at its zero value and `sType` filled in.
    pub fn zeroed_struct(&self, name: &str) -> Result<StructValue, WireError> {
        let compound = self
            .registry
            .compound(name)
            .ok_or_else(|| WireError::ValueShape(format!("unknown struct {name}")))?;
        let mut out = StructValue::new(compound.name.clone());
        for member in compound.marshaled_members() {
            let value = if member.param_name == "sType" {
                let s_type = self.registry.structure_type_value(compound).unwrap_or_default();
                Value::Int(s_type as u64)
            } else {
                self.zeroed(member, Frame::of_struct(compound, &out.fields))?
            };
            out.fields.push((member.param_name.clone(), value));
        }
        Ok(out)
    }

    /// Zero value of one occurrence. Optional pointers are absent and
    /// counted pointers hold as many elements as their count evaluates to.
    pub fn zeroed(&self, ty: &VulkanType, frame: Frame<'_>) -> Result<Value, WireError> {
        let shape = classify(ty, self.registry);
        if needs_presence_check(ty, shape) {
            return Ok(Value::Null);
        }
        let count = || self.count(ty, frame).unwrap_or(0);
        let value = match shape {
            Shape::StructExtension | Shape::Unsupported => Value::Null,
            Shape::Compound => {
                let single = !ty.is_static_array()
                    && (!ty.is_pointer() || self.length(ty, frame) == LengthExpr::One);
                if single {
                    Value::Struct(self.zeroed_struct(&ty.type_name)?)
                } else {
                    let n = if ty.is_static_array() { self.static_len(ty)? } else { count() };
                    let mut items = Vec::with_capacity(n);
                    for _ in 0..n {
                        items.push(Value::Struct(self.zeroed_struct(&ty.type_name)?));
                    }
                    Value::Array(items)
                }
            }
            Shape::String => Value::Str(String::new()),
            Shape::StringArray => Value::StrArray(vec![String::new(); count()]),
            Shape::StaticArray => {
                let n = self.static_len(ty)?;
                if ty.type_name == "char" {
                    Value::Str(String::new())
                } else if self.registry.encoding_size(&ty.type_name) == Some(1) {
                    Value::Bytes(vec![0; n])
                } else {
                    Value::Array(vec![self.zero_scalar(ty); n])
                }
            }
            Shape::Pointer => {
                if ty.pointer_indirection_levels > 1 || (ty.is_void() && ty.count_expr().is_none()) {
                    Value::Address(0)
                } else if ty.is_void() || self.element_size(ty) == Some(1) {
                    Value::Bytes(vec![0; count()])
                } else if self.length(ty, frame) == LengthExpr::One {
                    self.zero_scalar(ty)
                } else {
                    Value::Array(vec![self.zero_scalar(ty); count()])
                }
            }
            Shape::Value => self.zero_scalar(ty),
        };
        Ok(value)
    }

    fn zero_scalar(&self, ty: &VulkanType) -> Value {
        let name = self.registry.resolve_alias(&ty.type_name);
        if is_handle_type(name) {
            Value::Handle(0)
        } else if self.registry.is_funcpointer(name) {
            Value::Address(0)
        } else {
            match name {
                "float" => Value::F32(0.0),
                "double" => Value::F64(0.0),
                _ => Value::Int(0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{CountingStream, WireWriter};
    use vkmarshal_types::extension::default_root_type_mappings;
    use vkmarshal_types::sample::sample_registry;
    use vkmarshal_types::{TypeDef, TypeRegistry};

    fn write_struct(codec: &Codec<'_>, value: &StructValue) -> Vec<u8> {
        let compound = codec.registry().compound(&value.type_name).unwrap();
        let mut w = WireWriter::new();
        codec
            .write_struct(&mut w, compound, value, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap();
        w.into_inner()
    }

    #[test]
    fn char_static_array_is_padded() {
        let reg = sample_registry().unwrap();
        let codec = Codec::new(&reg, &default_root_type_mappings());
        let props = StructValue::new("VkExtensionProperties")
            .with("extensionName", "VK_KHR_surface")
            .with("specVersion", Value::Int(25));
        let bytes = write_struct(&codec, &props);
        assert_eq!(bytes.len(), 256 + 4);
        assert_eq!(&bytes[..14], b"VK_KHR_surface");
        assert!(bytes[14..256].iter().all(|b| *b == 0));
        assert_eq!(&bytes[256..], &25u32.to_be_bytes());

        let compound = reg.compound("VkExtensionProperties").unwrap();
        let back = codec
            .read_struct(&mut WireReader::new(&bytes), compound, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn optional_string_gets_a_presence_byte() {
        let reg = sample_registry().unwrap();
        let codec = Codec::new(&reg, &default_root_type_mappings());
        let mut app = codec.zeroed_struct("VkApplicationInfo").unwrap();
        app.set("pApplicationName", "demo");
        let bytes = write_struct(&codec, &app);
        // sType, pNext presence, name presence, length, "demo\0".
        assert_eq!(&bytes[..4], &(ash_s_type(&reg, "VK_STRUCTURE_TYPE_APPLICATION_INFO")).to_be_bytes());
        assert_eq!(bytes[4], 0);
        assert_eq!(bytes[5], 1);
        assert_eq!(&bytes[6..10], &5u32.to_be_bytes());
        assert_eq!(&bytes[10..15], b"demo\0");
        // pEngineName is absent: one zero presence byte.
        assert_eq!(bytes[19], 0);
    }

    fn ash_s_type(reg: &TypeRegistry, literal: &str) -> u32 {
        reg.enum_value(literal).unwrap() as u32
    }

    #[test]
    fn counted_pointer_length_must_match() {
        let reg = sample_registry().unwrap();
        let codec = Codec::new(&reg, &default_root_type_mappings());
        let mut info = codec.zeroed_struct("VkShaderModuleCreateInfo").unwrap();
        info.set("codeSize", Value::Int(8));
        info.set("pCode", Value::Array(vec![Value::Int(1)]));
        let compound = reg.compound("VkShaderModuleCreateInfo").unwrap();
        let err = codec
            .write_struct(&mut CountingStream::new(), compound, &info, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap_err();
        assert!(matches!(err, WireError::ValueShape(_)));
    }

    #[test]
    fn filtered_member_follows_its_sibling() {
        let mut reg = TypeRegistry::new();
        reg.add_type("VkDescriptorType", TypeDef::Enum);
        reg.add_compound(VulkanCompoundType::new(
            "VkWriteSlot",
            vec![
                VulkanType::new("VkDescriptorType", "descriptorType"),
                VulkanType::new("uint32_t", "imageSlot").with_filter("descriptorType", &[1, 2]),
                VulkanType::new("uint32_t", "flagged").with_stream_feature("VULKAN_STREAM_FEATURE_X", 0x4),
            ],
        ));
        reg.reindex();
        let codec = Codec::new(&reg, &[]);
        let slot = |kind| {
            StructValue::new("VkWriteSlot")
                .with("descriptorType", Value::Int(kind))
                .with("imageSlot", Value::Int(9))
                .with("flagged", Value::Int(3))
        };
        assert_eq!(write_struct(&codec, &slot(2)).len(), 8);
        assert_eq!(write_struct(&codec, &slot(5)).len(), 4);

        let codec = Codec::new(&reg, &[]).with_features(0x4);
        assert_eq!(write_struct(&codec, &slot(5)).len(), 8);
    }

    #[test]
    fn root_is_taken_from_the_first_s_type() {
        let reg = sample_registry().unwrap();
        let codec = Codec::new(&reg, &default_root_type_mappings());
        let alloc_info = reg.enum_value("VK_STRUCTURE_TYPE_MEMORY_ALLOCATE_INFO").unwrap();
        let shared = reg
            .enum_value("VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FRAGMENT_DENSITY_MAP_FEATURES_EXT")
            .unwrap();
        let import = StructValue::new("VkImportColorBufferGOOGLE")
            .with("sType", Value::Int(shared as u64))
            .with("pNext", Value::Null)
            .with("colorBuffer", Value::Int(77));
        let mut info = codec.zeroed_struct("VkMemoryAllocateInfo").unwrap();
        info.set("pNext", import);
        let bytes = write_struct(&codec, &info);

        let compound = reg.compound("VkMemoryAllocateInfo").unwrap();
        let back = codec
            .read_struct(&mut WireReader::new(&bytes), compound, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap();
        let ext = back.get("pNext").and_then(Value::as_struct).unwrap();
        assert_eq!(ext.type_name, "VkImportColorBufferGOOGLE");
        assert_eq!(ext.get("colorBuffer"), Some(&Value::Int(77)));
        assert_eq!(back.get("sType"), Some(&Value::Int(alloc_info as u64)));
    }

    #[test]
    fn null_counted_pointer_is_empty_when_count_is_zero() {
        let reg = sample_registry().unwrap();
        let codec = Codec::new(&reg, &default_root_type_mappings());

        let empty = codec.zeroed_struct("VkPipelineVertexInputStateCreateInfo").unwrap();
        let mut vertex = empty.clone();
        vertex.set("pVertexBindingDescriptions", Value::Null);
        vertex.set("pVertexAttributeDescriptions", Value::Null);
        assert_eq!(write_struct(&codec, &vertex), write_struct(&codec, &empty));

        let mut dynamic = codec.zeroed_struct("VkPipelineDynamicStateCreateInfo").unwrap();
        dynamic.set("dynamicStateCount", Value::Int(0));
        dynamic.set("pDynamicStates", Value::Null);
        let bytes = write_struct(&codec, &dynamic);
        let compound = reg.compound("VkPipelineDynamicStateCreateInfo").unwrap();
        let back = codec
            .read_struct(&mut WireReader::new(&bytes), compound, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap();
        assert_eq!(back.get("pDynamicStates"), Some(&Value::Array(Vec::new())));

        let mut shader = codec.zeroed_struct("VkShaderModuleCreateInfo").unwrap();
        shader.set("codeSize", Value::Int(0));
        shader.set("pCode", Value::Null);
        let compound = reg.compound("VkShaderModuleCreateInfo").unwrap();
        let mut w = WireWriter::new();
        codec
            .write_struct(&mut w, compound, &shader, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap();
    }

    #[test]
    fn null_counted_pointer_is_rejected_when_count_is_nonzero() {
        let reg = sample_registry().unwrap();
        let codec = Codec::new(&reg, &default_root_type_mappings());
        let mut vertex = codec.zeroed_struct("VkPipelineVertexInputStateCreateInfo").unwrap();
        vertex.set("vertexBindingDescriptionCount", Value::Int(1));
        vertex.set("pVertexBindingDescriptions", Value::Null);
        let compound = reg.compound("VkPipelineVertexInputStateCreateInfo").unwrap();
        let err = codec
            .write_struct(
                &mut WireWriter::new(),
                compound,
                &vertex,
                STRUCTURE_TYPE_MAX_ENUM,
                HandleMapping::none(),
            )
            .unwrap_err();
        assert!(matches!(err, WireError::ValueShape(_)));

        let mut dynamic = codec.zeroed_struct("VkPipelineDynamicStateCreateInfo").unwrap();
        dynamic.set("dynamicStateCount", Value::Int(2));
        dynamic.set("pDynamicStates", Value::Null);
        let compound = reg.compound("VkPipelineDynamicStateCreateInfo").unwrap();
        let err = codec
            .write_struct(
                &mut CountingStream::new(),
                compound,
                &dynamic,
                STRUCTURE_TYPE_MAX_ENUM,
                HandleMapping::none(),
            )
            .unwrap_err();
        assert!(matches!(err, WireError::ValueShape(_)));
    }
}
