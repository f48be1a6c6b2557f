//! Dynamic values for one command's parameters.
//!
//! The runtime walks the same type model the generator does, so values are
//! shaped by occurrence rather than by C type: a single pointee is stored as
//! the element itself, a counted pointer as an [`Value::Array`], and an
//! absent optional pointer as [`Value::Null`].

/// Named values of one struct or one parameter list, in declaration order.
pub type Fields = Vec<(String, Value)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Any integer, enum, bitmask or `VkBool32`, zero-extended.
    Int(u64),
    F32(f32),
    F64(f64),
    Handle(u64),
    /// Opaque pointer or function pointer, carried as an 8-byte id.
    Address(u64),
    Str(String),
    StrArray(Vec<String>),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Struct(StructValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Int(n) | Value::Handle(n) | Value::Address(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Struct elements of a single pointee or a counted pointer.
    pub fn structs(&self) -> Vec<&StructValue> {
        match self {
            Value::Struct(s) => vec![s],
            Value::Array(items) => items.iter().filter_map(Value::as_struct).collect(),
            _ => Vec::new(),
        }
    }

    /// Short name of the variant for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Handle(_) => "handle",
            Value::Address(_) => "address",
            Value::Str(_) => "string",
            Value::StrArray(_) => "string array",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }
}

impl From<StructValue> for Value {
    fn from(s: StructValue) -> Self {
        Value::Struct(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub type_name: String,
    pub fields: Fields,
}

impl StructValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder form of [`StructValue::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        lookup(&self.fields, name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Replace a field in place, or append it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        set_field(&mut self.fields, name, value.into());
    }
}

pub fn set_field(fields: &mut Fields, name: &str, value: Value) {
    match fields.iter_mut().find(|(n, _)| n == name) {
        Some((_, slot)) => *slot = value,
        None => fields.push((name.to_string(), value)),
    }
}

pub fn lookup<'a>(fields: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

/// Resolve a length-expression reference against already known values:
/// `name` alone, or `name->field` through a struct pointee.
pub fn lookup_count(fields: &[(String, Value)], name: &str, field: Option<&str>) -> Option<u64> {
    let value = lookup(fields, name)?;
    match field {
        None => value.as_u64(),
        Some(field) => value.structs().first()?.get(field)?.as_u64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut s = StructValue::new("VkExtent2D").with("width", Value::Int(1)).with("height", Value::Int(2));
        s.set("width", Value::Int(7));
        assert_eq!(s.fields[0], ("width".to_string(), Value::Int(7)));
        assert_eq!(s.fields.len(), 2);
    }

    #[test]
    fn counts_through_cross_references() {
        let info = StructValue::new("VkCommandBufferAllocateInfo").with("commandBufferCount", Value::Int(3));
        let params = vec![
            ("device".to_string(), Value::Handle(1)),
            ("pAllocateInfo".to_string(), Value::Struct(info)),
        ];
        assert_eq!(lookup_count(&params, "pAllocateInfo", Some("commandBufferCount")), Some(3));
        assert_eq!(lookup_count(&params, "device", None), Some(1));
        assert_eq!(lookup_count(&params, "missing", None), None);
    }
}
