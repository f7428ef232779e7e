//! Decoded message model.
//!
//! Everything here is owned: a `Message` survives the file mapping it was
//! decoded from. Field order is the on-disk order and is preserved through
//! flattening and export.

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Metadata,
}

/// Tagged value sum. `Map` is a pair list, not a hash map: insertion order
/// is part of the contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// UTC epoch nanoseconds.
    Timestamp(i64),
    Uuid(u128),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Nested(Box<Message>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float64(_) => "float64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Nested(_) => "nested",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(value) => Some(*value),
            Value::UInt64(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
    pub declared_type: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            declared_type: None,
        }
    }

    pub fn typed(name: impl Into<String>, value: Value, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            declared_type: Some(declared_type.into()),
        }
    }
}

/// A recoverable decode problem attached to the message it occurred in.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeWarning {
    pub detail: String,
    pub payload_pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub index: u64,
    pub absolute_offset: u64,
    pub kind: Kind,
    /// Decoded class name, empty when the payload does not carry one.
    pub type_name: String,
    pub fields: Vec<Field>,
    pub warnings: Vec<DecodeWarning>,
    /// Non-strict mode: the failure that cut decoding short. Fields decoded
    /// before the failure are preserved above.
    pub decode_error: Option<DecodeError>,
}

impl Message {
    pub fn new(index: u64, absolute_offset: u64, kind: Kind) -> Self {
        Self {
            index,
            absolute_offset,
            kind,
            type_name: String::new(),
            fields: Vec::new(),
            warnings: Vec::new(),
            decode_error: None,
        }
    }

    /// Appends a field, renaming duplicates `name#2`, `name#3`, ... so that
    /// names stay unique within this level while every occurrence survives.
    pub fn push_field(&mut self, mut field: Field) {
        let occurrences = self
            .fields
            .iter()
            .filter(|existing| {
                existing.name == field.name
                    || existing
                        .name
                        .strip_prefix(field.name.as_str())
                        .is_some_and(|rest| rest.starts_with('#'))
            })
            .count();
        if occurrences > 0 {
            field.name = format!("{}#{}", field.name, occurrences + 1);
        }
        self.fields.push(field);
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn warn(&mut self, detail: impl Into<String>, payload_pos: usize) {
        self.warnings.push(DecodeWarning {
            detail: detail.into(),
            payload_pos,
        });
    }

    /// Flattens nested messages into dot-separated paths, preserving order.
    /// Scalar values are cloned; containers are kept whole under their path.
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for field in &self.fields {
            flatten_value(&mut out, &field.name, &field.value);
        }
        out
    }
}

fn flatten_value(out: &mut Vec<(String, Value)>, path: &str, value: &Value) {
    match value {
        Value::Nested(message) => {
            for field in &message.fields {
                let child = format!("{path}.{}", field.name);
                flatten_value(out, &child, &field.value);
            }
        }
        other => out.push((path.to_string(), other.clone())),
    }
}
