//! The dynamically-typed value a [`Field`](crate::field::Field) decodes to
//! or accepts for encoding. Because fields are composed at runtime from a
//! declarative descriptor tree (rather than generated at compile time), the
//! decoded representation has to be a tagged sum type (see `spec.md` §9,
//! "Dynamic dispatch over fields").

use internment::Intern;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, ordered sequence of field values: the in-memory representation
/// of a decoded [`Structure`](crate::structure::Structure) instance.
///
/// Declaration order is preserved (mirrors `destructify.structures.base.
/// Structure.__str__`, which renders fields in declaration order).
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record(pub Vec<(Intern<String>, Value)>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n.as_str() == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: Intern<String>, value: Value) {
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Intern<String>, Value)> {
        self.0.iter()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Record");
        for (name, value) in &self.0 {
            dbg.field(name.as_str(), value);
        }
        dbg.finish()
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(OrderedFloat<f64>),
    Bytes(Vec<u8>),
    Str(String),
    /// Raw integer plus, if the raw value matched a known variant, its name.
    Enum {
        raw: i64,
        name: Option<Intern<String>>,
    },
    Array(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            Value::Enum { raw, .. } if *raw >= 0 => Some(*raw as u64),
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Enum { raw, .. } => Some(*raw),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_uint().map(|v| v as usize)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::UInt(v) => Some(*v != 0),
            Value::Int(v) => Some(*v != 0),
            Value::None => Some(false),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Byte length of this value when it has an unambiguous one (used by the
    /// auto-override machinery and by `len_` expressions). Returns `None`
    /// when the value's length isn't a byte count (e.g. an array's "length"
    /// is its element count, not a byte count, handled separately).
    pub fn byte_len(&self) -> Option<usize> {
        match self {
            Value::Bytes(b) => Some(b.len()),
            Value::Str(s) => Some(s.len()),
            _ => None,
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(v.into())
    }
}
impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt(v.into())
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v.into())
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}
impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}
impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(v.into())
    }
}
impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v.into())
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(OrderedFloat(v as f64))
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(OrderedFloat(v))
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}
impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}
