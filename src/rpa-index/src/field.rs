//! Decoded record field values and their text rendering

use std::fmt;

use num_bigint::BigInt;
use serde_pickle::{HashableValue, Value};

/// A single decoded field of an index record.
///
/// Covers everything the pickle decoder can produce. Scalars render
/// through `Display` with their default formatting; containers render in
/// Python literal style (`[1, 2]`, `(1, 2)`, `{k: v}`).
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    None,
    Bool(bool),
    Int(i64),
    /// Integers outside the i64 range (pickle longs)
    BigInt(BigInt),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Field>),
    Tuple(Vec<Field>),
    Map(Vec<(Field, Field)>),
}

impl Field {
    /// Convert a decoded value into an owned field.
    ///
    /// Sets are carried as their element list; the decoder stores them
    /// sorted, so the order is stable.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::None => Field::None,
            Value::Bool(b) => Field::Bool(b),
            Value::I64(n) => Field::Int(n),
            Value::Int(n) => Field::BigInt(n),
            Value::F64(x) => Field::Float(x),
            Value::String(s) => Field::Text(s),
            Value::Bytes(bytes) => Field::Bytes(bytes),
            Value::List(items) => Field::List(items.into_iter().map(Field::from_value).collect()),
            Value::Tuple(items) => Field::Tuple(items.into_iter().map(Field::from_value).collect()),
            Value::Set(items) | Value::FrozenSet(items) => {
                Field::List(items.into_iter().map(Field::from_hashable).collect())
            }
            Value::Dict(map) => Field::Map(
                map.into_iter()
                    .map(|(key, value)| (Field::from_hashable(key), Field::from_value(value)))
                    .collect(),
            ),
        }
    }

    fn from_hashable(value: HashableValue) -> Self {
        match value {
            HashableValue::None => Field::None,
            HashableValue::Bool(b) => Field::Bool(b),
            HashableValue::I64(n) => Field::Int(n),
            HashableValue::Int(n) => Field::BigInt(n),
            HashableValue::F64(x) => Field::Float(x),
            HashableValue::String(s) => Field::Text(s),
            HashableValue::Bytes(bytes) => Field::Bytes(bytes),
            HashableValue::Tuple(items) => {
                Field::Tuple(items.into_iter().map(Field::from_hashable).collect())
            }
            HashableValue::FrozenSet(items) => {
                Field::List(items.into_iter().map(Field::from_hashable).collect())
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::None => f.write_str("None"),
            Field::Bool(b) => write!(f, "{}", b),
            Field::Int(n) => write!(f, "{}", n),
            Field::BigInt(n) => write!(f, "{}", n),
            Field::Float(x) => write!(f, "{}", x),
            Field::Text(s) => f.write_str(s),
            Field::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Field::List(items) => {
                f.write_str("[")?;
                write_separated(f, items)?;
                f.write_str("]")
            }
            Field::Tuple(items) => {
                f.write_str("(")?;
                write_separated(f, items)?;
                // Single-element tuples keep the trailing comma
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Field::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, items: &[Field]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Python-side type name of a decoded value, for shape error messages
pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::None => "NoneType",
        Value::Bool(_) => "bool",
        Value::I64(_) | Value::Int(_) => "int",
        Value::F64(_) => "float",
        Value::Bytes(_) => "bytes",
        Value::String(_) => "str",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
        Value::Set(_) => "set",
        Value::FrozenSet(_) => "frozenset",
        Value::Dict(_) => "dict",
    }
}

/// Lift a dict key back into the general value type.
///
/// Index conversion checks all keys through one `Value` matcher, whether
/// they came from a sorted dict or straight off the stream.
pub(crate) fn hashable_to_value(key: HashableValue) -> Value {
    match key {
        HashableValue::None => Value::None,
        HashableValue::Bool(b) => Value::Bool(b),
        HashableValue::I64(n) => Value::I64(n),
        HashableValue::Int(n) => Value::Int(n),
        HashableValue::F64(x) => Value::F64(x),
        HashableValue::Bytes(bytes) => Value::Bytes(bytes),
        HashableValue::String(s) => Value::String(s),
        HashableValue::Tuple(items) => {
            Value::Tuple(items.into_iter().map(hashable_to_value).collect())
        }
        HashableValue::FrozenSet(items) => Value::FrozenSet(items),
    }
}
