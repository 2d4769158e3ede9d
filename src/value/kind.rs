//! Value kinds: what a per-language value may hold and how it is coerced.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

/// Finite tag for every value kind. Adapters dispatch on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindTag {
    Raw,
    Text,
    Integer,
    Float,
    Boolean,
    File,
}

/// A stored value counts as blank when it is null or the empty string.
///
/// Zero and `false` are real values.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl KindTag {
    pub fn name(self) -> &'static str {
        match self {
            KindTag::Raw => "raw",
            KindTag::Text => "text",
            KindTag::Integer => "integer",
            KindTag::Float => "float",
            KindTag::Boolean => "boolean",
            KindTag::File => "file",
        }
    }

    /// Wording used in value-kind errors ("must be an integer").
    pub fn expected(self) -> &'static str {
        match self {
            KindTag::Raw => "a JSON value",
            KindTag::Text => "a string",
            KindTag::Integer => "an integer",
            KindTag::Float => "a float",
            KindTag::Boolean => "a boolean",
            KindTag::File => "a file name",
        }
    }

    /// The empty sentinel stored for a language without a value.
    pub fn empty(self) -> Value {
        match self {
            KindTag::Text => Value::String(String::new()),
            _ => Value::Null,
        }
    }

    /// Check and normalize one per-language value for storage.
    ///
    /// Returns `None` when the value has the wrong primitive kind.
    pub fn prepare(self, value: &Value) -> Option<Value> {
        if is_blank(value) && self != KindTag::Text {
            return Some(Value::Null);
        }
        match self {
            KindTag::Raw => Some(value.clone()),
            KindTag::Text => match value {
                Value::Null => Some(Value::String(String::new())),
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                Value::Array(_) | Value::Object(_) => None,
            },
            KindTag::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            KindTag::Float => match value {
                Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number),
                _ => None,
            },
            KindTag::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::String(s) => parse_bool(s).map(Value::Bool),
                _ => None,
            },
            KindTag::File => match value {
                Value::String(_) => Some(value.clone()),
                _ => None,
            },
        }
    }

    /// Coerce a scalar read through a per-language key projection.
    ///
    /// Unparseable values degrade to null instead of failing.
    pub fn decode_projection(self, value: Value) -> Value {
        match self {
            KindTag::Raw | KindTag::Text | KindTag::File => value,
            KindTag::Integer => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => value,
                Value::Number(n) => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| Value::from(f.trunc() as i64))
                    .unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            KindTag::Float => match &value {
                Value::Number(n) => n
                    .as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            KindTag::Boolean => match &value {
                Value::Bool(_) => value,
                Value::String(s) => parse_bool(s).map(Value::Bool).unwrap_or(Value::Null),
                _ => Value::Null,
            },
        }
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Compile-time value kind of a [`LocalizedValue`](super::LocalizedValue).
pub trait ValueKind:
    fmt::Debug + Clone + Copy + Default + PartialEq + Send + Sync + 'static
{
    /// Type produced when a value is resolved to a scalar.
    type Scalar: Clone + fmt::Debug + PartialEq;

    const TAG: KindTag;

    /// Coerce a stored value into the kind's scalar; invalid input gives `None`.
    fn coerce(value: &Value) -> Option<Self::Scalar>;

    fn into_value(scalar: Self::Scalar) -> Value;
}

/// Untyped values, returned as stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Raw;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Text;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Integer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Float;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Boolean;

/// File references, stored as the file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct File;

impl ValueKind for Raw {
    type Scalar = Value;
    const TAG: KindTag = KindTag::Raw;

    fn coerce(value: &Value) -> Option<Value> {
        (!is_blank(value)).then(|| value.clone())
    }

    fn into_value(scalar: Value) -> Value {
        scalar
    }
}

impl ValueKind for Text {
    type Scalar = String;
    const TAG: KindTag = KindTag::Text;

    fn coerce(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn into_value(scalar: String) -> Value {
        Value::String(scalar)
    }
}

impl ValueKind for Integer {
    type Scalar = i64;
    const TAG: KindTag = KindTag::Integer;

    fn coerce(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_value(scalar: i64) -> Value {
        Value::from(scalar)
    }
}

impl ValueKind for Float {
    type Scalar = f64;
    const TAG: KindTag = KindTag::Float;

    fn coerce(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_value(scalar: f64) -> Value {
        Number::from_f64(scalar)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl ValueKind for Boolean {
    type Scalar = bool;
    const TAG: KindTag = KindTag::Boolean;

    fn coerce(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => parse_bool(s),
            _ => None,
        }
    }

    fn into_value(scalar: bool) -> Value {
        Value::Bool(scalar)
    }
}

impl ValueKind for File {
    type Scalar = String;
    const TAG: KindTag = KindTag::File;

    fn coerce(value: &Value) -> Option<String> {
        value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
    }

    fn into_value(scalar: String) -> Value {
        Value::String(scalar)
    }
}
