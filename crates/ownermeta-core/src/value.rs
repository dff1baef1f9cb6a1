//! Typed Value Codec
//!
//! Metadata values live in a single text column. To get back exactly what was
//! stored, every value is written as a `(text, type tag)` pair:
//!
//! | Variant         | Stored text               | Tag       |
//! |-----------------|---------------------------|-----------|
//! | `Null`          | `""`                      | `null`    |
//! | `Bool(true)`    | `"1"`                     | `boolean` |
//! | `Bool(false)`   | `"0"`                     | `boolean` |
//! | `Int(42)`       | `"42"`                    | `int`     |
//! | `Float(1.5)`    | `"1.5"`                   | `float`   |
//! | `Text(s)`       | `s`                       | `string`  |
//! | `Array(json)`   | compact JSON              | `array`   |
//!
//! A missing tag decodes as raw text, which is how rows written before the
//! `type` column existed come back.

use crate::error::{MetaError, MetaResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Logical type of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    String,
    Int,
    Float,
    Boolean,
    Null,
    Array,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Boolean => "boolean",
            TypeTag::Null => "null",
            TypeTag::Array => "array",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(TypeTag::String),
            "int" => Ok(TypeTag::Int),
            "float" => Ok(TypeTag::Float),
            "boolean" => Ok(TypeTag::Boolean),
            "null" => Ok(TypeTag::Null),
            "array" => Ok(TypeTag::Array),
            other => Err(MetaError::encoding(format!("unknown type tag '{}'", other))),
        }
    }
}

/// A metadata value
///
/// `Array` holds any structured JSON payload (lists and maps alike).
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Value),
}

impl MetaValue {
    /// Tag this value is stored under
    pub fn type_tag(&self) -> TypeTag {
        match self {
            MetaValue::Null => TypeTag::Null,
            MetaValue::Bool(_) => TypeTag::Boolean,
            MetaValue::Int(_) => TypeTag::Int,
            MetaValue::Float(_) => TypeTag::Float,
            MetaValue::Text(_) => TypeTag::String,
            MetaValue::Array(_) => TypeTag::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Float` values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            MetaValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to a plain JSON value
    pub fn to_json(&self) -> Value {
        match self {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Int(i) => Value::from(*i),
            MetaValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetaValue::Text(s) => Value::String(s.clone()),
            MetaValue::Array(v) => v.clone(),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<bool> for MetaValue {
    fn from(b: bool) -> Self {
        MetaValue::Bool(b)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Int(i)
    }
}

impl From<i32> for MetaValue {
    fn from(i: i32) -> Self {
        MetaValue::Int(i64::from(i))
    }
}

impl From<u32> for MetaValue {
    fn from(i: u32) -> Self {
        MetaValue::Int(i64::from(i))
    }
}

impl From<f64> for MetaValue {
    fn from(f: f64) -> Self {
        MetaValue::Float(f)
    }
}

impl<T: Into<MetaValue>> From<Vec<T>> for MetaValue {
    fn from(items: Vec<T>) -> Self {
        MetaValue::Array(Value::Array(
            items.into_iter().map(|item| item.into().to_json()).collect(),
        ))
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(MetaValue::Null)
    }
}

/// Maps JSON scalars onto their own variants; lists and maps become `Array`.
impl From<Value> for MetaValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => MetaValue::Null,
            Value::Bool(b) => MetaValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => MetaValue::Int(i),
                None => MetaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => MetaValue::Text(s),
            other => MetaValue::Array(other),
        }
    }
}

/// The stored form of a [`MetaValue`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    pub value: String,
    pub tag: TypeTag,
}

/// Encode a value into its stored text and type tag
pub fn encode(value: &MetaValue) -> MetaResult<EncodedValue> {
    let text = match value {
        MetaValue::Null => String::new(),
        MetaValue::Bool(true) => "1".to_string(),
        MetaValue::Bool(false) => "0".to_string(),
        MetaValue::Int(i) => i.to_string(),
        // Display for f64 is the shortest text that parses back to the same bits
        MetaValue::Float(f) => f.to_string(),
        MetaValue::Text(s) => s.clone(),
        MetaValue::Array(v) => serde_json::to_string(v)?,
    };

    Ok(EncodedValue {
        value: text,
        tag: value.type_tag(),
    })
}

/// Decode stored text back into a value
///
/// `tag` is the raw content of the `type` column; `None` means the row predates
/// typed storage and is returned as text.
pub fn decode(text: &str, tag: Option<&str>) -> MetaResult<MetaValue> {
    let tag = match tag {
        Some(t) => t.parse::<TypeTag>()?,
        None => TypeTag::String,
    };
    decode_tagged(text, tag)
}

/// Decode stored text with an already-parsed tag
pub fn decode_tagged(text: &str, tag: TypeTag) -> MetaResult<MetaValue> {
    match tag {
        TypeTag::Null => Ok(MetaValue::Null),
        TypeTag::String => Ok(MetaValue::Text(text.to_string())),
        TypeTag::Boolean => match text {
            "1" => Ok(MetaValue::Bool(true)),
            "0" => Ok(MetaValue::Bool(false)),
            other => Err(MetaError::encoding(format!(
                "'{}' is not a stored boolean",
                other
            ))),
        },
        TypeTag::Int => text
            .parse::<i64>()
            .map(MetaValue::Int)
            .map_err(|e| MetaError::encoding(format!("'{}' is not an int: {}", text, e))),
        TypeTag::Float => text
            .parse::<f64>()
            .map(MetaValue::Float)
            .map_err(|e| MetaError::encoding(format!("'{}' is not a float: {}", text, e))),
        TypeTag::Array => Ok(MetaValue::Array(serde_json::from_str(text)?)),
    }
}
