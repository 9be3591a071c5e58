//! Runtime values and the semantic types used for driver-level type mapping.
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Semantic type of a plan column or parameter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Boolean,
    Int32,
    Int64,
    Float64,
    String,
    Bytes,
    DateTime,
}

impl SemanticType {
    pub fn name(&self) -> &'static str {
        match self {
            SemanticType::Boolean => "boolean",
            SemanticType::Int32 => "int32",
            SemanticType::Int64 => "int64",
            SemanticType::Float64 => "float64",
            SemanticType::String => "string",
            SemanticType::Bytes => "bytes",
            SemanticType::DateTime => "datetime",
        }
    }
}

/// A runtime value supplied to, or produced by, a parameter source.
///
/// `Tuple` carries a single key (e.g. the argument of a seek) and `Rows`
/// carries the variable-length row set of a membership filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Tuple(Vec<Value>),
    Rows(Vec<Vec<Value>>),
}

impl Value {
    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Tuple(_) => "tuple",
            Value::Rows(_) => "rows",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
