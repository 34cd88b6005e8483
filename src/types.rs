//! Core value types shared by the registry, the condition builder and the SQL layer.
//!
//! Every parameter that reaches the driver is a [`Value`]; every column a model
//! declares has a [`ValueKind`]. Records travel between models and rows as
//! `serde_json` objects, so this module also owns the kind-guided conversions
//! between the two representations.

use serde::{Deserialize, Serialize};
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::Row;

use crate::error::{EngineError, Result};

/// Storage kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// 64-bit signed integer
    Int,
    /// Double precision float
    Float,
    /// UTF-8 text
    Text,
    /// Opaque byte blob
    Bytes,
    /// Boolean (stored as TINYINT/INTEGER where the backend has no native type)
    Bool,
}

impl ValueKind {
    /// Infer a kind from the serialized form of a field's default value.
    ///
    /// Returns `None` for `null`, which is what an `Option` field serializes to;
    /// such fields must declare their kind explicitly.
    pub fn infer(sample: &serde_json::Value) -> Option<Self> {
        match sample {
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(ValueKind::Int),
            serde_json::Value::Number(_) => Some(ValueKind::Float),
            serde_json::Value::String(_) => Some(ValueKind::Text),
            serde_json::Value::Bool(_) => Some(ValueKind::Bool),
            serde_json::Value::Array(items) if items.iter().all(|v| v.is_u64()) => {
                Some(ValueKind::Bytes)
            }
            _ => None,
        }
    }
}

/// A single bindable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Bytes(_) => Some(ValueKind::Bytes),
            Value::Bool(_) => Some(ValueKind::Bool),
        }
    }

    /// Zero value of a primary key: `0`, `""` or `NULL`.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Int(n) => *n == 0,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Convert a JSON field into a bindable value of the given kind.
    pub fn from_json(json: &serde_json::Value, kind: ValueKind) -> Result<Self> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let value = match (kind, json) {
            (ValueKind::Int, serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|u| u as i64))
                .map(Value::Int),
            (ValueKind::Float, serde_json::Value::Number(n)) => n.as_f64().map(Value::Float),
            (ValueKind::Text, serde_json::Value::String(s)) => Some(Value::Text(s.clone())),
            (ValueKind::Bool, serde_json::Value::Bool(b)) => Some(Value::Bool(*b)),
            (ValueKind::Bytes, serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Bytes),
            _ => None,
        };
        value.ok_or_else(|| {
            EngineError::validation(format!("Type mismatch: expected {:?}, got {}", kind, json))
        })
    }

    /// JSON form used when rebuilding a record from a row.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(n) => serde_json::Value::from(n),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Bytes(b) => serde_json::Value::from(b),
            Value::Bool(b) => serde_json::Value::Bool(b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Bind one value onto a query built against the `Any` driver
pub fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Int(n) => query.bind(n),
        Value::Float(f) => query.bind(f),
        Value::Text(s) => query.bind(s),
        Value::Bytes(b) => query.bind(b),
        Value::Bool(b) => query.bind(b),
    }
}

/// An integer column that arrived as a float; fractional or out-of-range values are refused
fn integral(f: f64) -> Result<i64> {
    if f.fract() != 0.0 || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(EngineError::validation(format!(
            "expected an integer column value, found {}",
            f
        )));
    }
    Ok(f as i64)
}

/// Read one column of a row as JSON, decoding according to the declared kind.
///
/// Backends disagree on the wire type of some kinds (SQLite has no boolean,
/// MySQL reports `COUNT` as a decimal in some modes), so each kind falls back
/// to the nearest compatible representation before giving up.
pub fn decode_column(row: &AnyRow, index: usize, kind: ValueKind) -> Result<serde_json::Value> {
    let value = match kind {
        ValueKind::Int => match row.try_get::<Option<i64>, _>(index) {
            Ok(v) => v.map(Value::Int),
            Err(_) => row
                .try_get::<Option<f64>, _>(index)?
                .map(integral)
                .transpose()?
                .map(Value::Int),
        },
        ValueKind::Float => match row.try_get::<Option<f64>, _>(index) {
            Ok(v) => v.map(Value::Float),
            Err(_) => row
                .try_get::<Option<i64>, _>(index)?
                .map(|n| Value::Float(n as f64)),
        },
        ValueKind::Text => match row.try_get::<Option<String>, _>(index) {
            Ok(v) => v.map(Value::Text),
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned())),
        },
        ValueKind::Bytes => row.try_get::<Option<Vec<u8>>, _>(index)?.map(Value::Bytes),
        ValueKind::Bool => match row.try_get::<Option<bool>, _>(index) {
            Ok(v) => v.map(Value::Bool),
            Err(_) => row
                .try_get::<Option<i64>, _>(index)?
                .map(|n| Value::Bool(n != 0)),
        },
    };
    Ok(value.unwrap_or(Value::Null).into_json())
}
