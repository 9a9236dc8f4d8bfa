//! Parameter and column values exchanged with the SQL backend.
//!
//! `SqlValue` is what a command parameter carries and what a result row
//! column holds. `ValueType` is the storage type a document member is
//! registered with, which decides how its JSON locator is cast.

use crate::config::EnumStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// A single SQL parameter or column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(Value),
    TextArray(Vec<String>),
    IntArray(Vec<i64>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Json(_) => "json",
            SqlValue::TextArray(_) => "text[]",
            SqlValue::IntArray(_) => "int[]",
        }
    }

    /// Convert into the JSON representation a serializer would produce for
    /// the same value.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => Value::from(*f),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Uuid(u) => Value::String(u.to_string()),
            SqlValue::Timestamp(t) => Value::String(t.to_rfc3339()),
            SqlValue::Json(v) => v.clone(),
            SqlValue::TextArray(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            SqlValue::IntArray(items) => Value::Array(items.iter().map(|i| Value::from(*i)).collect()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Text(s) => write!(f, "'{}'", s),
            SqlValue::Uuid(u) => write!(f, "'{}'", u),
            SqlValue::Timestamp(t) => write!(f, "'{}'", t.to_rfc3339()),
            SqlValue::Json(v) => write!(f, "'{}'", v),
            SqlValue::TextArray(items) => write!(f, "{:?}", items),
            SqlValue::IntArray(items) => write!(f, "{:?}", items),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(value: Vec<String>) -> Self {
        SqlValue::TextArray(value)
    }
}

impl From<Vec<&str>> for SqlValue {
    fn from(value: Vec<&str>) -> Self {
        SqlValue::TextArray(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<i64>> for SqlValue {
    fn from(value: Vec<i64>) -> Self {
        SqlValue::IntArray(value)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// An enum usable as a query value, written as its name or ordinal
/// depending on the store's `EnumStorage`
pub trait QueryEnum: Copy + Send + Sync + 'static {
    /// Every variant, in declaration order
    fn variants() -> &'static [Self];

    fn name(&self) -> &'static str;

    fn ordinal(&self) -> i64;

    fn to_sql(&self, storage: EnumStorage) -> SqlValue {
        match storage {
            EnumStorage::AsString => SqlValue::Text(self.name().to_string()),
            EnumStorage::AsInteger => SqlValue::Int(self.ordinal()),
        }
    }
}

/// Storage type of a document member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Text,
    Int,
    BigInt,
    Float,
    Bool,
    Uuid,
    Timestamp,
    Json,
}

impl ValueType {
    /// PostgreSQL type name
    pub fn pg_type(&self) -> &'static str {
        match self {
            ValueType::Text => "varchar",
            ValueType::Int => "integer",
            ValueType::BigInt => "bigint",
            ValueType::Float => "double precision",
            ValueType::Bool => "boolean",
            ValueType::Uuid => "uuid",
            ValueType::Timestamp => "timestamp with time zone",
            ValueType::Json => "jsonb",
        }
    }

    /// Wrap a raw text extraction (`->>`) so it compares as this type.
    pub fn cast(&self, raw_text_locator: &str) -> String {
        match self {
            ValueType::Text => raw_text_locator.to_string(),
            other => format!("CAST({} as {})", raw_text_locator, other.pg_type()),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ValueType::Json)
    }
}
