use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Scalar stored under an `(origin, key)` pair.
///
/// Deserializing also accepts JSON booleans, stored as `1`/`0` the way SQLite
/// binds them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SiteValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl<'de> Deserialize<'de> for SiteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireScalar::deserialize(deserializer)? {
            WireScalar::Bool(b) => SiteValue::from(b),
            WireScalar::Integer(n) => SiteValue::Integer(n),
            WireScalar::Real(f) => SiteValue::Real(f),
            WireScalar::Text(s) => SiteValue::Text(s),
            WireScalar::Null => SiteValue::Null,
        })
    }
}

/// Loose truthiness of an arbitrary JSON value. Arrays and objects are
/// truthy even when empty.
pub fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

impl SiteValue {
    /// Truthiness as the browser-facing callers understand it: empty text,
    /// zero, NaN and null are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            SiteValue::Integer(n) => *n != 0,
            SiteValue::Real(f) => *f != 0.0 && !f.is_nan(),
            SiteValue::Text(s) => !s.is_empty(),
            SiteValue::Null => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SiteValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SiteValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SiteValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Map a JSON value onto a scalar. Booleans become `1`/`0`; arrays and
    /// objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SiteValue::Null,
            serde_json::Value::Bool(b) => SiteValue::from(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SiteValue::Integer(i),
                None => n.as_f64().map(SiteValue::Real).unwrap_or(SiteValue::Null),
            },
            serde_json::Value::String(s) => SiteValue::Text(s.clone()),
            other => SiteValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SiteValue::Integer(n) => serde_json::Value::from(*n),
            SiteValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SiteValue::Text(s) => serde_json::Value::String(s.clone()),
            SiteValue::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for SiteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteValue::Integer(n) => write!(f, "{n}"),
            SiteValue::Real(v) => write!(f, "{v}"),
            SiteValue::Text(s) => f.write_str(s),
            SiteValue::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for SiteValue {
    fn from(s: &str) -> Self {
        SiteValue::Text(s.to_string())
    }
}

impl From<String> for SiteValue {
    fn from(s: String) -> Self {
        SiteValue::Text(s)
    }
}

impl From<i64> for SiteValue {
    fn from(n: i64) -> Self {
        SiteValue::Integer(n)
    }
}

impl From<i32> for SiteValue {
    fn from(n: i32) -> Self {
        SiteValue::Integer(n.into())
    }
}

impl From<f64> for SiteValue {
    fn from(f: f64) -> Self {
        SiteValue::Real(f)
    }
}

impl From<bool> for SiteValue {
    fn from(b: bool) -> Self {
        SiteValue::Integer(i64::from(b))
    }
}

impl<T: Into<SiteValue>> From<Option<T>> for SiteValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SiteValue::Null)
    }
}

impl ToSql for SiteValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SiteValue::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            SiteValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SiteValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SiteValue::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl FromSql for SiteValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => SiteValue::Null,
            ValueRef::Integer(n) => SiteValue::Integer(n),
            ValueRef::Real(f) => SiteValue::Real(f),
            ValueRef::Text(t) => std::str::from_utf8(t)
                .map(|s| SiteValue::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e)))?,
            // Only blobs holding UTF-8 text have a scalar reading.
            ValueRef::Blob(b) => std::str::from_utf8(b)
                .map(|s| SiteValue::Text(s.to_string()))
                .map_err(|_| FromSqlError::InvalidType)?,
        })
    }
}
