//! Values passed as statement parameters and returned in result rows.
//!
//! Serialization to the wire format is the connection's concern; the pool
//! only moves these values around.

use uuid::Uuid;

/// A single CQL value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CqlValue {
    /// The CQL empty value, distinct from null (a null column is
    /// represented as `None` in a [`Row`](crate::Row)).
    Empty,
    /// `boolean`
    Boolean(bool),
    /// `int`
    Int(i32),
    /// `bigint` / `counter`
    BigInt(i64),
    /// `double`
    Double(f64),
    /// `text` / `varchar` / `ascii`
    Text(String),
    /// `blob`
    Blob(Vec<u8>),
    /// `uuid` / `timeuuid`
    Uuid(Uuid),
    /// `list` / `set`
    List(Vec<CqlValue>),
    /// `map`
    Map(Vec<(CqlValue, CqlValue)>),
}

impl CqlValue {
    /// Returns the value as text, if it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an `int`, if it is one.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            CqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a `bigint`, if it is one.
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            CqlValue::BigInt(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for CqlValue {
    fn from(v: bool) -> CqlValue {
        CqlValue::Boolean(v)
    }
}

impl From<i32> for CqlValue {
    fn from(v: i32) -> CqlValue {
        CqlValue::Int(v)
    }
}

impl From<i64> for CqlValue {
    fn from(v: i64) -> CqlValue {
        CqlValue::BigInt(v)
    }
}

impl From<f64> for CqlValue {
    fn from(v: f64) -> CqlValue {
        CqlValue::Double(v)
    }
}

impl From<&str> for CqlValue {
    fn from(v: &str) -> CqlValue {
        CqlValue::Text(v.to_owned())
    }
}

impl From<String> for CqlValue {
    fn from(v: String) -> CqlValue {
        CqlValue::Text(v)
    }
}

impl From<Vec<u8>> for CqlValue {
    fn from(v: Vec<u8>) -> CqlValue {
        CqlValue::Blob(v)
    }
}

impl From<Uuid> for CqlValue {
    fn from(v: Uuid) -> CqlValue {
        CqlValue::Uuid(v)
    }
}
