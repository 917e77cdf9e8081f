//! Runtime values bound as statement parameters and read back from rows.

use std::fmt;

use chrono::NaiveDateTime;
use uuid::Uuid;

/// Text layout used when date-times travel as strings.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A runtime value that can be bound to a statement or read from a row.
///
/// Each variant corresponds to one portable `ScalarType` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Date and time without zone.
    DateTime(NaiveDateTime),
    /// 128-bit identifier.
    Guid(Uuid),
}

/// Hashable projection of a key value, used by the identity cache.
///
/// Integer widths unify so that a key read as `Int64` matches one bound as
/// `Int32`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Boolean key.
    Bool(bool),
    /// Integer key of any width.
    Int(i64),
    /// Float key by bit pattern.
    Float(u64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Date-time key.
    DateTime(NaiveDateTime),
    /// GUID key.
    Guid(Uuid),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Int64(_) | Value::Float64(_))
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int32(i) => Some(*i != 0),
            Value::Int64(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int32(i) => Some(f64::from(*i)),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Guid(_) => "guid",
        }
    }

    /// Hashable key for this value, or `None` when the value is null.
    pub fn identity_key(&self) -> Option<IdentityKey> {
        let key = match self {
            Value::Null => return None,
            Value::Bool(b) => IdentityKey::Bool(*b),
            Value::Int32(i) => IdentityKey::Int(i64::from(*i)),
            Value::Int64(i) => IdentityKey::Int(*i),
            Value::Float64(f) => IdentityKey::Float(f.to_bits()),
            Value::String(s) => IdentityKey::Text(s.clone()),
            Value::Bytes(b) => IdentityKey::Bytes(b.clone()),
            Value::DateTime(dt) => IdentityKey::DateTime(*dt),
            Value::Guid(g) => IdentityKey::Guid(*g),
        };
        Some(key)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Guid(g) => write!(f, "{}", g),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    Uuid => Guid,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion from a row value into a Rust field type.
///
/// Conversions tolerate the representations storage engines commonly hand
/// back: integers for booleans, 64-bit integers for narrower ones, text for
/// date-times, and blobs or text for GUIDs.
pub trait FromValue: Sized {
    /// Convert, or describe why the value does not fit.
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {}, found {}", expected, value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_i64().ok_or_else(|| mismatch("int64", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = value.as_i64().ok_or_else(|| mismatch("int32", value))?;
        i32::try_from(wide).map_err(|_| format!("{} does not fit in int32", wide))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_f64().ok_or_else(|| mismatch("float64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("string", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .map_err(|e| format!("invalid datetime '{}': {}", s, e)),
            _ => Err(mismatch("datetime", value)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Guid(g) => Ok(*g),
            Value::Bytes(b) => Uuid::from_slice(b).map_err(|e| e.to_string()),
            Value::String(s) => Uuid::parse_str(s).map_err(|e| e.to_string()),
            _ => Err(mismatch("guid", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
