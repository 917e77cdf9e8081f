//! Portable type tags for mapped fields.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Scalar data types a field may map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Date and time without zone.
    DateTime,
    /// 128-bit identifier.
    Guid,
}

/// Sort direction for ordering and index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float64
        )
    }

    /// Check if this type is an integer.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarType::Int32 | ScalarType::Int64)
    }

    /// Check whether a runtime value may be stored in a field of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ScalarType::Bool, Value::Bool(_)) => true,
            (ScalarType::Int32, Value::Int32(_)) => true,
            (ScalarType::Int64, Value::Int32(_) | Value::Int64(_)) => true,
            (ScalarType::Float64, v) => v.is_numeric(),
            (ScalarType::String, Value::String(_)) => true,
            (ScalarType::Bytes, Value::Bytes(_)) => true,
            (ScalarType::DateTime, Value::DateTime(_)) => true,
            (ScalarType::Guid, Value::Guid(_)) => true,
            _ => false,
        }
    }
}

impl SortOrder {
    /// SQL keyword for this direction.
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}
