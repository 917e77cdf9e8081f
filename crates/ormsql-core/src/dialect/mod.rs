//! Vendor-specific SQL syntax.
//!
//! Everything that differs between storage engines lives behind the
//! [`Dialect`] trait: identifier quoting, parameter naming, column types,
//! identity columns, paging, transaction control and live-schema
//! inspection. The statement builder and schema reconciler only ever talk
//! to a `&dyn Dialect`.

mod ansi;
mod schema;

pub use ansi::AnsiDialect;
pub use schema::{LiveColumn, SchemaChecker};

use serde::{Deserialize, Serialize};

use crate::catalog::{DefaultValue, FieldDescriptor, ScalarType};
use crate::value::{Value, DATETIME_FORMAT};

/// A named statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Placeholder name including the dialect prefix (`@p0`).
    pub name: String,
    /// Bound value.
    pub value: Value,
}

impl Parameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Ordered parameter list shared by every node rendering into one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    items: Vec<Parameter>,
}

impl Parameters {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn push(&mut self, parameter: Parameter) {
        self.items.push(parameter);
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in placeholder order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.items.iter()
    }

    /// Look up a parameter by placeholder name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    /// Bound values in placeholder order.
    pub fn values(&self) -> Vec<&Value> {
        self.items.iter().map(|p| &p.value).collect()
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Dirty reads allowed.
    ReadUncommitted,
    /// Only committed data is visible.
    #[default]
    ReadCommitted,
    /// Rows read stay stable.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling of the level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// SQL syntax of one storage engine.
pub trait Dialect: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Quote an identifier.
    fn quote(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    /// Prefix of parameter placeholders.
    fn param_prefix(&self) -> &'static str {
        "@"
    }

    /// Build a parameter object.
    fn create_parameter(&self, name: &str, value: Value) -> Parameter {
        Parameter::new(name, value)
    }

    /// Append `value` to `params` and return its placeholder.
    ///
    /// Names are positional (`p0`, `p1`, ...) within one statement.
    fn add_param(&self, value: Value, params: &mut Parameters) -> String {
        let name = format!("{}p{}", self.param_prefix(), params.len());
        params.push(self.create_parameter(&name, value));
        name
    }

    /// Column type for a field.
    fn column_type(&self, field: &FieldDescriptor) -> String;

    /// Clause marking a store-assigned key column.
    fn identity_clause(&self) -> &'static str;

    /// Whether the identity clause already declares the primary key.
    fn inline_identity_primary_key(&self) -> bool {
        false
    }

    /// Statement returning the key assigned by the last insert on a connection.
    fn last_identity_sql(&self) -> &'static str;

    /// `TOP n` style prefix placed after `SELECT`.
    fn top_prefix(&self, _limit: usize) -> Option<String> {
        None
    }

    /// `LIMIT n` style suffix placed at the end of a select.
    fn limit_suffix(&self, _limit: usize) -> Option<String> {
        None
    }

    /// Whether `SET` targets in an update are written `[T].[c]`.
    fn qualify_update_targets(&self) -> bool {
        true
    }

    /// Keyword sequence introducing a new column in `ALTER TABLE`.
    fn add_column_keyword(&self) -> &'static str {
        "ADD"
    }

    /// Whether keys can be added to an existing table.
    fn supports_alter_constraints(&self) -> bool {
        true
    }

    /// Statements opening a transaction.
    fn begin_transaction_sql(&self, isolation: IsolationLevel) -> Vec<String>;

    /// Statement committing a transaction.
    fn commit_sql(&self) -> &'static str {
        "COMMIT;"
    }

    /// Statement rolling back a transaction.
    fn rollback_sql(&self) -> &'static str {
        "ROLLBACK;"
    }

    /// Inspector for the live schema.
    fn schema_checker(&self) -> Box<dyn SchemaChecker>;

    /// SQL literal for a constant, used in DDL defaults.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Value::Int32(i) => i.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => format!("{:?}", f),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Bytes(b) => format!("X'{}'", hex::encode(b)),
            Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
            Value::Guid(g) => format!("'{}'", g),
        }
    }

    /// SQL for a default value policy.
    fn default_literal(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Value(value) => self.literal(value),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    /// Default used to backfill a required column added to a populated table.
    fn backfill_literal(&self, field: &FieldDescriptor) -> String {
        if let Some(default) = &field.default {
            return self.default_literal(default);
        }
        match field.scalar {
            ScalarType::Bool | ScalarType::Int32 | ScalarType::Int64 => "0".to_string(),
            ScalarType::Float64 => "0.0".to_string(),
            ScalarType::String => "''".to_string(),
            ScalarType::Bytes => "X''".to_string(),
            ScalarType::DateTime => "'1970-01-01 00:00:00'".to_string(),
            ScalarType::Guid => format!("'{}'", uuid::Uuid::nil()),
        }
    }
}
