//! Interfaces a storage engine adapter implements.

use std::sync::Arc;

use crate::dialect::{Dialect, Parameters};
use crate::error::Error;
use crate::value::Value;

/// Rows returned by a query, fully fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column labels in projection order.
    pub columns: Vec<String>,
    /// Row values, one inner vector per row, aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create a row set.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column label (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Iterate rows.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }
}

/// A borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Value at a position.
    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    /// Value under a column label (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&'a Value> {
        let index = self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))?;
        self.values.get(index)
    }

    /// All values.
    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

/// One open connection to the backing store.
pub trait Connection: Send {
    /// Run a statement that returns no rows, yielding the affected row count.
    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<u64, Error>;

    /// Run a statement and fetch every row.
    fn query(&mut self, sql: &str, params: &Parameters) -> Result<RowSet, Error>;

    /// Run a statement and return the first column of the first row.
    fn query_scalar(&mut self, sql: &str, params: &Parameters) -> Result<Value, Error> {
        let rows = self.query(sql, params)?;
        Ok(rows
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }

    /// Whether the connection can still be used.
    fn is_valid(&mut self) -> bool {
        true
    }
}

/// A storage engine: lifecycle of the store plus a connection factory.
pub trait StorageAdapter: Send + Sync {
    /// Whether the store exists.
    fn database_exists(&self) -> Result<bool, Error>;

    /// Create an empty store.
    fn create_database(&self) -> Result<(), Error>;

    /// Remove the store.
    fn delete_database(&self) -> Result<(), Error>;

    /// Open a new connection.
    fn new_connection(&self) -> Result<Box<dyn Connection>, Error>;

    /// SQL dialect spoken by this engine.
    fn dialect(&self) -> Arc<dyn Dialect>;

    /// Reclaim unused space.
    fn compact(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Check and repair store integrity.
    fn repair(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Shrink store files.
    fn shrink(&self) -> Result<(), Error> {
        Ok(())
    }
}
