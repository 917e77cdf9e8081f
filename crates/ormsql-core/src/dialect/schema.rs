//! Live-schema inspection.

use crate::error::Error;
use crate::storage::Connection;

/// A column as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Declared type as reported by the store.
    pub declared_type: String,
    /// Whether the column accepts null.
    pub nullable: bool,
}

/// Reads table, column, key and index metadata from a live store.
///
/// Name comparisons made against the results are case-insensitive.
pub trait SchemaChecker: Send + Sync {
    /// Whether a table exists.
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool, Error>;

    /// Columns of a table in ordinal order.
    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>, Error>;

    /// Columns making up the primary key.
    fn primary_key(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error>;

    /// Local columns covered by a foreign key.
    fn foreign_keys(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error>;

    /// Names of indexes, excluding ones the store creates implicitly.
    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<String>, Error>;
}
