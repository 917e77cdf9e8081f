//! Error types for the SQLite adapter.

use thiserror::Error;

/// Failures raised by the SQLite adapter before they are handed to the core.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while creating or removing the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A bound parameter has no placeholder in the statement.
    #[error("parameter {0} does not appear in the statement")]
    UnboundParameter(String),

    /// A text column did not hold valid UTF-8.
    #[error("column {0} holds text that is not valid UTF-8")]
    InvalidText(usize),

    /// `PRAGMA integrity_check` reported problems.
    #[error("integrity check failed: {0}")]
    Integrity(String),
}

impl From<SqliteError> for ormsql_core::Error {
    fn from(err: SqliteError) -> Self {
        ormsql_core::Error::storage(err)
    }
}
