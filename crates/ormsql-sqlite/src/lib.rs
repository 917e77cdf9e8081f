//! ORMSQL SQLite - Storage engine adapter for SQLite.
//!
//! Provides a file-backed [`StorageAdapter`](ormsql_core::StorageAdapter)
//! over `rusqlite` together with the matching [`SqliteDialect`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use ormsql_core::Engine;
//! use ormsql_sqlite::{SqliteAdapter, SqliteConfig};
//!
//! let adapter = SqliteAdapter::new(SqliteConfig::new("library.db"));
//! let engine = Engine::new(Arc::new(adapter));
//! engine.register::<Author>()?;
//! engine.ensure_compatibility()?;
//! ```

mod adapter;
mod config;
mod connection;
mod dialect;
mod error;

pub use adapter::SqliteAdapter;
pub use config::{JournalMode, SqliteConfig, DEFAULT_BUSY_TIMEOUT};
pub use connection::SqliteConnection;
pub use dialect::SqliteDialect;
pub use error::SqliteError;
