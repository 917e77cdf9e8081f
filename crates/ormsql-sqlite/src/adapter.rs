//! File-backed SQLite storage engine adapter.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use ormsql_core::{Connection, Dialect, Error, StorageAdapter};

use crate::config::SqliteConfig;
use crate::connection::SqliteConnection;
use crate::dialect::SqliteDialect;
use crate::error::SqliteError;

/// Storage engine adapter for one SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    config: SqliteConfig,
}

impl SqliteAdapter {
    /// Create an adapter.
    pub fn new(config: SqliteConfig) -> Self {
        Self { config }
    }

    /// Adapter configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Files making up the store: the database plus its journal files.
    fn store_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.config.path.clone()];
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut name = self.config.path.clone().into_os_string();
            name.push(suffix);
            files.push(PathBuf::from(name));
        }
        files
    }

    fn maintenance(&self, sql: &str) -> Result<(), SqliteError> {
        let conn = rusqlite::Connection::open(&self.config.path)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl StorageAdapter for SqliteAdapter {
    fn database_exists(&self) -> Result<bool, Error> {
        Ok(self.config.path.is_file())
    }

    fn create_database(&self) -> Result<(), Error> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(SqliteError::from)?;
            }
        }
        SqliteConnection::open(&self.config, true)?;
        info!(path = %self.config.path.display(), "Created SQLite database");
        Ok(())
    }

    fn delete_database(&self) -> Result<(), Error> {
        for file in self.store_files() {
            if file.exists() {
                fs::remove_file(&file).map_err(SqliteError::from)?;
                debug!(path = %file.display(), "Removed store file");
            }
        }
        Ok(())
    }

    fn new_connection(&self) -> Result<Box<dyn Connection>, Error> {
        Ok(Box::new(SqliteConnection::open(&self.config, false)?))
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::new(SqliteDialect)
    }

    fn compact(&self) -> Result<(), Error> {
        Ok(self.maintenance("VACUUM;")?)
    }

    fn repair(&self) -> Result<(), Error> {
        let conn = rusqlite::Connection::open(&self.config.path).map_err(SqliteError::from)?;
        let report: String = conn
            .query_row("PRAGMA integrity_check;", [], |row| row.get(0))
            .map_err(SqliteError::from)?;
        if report != "ok" {
            return Err(SqliteError::Integrity(report).into());
        }
        conn.execute_batch("REINDEX;").map_err(SqliteError::from)?;
        Ok(())
    }

    fn shrink(&self) -> Result<(), Error> {
        Ok(self.maintenance("PRAGMA wal_checkpoint(TRUNCATE); VACUUM;")?)
    }
}
