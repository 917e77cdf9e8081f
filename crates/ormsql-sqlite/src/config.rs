//! SQLite adapter configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time a connection waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// Write-ahead log; readers do not block the writer.
    #[default]
    Wal,
    /// Rollback journal deleted at the end of each transaction.
    Delete,
}

impl JournalMode {
    /// Value for `PRAGMA journal_mode`.
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
        }
    }
}

/// Configuration for a [`SqliteAdapter`](crate::SqliteAdapter).
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file.
    pub path: PathBuf,
    /// Busy timeout applied to every connection.
    pub busy_timeout: Duration,
    /// Journal mode set when a connection opens.
    pub journal_mode: JournalMode,
    /// Whether foreign key constraints are enforced.
    pub foreign_keys: bool,
}

impl SqliteConfig {
    /// Configuration for a database file with default settings.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            journal_mode: JournalMode::default(),
            foreign_keys: true,
        }
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the journal mode.
    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SqliteConfig::new("store.db");
        assert_eq!(config.path, PathBuf::from("store.db"));
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert!(config.foreign_keys);
    }

    #[test]
    fn test_config_builder() {
        let config = SqliteConfig::new("store.db")
            .with_busy_timeout(Duration::from_millis(250))
            .with_journal_mode(JournalMode::Delete)
            .with_foreign_keys(false);

        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.journal_mode.pragma_value(), "delete");
        assert!(!config.foreign_keys);
    }
}
