//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pool::PoolConfig;
use crate::error::Error;

/// Default number of pooled read connections.
pub const DEFAULT_READ_POOL_SIZE: usize = 20;

/// Default number of pooled write connections.
///
/// Several engines serialize writers, so one is the safe default.
pub const DEFAULT_WRITE_POOL_SIZE: usize = 1;

/// Default number of immediate retries when opening a connection fails.
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Read pool capacity.
    pub read_pool_size: usize,

    /// Write pool capacity.
    pub write_pool_size: usize,

    /// Upper bound on waiting for a pooled connection. None waits forever.
    #[serde(with = "millis")]
    pub acquire_timeout: Option<Duration>,

    /// Immediate retries when opening a connection fails.
    pub connect_retries: u32,

    /// Register entity types on first use instead of failing.
    pub auto_register: bool,
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            write_pool_size: DEFAULT_WRITE_POOL_SIZE,
            acquire_timeout: None,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            auto_register: true,
        }
    }

    /// Parse a configuration from JSON; missing keys take defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the read pool capacity.
    pub fn with_read_pool_size(mut self, size: usize) -> Self {
        self.read_pool_size = size;
        self
    }

    /// Set the write pool capacity.
    pub fn with_write_pool_size(mut self, size: usize) -> Self {
        self.write_pool_size = size;
        self
    }

    /// Bound the wait for a pooled connection.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the number of connect retries.
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Enable or disable registration on first use.
    pub fn with_auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub(crate) fn read_pool(&self) -> PoolConfig {
        PoolConfig::new(self.read_pool_size)
            .with_acquire_timeout(self.acquire_timeout)
            .with_connect_retries(self.connect_retries)
    }

    pub(crate) fn write_pool(&self) -> PoolConfig {
        PoolConfig::new(self.write_pool_size)
            .with_acquire_timeout(self.acquire_timeout)
            .with_connect_retries(self.connect_retries)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.read_pool_size, 20);
        assert_eq!(config.write_pool_size, 1);
        assert_eq!(config.acquire_timeout, None);
        assert_eq!(config.connect_retries, 3);
        assert!(config.auto_register);
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_read_pool_size(4)
            .with_acquire_timeout(Duration::from_millis(250))
            .with_auto_register(false);

        assert_eq!(config.read_pool().capacity, 4);
        assert_eq!(config.write_pool().capacity, 1);
        assert_eq!(config.read_pool().acquire_timeout, Some(Duration::from_millis(250)));
        assert!(!config.auto_register);
    }

    #[test]
    fn test_from_json() {
        let config =
            EngineConfig::from_json(r#"{"read_pool_size": 5, "acquire_timeout": 1500}"#).unwrap();
        assert_eq!(config.read_pool_size, 5);
        assert_eq!(config.write_pool_size, 1);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(1500)));

        let round = EngineConfig::from_json(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round, config);

        assert!(matches!(
            EngineConfig::from_json("{\"read_pool_size\": \"many\"}"),
            Err(Error::Config(_))
        ));
    }
}
