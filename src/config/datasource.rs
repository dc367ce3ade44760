//! Connection-pool configuration for the query workload

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::serde_duration;
use crate::{Result, VtBenchError};

/// Drivers the query workload can talk to
pub const SUPPORTED_DRIVERS: &[&str] = &["sqlite"];

/// Datasource and pool settings, all supplied from outside the harness
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Database location: ":memory:", a file path or a `file:` URI
    pub url: String,
    pub username: String,
    pub password: String,
    /// Driver identity, see [`SUPPORTED_DRIVERS`]
    pub driver: String,
    /// Longest a task waits for a free connection
    #[serde(with = "serde_duration::human")]
    pub connection_timeout: Duration,
    /// Busy timeout while checking a reused connection
    #[serde(with = "serde_duration::human")]
    pub validation_timeout: Duration,
    /// Connections opened when the pool is built
    pub minimum_idle: usize,
    /// Connections older than this are closed rather than reused
    #[serde(with = "serde_duration::human")]
    pub max_lifetime: Duration,
    /// Hard cap on open connections
    pub maximum_pool_size: usize,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            url: ":memory:".to_string(),
            username: "vtbench".to_string(),
            password: String::new(),
            driver: "sqlite".to_string(),
            connection_timeout: Duration::from_millis(3000),
            validation_timeout: Duration::from_millis(3000),
            minimum_idle: 5,
            max_lifetime: Duration::from_millis(240_000),
            maximum_pool_size: 20,
        }
    }
}

// Keeps the password out of logs
impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("driver", &self.driver)
            .field("connection_timeout", &self.connection_timeout)
            .field("validation_timeout", &self.validation_timeout)
            .field("minimum_idle", &self.minimum_idle)
            .field("max_lifetime", &self.max_lifetime)
            .field("maximum_pool_size", &self.maximum_pool_size)
            .finish()
    }
}

impl DataSourceConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_maximum_pool_size(mut self, size: usize) -> Self {
        self.maximum_pool_size = size;
        self
    }

    pub fn with_minimum_idle(mut self, idle: usize) -> Self {
        self.minimum_idle = idle;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_DRIVERS.contains(&self.driver.as_str()) {
            return Err(VtBenchError::ConfigError(format!(
                "Unsupported driver '{}' (supported: {})",
                self.driver,
                SUPPORTED_DRIVERS.join(", ")
            )));
        }

        if self.url.trim().is_empty() {
            return Err(VtBenchError::ConfigError(
                "Datasource url must not be empty".to_string(),
            ));
        }

        if self.maximum_pool_size == 0 {
            return Err(VtBenchError::ConfigError(
                "maximum_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.minimum_idle > self.maximum_pool_size {
            return Err(VtBenchError::ConfigError(format!(
                "minimum_idle ({}) exceeds maximum_pool_size ({})",
                self.minimum_idle, self.maximum_pool_size
            )));
        }

        if self.connection_timeout.is_zero() {
            return Err(VtBenchError::ConfigError(
                "connection_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_lifetime.is_zero() {
            return Err(VtBenchError::ConfigError(
                "max_lifetime must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
