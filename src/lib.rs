//! vtbench - platform vs virtual thread benchmark harness
//!
//! Submits a fixed batch of blocking tasks to either a bounded pool of OS
//! threads or to one lightweight task per submission, waits for the batch to
//! drain and reports the wall-clock time it took.

use std::fmt;

pub mod bench;
pub mod config;
pub mod db;
pub mod models;
pub mod suite;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum VtBenchError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// Execution context set could not be built or used
    ExecutorError(String),
    /// Datasource could not be opened
    DataSourceError(String),
    /// Connection pool could not hand out a connection
    PoolError(String),
    /// Query against the datasource failed
    QueryError(String),
    /// Results persistence error
    PersistenceError(String),
    /// Task observed the cancellation signal
    Cancelled,
}

impl fmt::Display for VtBenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VtBenchError::IoError(err) => write!(f, "I/O error: {}", err),
            VtBenchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            VtBenchError::ExecutorError(msg) => write!(f, "Executor error: {}", msg),
            VtBenchError::DataSourceError(msg) => write!(f, "Datasource error: {}", msg),
            VtBenchError::PoolError(msg) => write!(f, "Connection pool error: {}", msg),
            VtBenchError::QueryError(msg) => write!(f, "Query error: {}", msg),
            VtBenchError::PersistenceError(msg) => write!(f, "Results persistence error: {}", msg),
            VtBenchError::Cancelled => write!(f, "Task cancelled"),
        }
    }
}

impl std::error::Error for VtBenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VtBenchError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VtBenchError {
    fn from(err: std::io::Error) -> Self {
        VtBenchError::IoError(err)
    }
}

impl From<serde_json::Error> for VtBenchError {
    fn from(err: serde_json::Error) -> Self {
        VtBenchError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for VtBenchError {
    fn from(err: toml::de::Error) -> Self {
        VtBenchError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for VtBenchError {
    fn from(err: toml::ser::Error) -> Self {
        VtBenchError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

impl From<rusqlite::Error> for VtBenchError {
    fn from(err: rusqlite::Error) -> Self {
        VtBenchError::QueryError(err.to_string())
    }
}

/// Result type alias for vtbench operations
pub type Result<T> = std::result::Result<T, VtBenchError>;

/// Error handling utilities
pub mod error {
    use super::VtBenchError;

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &VtBenchError) -> String {
        match error {
            VtBenchError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            VtBenchError::ExecutorError(_) => {
                "Could not start worker threads. Lower --threads or check process limits."
                    .to_string()
            }
            VtBenchError::DataSourceError(msg) => {
                format!("Could not open the datasource: {}. Check the url and driver.", msg)
            }
            VtBenchError::PoolError(_) => {
                "No database connection became available. Raise maximum_pool_size or connection_timeout."
                    .to_string()
            }
            VtBenchError::PersistenceError(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            _ => error.to_string(),
        }
    }

    /// Whether the error aborts a whole benchmark run rather than one task
    pub fn is_fatal(error: &VtBenchError) -> bool {
        match error {
            VtBenchError::PoolError(_) | VtBenchError::QueryError(_) | VtBenchError::Cancelled => {
                false
            }
            VtBenchError::IoError(_)
            | VtBenchError::ConfigError(_)
            | VtBenchError::ExecutorError(_)
            | VtBenchError::DataSourceError(_)
            | VtBenchError::PersistenceError(_) => true,
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "vtbench";
pub const CONFIG_FILE: &str = "vtbench.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const MAX_RESULTS_HISTORY: usize = 100;
