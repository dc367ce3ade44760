//! Configuration management module
//!
//! Handles loading, saving, and validation of harness configuration and
//! the datasource settings used by the query workload.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::bench::RunnerConfig;
use crate::models::RunReport;
use crate::util::serde_duration;
use crate::{Result, VtBenchError, APP_NAME, CONFIG_FILE};

pub mod cli;
pub mod datasource;
pub mod persistence;

pub use datasource::DataSourceConfig;

/// Which drain steps the grace period bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutPolicy {
    /// One deadline covers the whole drain in both submission modes
    #[default]
    Uniform,
    /// Only the termination wait is bounded; the async join waits forever
    SyncOnly,
}

/// Harness configuration containing all run parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Tasks submitted per scenario
    pub task_count: usize,
    /// Worker threads in the platform pool
    pub platform_threads: usize,
    /// Blocking time of one sleep task
    #[serde(with = "serde_duration::human")]
    pub task_duration: Duration,
    /// Wait before outstanding tasks are force-cancelled
    #[serde(with = "serde_duration::human")]
    pub grace_period: Duration,
    pub timeout_policy: TimeoutPolicy,
    /// Scalar query issued by the query workload
    pub query: String,
    pub datasource: DataSourceConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            task_count: 1_000,
            platform_threads: default_platform_threads(),
            task_duration: Duration::from_millis(100),
            grace_period: Duration::from_secs(60),
            timeout_policy: TimeoutPolicy::Uniform,
            query: "SELECT pg_sleep(0.1)".to_string(),
            datasource: DataSourceConfig::default(),
        }
    }
}

/// Four platform threads per available processor
pub fn default_platform_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 4
}

impl HarnessConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.task_count == 0 {
            return Err(VtBenchError::ConfigError(
                "Task count must be greater than 0".to_string(),
            ));
        }

        const MAX_TASKS: usize = 1_000_000;
        if self.task_count > MAX_TASKS {
            return Err(VtBenchError::ConfigError(format!(
                "Too many tasks: {} (max: {})",
                self.task_count, MAX_TASKS
            )));
        }

        if self.platform_threads == 0 {
            return Err(VtBenchError::ConfigError(
                "Platform thread count must be greater than 0".to_string(),
            ));
        }

        const MAX_THREADS: usize = 4096;
        if self.platform_threads > MAX_THREADS {
            return Err(VtBenchError::ConfigError(format!(
                "Too many platform threads: {} (max: {})",
                self.platform_threads, MAX_THREADS
            )));
        }

        const MAX_DURATION: Duration = Duration::from_secs(3600); // 1 hour
        if self.task_duration.is_zero() || self.task_duration > MAX_DURATION {
            return Err(VtBenchError::ConfigError(format!(
                "Task duration must be between 1ns and {}s",
                MAX_DURATION.as_secs()
            )));
        }

        if self.grace_period.is_zero() || self.grace_period > MAX_DURATION {
            return Err(VtBenchError::ConfigError(format!(
                "Grace period must be between 1ns and {}s",
                MAX_DURATION.as_secs()
            )));
        }

        if self.query.trim().is_empty() {
            return Err(VtBenchError::ConfigError(
                "Query must not be empty".to_string(),
            ));
        }

        self.datasource.validate()
    }

    /// Runner parameters derived from this configuration
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            task_count: self.task_count,
            grace_period: self.grace_period,
            timeout_policy: self.timeout_policy,
        }
    }

    pub fn with_task_count(mut self, count: usize) -> Self {
        self.task_count = count;
        self
    }

    pub fn with_platform_threads(mut self, count: usize) -> Self {
        self.platform_threads = count;
        self
    }

    pub fn with_task_duration(mut self, duration: Duration) -> Self {
        self.task_duration = duration;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_datasource(mut self, datasource: DataSourceConfig) -> Self {
        self.datasource = datasource;
        self
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load configuration from `path`, defaulting when it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            VtBenchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            VtBenchError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                VtBenchError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|e| {
            VtBenchError::ConfigError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/vtbench/vtbench.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            VtBenchError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

/// Configuration manager for handling config and results persistence
pub struct ConfigManager {
    config_path: PathBuf,
    results: persistence::ResultsStorage,
}

impl ConfigManager {
    /// Create a manager over the standard locations
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: HarnessConfig::config_file_path()?,
            results: persistence::ResultsStorage::new()?,
        })
    }

    /// Create a manager over explicit locations
    pub fn with_paths(config_path: PathBuf, results_path: PathBuf) -> Self {
        Self {
            config_path,
            results: persistence::ResultsStorage::at(results_path),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file or return default
    pub fn load_config(&self) -> Result<HarnessConfig> {
        HarnessConfig::load_from(&self.config_path)
    }

    pub fn save_config(&self, config: &HarnessConfig) -> Result<()> {
        config.save_to(&self.config_path)
    }

    pub fn save_report(&self, report: RunReport) -> Result<()> {
        self.results.append_report(report)
    }

    /// Get the most recent reports (up to limit), newest first
    pub fn get_recent_reports(&self, limit: usize) -> Result<Vec<RunReport>> {
        let mut reports = self.results.load_reports()?;
        reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        reports.truncate(limit);
        Ok(reports)
    }
}
