//! Run report data models
//!
//! Contains structures for storing and serializing the measurements of one
//! invocation across the scenario matrix.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::bench::{DrainOutcome, Measurement};
use crate::config::{HarnessConfig, TimeoutPolicy};
use crate::util::serde_duration;

/// Task body family a report was produced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// Fixed sleep per task
    Sleep,
    /// One blocking scalar query per task
    Query,
    /// Instrumented sleep that records peak concurrency
    Probe,
}

impl Workload {
    pub fn description(&self) -> &'static str {
        match self {
            Workload::Sleep => "sleep",
            Workload::Query => "db-io",
            Workload::Probe => "probe",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Settings that shaped a run, without datasource credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    pub task_count: usize,
    pub platform_threads: usize,
    #[serde(with = "serde_duration::nanos")]
    pub task_duration: Duration,
    #[serde(with = "serde_duration::nanos")]
    pub grace_period: Duration,
    pub timeout_policy: TimeoutPolicy,
}

impl From<&HarnessConfig> for RunSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            task_count: config.task_count,
            platform_threads: config.platform_threads,
            task_duration: config.task_duration,
            grace_period: config.grace_period,
            timeout_policy: config.timeout_policy,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings::from(&HarnessConfig::default())
    }
}

/// Measurements of one workload across the scenarios that were run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
    pub workload: Workload,
    #[serde(default)]
    pub settings: RunSettings,
    pub measurements: Vec<Measurement>,
    pub system_info: SystemInfo,
}

impl RunReport {
    /// Create a report with detected system info
    pub fn new(workload: Workload, settings: RunSettings, measurements: Vec<Measurement>) -> Self {
        Self {
            timestamp: Utc::now(),
            workload,
            settings,
            measurements,
            system_info: SystemInfo::detect(),
        }
    }

    /// Create a report with custom system info and default settings
    pub fn with_system_info(
        workload: Workload,
        measurements: Vec<Measurement>,
        system_info: SystemInfo,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            workload,
            settings: RunSettings::default(),
            measurements,
            system_info,
        }
    }

    /// One line per measurement, prefixed with the workload when asked
    pub fn console_lines(&self, with_workload: bool) -> Vec<String> {
        self.measurements
            .iter()
            .map(|m| {
                if with_workload {
                    format!("[{}] {}", self.workload, m.console_line())
                } else {
                    m.console_line()
                }
            })
            .collect()
    }

    /// Get a human-readable summary of the report
    pub fn summary(&self) -> String {
        let scenarios = self
            .measurements
            .iter()
            .map(|m| format!("{} {}ms", m.scenario.slug(), m.elapsed_millis()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} - {} - {} tasks - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.workload,
            self.settings.task_count,
            scenarios
        )
    }

    /// Fastest platform measurement divided by fastest lightweight one
    pub fn speedup(&self) -> Option<f64> {
        let fastest = |platform: bool| {
            self.measurements
                .iter()
                .filter(|m| m.drain == DrainOutcome::Drained)
                .filter(|m| m.scenario.strategy.concurrency_limit().is_some() == platform)
                .map(|m| m.elapsed)
                .min()
        };

        let platform = fastest(true)?;
        let lightweight = fastest(false)?;
        if lightweight.is_zero() {
            return None;
        }
        Some(platform.as_secs_f64() / lightweight.as_secs_f64())
    }

    /// Whether any scenario hit the grace period
    pub fn any_forced_shutdown(&self) -> bool {
        self.measurements
            .iter()
            .any(|m| m.drain == DrainOutcome::ForcedShutdown)
    }
}

/// System information captured at run time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    /// Operating system and architecture
    pub os: String,
    /// Logical processors visible to the process
    pub logical_cpus: usize,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            logical_cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl SystemInfo {
    /// Create system info by detecting current system
    pub fn detect() -> Self {
        Self::default()
    }
}
