//! Command-line argument parsing
//!
//! Flags given on the command line override values loaded from the
//! configuration file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use super::{HarnessConfig, TimeoutPolicy};
use crate::bench::Scenario;
use crate::models::Workload;
use crate::util::parse_duration;

/// Scenario identifiers accepted by `--scenario`
pub const SCENARIO_SLUGS: [&str; 4] = [
    "platform-sync",
    "platform-async",
    "virtual-sync",
    "virtual-async",
];

/// Platform vs virtual thread benchmark harness
#[derive(Parser, Debug, Clone)]
#[command(name = "vtbench")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Log debug events
    #[arg(short = 'v', long = "verbose", global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors and hide progress bars
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Configuration file to use instead of the standard location
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one or more workloads across the scenario matrix
    Run(RunArgs),
    /// Print saved run reports, newest first
    History {
        /// Number of reports to show
        #[arg(long = "limit", default_value_t = 10)]
        limit: usize,
    },
    /// Inspect or persist the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the effective configuration to the config file
    Save,
    /// Print the config file location
    Path,
}

/// Workloads selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WorkloadSelection {
    #[default]
    Sleep,
    Query,
    Probe,
    /// Sleep, then query
    All,
}

impl WorkloadSelection {
    pub fn workloads(&self) -> Vec<Workload> {
        match self {
            WorkloadSelection::Sleep => vec![Workload::Sleep],
            WorkloadSelection::Query => vec![Workload::Query],
            WorkloadSelection::Probe => vec![Workload::Probe],
            WorkloadSelection::All => vec![Workload::Sleep, Workload::Query],
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Workload to run
    #[arg(short = 'w', long = "workload", value_enum, default_value_t = WorkloadSelection::Sleep)]
    pub workload: WorkloadSelection,

    /// Tasks submitted per scenario
    #[arg(short = 'n', long = "tasks")]
    pub tasks: Option<usize>,

    /// Worker threads in the platform pool
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Blocking time of one sleep task (e.g. 100ms)
    #[arg(long = "task-duration", value_parser = parse_duration)]
    pub task_duration: Option<Duration>,

    /// Wait before outstanding tasks are cancelled (e.g. 60s)
    #[arg(long = "grace-period", value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    /// Which drain steps the grace period bounds
    #[arg(long = "timeout-policy", value_enum)]
    pub timeout_policy: Option<TimeoutPolicy>,

    /// Scalar query for the query workload
    #[arg(long = "query")]
    pub query: Option<String>,

    /// Datasource url for the query workload
    #[arg(long = "db-url")]
    pub db_url: Option<String>,

    /// Connection pool size for the query workload
    #[arg(long = "pool-size")]
    pub pool_size: Option<usize>,

    /// Scenario to run; repeat to pick several (default: all four)
    #[arg(short = 's', long = "scenario", value_parser = SCENARIO_SLUGS, action = clap::ArgAction::Append)]
    pub scenarios: Vec<String>,

    /// Append the report to the run history
    #[arg(long = "save")]
    pub save: bool,

    /// Print the report as JSON instead of result lines
    #[arg(long = "json")]
    pub json: bool,
}

impl RunArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply_overrides(&self, config: &mut HarnessConfig) {
        if let Some(tasks) = self.tasks {
            config.task_count = tasks;
        }
        if let Some(threads) = self.threads {
            config.platform_threads = threads;
        }
        if let Some(duration) = self.task_duration {
            config.task_duration = duration;
        }
        if let Some(grace) = self.grace_period {
            config.grace_period = grace;
        }
        if let Some(policy) = self.timeout_policy {
            config.timeout_policy = policy;
        }
        if let Some(query) = &self.query {
            config.query = query.clone();
        }
        if let Some(url) = &self.db_url {
            config.datasource.url = url.clone();
        }
        if let Some(size) = self.pool_size {
            config.datasource.maximum_pool_size = size;
            config.datasource.minimum_idle = config.datasource.minimum_idle.min(size);
        }
    }

    /// Scenarios to run in order, defaulting to the full matrix
    pub fn selected_scenarios(&self, pool_size: usize) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            return Scenario::matrix(pool_size);
        }
        let mut selected = Vec::new();
        for slug in &self.scenarios {
            if let Some(scenario) = Scenario::from_slug(slug, pool_size) {
                if !selected.contains(&scenario) {
                    selected.push(scenario);
                }
            }
        }
        selected
    }

    /// Whether progress bars should be drawn
    pub fn shows_progress(&self, quiet: bool) -> bool {
        !self.json && !quiet
    }
}

impl CliArgs {
    /// Default filter directive for the log subscriber
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
