//! Execution strategies, submission modes and the scenarios built from them

use std::fmt;

use serde::{Deserialize, Serialize};

/// How many concurrent execution contexts a run gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExecutionStrategy {
    /// Fixed set of OS threads pulling from one shared queue
    BoundedPool {
        /// Number of worker threads
        size: usize,
    },
    /// One lightweight task per submission, no ceiling
    UnboundedPerTask,
}

/// How tasks are handed to the execution strategy and awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Submit everything, then drain the whole set
    Synchronous,
    /// Keep one completion handle per task and join on all of them
    Asynchronous,
}

/// One cell of the strategy x mode matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub strategy: ExecutionStrategy,
    pub mode: SubmissionMode,
}

impl ExecutionStrategy {
    /// Human-readable name used in console output
    pub fn description(&self) -> &'static str {
        match self {
            ExecutionStrategy::BoundedPool { .. } => "Platform Threads",
            ExecutionStrategy::UnboundedPerTask => "Virtual Threads",
        }
    }

    /// Upper bound on concurrently running tasks, if any
    pub fn concurrency_limit(&self) -> Option<usize> {
        match self {
            ExecutionStrategy::BoundedPool { size } => Some(*size),
            ExecutionStrategy::UnboundedPerTask => None,
        }
    }
}

impl SubmissionMode {
    pub fn description(&self) -> &'static str {
        match self {
            SubmissionMode::Synchronous => "Sync",
            SubmissionMode::Asynchronous => "Async",
        }
    }

    /// Whether individual completion handles are retained
    pub fn collects_handles(&self) -> bool {
        matches!(self, SubmissionMode::Asynchronous)
    }
}

impl Scenario {
    pub fn new(strategy: ExecutionStrategy, mode: SubmissionMode) -> Self {
        Self { strategy, mode }
    }

    pub fn platform(size: usize, mode: SubmissionMode) -> Self {
        Self::new(ExecutionStrategy::BoundedPool { size }, mode)
    }

    pub fn lightweight(mode: SubmissionMode) -> Self {
        Self::new(ExecutionStrategy::UnboundedPerTask, mode)
    }

    /// All four strategy/mode combinations, platform first
    pub fn matrix(pool_size: usize) -> Vec<Scenario> {
        let modes = [SubmissionMode::Synchronous, SubmissionMode::Asynchronous];
        let strategies = [
            ExecutionStrategy::BoundedPool { size: pool_size },
            ExecutionStrategy::UnboundedPerTask,
        ];

        strategies
            .iter()
            .flat_map(|&strategy| modes.iter().map(move |&mode| Scenario::new(strategy, mode)))
            .collect()
    }

    /// Console label, e.g. "Platform Threads (Sync)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.strategy.description(), self.mode.description())
    }

    /// Short identifier accepted on the command line
    pub fn slug(&self) -> &'static str {
        match (self.strategy, self.mode) {
            (ExecutionStrategy::BoundedPool { .. }, SubmissionMode::Synchronous) => "platform-sync",
            (ExecutionStrategy::BoundedPool { .. }, SubmissionMode::Asynchronous) => "platform-async",
            (ExecutionStrategy::UnboundedPerTask, SubmissionMode::Synchronous) => "virtual-sync",
            (ExecutionStrategy::UnboundedPerTask, SubmissionMode::Asynchronous) => "virtual-async",
        }
    }

    /// Parse a slug back into a scenario, using `pool_size` for platform scenarios
    pub fn from_slug(slug: &str, pool_size: usize) -> Option<Scenario> {
        Scenario::matrix(pool_size)
            .into_iter()
            .find(|s| s.slug().eq_ignore_ascii_case(slug.trim()))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
