//! Benchmark runner
//!
//! Builds the execution contexts for a scenario, submits a fixed batch of
//! tasks, drains the set and measures how long that took.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::executor::{within_deadline, ExecutorSet, TaskLedger};
use super::scenario::Scenario;
use super::task::TaskBody;
use crate::config::TimeoutPolicy;
use crate::util::{format_millis, serde_duration, tasks_per_second};
use crate::Result;

/// How long counters are given to settle after a forced shutdown.
/// Not part of the measured time.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// How a run's drain step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Every task finished within the grace period
    Drained,
    /// The grace period expired and outstanding tasks were cancelled
    ForcedShutdown,
}

/// Parameters shared by every run of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Tasks submitted per run
    pub task_count: usize,
    /// Bounded wait before outstanding tasks are force-cancelled
    pub grace_period: Duration,
    /// Which drain steps the grace period applies to
    pub timeout_policy: TimeoutPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            task_count: 1_000,
            grace_period: Duration::from_secs(60),
            timeout_policy: TimeoutPolicy::Uniform,
        }
    }
}

/// Wall-clock result of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub scenario: Scenario,
    pub task_name: String,
    pub task_count: usize,
    pub started_at: DateTime<Utc>,
    #[serde(with = "serde_duration::nanos")]
    pub elapsed: Duration,
    /// Tasks whose body ran to the end
    pub completed: usize,
    /// Tasks dropped or interrupted by a forced shutdown
    pub cancelled: usize,
    pub drain: DrainOutcome,
}

impl Measurement {
    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }

    /// Console line, e.g. "Virtual Threads (Sync): 103 ms"
    pub fn console_line(&self) -> String {
        format!("{}: {}", self.scenario.label(), format_millis(self.elapsed))
    }

    /// Tasks still running when the measurement was finalised
    pub fn unsettled(&self) -> usize {
        self.task_count.saturating_sub(self.completed + self.cancelled)
    }
}

/// Runs scenarios with a fixed task count and drain policy
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    config: RunnerConfig,
}

impl BenchmarkRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one scenario with `body` and return its measurement
    pub async fn run(&self, scenario: Scenario, body: Arc<dyn TaskBody>) -> Result<Measurement> {
        self.run_tracked(scenario, body, Arc::new(TaskLedger::new()))
            .await
    }

    /// Like [`run`](Self::run), with counters the caller can watch while the run is in flight
    pub async fn run_tracked(
        &self,
        scenario: Scenario,
        body: Arc<dyn TaskBody>,
        ledger: Arc<TaskLedger>,
    ) -> Result<Measurement> {
        let cancel = CancelToken::new();
        let mut executor =
            ExecutorSet::for_strategy(scenario.strategy, cancel.clone(), Arc::clone(&ledger))?;

        let task_count = self.config.task_count;
        let started_at = Utc::now();
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..task_count {
            let done = if scenario.mode.collects_handles() {
                let (tx, rx) = oneshot::channel();
                handles.push(rx);
                Some(tx)
            } else {
                None
            };

            if let Err(e) = executor.submit(Arc::clone(&body), done) {
                executor.shutdown_now();
                return Err(e);
            }
        }
        debug!(scenario = %scenario, tasks = task_count, "all tasks submitted");

        let drain = self.drain(&mut executor, handles).await;
        let elapsed = start.elapsed();

        if drain == DrainOutcome::ForcedShutdown {
            warn!(
                scenario = %scenario,
                grace_period = ?self.config.grace_period,
                "grace period expired, outstanding tasks cancelled"
            );
            executor
                .await_termination(Some(Instant::now() + SETTLE_TIMEOUT))
                .await;
        }

        let measurement = Measurement {
            scenario,
            task_name: body.name().to_string(),
            task_count,
            started_at,
            elapsed,
            completed: ledger.completed(),
            cancelled: ledger.cancelled(),
            drain,
        };

        info!(
            scenario = %scenario,
            task = %measurement.task_name,
            elapsed_ms = measurement.elapsed_millis() as u64,
            completed = measurement.completed,
            cancelled = measurement.cancelled,
            tasks_per_sec = %format!("{:.1}", tasks_per_second(measurement.completed, elapsed)),
            "scenario finished"
        );
        Ok(measurement)
    }

    async fn drain(
        &self,
        executor: &mut ExecutorSet,
        handles: Vec<oneshot::Receiver<()>>,
    ) -> DrainOutcome {
        let grace = self.config.grace_period;
        let deadline = Instant::now() + grace;

        if !handles.is_empty() {
            let join_deadline = match self.config.timeout_policy {
                TimeoutPolicy::Uniform => Some(deadline),
                TimeoutPolicy::SyncOnly => None,
            };
            let joined = within_deadline(join_deadline, async move {
                // A dropped sender still means the task is over
                join_all(handles).await;
            })
            .await;

            if !joined {
                executor.shutdown_now();
                return DrainOutcome::ForcedShutdown;
            }
        }

        executor.shutdown();
        let termination_deadline = match self.config.timeout_policy {
            TimeoutPolicy::Uniform => deadline,
            TimeoutPolicy::SyncOnly => Instant::now() + grace,
        };

        if executor.await_termination(Some(termination_deadline)).await {
            DrainOutcome::Drained
        } else {
            executor.shutdown_now();
            DrainOutcome::ForcedShutdown
        }
    }
}
