//! Runs a workload across the selected scenarios and streams progress.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tracing::info;

use crate::bench::{
    BenchmarkRunner, Measurement, ProbeTask, Scenario, SleepTask, TaskBody, TaskLedger,
};
use crate::config::HarnessConfig;
use crate::db::{ConnectionPool, QueryTask};
use crate::models::{RunReport, RunSettings, Workload};
use crate::Result;

const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// One workload across a list of scenarios, run one after another
pub struct BenchmarkSuite {
    config: HarnessConfig,
    scenarios: Vec<Scenario>,
    show_progress: bool,
}

impl BenchmarkSuite {
    /// Create a suite over the full scenario matrix
    pub fn new(config: HarnessConfig) -> Self {
        let scenarios = Scenario::matrix(config.platform_threads);
        Self {
            config,
            scenarios,
            show_progress: false,
        }
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Scenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Run `workload` on every scenario and collect the measurements.
    ///
    /// The first fatal error stops the suite; no partial report is returned.
    pub async fn run(&self, workload: Workload) -> Result<RunReport> {
        self.config.validate()?;
        let runner = BenchmarkRunner::new(self.config.runner_config());

        let shared = match workload {
            Workload::Sleep => Some(Arc::new(SleepTask::new(self.config.task_duration)) as Arc<dyn TaskBody>),
            Workload::Query => {
                let pool = ConnectionPool::new(self.config.datasource.clone())?;
                Some(Arc::new(QueryTask::new(pool, self.config.query.clone())) as Arc<dyn TaskBody>)
            }
            // A fresh probe per scenario so peaks are not mixed
            Workload::Probe => None,
        };

        let mut measurements = Vec::with_capacity(self.scenarios.len());
        for scenario in &self.scenarios {
            // Stragglers of a forced shutdown keep settling into their own ledger
            let ledger = Arc::new(TaskLedger::new());

            let (body, probe): (Arc<dyn TaskBody>, Option<Arc<ProbeTask>>) = match &shared {
                Some(body) => (Arc::clone(body), None),
                None => {
                    let probe = Arc::new(ProbeTask::new(self.config.task_duration));
                    (Arc::clone(&probe) as Arc<dyn TaskBody>, Some(probe))
                }
            };

            let measurement = self
                .run_scenario(&runner, *scenario, body, ledger)
                .await?;

            if let Some(probe) = probe {
                info!(
                    scenario = %scenario,
                    invocations = probe.invocations(),
                    peak_concurrency = probe.max_active(),
                    "probe finished"
                );
            }
            measurements.push(measurement);
        }

        Ok(RunReport::new(
            workload,
            RunSettings::from(&self.config),
            measurements,
        ))
    }

    async fn run_scenario(
        &self,
        runner: &BenchmarkRunner,
        scenario: Scenario,
        body: Arc<dyn TaskBody>,
        ledger: Arc<TaskLedger>,
    ) -> Result<Measurement> {
        let pb = if self.show_progress {
            ProgressBar::new(self.config.task_count as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template("{spinner} {prefix:<26} [{bar:30}] {pos}/{len} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_prefix(scenario.label());

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let progress = {
            let pb = pb.clone();
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(PROGRESS_TICK);
                loop {
                    tokio::select! {
                        _ = tick.tick() => pb.set_position(ledger.settled() as u64),
                        _ = &mut stop_rx => break,
                    }
                }
                pb.set_position(ledger.settled() as u64);
            })
        };

        let result = runner.run_tracked(scenario, body, ledger).await;

        let _ = stop_tx.send(());
        progress.await.ok();
        pb.finish_and_clear();
        result
    }
}
