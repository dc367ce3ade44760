//! One lightweight task per submission

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::debug;

use super::cancel::CancelToken;
use super::executor::{log_task_failure, within_deadline, CompletionTx, Job, TaskLedger};
use super::task::TaskBody;
use crate::{Result, VtBenchError};

/// Unbounded set of tokio tasks, one per submitted body.
///
/// The `JoinSet` is the set's own bookkeeping; callers in synchronous mode
/// never see per-task handles.
pub struct LightweightSet {
    tasks: JoinSet<()>,
    runtime: Handle,
    accepting: bool,
    cancel: CancelToken,
    ledger: Arc<TaskLedger>,
}

impl LightweightSet {
    /// Bind the set to the current tokio runtime
    pub fn new(cancel: CancelToken, ledger: Arc<TaskLedger>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            VtBenchError::ExecutorError(format!("No async runtime for lightweight tasks: {}", e))
        })?;

        Ok(Self {
            tasks: JoinSet::new(),
            runtime,
            accepting: true,
            cancel,
            ledger,
        })
    }

    pub fn submit(&mut self, body: Arc<dyn TaskBody>, done: Option<CompletionTx>) -> Result<()> {
        if !self.accepting {
            return Err(VtBenchError::ExecutorError(
                "Lightweight set is shut down".to_string(),
            ));
        }

        let job = Job::new(body, done, &self.cancel, &self.ledger);
        let cancel = self.cancel.clone();
        self.tasks.spawn_on(
            async move {
                job.begin();
                if let Err(e) = job.body.run_async(&cancel).await {
                    log_task_failure(job.body.name(), &e);
                }
                drop(job);
            },
            &self.runtime,
        );
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.accepting = false;
    }

    pub async fn await_termination(&mut self, deadline: Option<Instant>) -> bool {
        let tasks = &mut self.tasks;
        within_deadline(deadline, async move {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        debug!("lightweight task panicked");
                    }
                }
            }
        })
        .await
    }

    /// Cancel running bodies and abort tasks that have not finished
    pub fn shutdown_now(&mut self) {
        self.accepting = false;
        self.cancel.cancel();
        self.tasks.abort_all();
    }
}
