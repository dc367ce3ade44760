//! Execution context sets and the bookkeeping shared by both strategies

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::cancel::CancelToken;
use super::lightweight::LightweightSet;
use super::platform::PlatformPool;
use super::scenario::ExecutionStrategy;
use super::task::TaskBody;
use crate::{error, Result, VtBenchError};

/// Completion handle sender given to a task in asynchronous mode
pub type CompletionTx = oneshot::Sender<()>;

/// Counters for one run, readable while the run is in progress
#[derive(Debug, Default)]
pub struct TaskLedger {
    submitted: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Tasks whose body ran to its end before cancellation
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks dropped from the queue or interrupted by cancellation
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Tasks that have reached a terminal state
    pub fn settled(&self) -> usize {
        self.completed() + self.cancelled()
    }
}

/// Settles a task exactly once: when dropped it records the outcome in the
/// ledger and resolves the completion handle, whether the body ran, failed,
/// panicked or never started.
#[derive(Debug)]
pub(crate) struct CompletionGuard {
    ledger: Arc<TaskLedger>,
    cancel: CancelToken,
    done: Option<CompletionTx>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.cancel.is_cancelled() {
            self.ledger.cancelled.fetch_add(1, Ordering::SeqCst);
        } else {
            self.ledger.completed.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(done) = self.done.take() {
            // Receiver may already be gone after a timed-out join
            let _ = done.send(());
        }
    }
}

/// A submitted task waiting for an execution context
pub(crate) struct Job {
    pub(crate) body: Arc<dyn TaskBody>,
    pub(crate) guard: CompletionGuard,
}

impl Job {
    pub(crate) fn new(
        body: Arc<dyn TaskBody>,
        done: Option<CompletionTx>,
        cancel: &CancelToken,
        ledger: &Arc<TaskLedger>,
    ) -> Self {
        ledger.submitted.fetch_add(1, Ordering::SeqCst);
        Self {
            body,
            guard: CompletionGuard {
                ledger: Arc::clone(ledger),
                cancel: cancel.clone(),
                done,
            },
        }
    }

    /// Mark the body as started
    pub(crate) fn begin(&self) {
        self.guard.ledger.started.fetch_add(1, Ordering::SeqCst);
    }
}

/// The set of execution contexts behind one strategy
pub enum ExecutorSet {
    Platform(PlatformPool),
    Lightweight(LightweightSet),
}

impl ExecutorSet {
    /// Build the execution contexts for `strategy`.
    ///
    /// Fails if OS threads cannot be spawned or, for the lightweight strategy,
    /// if there is no tokio runtime to spawn onto.
    pub fn for_strategy(
        strategy: ExecutionStrategy,
        cancel: CancelToken,
        ledger: Arc<TaskLedger>,
    ) -> Result<Self> {
        match strategy {
            ExecutionStrategy::BoundedPool { size } => {
                Ok(ExecutorSet::Platform(PlatformPool::new(size, cancel, ledger)?))
            }
            ExecutionStrategy::UnboundedPerTask => {
                Ok(ExecutorSet::Lightweight(LightweightSet::new(cancel, ledger)?))
            }
        }
    }

    /// Hand one task to the set
    pub fn submit(&mut self, body: Arc<dyn TaskBody>, done: Option<CompletionTx>) -> Result<()> {
        match self {
            ExecutorSet::Platform(pool) => pool.submit(body, done),
            ExecutorSet::Lightweight(set) => set.submit(body, done),
        }
    }

    /// Stop accepting submissions; queued work still runs
    pub fn shutdown(&mut self) {
        match self {
            ExecutorSet::Platform(pool) => pool.shutdown(),
            ExecutorSet::Lightweight(set) => set.shutdown(),
        }
    }

    /// Wait until every context has finished, or until `deadline`.
    ///
    /// Returns `true` if the set terminated.
    pub async fn await_termination(&mut self, deadline: Option<Instant>) -> bool {
        match self {
            ExecutorSet::Platform(pool) => pool.await_termination(deadline).await,
            ExecutorSet::Lightweight(set) => set.await_termination(deadline).await,
        }
    }

    /// Signal cancellation and drop all work that has not started
    pub fn shutdown_now(&mut self) {
        match self {
            ExecutorSet::Platform(pool) => pool.shutdown_now(),
            ExecutorSet::Lightweight(set) => set.shutdown_now(),
        }
    }
}

/// Log a failed body; failures that will hit every task are raised to `warn`
pub(crate) fn log_task_failure(task: &str, err: &VtBenchError) {
    if error::is_fatal(err) {
        warn!(task, error = %err, "task failed");
    } else {
        debug!(task, error = %err, "task failed");
    }
}

/// Run `wait` with an optional deadline; `true` if it finished in time
pub(crate) async fn within_deadline<F>(deadline: Option<Instant>, wait: F) -> bool
where
    F: std::future::Future<Output = ()>,
{
    match deadline {
        Some(deadline) => {
            tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), wait)
                .await
                .is_ok()
        }
        None => {
            wait.await;
            true
        }
    }
}
