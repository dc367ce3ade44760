//! Bounded pool of OS threads pulling from one shared queue

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::cancel::CancelToken;
use super::executor::{log_task_failure, within_deadline, CompletionTx, Job, TaskLedger};
use super::task::TaskBody;
use crate::{Result, VtBenchError};

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Fixed-size worker pool.
///
/// Concurrency never exceeds the number of workers; extra submissions wait
/// in the queue.
pub struct PlatformPool {
    sender: Option<mpsc::Sender<Job>>,
    queue: SharedQueue,
    workers: Vec<JoinHandle<()>>,
    live: Arc<watch::Sender<usize>>,
    cancel: CancelToken,
    ledger: Arc<TaskLedger>,
}

impl PlatformPool {
    /// Spawn `size` worker threads
    pub fn new(size: usize, cancel: CancelToken, ledger: Arc<TaskLedger>) -> Result<Self> {
        if size == 0 {
            return Err(VtBenchError::ExecutorError(
                "Platform pool needs at least one worker".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel();
        let queue: SharedQueue = Arc::new(Mutex::new(receiver));
        let (live, _) = watch::channel(0usize);
        let live = Arc::new(live);

        let mut pool = Self {
            sender: Some(sender),
            queue,
            workers: Vec::with_capacity(size),
            live,
            cancel,
            ledger,
        };

        for id in 0..size {
            let queue = Arc::clone(&pool.queue);
            let live = Arc::clone(&pool.live);
            let cancel = pool.cancel.clone();

            live.send_modify(|n| *n += 1);
            let spawned = thread::Builder::new()
                .name(format!("platform-worker-{}", id))
                .spawn(move || worker_loop(id, &queue, &cancel, &live));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.live.send_modify(|n| *n -= 1);
                    // Dropping the pool releases the workers already started
                    return Err(VtBenchError::ExecutorError(format!(
                        "Failed to spawn worker {} of {}: {}",
                        id, size, e
                    )));
                }
            }
        }

        debug!(workers = size, "platform pool started");
        Ok(pool)
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&mut self, body: Arc<dyn TaskBody>, done: Option<CompletionTx>) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(|| {
            VtBenchError::ExecutorError("Platform pool is shut down".to_string())
        })?;
        let job = Job::new(body, done, &self.cancel, &self.ledger);
        sender
            .send(job)
            .map_err(|_| VtBenchError::ExecutorError("All platform workers have exited".to_string()))
    }

    /// Close the queue; workers exit once it is empty
    pub fn shutdown(&mut self) {
        self.sender.take();
    }

    pub async fn await_termination(&mut self, deadline: Option<Instant>) -> bool {
        let mut live = self.live.subscribe();
        let terminated = within_deadline(deadline, async move {
            let _ = live.wait_for(|n| *n == 0).await;
        })
        .await;

        if terminated {
            for handle in self.workers.drain(..) {
                if handle.join().is_err() {
                    warn!("platform worker exited by panic");
                }
            }
        }
        terminated
    }

    /// Cancel running bodies and discard whatever is still queued
    pub fn shutdown_now(&mut self) {
        self.shutdown();
        self.cancel.cancel();

        // Workers blocked in an uncooperative body cannot drain the queue
        if let Ok(receiver) = self.queue.try_lock() {
            let mut dropped = 0usize;
            while let Ok(job) = receiver.try_recv() {
                drop(job);
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "discarded queued tasks");
            }
        }
    }
}

impl Drop for PlatformPool {
    fn drop(&mut self) {
        // Closing the queue lets idle workers exit; busy ones are detached
        self.sender.take();
    }
}

fn worker_loop(id: usize, queue: &SharedQueue, cancel: &CancelToken, live: &watch::Sender<usize>) {
    loop {
        let next = match queue.lock() {
            Ok(receiver) => receiver.recv(),
            Err(poisoned) => poisoned.into_inner().recv(),
        };

        let job = match next {
            Ok(job) => job,
            Err(_) => break,
        };

        if cancel.is_cancelled() {
            // Settles as cancelled without running
            drop(job);
            continue;
        }

        job.begin();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.body.run_blocking(cancel)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log_task_failure(job.body.name(), &e),
            Err(_) => debug!(worker = id, task = job.body.name(), "task panicked"),
        }
        drop(job);
    }

    live.send_modify(|n| *n -= 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::task::{ProbeTask, SleepTask};
    use futures::future::BoxFuture;
    use std::time::Duration;

    struct PanickingTask;

    impl TaskBody for PanickingTask {
        fn name(&self) -> &str {
            "panic"
        }

        fn run_blocking(&self, _cancel: &CancelToken) -> Result<()> {
            panic!("task body blew up");
        }

        fn run_async<'a>(&'a self, _cancel: &'a CancelToken) -> BoxFuture<'a, Result<()>> {
            Box::pin(async {
                let blow_up = || -> Result<()> { panic!("task body blew up") };
                blow_up()
            })
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = PlatformPool::new(0, CancelToken::new(), Arc::new(TaskLedger::new()));
        assert!(matches!(result, Err(VtBenchError::ExecutorError(_))));
    }

    #[tokio::test]
    async fn test_pool_runs_every_task_within_bound() {
        let ledger = Arc::new(TaskLedger::new());
        let mut pool = PlatformPool::new(3, CancelToken::new(), Arc::clone(&ledger)).unwrap();
        assert_eq!(pool.size(), 3);

        let probe = Arc::new(ProbeTask::new(Duration::from_millis(10)));
        for _ in 0..12 {
            pool.submit(probe.clone(), None).unwrap();
        }
        pool.shutdown();
        assert!(pool.await_termination(Some(Instant::now() + Duration::from_secs(10))).await);

        assert_eq!(probe.invocations(), 12);
        assert!(probe.max_active() <= 3);
        assert_eq!(ledger.completed(), 12);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let mut pool =
            PlatformPool::new(1, CancelToken::new(), Arc::new(TaskLedger::new())).unwrap();
        pool.shutdown();
        let result = pool.submit(Arc::new(SleepTask::new(Duration::ZERO)), None);
        assert!(matches!(result, Err(VtBenchError::ExecutorError(_))));
        assert!(pool.await_termination(None).await);
    }

    #[tokio::test]
    async fn test_worker_survives_panicking_task() {
        let ledger = Arc::new(TaskLedger::new());
        let mut pool = PlatformPool::new(1, CancelToken::new(), Arc::clone(&ledger)).unwrap();
        let probe = Arc::new(ProbeTask::new(Duration::ZERO));

        pool.submit(Arc::new(PanickingTask), None).unwrap();
        pool.submit(probe.clone(), None).unwrap();
        pool.shutdown();
        assert!(pool.await_termination(Some(Instant::now() + Duration::from_secs(5))).await);

        assert_eq!(probe.invocations(), 1);
        assert_eq!(ledger.completed(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_now_drops_queued_tasks() {
        let ledger = Arc::new(TaskLedger::new());
        let mut pool = PlatformPool::new(1, CancelToken::new(), Arc::clone(&ledger)).unwrap();
        let task = Arc::new(SleepTask::new(Duration::from_secs(30)));
        for _ in 0..5 {
            pool.submit(task.clone(), None).unwrap();
        }
        pool.shutdown();

        assert!(!pool.await_termination(Some(Instant::now() + Duration::from_millis(50))).await);
        pool.shutdown_now();
        assert!(pool.await_termination(Some(Instant::now() + Duration::from_secs(5))).await);

        assert_eq!(ledger.completed(), 0);
        assert_eq!(ledger.cancelled(), 5);
        assert_eq!(ledger.started(), 1);
    }
}
