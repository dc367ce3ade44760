//! Task bodies submitted by the benchmark runner
//!
//! A body has two entry points: one for OS worker threads, where blocking is
//! the point, and one for lightweight tasks, where the same wait is expressed
//! as a suspension.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use super::cancel::CancelToken;
use crate::Result;

/// Uniform unit of work submitted `task_count` times per run
pub trait TaskBody: Send + Sync + 'static {
    /// Short name for logs and reports
    fn name(&self) -> &str;

    /// Run on an OS thread, blocking it for the duration of the work
    fn run_blocking(&self, cancel: &CancelToken) -> Result<()>;

    /// Run on a lightweight task, suspending instead of blocking
    fn run_async<'a>(&'a self, cancel: &'a CancelToken) -> BoxFuture<'a, Result<()>>;
}

/// Fixed sleep standing in for a blocking I/O call
#[derive(Debug, Clone)]
pub struct SleepTask {
    duration: Duration,
}

impl SleepTask {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl TaskBody for SleepTask {
    fn name(&self) -> &str {
        "sleep"
    }

    fn run_blocking(&self, cancel: &CancelToken) -> Result<()> {
        // An interrupted sleep is an early exit, not a failure
        cancel.sleep_blocking(self.duration);
        Ok(())
    }

    fn run_async<'a>(&'a self, cancel: &'a CancelToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            cancel.sleep(self.duration).await;
            Ok(())
        })
    }
}

/// Instrumented body that counts invocations and tracks peak concurrency
#[derive(Debug, Default)]
pub struct ProbeTask {
    hold: Duration,
    invocations: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ProbeTask {
    /// Create a probe that holds its slot for `hold` on every invocation
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    /// Number of times the body started
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Highest number of bodies observed running at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Bodies running right now
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ActiveGuard<'_> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveGuard { probe: self }
    }
}

/// Decrements the active count even if the body unwinds or is aborted
struct ActiveGuard<'a> {
    probe: &'a ProbeTask,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskBody for ProbeTask {
    fn name(&self) -> &str {
        "probe"
    }

    fn run_blocking(&self, cancel: &CancelToken) -> Result<()> {
        let _guard = self.enter();
        cancel.sleep_blocking(self.hold);
        Ok(())
    }

    fn run_async<'a>(&'a self, cancel: &'a CancelToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let _guard = self.enter();
            cancel.sleep(self.hold).await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_sleep_task_blocks_for_duration() {
        let task = SleepTask::new(Duration::from_millis(30));
        let cancel = CancelToken::new();
        let start = Instant::now();
        task.run_blocking(&cancel).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(task.name(), "sleep");
    }

    #[test]
    fn test_sleep_task_cancelled_is_not_an_error() {
        let task = SleepTask::new(Duration::from_secs(30));
        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(task.run_blocking(&cancel).is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_task_async_suspends() {
        let task = SleepTask::new(Duration::from_millis(30));
        let cancel = CancelToken::new();
        let start = Instant::now();
        task.run_async(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_probe_counts_and_releases() {
        let probe = ProbeTask::new(Duration::ZERO);
        let cancel = CancelToken::new();
        for _ in 0..3 {
            probe.run_blocking(&cancel).unwrap();
        }
        assert_eq!(probe.invocations(), 3);
        assert_eq!(probe.max_active(), 1);
        assert_eq!(probe.active(), 0);
    }
}
