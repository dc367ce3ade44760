use std::sync::Arc;
use std::time::Duration;

use vtbench::bench::{BenchmarkRunner, DrainOutcome, RunnerConfig, Scenario, SubmissionMode};
use vtbench::config::{DataSourceConfig, TimeoutPolicy};
use vtbench::db::{ConnectionPool, QueryTask};
use vtbench::error::is_fatal;
use vtbench::VtBenchError;

fn runner(task_count: usize) -> BenchmarkRunner {
    BenchmarkRunner::new(RunnerConfig {
        task_count,
        grace_period: Duration::from_secs(30),
        timeout_policy: TimeoutPolicy::Uniform,
    })
}

fn pool(size: usize) -> Arc<ConnectionPool> {
    ConnectionPool::new(
        DataSourceConfig::default()
            .with_maximum_pool_size(size)
            .with_minimum_idle(1)
            .with_connection_timeout(Duration::from_secs(10)),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_size_bounds_lightweight_queries() {
    let pool = pool(2);
    let task = Arc::new(QueryTask::new(pool.clone(), "SELECT pg_sleep(0.05)"));

    let m = runner(10)
        .run(Scenario::lightweight(SubmissionMode::Asynchronous), task)
        .await
        .unwrap();

    assert_eq!(m.drain, DrainOutcome::Drained);
    assert_eq!(m.completed, 10);
    assert!(pool.stats().peak_in_use <= 2);
    // Ten 50ms queries through two connections
    assert!(m.elapsed >= Duration::from_millis(250), "elapsed {:?}", m.elapsed);
    assert_eq!(pool.stats().in_use, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_size_bounds_platform_queries() {
    let pool = pool(2);
    let task = Arc::new(QueryTask::new(pool.clone(), "SELECT pg_sleep(0.02)"));

    let m = runner(12)
        .run(Scenario::platform(6, SubmissionMode::Synchronous), task)
        .await
        .unwrap();

    assert_eq!(m.completed, 12);
    assert!(pool.stats().peak_in_use <= 2);
    assert!(pool.stats().open <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_query_failures_do_not_fail_the_run() {
    let task = Arc::new(QueryTask::new(pool(2), "SELECT * FROM no_such_table"));

    let m = runner(5)
        .run(Scenario::platform(2, SubmissionMode::Asynchronous), task)
        .await
        .unwrap();

    // Failed bodies still settle as finished tasks
    assert_eq!(m.drain, DrainOutcome::Drained);
    assert_eq!(m.completed, 5);
}

#[test]
fn test_unopenable_datasource_is_fatal() {
    let result = ConnectionPool::new(
        DataSourceConfig::default()
            .with_url("/nonexistent-dir/vtbench/bench.db")
            .with_minimum_idle(1),
    );
    match result {
        Err(e @ VtBenchError::DataSourceError(_)) => assert!(is_fatal(&e)),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("pool opened on a missing directory"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forced_shutdown_releases_threads_waiting_on_pool() {
    // Three workers queue behind one connection with a 10s checkout timeout
    let pool = ConnectionPool::new(
        DataSourceConfig::default()
            .with_maximum_pool_size(1)
            .with_minimum_idle(1)
            .with_connection_timeout(Duration::from_secs(10)),
    )
    .unwrap();
    let task = Arc::new(QueryTask::new(pool.clone(), "SELECT pg_sleep(0.3)"));
    let runner = BenchmarkRunner::new(RunnerConfig {
        task_count: 4,
        grace_period: Duration::from_millis(50),
        timeout_policy: TimeoutPolicy::Uniform,
    });

    let m = runner
        .run(Scenario::platform(4, SubmissionMode::Synchronous), task)
        .await
        .unwrap();

    assert_eq!(m.drain, DrainOutcome::ForcedShutdown);
    assert_eq!(m.completed + m.cancelled, 4);
    assert_eq!(m.unsettled(), 0);
    assert_eq!(pool.stats().in_use, 0);
}
