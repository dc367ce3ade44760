//! Task body that runs one blocking query through the shared pool

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::trace;

use super::pool::ConnectionPool;
use crate::bench::{CancelToken, TaskBody};
use crate::{Result, VtBenchError};

/// Borrow a pooled connection, run `sql` and hand the connection back
pub struct QueryTask {
    pool: Arc<ConnectionPool>,
    sql: String,
}

impl QueryTask {
    pub fn new(pool: Arc<ConnectionPool>, sql: impl Into<String>) -> Self {
        Self {
            pool,
            sql: sql.into(),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl TaskBody for QueryTask {
    fn name(&self) -> &str {
        "query"
    }

    fn run_blocking(&self, cancel: &CancelToken) -> Result<()> {
        let conn = self.pool.get_cancellable(cancel)?;
        if cancel.is_cancelled() {
            return Err(VtBenchError::Cancelled);
        }
        let value = conn.query_scalar(&self.sql)?;
        trace!(?value, "query finished");
        Ok(())
    }

    fn run_async<'a>(&'a self, cancel: &'a CancelToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let conn = tokio::select! {
                conn = self.pool.get_async() => conn?,
                _ = cancel.cancelled() => return Err(VtBenchError::Cancelled),
            };
            if cancel.is_cancelled() {
                return Err(VtBenchError::Cancelled);
            }

            // The driver call blocks, so it runs off the scheduler threads
            let sql = self.sql.clone();
            let value = tokio::task::spawn_blocking(move || conn.query_scalar(&sql))
                .await
                .map_err(|e| VtBenchError::QueryError(format!("Query task failed: {}", e)))??;
            trace!(?value, "query finished");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceConfig;
    use std::time::{Duration, Instant};

    fn pool(max: usize) -> Arc<ConnectionPool> {
        ConnectionPool::new(
            DataSourceConfig::default()
                .with_maximum_pool_size(max)
                .with_minimum_idle(0),
        )
        .unwrap()
    }

    #[test]
    fn test_blocking_query_returns_connection() {
        let pool = pool(2);
        let task = QueryTask::new(Arc::clone(&pool), "SELECT pg_sleep(0.02)");
        let cancel = CancelToken::new();

        let start = Instant::now();
        task.run_blocking(&cancel).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_async_query_returns_connection() {
        let pool = pool(2);
        let task = QueryTask::new(Arc::clone(&pool), "SELECT pg_sleep(0.02)");
        let cancel = CancelToken::new();

        task.run_async(&cancel).await.unwrap();
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(task.name(), "query");
    }

    #[test]
    fn test_bad_sql_is_query_error() {
        let task = QueryTask::new(pool(1), "SELECT * FROM missing_table");
        let result = task.run_blocking(&CancelToken::new());
        assert!(matches!(result, Err(VtBenchError::QueryError(_))));
    }

    #[test]
    fn test_blocking_cancel_while_waiting_for_connection() {
        let pool = ConnectionPool::new(
            DataSourceConfig::default()
                .with_maximum_pool_size(1)
                .with_minimum_idle(0)
                .with_connection_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        let _held = pool.get().unwrap();
        let task = QueryTask::new(Arc::clone(&pool), "SELECT 1");
        let cancel = CancelToken::new();

        let canceller = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                cancel.cancel();
            })
        };

        let start = Instant::now();
        let result = task.run_blocking(&cancel);
        canceller.join().unwrap();
        assert!(matches!(result, Err(VtBenchError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_connection() {
        let pool = pool(1);
        let _held = pool.get().unwrap();
        let task = QueryTask::new(Arc::clone(&pool), "SELECT 1");
        let cancel = CancelToken::new();

        let waiter = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter.cancel();
        });

        let result = task.run_async(&cancel).await;
        assert!(matches!(result, Err(VtBenchError::Cancelled)));
    }
}
