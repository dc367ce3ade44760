//! Bounded connection pool shared by every task of a query run
//!
//! `maximum_pool_size` is a hard cap on open connections, so it also caps how
//! many queries can be in flight no matter how many tasks ask for one.

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::sqlite;
use crate::bench::CancelToken;
use crate::config::DataSourceConfig;
use crate::{Result, VtBenchError};

/// Longest a blocked cancellable getter waits before rechecking its token
const CANCEL_POLL: Duration = Duration::from_millis(10);

struct IdleConnection {
    conn: Connection,
    created_at: Instant,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<IdleConnection>,
    /// Open connections, idle or checked out
    open: usize,
    peak_in_use: usize,
}

impl PoolState {
    fn in_use(&self) -> usize {
        self.open - self.idle.len()
    }
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub open: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Highest number of connections checked out at once
    pub peak_in_use: usize,
}

enum Checkout {
    Reused(IdleConnection),
    Open,
}

/// Connection pool over the configured datasource
pub struct ConnectionPool {
    config: DataSourceConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    notify: Notify,
}

impl ConnectionPool {
    /// Build the pool and eagerly open `minimum_idle` connections.
    ///
    /// Any failure here is fatal for the run that needs the pool.
    pub fn new(config: DataSourceConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let mut idle = Vec::with_capacity(config.minimum_idle);
        for _ in 0..config.minimum_idle {
            idle.push(IdleConnection {
                conn: sqlite::open_connection(&config)?,
                created_at: Instant::now(),
            });
        }

        debug!(
            url = %config.url,
            username = %config.username,
            driver = %config.driver,
            minimum_idle = config.minimum_idle,
            maximum_pool_size = config.maximum_pool_size,
            "connection pool ready"
        );

        let open = idle.len();
        Ok(Arc::new(Self {
            config,
            state: Mutex::new(PoolState {
                idle,
                open,
                peak_in_use: 0,
            }),
            available: Condvar::new(),
            notify: Notify::new(),
        }))
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            open: state.open,
            idle: state.idle.len(),
            in_use: state.in_use(),
            peak_in_use: state.peak_in_use,
        }
    }

    /// Check out a connection, blocking the current thread for at most
    /// `connection_timeout`
    pub fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        self.get_blocking(None)
    }

    /// Like [`get`](Self::get), but gives up with `Cancelled` soon after
    /// `cancel` fires
    pub fn get_cancellable(self: &Arc<Self>, cancel: &CancelToken) -> Result<PooledConnection> {
        self.get_blocking(Some(cancel))
    }

    fn get_blocking(self: &Arc<Self>, cancel: Option<&CancelToken>) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.config.connection_timeout;
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(VtBenchError::Cancelled);
            }
            if let Some(conn) = self.try_get()? {
                return Ok(conn);
            }

            let state = self.lock_state();
            if state.idle.is_empty() && state.open >= self.config.maximum_pool_size {
                let now = Instant::now();
                if now >= deadline {
                    return Err(self.timeout_error());
                }
                let mut wait = deadline - now;
                if cancel.is_some() {
                    wait = wait.min(CANCEL_POLL);
                }
                // Woken by a release or by the timeout; either way retry
                let _ = self.available.wait_timeout(state, wait);
            }
        }
    }

    /// Check out a connection, suspending for at most `connection_timeout`
    pub async fn get_async(self: &Arc<Self>) -> Result<PooledConnection> {
        let deadline = tokio::time::Instant::now() + self.config.connection_timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(conn) = self.try_get()? {
                return Ok(conn);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(self.timeout_error());
            }
        }
    }

    /// Check out a connection if one is free or can be opened right now
    pub fn try_get(self: &Arc<Self>) -> Result<Option<PooledConnection>> {
        loop {
            let checkout = {
                let mut state = self.lock_state();
                match state.idle.pop() {
                    Some(idle) => Checkout::Reused(idle),
                    None if state.open < self.config.maximum_pool_size => {
                        state.open += 1;
                        Checkout::Open
                    }
                    None => return Ok(None),
                }
            };

            match checkout {
                Checkout::Reused(idle) => {
                    if self.is_expired(idle.created_at) {
                        trace!("retiring connection past max_lifetime");
                        self.discard(idle.conn);
                        continue;
                    }
                    if !sqlite::is_valid(&idle.conn, self.config.validation_timeout) {
                        debug!("discarding connection that failed validation");
                        self.discard(idle.conn);
                        continue;
                    }
                    return Ok(Some(self.checked_out(idle)));
                }
                Checkout::Open => match sqlite::open_connection(&self.config) {
                    Ok(conn) => {
                        trace!("opened new connection");
                        let idle = IdleConnection {
                            conn,
                            created_at: Instant::now(),
                        };
                        return Ok(Some(self.checked_out(idle)));
                    }
                    Err(e) => {
                        self.release_slot();
                        return Err(e);
                    }
                },
            }
        }
    }

    fn checked_out(self: &Arc<Self>, idle: IdleConnection) -> PooledConnection {
        {
            let mut state = self.lock_state();
            let in_use = state.in_use();
            state.peak_in_use = state.peak_in_use.max(in_use);
        }
        PooledConnection {
            conn: Some(idle.conn),
            created_at: idle.created_at,
            pool: Arc::clone(self),
        }
    }

    fn is_expired(&self, created_at: Instant) -> bool {
        created_at.elapsed() >= self.config.max_lifetime
    }

    /// Close a connection that is not in the idle list
    fn discard(&self, conn: Connection) {
        drop(conn);
        self.release_slot();
    }

    fn release_slot(&self) {
        self.lock_state().open -= 1;
        self.wake_one();
    }

    fn give_back(&self, conn: Connection, created_at: Instant) {
        if self.is_expired(created_at) {
            self.discard(conn);
            return;
        }
        self.lock_state().idle.push(IdleConnection { conn, created_at });
        self.wake_one();
    }

    fn wake_one(&self) {
        self.available.notify_one();
        self.notify.notify_one();
    }

    fn timeout_error(&self) -> VtBenchError {
        VtBenchError::PoolError(format!(
            "Connection is not available, request timed out after {}ms",
            self.config.connection_timeout.as_millis()
        ))
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Connection checked out of a [`ConnectionPool`]; returned on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    created_at: Instant,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    pub fn query_scalar(&self, sql: &str) -> Result<rusqlite::types::Value> {
        sqlite::query_scalar(self, sql)
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn, self.created_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pool(max: usize, min_idle: usize) -> Arc<ConnectionPool> {
        ConnectionPool::new(
            DataSourceConfig::default()
                .with_maximum_pool_size(max)
                .with_minimum_idle(min_idle)
                .with_connection_timeout(Duration::from_millis(200)),
        )
        .unwrap()
    }

    #[test]
    fn test_minimum_idle_prefilled() {
        let pool = pool(4, 2);
        let stats = pool.stats();
        assert_eq!(stats.open, 2);
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn test_checkout_and_return() {
        let pool = pool(2, 0);
        {
            let conn = pool.get().unwrap();
            assert_eq!(conn.query_scalar("SELECT 1").unwrap(), rusqlite::types::Value::Integer(1));
            assert_eq!(pool.stats().in_use, 1);
        }
        let stats = pool.stats();
        assert_eq!(stats.in_use, 0);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.peak_in_use, 1);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let pool = pool(1, 0);
        let _held = pool.get().unwrap();
        assert!(pool.try_get().unwrap().is_none());

        let start = Instant::now();
        let result = pool.get();
        assert!(matches!(result, Err(VtBenchError::PoolError(_))));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_blocked_getter_wakes_on_release() {
        let pool = pool(1, 0);
        let held = pool.get().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.get().map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);

        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_cancellable_getter_stops_waiting_on_cancel() {
        let pool = ConnectionPool::new(
            DataSourceConfig::default()
                .with_maximum_pool_size(1)
                .with_minimum_idle(0)
                .with_connection_timeout(Duration::from_secs(10)),
        )
        .unwrap();
        let _held = pool.get().unwrap();
        let cancel = CancelToken::new();

        let waiter = {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            thread::spawn(move || {
                let start = Instant::now();
                (pool.get_cancellable(&cancel).map(|_| ()), start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();

        let (result, waited) = waiter.join().unwrap();
        assert!(matches!(result, Err(VtBenchError::Cancelled)));
        assert!(waited < Duration::from_secs(1), "waited {:?}", waited);
        assert_eq!(pool.stats().in_use, 1);
    }

    #[test]
    fn test_cancellable_getter_refuses_after_cancel() {
        let pool = pool(2, 1);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(pool.get_cancellable(&cancel), Err(VtBenchError::Cancelled)));
        assert_eq!(pool.stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_async_getter_wakes_on_release() {
        let pool = pool(1, 0);
        let held = pool.get_async().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get_async().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(pool.stats().open, 1);
    }

    #[tokio::test]
    async fn test_async_getter_times_out() {
        let pool = pool(1, 0);
        let _held = pool.get().unwrap();
        assert!(matches!(
            pool.get_async().await,
            Err(VtBenchError::PoolError(_))
        ));
    }

    #[test]
    fn test_expired_connections_are_retired() {
        let pool = ConnectionPool::new(
            DataSourceConfig::default()
                .with_maximum_pool_size(2)
                .with_minimum_idle(1)
                .with_max_lifetime(Duration::from_millis(10)),
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        // The prefilled connection is too old and gets replaced
        let conn = pool.get().unwrap();
        assert_eq!(pool.stats().open, 1);
        thread::sleep(Duration::from_millis(20));
        drop(conn);
        assert_eq!(pool.stats().open, 0);
    }

    #[test]
    fn test_unsupported_driver_is_fatal() {
        let result = ConnectionPool::new(DataSourceConfig::default().with_driver("mysql"));
        assert!(matches!(result, Err(VtBenchError::ConfigError(_))));
    }
}
