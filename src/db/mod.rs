//! Database collaborator for the query workload
//!
//! A bounded connection pool over SQLite, where `pg_sleep` blocks the
//! connection for a fixed time to stand in for a slow server round-trip.

pub mod pool;
pub mod query;
pub mod sqlite;

pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use query::QueryTask;
