//! SQLite connections with a server-side sleeping function

use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Null, Value};
use rusqlite::Connection;

use crate::config::DataSourceConfig;
use crate::{Result, VtBenchError};

/// Longest sleep `pg_sleep` will honour
const MAX_SLEEP: Duration = Duration::from_secs(3600);

/// Open one connection for `config` and install `pg_sleep`
pub fn open_connection(config: &DataSourceConfig) -> Result<Connection> {
    let conn = Connection::open(&config.url).map_err(|e| {
        VtBenchError::DataSourceError(format!("{}: {}", config.url, e))
    })?;
    register_sleep_function(&conn)?;
    Ok(conn)
}

/// Register `pg_sleep(seconds)`, which blocks the calling connection.
///
/// Negative, NaN and NULL arguments return immediately.
pub fn register_sleep_function(conn: &Connection) -> Result<()> {
    conn.create_scalar_function("pg_sleep", 1, FunctionFlags::SQLITE_UTF8, |ctx| {
        if let Some(duration) = sleep_duration(ctx.get(0)?) {
            std::thread::sleep(duration);
        }
        Ok(Null)
    })?;
    Ok(())
}

/// Seconds argument of `pg_sleep` as a duration capped at `MAX_SLEEP`
fn sleep_duration(seconds: Option<f64>) -> Option<Duration> {
    seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| Duration::from_secs_f64(s.min(MAX_SLEEP.as_secs_f64())))
}

/// Check a connection with `SELECT 1` under `timeout`
pub fn is_valid(conn: &Connection, timeout: Duration) -> bool {
    if conn.busy_timeout(timeout).is_err() {
        return false;
    }
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map(|one| one == 1)
        .unwrap_or(false)
}

/// Run a parameterless query and return its first column of the first row
pub fn query_scalar(conn: &Connection, sql: &str) -> Result<Value> {
    conn.query_row(sql, [], |row| row.get::<_, Value>(0))
        .map_err(VtBenchError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn memory() -> Connection {
        open_connection(&DataSourceConfig::default()).unwrap()
    }

    #[test]
    fn test_pg_sleep_blocks_server_side() {
        let conn = memory();
        let start = Instant::now();
        let value = query_scalar(&conn, "SELECT pg_sleep(0.05)").unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_pg_sleep_ignores_non_positive_arguments() {
        let conn = memory();
        let start = Instant::now();
        query_scalar(&conn, "SELECT pg_sleep(-1)").unwrap();
        query_scalar(&conn, "SELECT pg_sleep(NULL)").unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_duration_is_capped() {
        assert_eq!(sleep_duration(Some(1e30)), Some(MAX_SLEEP));
        assert_eq!(sleep_duration(Some(f64::MAX)), Some(MAX_SLEEP));
        assert_eq!(sleep_duration(Some(0.25)), Some(Duration::from_millis(250)));
        assert_eq!(sleep_duration(Some(f64::INFINITY)), None);
        assert_eq!(sleep_duration(Some(f64::NAN)), None);
        assert_eq!(sleep_duration(Some(0.0)), None);
        assert_eq!(sleep_duration(None), None);
    }

    #[test]
    fn test_unopenable_url_is_datasource_error() {
        let config = DataSourceConfig::default().with_url("/nonexistent-dir/vtbench/bench.db");
        assert!(matches!(
            open_connection(&config),
            Err(VtBenchError::DataSourceError(_))
        ));
    }

    #[test]
    fn test_query_scalar_returns_value() {
        let conn = memory();
        assert_eq!(query_scalar(&conn, "SELECT 40 + 2").unwrap(), Value::Integer(42));
        assert!(matches!(
            query_scalar(&conn, "SELECT nope FROM nowhere"),
            Err(VtBenchError::QueryError(_))
        ));
    }

    #[test]
    fn test_validation() {
        let conn = memory();
        assert!(is_valid(&conn, Duration::from_millis(100)));
    }

    #[test]
    fn test_file_datasource() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bench.db");
        let config = DataSourceConfig::default().with_url(path.to_string_lossy());
        let conn = open_connection(&config).unwrap();
        assert!(is_valid(&conn, Duration::from_millis(100)));
        assert!(path.exists());
    }
}
