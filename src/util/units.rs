//! Duration formatting and expected-time estimates
//!
//! Provides human-readable formatting of elapsed times and the back-of-the-
//! envelope numbers a run can be compared against.

use std::time::Duration;

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use vtbench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        format!("{}ms", millis)
    }
}

/// Format a duration as whole milliseconds, the unit used on the console
pub fn format_millis(duration: Duration) -> String {
    format!("{} ms", duration.as_millis())
}

/// Parse duration string into Duration
///
/// Supports formats like: "30s", "1m 30s", "1h 30m", "500ms"
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use vtbench::util::units::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Empty duration".to_string());
    }
    humantime::parse_duration(input).map_err(|e| format!("Invalid duration '{}': {}", input, e))
}

/// Expected wall-clock time for `task_count` tasks of `task_duration` each on
/// `workers` concurrent contexts, ignoring scheduling overhead:
/// `ceil(task_count / workers) * task_duration`.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use vtbench::util::units::expected_bounded_duration;
///
/// let expected = expected_bounded_duration(1000, 4, Duration::from_millis(100));
/// assert_eq!(expected, Duration::from_secs(25));
/// ```
pub fn expected_bounded_duration(task_count: usize, workers: usize, task_duration: Duration) -> Duration {
    if task_count == 0 || workers == 0 {
        return Duration::ZERO;
    }
    let rounds = task_count.div_ceil(workers);
    task_duration.saturating_mul(rounds.min(u32::MAX as usize) as u32)
}

/// Completed tasks per second over `elapsed`
pub fn tasks_per_second(tasks: usize, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    tasks as f64 / elapsed.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(Duration::from_millis(25_031)), "25031 ms");
        assert_eq!(format_millis(Duration::from_micros(999)), "0 ms");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration(" 500ms ").unwrap(), Duration::from_millis(500));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("1x").is_err());
    }

    #[test]
    fn test_expected_bounded_duration() {
        let block = Duration::from_millis(100);
        assert_eq!(expected_bounded_duration(1000, 4, block), Duration::from_secs(25));
        assert_eq!(expected_bounded_duration(1000, 1000, block), block);
        assert_eq!(expected_bounded_duration(10, 3, block), Duration::from_millis(400));
        assert_eq!(expected_bounded_duration(0, 3, block), Duration::ZERO);
        assert_eq!(expected_bounded_duration(5, 0, block), Duration::ZERO);
    }

    #[test]
    fn test_tasks_per_second() {
        assert!((tasks_per_second(1000, Duration::from_secs(2)) - 500.0).abs() < 0.01);
        assert_eq!(tasks_per_second(1000, Duration::ZERO), 0.0);
    }
}
