//! Utility functions module
//!
//! Contains helpers for duration formatting and parsing, expected-time
//! estimates and serde adapters for durations.

pub mod serde_duration;
pub mod units;

// Re-export commonly used functions
pub use units::{
    expected_bounded_duration, format_duration, format_millis, parse_duration, tasks_per_second,
};
