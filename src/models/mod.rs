//! Data models module
//!
//! Contains the run report that groups scenario measurements, the settings
//! it was produced with and system information.

pub mod result;

// Re-export commonly used types
pub use result::{RunReport, RunSettings, SystemInfo, Workload};
