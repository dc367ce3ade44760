//! Benchmark engine module
//!
//! Contains the execution strategies, the task bodies they run and the
//! runner that measures a batch from submission to drain.

pub mod cancel;
pub mod executor;
pub mod lightweight;
pub mod platform;
pub mod runner;
pub mod scenario;
pub mod task;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use executor::{ExecutorSet, TaskLedger};
pub use runner::{BenchmarkRunner, DrainOutcome, Measurement, RunnerConfig};
pub use scenario::{ExecutionStrategy, Scenario, SubmissionMode};
pub use task::{ProbeTask, SleepTask, TaskBody};
