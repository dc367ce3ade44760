//! Results persistence module
//!
//! Handles saving, loading, and rotation of run reports.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::RunReport;
use crate::{Result, VtBenchError, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};

/// Results storage manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<RunReport>,
}

impl ResultsStorage {
    /// Create a storage manager over the standard results file
    pub fn new() -> Result<Self> {
        Ok(Self::at(Self::results_file_path()?))
    }

    /// Create a storage manager over an explicit file
    pub fn at(results_path: PathBuf) -> Self {
        Self { results_path }
    }

    /// Get the standard results file path
    /// Uses $DATA_HOME/vtbench/results.json
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            VtBenchError::PersistenceError("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all reports from the results file
    pub fn load_reports(&self) -> Result<Vec<RunReport>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            VtBenchError::PersistenceError(format!(
                "Failed to read results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let results_file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            VtBenchError::PersistenceError(format!(
                "Failed to parse results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(results_file.results)
    }

    /// Append a report, keeping only the newest MAX_RESULTS_HISTORY entries
    pub fn append_report(&self, report: RunReport) -> Result<()> {
        let mut reports = self.load_reports()?;
        reports.push(report);

        if reports.len() > MAX_RESULTS_HISTORY {
            let skip_count = reports.len() - MAX_RESULTS_HISTORY;
            reports.drain(..skip_count);
        }

        self.save_reports(reports)
    }

    fn save_reports(&self, results: Vec<RunReport>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                VtBenchError::PersistenceError(format!(
                    "Failed to create results directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let results_file = ResultsFile {
            version: 1,
            results,
        };
        let content = serde_json::to_string_pretty(&results_file)?;

        fs::write(&self.results_path, content).map_err(|e| {
            VtBenchError::PersistenceError(format!(
                "Failed to write results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    pub fn count_reports(&self) -> Result<usize> {
        Ok(self.load_reports()?.len())
    }

    /// Clear all stored reports
    pub fn clear_reports(&self) -> Result<()> {
        if self.results_path.exists() {
            fs::remove_file(&self.results_path).map_err(|e| {
                VtBenchError::PersistenceError(format!(
                    "Failed to remove results file {}: {}",
                    self.results_path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn results_path(&self) -> &PathBuf {
        &self.results_path
    }
}
