//! Batch summary

use anyhow::{Context, Result};
use mf4_csv_core::FailureEvent;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<FailureEvent>,
}

impl BatchSummary {
    pub fn from_results(results: Vec<std::result::Result<PathBuf, FailureEvent>>) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result {
                Ok(path) => summary.converted.push(path),
                Err(event) => summary.failed.push(event),
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn log(&self) {
        log::info!(
            "Converted {} file(s), {} failed",
            self.converted.len(),
            self.failed.len()
        );
        for event in &self.failed {
            log::info!("  {} [{}] {}", event.file, event.kind, event.reason);
        }
    }

    /// Write the summary as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize summary")?;
        fs::write(path, json).with_context(|| format!("Failed to write summary: {:?}", path))?;
        Ok(())
    }
}
