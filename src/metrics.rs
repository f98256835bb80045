//! Reporting collaborators that receive named scalar values during
//! training.
//!
//! Training takes two independent sinks — a local metrics writer and an
//! external experiment tracker — and reports every computed accuracy to
//! both under the same key. Their transport is their own business; the
//! trait only carries (name, value) pairs.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

/// A sink for named scalar metrics reported during training.
pub trait MetricsSink {
    fn log_scalar(&mut self, name: &str, value: f64);
}

/// Local metrics writer appending `(timestamp, name, value)` rows to a
/// CSV file.
pub struct CsvMetricsWriter {
    writer: csv::Writer<File>,
}

impl CsvMetricsWriter {
    /// Create `metrics.csv` inside `dir`, truncating any previous run.
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join("metrics.csv");
        let file = File::create(&path)
            .with_context(|| format!("failed to create metrics file {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(["timestamp", "name", "value"])
            .context("failed to write metrics header")?;
        Ok(Self { writer })
    }
}

impl MetricsSink for CsvMetricsWriter {
    fn log_scalar(&mut self, name: &str, value: f64) {
        // A metric that cannot be written must not fail the training run.
        let timestamp = Utc::now().to_rfc3339();
        let value = value.to_string();
        if let Err(err) = self
            .writer
            .write_record([timestamp.as_str(), name, value.as_str()])
        {
            log::warn!("dropping metric {}: {}", name, err);
            return;
        }
        if let Err(err) = self.writer.flush() {
            log::warn!("failed to flush metrics file: {}", err);
        }
    }
}

/// Stand-in for an external experiment tracker.
///
/// Runs are tagged with a name and metrics go through the `log` facade;
/// transport to a real tracking service is out of scope.
pub struct ExperimentTracker {
    run: String,
}

impl ExperimentTracker {
    pub fn new(run: impl Into<String>) -> Self {
        Self { run: run.into() }
    }
}

impl MetricsSink for ExperimentTracker {
    fn log_scalar(&mut self, name: &str, value: f64) {
        log::info!("experiment {}: {} = {}", self.run, name, value);
    }
}

/// In-memory sink recording every reported value, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub scalars: Vec<(String, f64)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.scalars.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.scalars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }
}

impl MetricsSink for RecordingSink {
    fn log_scalar(&mut self, name: &str, value: f64) {
        self.scalars.push((name.to_string(), value));
    }
}
