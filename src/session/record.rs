use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gaze::{write_samples_csv, GazeSampleLog};
use crate::metrics::{CounterSnapshot, SessionStatistics};

use super::calibration::CalibrationResult;

const SAMPLES_FILE: &str = "samples.csv";
const SUMMARY_FILE: &str = "summary.json";

/// One finished recording.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub name: String,
    pub directory_path: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub samples: GazeSampleLog,
    pub saved_image_count: u32,
}

impl SessionRecord {
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn samples_path(&self) -> PathBuf {
        self.directory_path.join(SAMPLES_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.directory_path.join(SUMMARY_FILE)
    }

    /// Path of the table the estimator exports for this session.
    pub fn export_path(&self) -> PathBuf {
        self.directory_path.join(format!("{}.csv", self.name))
    }

    pub fn write_samples(&self) -> Result<()> {
        write_samples_csv(&self.samples_path(), self.samples.as_slice())
    }
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub saved_image_count: u32,
    pub calibration: Option<CalibrationResult>,
    pub statistics: SessionStatistics,
    pub counters: CounterSnapshot,
}

impl SessionSummary {
    pub fn new(
        record: &SessionRecord,
        calibration: Option<CalibrationResult>,
        statistics: SessionStatistics,
        counters: CounterSnapshot,
    ) -> Self {
        Self {
            name: record.name.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
            saved_image_count: record.saved_image_count,
            calibration,
            statistics,
            counters,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write summary to {}", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read summary from {}", path.display()))?;
        Ok(serde_json::from_str(&contents)?)
    }
}
