use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::samples::GazeSample;

#[derive(Serialize)]
struct SampleRow {
    timestamp_ms: i64,
    gaze_x: Option<f64>,
    gaze_y: Option<f64>,
    tracking_ok: bool,
    looking_at_screen: bool,
    tracking_lost: bool,
}

impl From<&GazeSample> for SampleRow {
    fn from(sample: &GazeSample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms(),
            gaze_x: sample.gaze_x(),
            gaze_y: sample.gaze_y(),
            tracking_ok: sample.tracking_ok(),
            looking_at_screen: sample.looking_at_screen(),
            tracking_lost: sample.tracking_lost(),
        }
    }
}

/// Writes the samples as CSV with a header row; absent coordinates are
/// empty cells.
pub fn write_samples_csv(path: &Path, samples: &[GazeSample]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for sample in samples {
        writer
            .serialize(SampleRow::from(sample))
            .with_context(|| format!("failed to write sample row to {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}
