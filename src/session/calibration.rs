use serde::{Deserialize, Serialize};
use std::fmt;

use crate::estimator::CalibrationOutcome;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityTier {
    /// Fixed thresholds on mean calibration error; lower is better.
    pub fn from_mean_error(mean_error: f64) -> Self {
        if mean_error < 0.05 {
            QualityTier::Excellent
        } else if mean_error < 0.10 {
            QualityTier::Good
        } else if mean_error < 0.20 {
            QualityTier::Fair
        } else {
            // NaN lands here too.
            QualityTier::Poor
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityTier::Excellent => "EXCELLENT",
            QualityTier::Good => "GOOD",
            QualityTier::Fair => "FAIR",
            QualityTier::Poor => "POOR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub mean_error: f64,
    pub tier: QualityTier,
    pub passed: bool,
}

impl CalibrationResult {
    pub fn new(mean_error: f64, passed: bool) -> Self {
        Self {
            mean_error,
            tier: QualityTier::from_mean_error(mean_error),
            passed,
        }
    }
}

impl From<CalibrationOutcome> for CalibrationResult {
    fn from(outcome: CalibrationOutcome) -> Self {
        Self::new(outcome.mean_error, outcome.passed)
    }
}
