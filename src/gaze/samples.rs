use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimator::GazeResult;

/// Display area a gaze point must fall in to count as "on screen".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScreenBounds {
    pub width: f64,
    pub height: f64,
}

impl ScreenBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Inclusive on both edges.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("gaze coordinates are not finite: ({x}, {y})")]
    NonFinite { x: f64, y: f64 },
}

/// One estimator tick.
///
/// `looking_at_screen` can only be set through the constructors, which
/// require `tracking_ok` and an in-bounds point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GazeSample {
    timestamp_ms: i64,
    gaze_x: Option<f64>,
    gaze_y: Option<f64>,
    tracking_ok: bool,
    looking_at_screen: bool,
}

impl GazeSample {
    pub fn new(
        timestamp_ms: i64,
        point: Option<(f64, f64)>,
        tracking_ok: bool,
        bounds: &ScreenBounds,
    ) -> Result<Self, SampleError> {
        if let Some((x, y)) = point {
            if !x.is_finite() || !y.is_finite() {
                return Err(SampleError::NonFinite { x, y });
            }
        }

        let looking_at_screen = tracking_ok
            && point.map(|(x, y)| bounds.contains(x, y)).unwrap_or(false);

        Ok(Self {
            timestamp_ms,
            gaze_x: point.map(|(x, _)| x),
            gaze_y: point.map(|(_, y)| y),
            tracking_ok,
            looking_at_screen,
        })
    }

    pub fn tracking_lost_at(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            gaze_x: None,
            gaze_y: None,
            tracking_ok: false,
            looking_at_screen: false,
        }
    }

    /// Translates an estimator result. A missing or failed gaze becomes a
    /// tracking-loss sample stamped with `now_ms`.
    pub fn from_result(
        result: &GazeResult,
        bounds: &ScreenBounds,
        now_ms: i64,
    ) -> Result<Self, SampleError> {
        match &result.gaze {
            Some(gaze) if gaze.status => {
                Self::new(gaze.timestamp_ms, gaze.filtered_coordinates, true, bounds)
            }
            Some(gaze) => Ok(Self::tracking_lost_at(gaze.timestamp_ms)),
            None => Ok(Self::tracking_lost_at(now_ms)),
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn gaze_x(&self) -> Option<f64> {
        self.gaze_x
    }

    pub fn gaze_y(&self) -> Option<f64> {
        self.gaze_y
    }

    pub fn point(&self) -> Option<(f64, f64)> {
        self.gaze_x.zip(self.gaze_y)
    }

    pub fn tracking_ok(&self) -> bool {
        self.tracking_ok
    }

    pub fn tracking_lost(&self) -> bool {
        !self.tracking_ok
    }

    pub fn looking_at_screen(&self) -> bool {
        self.looking_at_screen
    }

    /// Tracking succeeded and produced a usable point.
    pub fn is_valid(&self) -> bool {
        self.tracking_ok && self.point().is_some()
    }
}

/// Append-only, arrival-ordered sequence of samples for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GazeSampleLog {
    samples: Vec<GazeSample>,
}

impl GazeSampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: GazeSample) {
        self.samples.push(sample);
    }

    pub fn snapshot(&self) -> Vec<GazeSample> {
        self.samples.clone()
    }

    pub fn as_slice(&self) -> &[GazeSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl FromIterator<GazeSample> for GazeSampleLog {
    fn from_iter<I: IntoIterator<Item = GazeSample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
