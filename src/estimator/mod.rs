pub mod simulated;

pub use simulated::{SimulatedConfig, SimulatedEstimator};

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::camera::{CameraState, Frame, FrameHandler};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceInfo {
    pub detected: bool,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeInfo {
    pub timestamp_ms: i64,
    pub status: bool,
    pub raw_coordinates: Option<(f64, f64)>,
    pub filtered_coordinates: Option<(f64, f64)>,
}

/// One tick of the estimation pipeline. Either part may be missing when
/// the estimator lost the face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeResult {
    pub face: Option<FaceInfo>,
    pub gaze: Option<GazeInfo>,
}

/// Where an estimator pushes its results. Sending never blocks and works
/// from any thread.
pub type GazeResultSender = mpsc::UnboundedSender<GazeResult>;
pub type GazeResultReceiver = mpsc::UnboundedReceiver<GazeResult>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    pub mean_error: f64,
    pub passed: bool,
}

/// The gaze-estimation engine, treated as a black box.
pub trait GazeEstimator: Send + Sync {
    fn name(&self) -> String;

    /// Synchronous frame intake, called on the capture thread.
    fn process_frame(&self, state: CameraState, frame: &Frame) -> Result<()>;

    /// Registers the channel that receives every subsequent result.
    fn subscribe(&self, sender: GazeResultSender);
    fn unsubscribe(&self);

    fn start_sampling(&self) -> Result<()>;
    fn stop_sampling(&self) -> Result<()>;

    /// Runs the full calibration protocol; may block for a long time.
    fn calibrate(&self) -> Result<CalibrationOutcome>;

    /// Writes the estimator's own sample history as a table.
    fn export(&self, path: &Path) -> Result<()>;

    fn release(&self);
}

/// Adapts an estimator's frame intake to the router's handler slot.
pub struct EstimatorFrameHandler {
    estimator: Arc<dyn GazeEstimator>,
}

impl EstimatorFrameHandler {
    pub fn new(estimator: Arc<dyn GazeEstimator>) -> Self {
        Self { estimator }
    }
}

impl FrameHandler for EstimatorFrameHandler {
    fn on_frame(&self, state: CameraState, frame: &Frame) -> Result<()> {
        self.estimator.process_frame(state, frame)
    }
}
