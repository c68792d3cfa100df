use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Running state the camera reports alongside every frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CameraState {
    Standby,
    Calibrating,
    Sampling,
}

impl Default for CameraState {
    fn default() -> Self {
        CameraState::Standby
    }
}

impl CameraState {
    pub fn as_u8(self) -> u8 {
        match self {
            CameraState::Standby => 0,
            CameraState::Calibrating => 1,
            CameraState::Sampling => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => CameraState::Calibrating,
            2 => CameraState::Sampling,
            _ => CameraState::Standby,
        }
    }
}

/// Byte order of the three colour channels in a raw device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// A buffer exactly as the device produced it.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub pixels: Vec<u8>,
}

/// A normalized RGB frame with its monotonic capture time.
///
/// The capture loop reuses the same `Frame` on every iteration and only
/// lends it to consumers, so anything that must outlive a callback has to
/// `clone()` it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp_ns: u64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_ns: u64) -> Self {
        Self {
            image,
            timestamp_ns,
        }
    }
}

/// Nanosecond timestamps relative to the moment the source was opened.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }

    pub fn now_ns(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}
