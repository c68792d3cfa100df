use std::thread;
use std::time::{Duration, Instant};

use image::{imageops, ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

use super::frame::{ChannelOrder, RawFrame};

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open camera {device_id}: {reason}")]
    Open { device_id: u32, reason: String },
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("invalid frame buffer: expected {expected} bytes, got {actual}")]
    BadBuffer { expected: usize, actual: usize },
    #[error("capture thread is gone")]
    Closed,
}

/// Error returned by `FrameSource::open`.
pub type OpenError = CameraError;

/// A camera the capture loop can pull from.
///
/// `read_frame` may block until the next frame is available; it is only
/// ever called from the capture thread.
pub trait CaptureDevice {
    fn name(&self) -> String;
    fn read_frame(&mut self) -> Result<RawFrame, CameraError>;
    fn release(&mut self);
}

/// Builds the device on the capture thread, so devices need not be `Send`.
pub type DeviceFactory =
    Box<dyn FnOnce() -> Result<Box<dyn CaptureDevice>, CameraError> + Send + 'static>;

/// Converts a raw buffer into an RGB image of exactly `width` x `height`.
pub fn normalize(raw: RawFrame, width: u32, height: u32) -> Result<RgbImage, CameraError> {
    let expected = raw.width as usize * raw.height as usize * 3;
    if raw.pixels.len() != expected {
        return Err(CameraError::BadBuffer {
            expected,
            actual: raw.pixels.len(),
        });
    }

    let mut pixels = raw.pixels;
    if raw.order == ChannelOrder::Bgr {
        for px in pixels.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }

    let image: RgbImage = ImageBuffer::from_raw(raw.width, raw.height, pixels).ok_or(
        CameraError::BadBuffer {
            expected,
            actual: 0,
        },
    )?;

    if image.width() == width && image.height() == height {
        Ok(image)
    } else {
        Ok(imageops::resize(
            &image,
            width,
            height,
            imageops::FilterType::Triangle,
        ))
    }
}

/// Paced test-pattern camera producing BGR frames.
pub struct SyntheticDevice {
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_due: Option<Instant>,
    produced: u64,
    fail_every: Option<u64>,
}

impl SyntheticDevice {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            width,
            height,
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            next_due: None,
            produced: 0,
            fail_every: None,
        }
    }

    /// Makes every n-th read fail, to exercise the transient-error path.
    pub fn with_failures_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    fn pace(&mut self) {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + self.frame_interval);
    }
}

impl CaptureDevice for SyntheticDevice {
    fn name(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        self.pace();
        self.produced += 1;

        if let Some(n) = self.fail_every {
            if self.produced % n == 0 {
                return Err(CameraError::Read(format!(
                    "synthetic dropout at frame {}",
                    self.produced
                )));
            }
        }

        let shift = (self.produced % 256) as u32;
        let image = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            // BGR on purpose: the loop has to swap it.
            Rgb([
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
                ((x + shift) % 256) as u8,
            ])
        });

        Ok(RawFrame {
            width: self.width,
            height: self.height,
            order: ChannelOrder::Bgr,
            pixels: image.into_raw(),
        })
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_swaps_bgr_to_rgb() {
        let raw = RawFrame {
            width: 1,
            height: 1,
            order: ChannelOrder::Bgr,
            pixels: vec![10, 20, 30],
        };
        let image = normalize(raw, 1, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn normalize_resizes_to_configured_shape() {
        let raw = RawFrame {
            width: 4,
            height: 2,
            order: ChannelOrder::Rgb,
            pixels: vec![128; 4 * 2 * 3],
        };
        let image = normalize(raw, 8, 6).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
    }

    #[test]
    fn normalize_rejects_short_buffers() {
        let raw = RawFrame {
            width: 2,
            height: 2,
            order: ChannelOrder::Rgb,
            pixels: vec![0; 5],
        };
        assert!(matches!(
            normalize(raw, 2, 2),
            Err(CameraError::BadBuffer { expected: 12, actual: 5 })
        ));
    }

    #[test]
    fn synthetic_device_reports_dropouts() {
        let mut device = SyntheticDevice::new(4, 4, 1000).with_failures_every(2);
        assert!(device.read_frame().is_ok());
        assert!(matches!(device.read_frame(), Err(CameraError::Read(_))));
        assert!(device.read_frame().is_ok());
    }
}
