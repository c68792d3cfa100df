use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
    Camera,
};

use super::device::{CameraError, CaptureDevice};
use super::frame::{ChannelOrder, RawFrame};

/// A physical camera opened through nokhwa.
pub struct WebcamDevice {
    camera: Camera,
    streaming: bool,
}

impl WebcamDevice {
    pub fn open(device_id: u32, width: u32, height: u32, fps: u32) -> Result<Self, CameraError> {
        let open_err = |reason: String| CameraError::Open { device_id, reason };

        let format = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));
        let mut camera = Camera::new(CameraIndex::Index(device_id), requested)
            .map_err(|e| open_err(e.to_string()))?;

        camera
            .open_stream()
            .map_err(|e| open_err(e.to_string()))?;

        log::info!(
            "Opened camera {} ({}), format {}",
            device_id,
            camera.info().human_name(),
            camera.camera_format()
        );

        Ok(Self {
            camera,
            streaming: true,
        })
    }
}

impl CaptureDevice for WebcamDevice {
    fn name(&self) -> String {
        self.camera.info().human_name()
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::Read(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::Read(e.to_string()))?;

        Ok(RawFrame {
            width: decoded.width(),
            height: decoded.height(),
            order: ChannelOrder::Rgb,
            pixels: decoded.into_raw(),
        })
    }

    fn release(&mut self) {
        if self.streaming {
            if let Err(err) = self.camera.stop_stream() {
                log::warn!("Failed to stop camera stream: {err}");
            }
            self.streaming = false;
        }
    }
}
