pub mod device;
pub mod frame;
pub mod router;
pub mod source;
#[cfg(feature = "webcam")]
pub mod webcam;

pub use device::{CameraError, CaptureDevice, DeviceFactory, OpenError, SyntheticDevice};
pub use frame::{CameraState, ChannelOrder, Frame, RawFrame};
pub use router::{CallbackRouter, FrameHandler, SharedHandler};
pub use source::{exit_on_fatal, FatalHandler, FrameSource, SourceConfig};
#[cfg(feature = "webcam")]
pub use webcam::WebcamDevice;
