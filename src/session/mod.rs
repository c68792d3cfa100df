mod calibration;
mod controller;
mod record;
mod state;

pub use calibration::{CalibrationResult, QualityTier};
pub use controller::{ControllerConfig, RenderSnapshot, SessionController, SessionOutcome};
pub use record::{SessionRecord, SessionSummary};
pub use state::{SessionEvent, SessionStatus, TransitionError};
