pub mod collector;
pub mod export;
pub mod samples;

pub use collector::{CollectorContext, GazeCollector};
pub use export::write_samples_csv;
pub use samples::{GazeSample, GazeSampleLog, SampleError, ScreenBounds};
