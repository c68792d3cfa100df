pub mod bridge;
pub mod live;
pub mod storage;

pub use bridge::{DualSinkBridge, SinkReport};
pub use live::LiveView;
pub use storage::{
    finalize_session_dir, sanitize_session_name, temp_session_name, unique_session_dir, ImageSink,
    IMAGES_DIR,
};
