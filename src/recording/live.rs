use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::camera::Frame;

/// Latest frame and gaze point for the render path.
///
/// Writers replace whole values; readers take a cheap snapshot and never
/// wait on the capture thread. A reader may see a frame one tick old.
#[derive(Default)]
pub struct LiveView {
    frame: ArcSwapOption<Frame>,
    gaze: ArcSwapOption<(f64, f64)>,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_frame(&self, frame: Frame) {
        self.frame.store(Some(Arc::new(frame)));
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.frame.load_full()
    }

    pub fn set_gaze(&self, point: Option<(f64, f64)>) {
        self.gaze.store(point.map(Arc::new));
    }

    pub fn current_gaze(&self) -> Option<(f64, f64)> {
        self.gaze.load().as_deref().copied()
    }

    pub fn clear(&self) {
        self.frame.store(None);
        self.gaze.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn stores_and_clears() {
        let live = LiveView::new();
        assert!(live.current_frame().is_none());

        live.store_frame(Frame::new(RgbImage::new(2, 2), 9));
        live.set_gaze(Some((1.5, 2.5)));
        assert_eq!(live.current_frame().unwrap().timestamp_ns, 9);
        assert_eq!(live.current_gaze(), Some((1.5, 2.5)));

        live.clear();
        assert!(live.current_frame().is_none());
        assert!(live.current_gaze().is_none());
    }
}
