use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use anyhow::Result;

use crate::camera::{CameraState, Frame, FrameHandler, SharedHandler};
use crate::metrics::PipelineCounters;
use crate::utils::panic::catch_panic;

use super::live::LiveView;
use super::storage::ImageSink;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Log every n-th saved image.
const IMAGE_LOG_EVERY: u32 = 30;

/// What the image sink left behind when recording ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub saved_images: u32,
    /// `None` when no image was ever written.
    pub session_dir: Option<PathBuf>,
}

/// Frame handler installed while recording.
///
/// Every frame goes to three places: the live view, the periodic image
/// sink and the downstream estimator. A failure in one of them is logged
/// and counted but never reaches the other two or the capture thread.
pub struct DualSinkBridge {
    downstream: Option<SharedHandler>,
    live: Arc<LiveView>,
    counters: Arc<PipelineCounters>,
    sink: Mutex<ImageSink>,
}

impl DualSinkBridge {
    pub fn new(
        downstream: Option<SharedHandler>,
        live: Arc<LiveView>,
        counters: Arc<PipelineCounters>,
        sink: ImageSink,
    ) -> Self {
        Self {
            downstream,
            live,
            counters,
            sink: Mutex::new(sink),
        }
    }

    fn lock_sink(&self) -> MutexGuard<'_, ImageSink> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Runs all three actions for one frame, using `now` for the save interval.
    pub fn handle_frame(&self, state: CameraState, frame: &Frame, now: Instant) {
        self.counters.record_frame();

        if let Err(err) = catch_panic(|| {
            self.live.store_frame(frame.clone());
            Ok(())
        }) {
            log_error!("Live frame update failed: {:?}", err);
        }

        // A failed save is retried on the next frame, so failures can arrive at frame rate.
        if let Err(err) = catch_panic(|| self.save_if_due(frame, now)) {
            let failures = self.counters.record_image_failure();
            if worth_logging(failures) {
                log_error!("Image save failed ({} so far): {:?}", failures, err);
            }
        }

        if let Some(downstream) = &self.downstream {
            if let Err(err) = catch_panic(|| downstream.on_frame(state, frame)) {
                let failures = self.counters.record_forward_failure();
                if worth_logging(failures) {
                    log_error!("Estimator forward failed ({} so far): {:?}", failures, err);
                }
            }
        }
    }

    fn save_if_due(&self, frame: &Frame, now: Instant) -> Result<()> {
        let mut sink = self.lock_sink();
        if !sink.is_due(now) {
            return Ok(());
        }

        let path = sink.save(&frame.image, now)?;
        self.counters.record_image_saved();

        let saved = sink.saved();
        if saved == 1 || saved % IMAGE_LOG_EVERY == 0 {
            log_info!("Saved image {} ({})", saved, path.display());
        }
        Ok(())
    }

    pub fn saved_images(&self) -> u32 {
        self.lock_sink().saved()
    }

    pub fn finish(&self) -> SinkReport {
        let sink = self.lock_sink();
        SinkReport {
            saved_images: sink.saved(),
            session_dir: sink.session_dir().map(|dir| dir.to_path_buf()),
        }
    }
}

impl FrameHandler for DualSinkBridge {
    fn on_frame(&self, state: CameraState, frame: &Frame) -> Result<()> {
        self.handle_frame(state, frame, Instant::now());
        Ok(())
    }
}

/// Logs the first few failures of a kind, then every hundredth.
fn worth_logging(failures: u64) -> bool {
    failures <= 3 || failures % 100 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::storage::IMAGES_DIR;
    use anyhow::anyhow;
    use image::RgbImage;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct Downstream {
        calls: AtomicU64,
        mode: Mode,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Ok,
        Fail,
        Panic,
    }

    impl FrameHandler for Downstream {
        fn on_frame(&self, _state: CameraState, _frame: &Frame) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Ok => Ok(()),
                Mode::Fail => Err(anyhow!("estimator rejected frame")),
                Mode::Panic => panic!("estimator blew up"),
            }
        }
    }

    fn bridge(root: &std::path::Path, mode: Mode, start: Instant) -> (DualSinkBridge, Arc<Downstream>) {
        let downstream = Arc::new(Downstream {
            calls: AtomicU64::new(0),
            mode,
        });
        let sink = ImageSink::new(root.join("session_1"), Duration::from_secs(2), 85, start);
        let bridge = DualSinkBridge::new(
            Some(downstream.clone()),
            Arc::new(LiveView::new()),
            Arc::new(PipelineCounters::new()),
            sink,
        );
        (bridge, downstream)
    }

    fn frame(ts: u64) -> Frame {
        Frame::new(RgbImage::new(8, 6), ts)
    }

    #[test]
    fn saves_one_image_per_interval_with_contiguous_names() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let (bridge, downstream) = bridge(dir.path(), Mode::Ok, start);

        // 10 simulated seconds at 30 fps.
        for i in 0..300u64 {
            let now = start + Duration::from_millis(i * 1000 / 30 + 1);
            bridge.handle_frame(CameraState::Sampling, &frame(i), now);
        }

        let report = bridge.finish();
        assert!((4..=6).contains(&report.saved_images), "saved {}", report.saved_images);
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 300);

        let images = report.session_dir.unwrap().join(IMAGES_DIR);
        let mut names: Vec<String> = std::fs::read_dir(&images)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let expected: Vec<String> = (1..=report.saved_images)
            .map(|i| format!("{i:04}.jpg"))
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn downstream_failures_do_not_stop_the_sink() {
        for mode in [Mode::Fail, Mode::Panic] {
            let dir = tempfile::tempdir().unwrap();
            let start = Instant::now();
            let (bridge, downstream) = bridge(dir.path(), mode, start);

            for i in 0..3u64 {
                let now = start + Duration::from_secs(2 * (i + 1));
                bridge
                    .on_frame(CameraState::Sampling, &frame(i))
                    .expect("bridge never fails");
                bridge.handle_frame(CameraState::Sampling, &frame(i), now);
            }

            assert_eq!(downstream.calls.load(Ordering::SeqCst), 6);
            assert_eq!(bridge.saved_images(), 3);
            assert_eq!(bridge.counters.snapshot().forward_failures, 6);
            assert!(bridge.live.current_frame().is_some());
        }
    }

    #[test]
    fn image_failures_do_not_stop_forwarding() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the session directory should go makes every save fail.
        let blocker = dir.path().join("session_1");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let start = Instant::now();
        let (bridge, downstream) = bridge(dir.path(), Mode::Ok, start);
        for i in 0..4u64 {
            let now = start + Duration::from_secs(3 * (i + 1));
            bridge.handle_frame(CameraState::Sampling, &frame(i), now);
        }

        assert_eq!(downstream.calls.load(Ordering::SeqCst), 4);
        assert_eq!(bridge.saved_images(), 0);
        assert_eq!(bridge.counters.snapshot().image_failures, 4);
        assert_eq!(bridge.finish().session_dir, None);
    }

    #[test]
    fn no_save_before_first_interval() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let (bridge, _) = bridge(dir.path(), Mode::Ok, start);
        bridge.handle_frame(CameraState::Sampling, &frame(0), start + Duration::from_millis(500));
        assert_eq!(bridge.finish(), SinkReport { saved_images: 0, session_dir: None });
    }

    #[test]
    fn repeated_save_failures_are_counted_but_logged_sparsely() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session_1"), b"not a directory").unwrap();

        let start = Instant::now();
        let (bridge, downstream) = bridge(dir.path(), Mode::Ok, start);
        // An unwritable disk at 30 fps for 10 seconds: every frame retries the save.
        for i in 0..300u64 {
            let now = start + Duration::from_secs(2) + Duration::from_millis(i * 1000 / 30);
            bridge.handle_frame(CameraState::Sampling, &frame(i), now);
        }

        assert_eq!(bridge.counters.snapshot().image_failures, 300);
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 300);
        assert_eq!(bridge.saved_images(), 0);

        let logged = (1..=300u64).filter(|&n| worth_logging(n)).count();
        assert_eq!(logged, 6);
    }
}
