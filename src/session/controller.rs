use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::{
    sync::Mutex,
    task::{self, JoinHandle},
    time,
};

use crate::camera::{CallbackRouter, CameraState, Frame, FrameSource, SharedHandler};
use crate::estimator::{EstimatorFrameHandler, GazeEstimator};
use crate::gaze::{CollectorContext, GazeCollector, GazeSampleLog, ScreenBounds};
use crate::metrics::{compute_statistics, CounterSnapshot, PipelineCounters, SessionStatistics};
use crate::recording::{
    finalize_session_dir, sanitize_session_name, temp_session_name, unique_session_dir,
    DualSinkBridge, ImageSink, LiveView,
};
use crate::settings::RecorderSettings;

use super::calibration::CalibrationResult;
use super::record::{SessionRecord, SessionSummary};
use super::state::{SessionEvent, SessionStatus};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub bounds: ScreenBounds,
    pub output_root: PathBuf,
    pub image_save_interval: Duration,
    pub jpeg_quality: u8,
    pub auto_start_after_calibration: bool,
    /// Heartbeat period in ticks of one second.
    pub heartbeat_every_ticks: u32,
}

impl ControllerConfig {
    pub fn from_settings(settings: &RecorderSettings) -> Self {
        let debug_mode = std::env::var("GAZEREC_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            bounds: settings.screen_bounds(),
            output_root: settings.output_root.clone(),
            image_save_interval: settings.image_save_interval(),
            jpeg_quality: settings.jpeg_quality(),
            auto_start_after_calibration: settings.auto_start_after_calibration,
            heartbeat_every_ticks: if debug_mode {
                1
            } else {
                settings.heartbeat_interval_secs.max(1)
            },
        }
    }
}

/// Everything the render loop needs for one tick. Taking it never waits
/// on the capture thread or on a controller operation in progress.
#[derive(Debug, Clone)]
pub struct RenderSnapshot {
    pub current_frame: Option<Arc<Frame>>,
    pub current_gaze_x: Option<f64>,
    pub current_gaze_y: Option<f64>,
    pub state: SessionStatus,
    pub statistics: Option<SessionStatistics>,
    pub calibration: Option<CalibrationResult>,
}

/// Controller state mirrored for lock-free readers.
#[derive(Debug, Clone, Default)]
struct Published {
    status: SessionStatus,
    calibration: Option<CalibrationResult>,
    statistics: Option<SessionStatistics>,
    counters: Option<Arc<PipelineCounters>>,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub record: SessionRecord,
    pub statistics: SessionStatistics,
    pub counters: CounterSnapshot,
}

/// A recording in progress. Created by `start`, consumed by `stop`.
struct Session {
    started_at: DateTime<Utc>,
    started: Instant,
    temp_dir: PathBuf,
    bridge: Arc<DualSinkBridge>,
    previous: Option<SharedHandler>,
    counters: Arc<PipelineCounters>,
}

#[derive(Default)]
struct ControllerState {
    status: SessionStatus,
    calibration: Option<CalibrationResult>,
    statistics: Option<SessionStatistics>,
    session: Option<Session>,
}

#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<ControllerState>>,
    published: Arc<ArcSwap<Published>>,
    source: Arc<FrameSource>,
    router: Arc<CallbackRouter>,
    estimator: Arc<dyn GazeEstimator>,
    collector: Arc<Mutex<GazeCollector>>,
    live: Arc<LiveView>,
    config: ControllerConfig,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl SessionController {
    /// Takes over an open source and installs the estimator as the
    /// router's consumer.
    pub fn new(
        source: FrameSource,
        router: Arc<CallbackRouter>,
        estimator: Arc<dyn GazeEstimator>,
        config: ControllerConfig,
    ) -> Self {
        let handler: SharedHandler = Arc::new(EstimatorFrameHandler::new(Arc::clone(&estimator)));
        if router.swap(Some(handler)).is_some() {
            warn!("Replaced an existing frame consumer with {}", estimator.name());
        }

        Self {
            state: Arc::new(Mutex::new(ControllerState::default())),
            published: Arc::new(ArcSwap::from_pointee(Published::default())),
            source: Arc::new(source),
            router,
            estimator,
            collector: Arc::new(Mutex::new(GazeCollector::new())),
            live: Arc::new(LiveView::new()),
            config,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.published.load().status
    }

    pub fn calibration(&self) -> Option<CalibrationResult> {
        self.published.load().calibration
    }

    pub fn statistics(&self) -> Option<SessionStatistics> {
        self.published.load().statistics
    }

    /// Counters of the current recording, if one is running.
    pub fn counters(&self) -> Option<CounterSnapshot> {
        self.published
            .load()
            .counters
            .as_ref()
            .map(|counters| counters.snapshot())
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn render_snapshot(&self) -> RenderSnapshot {
        let published = self.published.load();
        let gaze = self.live.current_gaze();
        RenderSnapshot {
            current_frame: self.live.current_frame(),
            current_gaze_x: gaze.map(|(x, _)| x),
            current_gaze_y: gaze.map(|(_, y)| y),
            state: published.status,
            statistics: published.statistics,
            calibration: published.calibration,
        }
    }

    /// IDLE -> CALIBRATED, then straight into recording when configured to.
    ///
    /// The result is returned once calibration succeeds. A failed
    /// auto-start is logged and leaves the controller CALIBRATED.
    pub async fn calibrate(&self) -> Result<CalibrationResult> {
        let result = {
            let mut state = self.state.lock().await;
            let next = state.status.apply(SessionEvent::Calibrate)?;
            let result = self.run_calibration().await?;
            state.status = next;
            state.calibration = Some(result);
            self.publish(&state);
            result
        };

        if self.config.auto_start_after_calibration {
            if let Err(err) = self.start().await {
                error!("Calibrated, but recording failed to start: {:?}", err);
            }
        }
        Ok(result)
    }

    pub async fn recalibrate(&self) -> Result<CalibrationResult> {
        let mut state = self.state.lock().await;
        let next = state.status.apply(SessionEvent::Recalibrate)?;
        let result = self.run_calibration().await?;
        state.status = next;
        state.calibration = Some(result);
        self.publish(&state);
        Ok(result)
    }

    pub async fn continue_same_calibration(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let next = state.status.apply(SessionEvent::ContinueSameCalibration)?;
        state.status = next;
        state.statistics = None;
        self.live.clear();
        self.publish(&state);
        info!("Continuing with the same calibration");
        Ok(())
    }

    pub async fn recalibrate_and_continue(&self) -> Result<CalibrationResult> {
        let mut state = self.state.lock().await;
        let next = state.status.apply(SessionEvent::RecalibrateAndContinue)?;
        self.live.clear();
        let result = self.run_calibration().await?;
        state.status = next;
        state.calibration = Some(result);
        state.statistics = None;
        self.publish(&state);
        Ok(result)
    }

    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let next = state.status.apply(SessionEvent::Start)?;
        let session = self.begin_session().await?;
        state.session = Some(session);
        state.status = next;
        state.statistics = None;
        self.publish(&state);
        Ok(())
    }

    /// Ends the recording and writes it under `name`.
    ///
    /// The bridge is uninstalled before anything else, so no frame can
    /// reach the session's sink while its directory is being renamed.
    /// File errors are logged; the session still ends up STOPPED.
    pub async fn stop(&self, name: &str) -> Result<SessionOutcome> {
        let mut state = self.state.lock().await;
        let next = state.status.apply(SessionEvent::Stop)?;
        let session = state
            .session
            .take()
            .ok_or_else(|| anyhow!("recording without an active session"))?;

        self.router.swap(session.previous.clone());
        self.source.set_state(CameraState::Standby);
        self.cancel_ticker().await;

        if let Err(err) = self.estimator.stop_sampling() {
            warn!("Estimator failed to stop sampling: {:?}", err);
        }
        self.estimator.unsubscribe();

        let samples = match self.collector.lock().await.stop().await {
            Ok(samples) => samples,
            Err(err) => {
                error!("Gaze samples lost: {:?}", err);
                GazeSampleLog::new()
            }
        };

        let end_time = Utc::now();
        let duration = session.started.elapsed().as_secs_f64();
        let sink = session.bridge.finish();
        let counters = session.counters.snapshot();
        let statistics = compute_statistics(samples.as_slice(), duration);

        let name = sanitize_session_name(name, end_time);
        let written = sink.session_dir.clone();
        let directory_path = self.finalize_directory(written, session.temp_dir, &name).await;

        let record = SessionRecord {
            name,
            directory_path,
            start_time: session.started_at,
            end_time,
            samples,
            saved_image_count: sink.saved_images,
        };
        let summary = SessionSummary::new(&record, state.calibration, statistics, counters);

        self.live.clear();
        state.status = next;
        state.statistics = Some(statistics);
        self.publish(&state);
        drop(state);

        let record = self.persist(record, summary).await?;

        info!(
            "Session '{}' stopped: {:.1}s, {} samples, {:.1}% on screen, {:.1}% lost, {} images in {}",
            record.name,
            statistics.total_duration,
            statistics.total_samples,
            statistics.percentage_on_screen,
            statistics.percentage_lost,
            record.saved_image_count,
            record.directory_path.display()
        );

        Ok(SessionOutcome {
            record,
            statistics,
            counters,
        })
    }

    /// Orderly shutdown: stops the capture thread (which releases the
    /// device) and then releases the estimator.
    pub async fn quit(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let next = state.status.apply(SessionEvent::Quit)?;

        self.cancel_ticker().await;
        self.router.swap(None);

        let source = Arc::clone(&self.source);
        let estimator = Arc::clone(&self.estimator);
        task::spawn_blocking(move || {
            source.close();
            estimator.release();
        })
        .await
        .context("shutdown task panicked")?;

        self.live.clear();
        state.status = next;
        self.publish(&state);
        info!("Recorder shut down");
        Ok(())
    }

    async fn run_calibration(&self) -> Result<CalibrationResult> {
        self.source.set_state(CameraState::Calibrating);
        let estimator = Arc::clone(&self.estimator);
        let outcome = task::spawn_blocking(move || estimator.calibrate()).await;
        self.source.set_state(CameraState::Standby);

        let result = CalibrationResult::from(outcome.context("calibration task panicked")??);
        if result.passed {
            info!(
                "Calibration finished: mean error {:.4} ({})",
                result.mean_error, result.tier
            );
        } else {
            warn!(
                "Calibration did not pass: mean error {:.4} ({}); recalibration advised",
                result.mean_error, result.tier
            );
        }
        Ok(result)
    }

    async fn begin_session(&self) -> Result<Session> {
        let started_at = Utc::now();
        let started = Instant::now();
        let counters = Arc::new(PipelineCounters::new());
        let temp_dir =
            unique_session_dir(&self.config.output_root, &temp_session_name(started_at));

        let sender = self
            .collector
            .lock()
            .await
            .start(CollectorContext {
                bounds: self.config.bounds,
                live: Arc::clone(&self.live),
                counters: Arc::clone(&counters),
            })
            .await?;
        self.estimator.subscribe(sender);

        if let Err(err) = self.estimator.start_sampling() {
            self.estimator.unsubscribe();
            if let Err(stop_err) = self.collector.lock().await.stop().await {
                error!("Failed to stop gaze collection: {:?}", stop_err);
            }
            return Err(err.context("estimator refused to start sampling"));
        }

        let sink = ImageSink::new(
            temp_dir.clone(),
            self.config.image_save_interval,
            self.config.jpeg_quality,
            started,
        );
        let bridge = Arc::new(DualSinkBridge::new(
            self.router.current(),
            Arc::clone(&self.live),
            Arc::clone(&counters),
            sink,
        ));
        let handler: SharedHandler = bridge.clone();
        let previous = self.router.swap(Some(handler));
        self.source.set_state(CameraState::Sampling);

        self.spawn_ticker(Arc::clone(&counters)).await;
        info!("Recording started, images go to {}", temp_dir.display());

        Ok(Session {
            started_at,
            started,
            temp_dir,
            bridge,
            previous,
            counters,
        })
    }

    async fn finalize_directory(
        &self,
        written: Option<PathBuf>,
        temp_dir: PathBuf,
        name: &str,
    ) -> PathBuf {
        let root = self.config.output_root.clone();
        let target_name = name.to_string();
        let written_dir = written.clone();

        let result = task::spawn_blocking(move || {
            finalize_session_dir(&root, written_dir.as_deref(), &target_name)
        })
        .await
        .context("directory task panicked")
        .and_then(|result| result);

        match result {
            Ok(dir) => dir,
            Err(err) => {
                error!("Failed to finalize session directory: {:?}", err);
                written.unwrap_or(temp_dir)
            }
        }
    }

    async fn persist(&self, record: SessionRecord, summary: SessionSummary) -> Result<SessionRecord> {
        let estimator = Arc::clone(&self.estimator);

        task::spawn_blocking(move || {
            if let Err(err) = estimator.export(&record.export_path()) {
                error!("Estimator export failed: {:?}", err);
            }
            if let Err(err) = record.write_samples() {
                error!("Failed to write gaze samples: {:?}", err);
            }
            if let Err(err) = summary.write(&record.summary_path()) {
                error!("Failed to write session summary: {:?}", err);
            }
            record
        })
        .await
        .context("session persistence task panicked")
    }

    fn publish(&self, state: &ControllerState) {
        self.published.store(Arc::new(Published {
            status: state.status,
            calibration: state.calibration,
            statistics: state.statistics,
            counters: state
                .session
                .as_ref()
                .map(|session| Arc::clone(&session.counters)),
        }));
    }

    async fn spawn_ticker(&self, counters: Arc<PipelineCounters>) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let source = Arc::clone(&self.source);
        let tick_interval = self.tick_interval;
        let heartbeat_every = self.config.heartbeat_every_ticks.max(1);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick completes immediately.
            interval.tick().await;
            let mut ticks: u32 = 0;
            loop {
                interval.tick().await;
                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every != 0 {
                    continue;
                }

                let snapshot = counters.snapshot();
                info!(
                    "Recording from {}: {} frames, {} samples, {} images ({} image failures, {} forward failures)",
                    source.device_name(),
                    snapshot.frames_seen,
                    snapshot.samples_appended,
                    snapshot.images_saved,
                    snapshot.image_failures,
                    snapshot.forward_failures
                );
                if !source.is_running() {
                    warn!("Capture thread is no longer running");
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CaptureDevice, DeviceFactory, SourceConfig, SyntheticDevice};
    use crate::estimator::{SimulatedConfig, SimulatedEstimator};
    use crate::recording::IMAGES_DIR;
    use std::path::Path;

    fn screen() -> ScreenBounds {
        ScreenBounds::new(1920.0, 1080.0)
    }

    fn controller(
        root: &Path,
        auto_start: bool,
        tweak: impl FnOnce(&mut SimulatedConfig),
    ) -> SessionController {
        let router = Arc::new(CallbackRouter::new());
        let factory: DeviceFactory =
            Box::new(|| Ok(Box::new(SyntheticDevice::new(32, 24, 200)) as Box<dyn CaptureDevice>));
        let source = FrameSource::open(
            SourceConfig {
                device_id: 0,
                width: 32,
                height: 24,
                fps: 200,
            },
            Arc::clone(&router),
            factory,
            Arc::new(|err| log::error!("capture failed in test: {err:?}")),
        )
        .unwrap();

        let mut sim = SimulatedConfig::new(screen());
        tweak(&mut sim);
        let estimator = Arc::new(SimulatedEstimator::new(sim).unwrap());

        SessionController::new(
            source,
            router,
            estimator,
            ControllerConfig {
                bounds: screen(),
                output_root: root.to_path_buf(),
                image_save_interval: Duration::from_millis(40),
                jpeg_quality: 85,
                auto_start_after_calibration: auto_start,
                heartbeat_every_ticks: 1,
            },
        )
    }

    async fn wait_for_samples(controller: &SessionController, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let seen = controller.counters().map(|c| c.samples_appended).unwrap_or(0);
            if seen >= n {
                return;
            }
            assert!(Instant::now() < deadline, "only {seen} samples arrived");
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn operations_outside_their_state_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), false, |_| {});

        assert!(controller.start().await.is_err());
        assert!(controller.stop("x").await.is_err());
        assert!(controller.recalibrate().await.is_err());
        assert!(controller.continue_same_calibration().await.is_err());
        assert_eq!(controller.status(), SessionStatus::Idle);

        controller.calibrate().await.unwrap();
        assert_eq!(controller.status(), SessionStatus::Calibrated);
        assert!(controller.calibrate().await.is_err());
        controller.quit().await.unwrap();
    }

    #[tokio::test]
    async fn calibrate_starts_recording_and_stop_writes_session() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), true, |_| {});

        let calibration = controller.calibrate().await.unwrap();
        assert!(calibration.passed);
        assert_eq!(controller.status(), SessionStatus::Recording);
        assert_eq!(controller.source().state(), CameraState::Sampling);

        wait_for_samples(&controller, 30).await;
        let outcome = controller.stop("  p01 ").await.unwrap();

        assert_eq!(controller.status(), SessionStatus::Stopped);
        assert_eq!(controller.source().state(), CameraState::Standby);
        assert_eq!(controller.statistics(), Some(outcome.statistics));
        assert!(controller.counters().is_none());

        let record = &outcome.record;
        assert_eq!(record.name, "p01");
        assert_eq!(record.directory_path, dir.path().join("p01"));
        assert!(record.samples.len() >= 30);
        assert_eq!(outcome.statistics.total_samples, record.samples.len() as u64);
        assert!(record.samples_path().is_file());
        assert!(record.summary_path().is_file());
        assert!(record.export_path().is_file());

        if record.saved_image_count > 0 {
            let images = std::fs::read_dir(record.directory_path.join(IMAGES_DIR))
                .unwrap()
                .count();
            assert_eq!(images as u32, record.saved_image_count);
        }

        let snapshot = controller.render_snapshot();
        assert!(snapshot.current_frame.is_none());
        assert!(snapshot.current_gaze_x.is_none());
        assert_eq!(snapshot.state, SessionStatus::Stopped);

        controller.quit().await.unwrap();
        assert!(!controller.source().is_running());
    }

    #[tokio::test]
    async fn failed_calibration_is_kept_and_can_be_redone() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), true, |sim| {
            sim.calibration_passes = false;
            sim.calibration_error = 0.25;
        });

        let result = controller.calibrate().await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.tier, crate::session::QualityTier::Poor);
        // Auto-start still happens; the operator decides what to do with it.
        assert_eq!(controller.status(), SessionStatus::Recording);
        controller.stop("bad").await.unwrap();

        controller.recalibrate_and_continue().await.unwrap();
        assert_eq!(controller.status(), SessionStatus::Calibrated);
        assert!(controller.statistics().is_none());
        assert_eq!(controller.calibration(), Some(result));
        controller.quit().await.unwrap();
    }

    #[tokio::test]
    async fn repeated_sessions_get_distinct_directories() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), false, |_| {});
        controller.calibrate().await.unwrap();

        let mut dirs = Vec::new();
        for round in 0..2 {
            if round > 0 {
                controller.continue_same_calibration().await.unwrap();
            }
            controller.start().await.unwrap();
            wait_for_samples(&controller, 5).await;
            let outcome = controller.stop("lab").await.unwrap();
            dirs.push(outcome.record.directory_path);
        }

        assert_eq!(dirs, vec![dir.path().join("lab"), dir.path().join("lab_1")]);
        controller.quit().await.unwrap();
        assert_eq!(controller.status(), SessionStatus::Terminated);
        assert!(controller.calibrate().await.is_err());
    }

    #[tokio::test]
    async fn failed_auto_start_keeps_the_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(dir.path(), true, |sim| sim.refuse_sampling = true);

        let result = controller.calibrate().await.unwrap();
        assert!(result.passed);
        assert_eq!(controller.status(), SessionStatus::Calibrated);
        assert_eq!(controller.calibration(), Some(result));
        assert!(controller.counters().is_none());
        assert_eq!(controller.source().state(), CameraState::Standby);

        assert!(controller.start().await.is_err());
        assert_eq!(controller.status(), SessionStatus::Calibrated);
        controller.quit().await.unwrap();
    }
}
