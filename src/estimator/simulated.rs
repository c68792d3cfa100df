use std::{
    ops::Range,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc, Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;

use super::{CalibrationOutcome, FaceInfo, GazeEstimator, GazeInfo, GazeResult, GazeResultSender};
use crate::camera::{CameraState, Frame};
use crate::gaze::ScreenBounds;

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub screen: ScreenBounds,
    /// Tick ranges (0-based, counted from `start_sampling`) reported as lost.
    pub loss_ticks: Vec<Range<u64>>,
    /// Stop emitting after this many ticks.
    pub tick_limit: Option<u64>,
    pub calibration_error: f64,
    pub calibration_passes: bool,
    pub calibration_delay: Duration,
    /// Make every n-th `process_frame` call fail.
    pub fail_every: Option<u64>,
    /// Make `start_sampling` fail.
    pub refuse_sampling: bool,
    /// Pixel noise added to each gaze point.
    pub jitter: f64,
}

impl SimulatedConfig {
    pub fn new(screen: ScreenBounds) -> Self {
        Self {
            screen,
            loss_ticks: Vec::new(),
            tick_limit: None,
            calibration_error: 0.04,
            calibration_passes: true,
            calibration_delay: Duration::ZERO,
            fail_every: None,
            refuse_sampling: false,
            jitter: 6.0,
        }
    }

    fn is_lost(&self, tick: u64) -> bool {
        self.loss_ticks.iter().any(|range| range.contains(&tick))
    }
}

struct WorkItem {
    tick: u64,
}

#[derive(Serialize)]
struct HistoryRow {
    timestamp_ms: i64,
    face_detected: bool,
    status: bool,
    raw_x: Option<f64>,
    raw_y: Option<f64>,
    filtered_x: Option<f64>,
    filtered_y: Option<f64>,
}

type Subscriber = Arc<Mutex<Option<GazeResultSender>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Stand-in estimator that answers every sampled frame from a worker
/// thread, the way a real engine calls back from its own threads.
pub struct SimulatedEstimator {
    config: Arc<SimulatedConfig>,
    sampling: AtomicBool,
    ticks: AtomicU64,
    calls: AtomicU64,
    subscriber: Subscriber,
    history: Arc<Mutex<Vec<GazeResult>>>,
    work_tx: Mutex<Option<mpsc::Sender<WorkItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedEstimator {
    pub fn new(config: SimulatedConfig) -> Result<Self> {
        let config = Arc::new(config);
        let subscriber: Subscriber = Arc::new(Mutex::new(None));
        let history = Arc::new(Mutex::new(Vec::new()));
        let (work_tx, work_rx) = mpsc::channel::<WorkItem>();

        let worker = {
            let config = Arc::clone(&config);
            let subscriber = Arc::clone(&subscriber);
            let history = Arc::clone(&history);
            thread::Builder::new()
                .name("gazerec-estimator".into())
                .spawn(move || {
                    let mut rng = rand::thread_rng();
                    while let Ok(item) = work_rx.recv() {
                        let result = estimate(&config, item.tick, &mut rng);
                        lock(&history).push(result);
                        if let Some(tx) = lock(&subscriber).as_ref() {
                            let _ = tx.send(result);
                        }
                    }
                })
                .context("failed to spawn estimator worker thread")?
        };

        Ok(Self {
            config,
            sampling: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            subscriber,
            history,
            work_tx: Mutex::new(Some(work_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

fn estimate(config: &SimulatedConfig, tick: u64, rng: &mut impl Rng) -> GazeResult {
    let timestamp_ms = Utc::now().timestamp_millis();

    if config.is_lost(tick) {
        return GazeResult {
            face: None,
            gaze: None,
        };
    }

    let t = tick as f64 * 0.05;
    let ScreenBounds { width, height } = config.screen;
    let raw = (
        width / 2.0 + t.cos() * width * 0.35,
        height / 2.0 + (2.0 * t).sin() * height * 0.35,
    );
    let filtered = if config.jitter > 0.0 {
        (
            raw.0 + rng.gen_range(-config.jitter..=config.jitter),
            raw.1 + rng.gen_range(-config.jitter..=config.jitter),
        )
    } else {
        raw
    };

    GazeResult {
        face: Some(FaceInfo {
            detected: true,
            timestamp_ms,
        }),
        gaze: Some(GazeInfo {
            timestamp_ms,
            status: true,
            raw_coordinates: Some(raw),
            filtered_coordinates: Some(filtered),
        }),
    }
}

impl GazeEstimator for SimulatedEstimator {
    fn name(&self) -> String {
        "simulated".to_string()
    }

    fn process_frame(&self, state: CameraState, _frame: &Frame) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.config.fail_every {
            if call % n.max(1) == 0 {
                return Err(anyhow!("simulated estimator failure on call {call}"));
            }
        }

        if state != CameraState::Sampling || !self.sampling.load(Ordering::SeqCst) {
            return Ok(());
        }

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        if self.config.tick_limit.is_some_and(|limit| tick >= limit) {
            return Ok(());
        }

        match lock(&self.work_tx).as_ref() {
            Some(tx) => tx
                .send(WorkItem { tick })
                .map_err(|_| anyhow!("estimator worker stopped")),
            None => Err(anyhow!("estimator released")),
        }
    }

    fn subscribe(&self, sender: GazeResultSender) {
        *lock(&self.subscriber) = Some(sender);
    }

    fn unsubscribe(&self) {
        lock(&self.subscriber).take();
    }

    fn start_sampling(&self) -> Result<()> {
        if self.config.refuse_sampling {
            return Err(anyhow!("simulated estimator refuses to sample"));
        }
        self.ticks.store(0, Ordering::SeqCst);
        lock(&self.history).clear();
        self.sampling.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_sampling(&self) -> Result<()> {
        self.sampling.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn calibrate(&self) -> Result<CalibrationOutcome> {
        if !self.config.calibration_delay.is_zero() {
            thread::sleep(self.config.calibration_delay);
        }
        Ok(CalibrationOutcome {
            mean_error: self.config.calibration_error,
            passed: self.config.calibration_passes,
        })
    }

    fn export(&self, path: &Path) -> Result<()> {
        let history = lock(&self.history).clone();
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;

        for result in &history {
            let gaze = result.gaze.as_ref();
            let row = HistoryRow {
                timestamp_ms: gaze
                    .map(|g| g.timestamp_ms)
                    .or(result.face.map(|f| f.timestamp_ms))
                    .unwrap_or_default(),
                face_detected: result.face.map(|f| f.detected).unwrap_or(false),
                status: gaze.map(|g| g.status).unwrap_or(false),
                raw_x: gaze.and_then(|g| g.raw_coordinates).map(|p| p.0),
                raw_y: gaze.and_then(|g| g.raw_coordinates).map(|p| p.1),
                filtered_x: gaze.and_then(|g| g.filtered_coordinates).map(|p| p.0),
                filtered_y: gaze.and_then(|g| g.filtered_coordinates).map(|p| p.1),
            };
            writer.serialize(row)?;
        }

        writer.flush()?;
        Ok(())
    }

    fn release(&self) {
        self.sampling.store(false, Ordering::SeqCst);
        // Dropping the sender lets the worker finish its queue and exit.
        lock(&self.work_tx).take();
        if let Some(handle) = lock(&self.worker).take() {
            if let Err(join_err) = handle.join() {
                log::error!("Failed to join estimator worker: {join_err:?}");
            }
        }
        self.unsubscribe();
    }
}

impl Drop for SimulatedEstimator {
    fn drop(&mut self) {
        self.release();
    }
}
