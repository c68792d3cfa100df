use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};
use image::RgbImage;

use super::device::{normalize, CameraError, CaptureDevice, DeviceFactory, OpenError};
use super::frame::{CameraState, Frame, MonotonicClock};
use super::router::CallbackRouter;
use crate::utils::panic::catch_panic;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Called on the capture thread when the consumer path fails.
pub type FatalHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

/// Default fatal policy: a broken capture pipeline takes the process down.
pub fn exit_on_fatal() -> FatalHandler {
    Arc::new(|err| {
        log::error!("Capture pipeline failed, terminating: {err:?}");
        std::process::exit(1);
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceConfig {
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

struct LoopContext {
    config: SourceConfig,
    router: Arc<CallbackRouter>,
    state: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    clock: MonotonicClock,
}

/// An open camera with its dedicated capture thread.
pub struct FrameSource {
    device_name: String,
    state: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FrameSource {
    /// Opens the device on a new capture thread and starts feeding `router`.
    ///
    /// Returns once the device is open, or with the device's open error.
    pub fn open(
        config: SourceConfig,
        router: Arc<CallbackRouter>,
        factory: DeviceFactory,
        on_fatal: FatalHandler,
    ) -> Result<Self, OpenError> {
        let state = Arc::new(AtomicU8::new(CameraState::Standby.as_u8()));
        let running = Arc::new(AtomicBool::new(true));
        let frames = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, CameraError>>();

        let ctx = LoopContext {
            config,
            router,
            state: Arc::clone(&state),
            running: Arc::clone(&running),
            frames: Arc::clone(&frames),
            clock: MonotonicClock::start(),
        };

        let worker = thread::Builder::new()
            .name("gazerec-capture".into())
            .spawn(move || {
                let mut device = match factory() {
                    Ok(device) => device,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                if ready_tx.send(Ok(device.name())).is_err() {
                    device.release();
                    return;
                }

                let outcome = catch_panic(|| capture_loop(device.as_mut(), &ctx));
                ctx.running.store(false, Ordering::SeqCst);
                device.release();
                log_info!("Capture thread exiting");

                if let Err(err) = outcome {
                    on_fatal(&err);
                }
            })
            .map_err(|err| CameraError::Open {
                device_id: config.device_id,
                reason: format!("failed to spawn capture thread: {err}"),
            })?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(CameraError::Closed);
            }
        };

        log_info!(
            "Frame source open: {} at {}x{} @ {} fps",
            device_name,
            config.width,
            config.height,
            config.fps
        );

        Ok(Self {
            device_name,
            state,
            running,
            frames,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn set_state(&self, state: CameraState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn state(&self) -> CameraState {
        CameraState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the loop and waits for the capture thread to exit.
    ///
    /// Safe to call any number of times; the device is released exactly
    /// once, by the capture thread on its way out. No handler runs after
    /// the first call returns.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = {
            let mut guard = match self.worker.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Closing from inside a handler; the loop exits after this frame.
                return;
            }
            if let Err(join_err) = handle.join() {
                log::error!("Failed to join capture thread: {join_err:?}");
            }
            log::info!("Frame source closed ({} frames)", self.frames_captured());
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_loop(device: &mut dyn CaptureDevice, ctx: &LoopContext) -> Result<()> {
    let SourceConfig { width, height, .. } = ctx.config;
    let mut frame = Frame::new(RgbImage::new(width, height), 0);
    let mut read_failures: u64 = 0;

    while ctx.running.load(Ordering::SeqCst) {
        let raw = match device.read_frame() {
            Ok(raw) => raw,
            Err(err) => {
                read_failures += 1;
                if read_failures <= 3 || read_failures % 100 == 0 {
                    log_warn!("Failed to grab frame ({} so far): {}", read_failures, err);
                }
                thread::sleep(READ_RETRY_DELAY);
                continue;
            }
        };
        let timestamp_ns = ctx.clock.now_ns();

        match normalize(raw, width, height) {
            Ok(image) => {
                frame.image = image;
                frame.timestamp_ns = timestamp_ns;
            }
            Err(err) => {
                log_warn!("Dropping malformed frame: {}", err);
                continue;
            }
        }

        ctx.frames.fetch_add(1, Ordering::Relaxed);

        let state = CameraState::from_u8(ctx.state.load(Ordering::SeqCst));
        if let Err(err) = ctx.router.invoke(state, &frame) {
            log_error!("Frame consumer failed at {} ns: {:?}", frame.timestamp_ns, err);
            return Err(err).context("frame consumer failed inside the capture loop");
        }
    }

    if read_failures > 0 {
        log_warn!("Capture loop saw {} read failures", read_failures);
    }
    Ok(())
}
