use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::estimator::{GazeResult, GazeResultReceiver, GazeResultSender};
use crate::metrics::PipelineCounters;
use crate::recording::LiveView;

use super::samples::{GazeSample, GazeSampleLog, ScreenBounds};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Everything the collector task needs besides its channel.
#[derive(Clone)]
pub struct CollectorContext {
    pub bounds: ScreenBounds,
    pub live: Arc<LiveView>,
    pub counters: Arc<PipelineCounters>,
}

/// Owns the task that turns estimator results into log entries.
///
/// The task is the only writer of the session's `GazeSampleLog`; estimator
/// threads only ever touch the channel.
pub struct GazeCollector {
    handle: Option<JoinHandle<GazeSampleLog>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for GazeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl GazeCollector {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the collector and returns the sender to hand to the estimator.
    pub async fn start(&mut self, ctx: CollectorContext) -> Result<GazeResultSender> {
        if self.handle.is_some() {
            bail!("gaze collection already active");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(collect_loop(rx, ctx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        info!("Gaze collection started");
        Ok(tx)
    }

    /// Stops the task after draining every result already queued and
    /// returns the finished log.
    pub async fn stop(&mut self) -> Result<GazeSampleLog> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        match self.handle.take() {
            Some(handle) => handle.await.context("gaze collector task failed to join"),
            None => Ok(GazeSampleLog::new()),
        }
    }
}

async fn collect_loop(
    mut rx: GazeResultReceiver,
    ctx: CollectorContext,
    cancel_token: CancellationToken,
) -> GazeSampleLog {
    let mut log = GazeSampleLog::new();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(result) => record(&mut log, &result, &ctx),
                None => break,
            },
            _ = cancel_token.cancelled() => {
                rx.close();
                while let Some(result) = rx.recv().await {
                    record(&mut log, &result, &ctx);
                }
                break;
            }
        }
    }

    log_info!("Gaze collection finished with {} samples", log.len());
    log
}

fn record(log: &mut GazeSampleLog, result: &GazeResult, ctx: &CollectorContext) {
    let sample = match GazeSample::from_result(result, &ctx.bounds, Utc::now().timestamp_millis()) {
        Ok(sample) => sample,
        Err(err) => {
            ctx.counters.record_sample_failure();
            log_error!("Skipping gaze sample: {}", err);
            return;
        }
    };

    if let Some(point) = sample.point() {
        ctx.live.set_gaze(Some(point));
    } else if sample.tracking_lost() {
        ctx.live.set_gaze(None);
    }

    log.append(sample);
    ctx.counters.record_sample();
}
