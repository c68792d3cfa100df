pub mod camera;
pub mod estimator;
pub mod gaze;
pub mod metrics;
pub mod recording;
pub mod session;
pub mod settings;
mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use camera::{exit_on_fatal, CallbackRouter, CaptureDevice, DeviceFactory, FrameSource, SyntheticDevice};
use estimator::{SimulatedConfig, SimulatedEstimator};
use session::{ControllerConfig, SessionController, SessionOutcome, SessionStatus};
use settings::{RecorderSettings, SettingsStore};

#[derive(Debug, Parser)]
#[command(name = "gazerec", version, about = "Supervised gaze-tracking session recorder")]
pub struct Cli {
    /// JSON settings file; defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Name of the session directory.
    #[arg(long)]
    pub name: Option<String>,

    /// Seconds to record; runs until Ctrl-C when omitted.
    #[arg(long)]
    pub duration: Option<f64>,

    /// Use the built-in test pattern instead of a camera.
    #[arg(long)]
    pub synthetic: bool,

    /// Camera index, overriding the settings file.
    #[arg(long)]
    pub device: Option<u32>,
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    info!("gazerec starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(record(cli))
}

fn load_settings(cli: &Cli) -> Result<RecorderSettings> {
    let mut settings = match &cli.config {
        Some(path) => SettingsStore::new(path.clone())?.settings(),
        None => RecorderSettings::default(),
    };
    if let Some(device_id) = cli.device {
        settings.device_id = device_id;
    }
    Ok(settings)
}

fn device_factory(settings: &RecorderSettings, synthetic: bool) -> DeviceFactory {
    let config = settings.source_config();

    #[cfg(feature = "webcam")]
    {
        if !synthetic {
            return Box::new(move || {
                camera::WebcamDevice::open(config.device_id, config.width, config.height, config.fps)
                    .map(|device| Box::new(device) as Box<dyn CaptureDevice>)
            });
        }
    }

    #[cfg(not(feature = "webcam"))]
    {
        if !synthetic {
            warn!("Built without the `webcam` feature; using the synthetic test pattern");
        }
    }

    Box::new(move || {
        Ok(Box::new(SyntheticDevice::new(config.width, config.height, config.fps))
            as Box<dyn CaptureDevice>)
    })
}

async fn record(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let router = Arc::new(CallbackRouter::new());

    let source = FrameSource::open(
        settings.source_config(),
        Arc::clone(&router),
        device_factory(&settings, cli.synthetic),
        exit_on_fatal(),
    )
    .with_context(|| format!("failed to open camera {}", settings.device_id))?;

    let estimator = Arc::new(SimulatedEstimator::new(SimulatedConfig::new(
        settings.screen_bounds(),
    ))?);

    let controller = SessionController::new(
        source,
        router,
        estimator,
        ControllerConfig::from_settings(&settings),
    );

    controller.calibrate().await?;
    if controller.status() != SessionStatus::Recording {
        controller.start().await?;
    }

    let name = cli.name.clone().unwrap_or_default();
    loop {
        let interrupted = wait_for_end(cli.duration).await;
        let outcome = controller.stop(&name).await?;
        print_outcome(&outcome)?;

        if interrupted || settings.exit_after_stop {
            break;
        }
        controller.continue_same_calibration().await?;
        controller.start().await?;
    }

    controller.quit().await?;
    info!("gazerec finished");
    Ok(())
}

/// Returns true when the operator pressed Ctrl-C.
async fn wait_for_end(duration: Option<f64>) -> bool {
    let limit = duration.and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    match limit {
        Some(limit) => tokio::select! {
            _ = tokio::time::sleep(limit) => false,
            _ = tokio::signal::ctrl_c() => true,
        },
        None => {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", err);
            }
            true
        }
    }
}

fn print_outcome(outcome: &SessionOutcome) -> Result<()> {
    let stats = &outcome.statistics;
    println!("Session: {}", outcome.record.name);
    println!("  Directory:        {}", outcome.record.directory_path.display());
    println!("  Duration:         {:.1} s", stats.total_duration);
    println!("  Samples:          {} ({} valid)", stats.total_samples, stats.valid_samples);
    println!(
        "  Time on screen:   {:.1} s ({:.1}%)",
        stats.time_on_screen, stats.percentage_on_screen
    );
    println!(
        "  Tracking lost:    {:.1} s ({:.1}%)",
        stats.time_lost, stats.percentage_lost
    );
    println!("  Images saved:     {}", outcome.record.saved_image_count);
    println!("{}", serde_json::to_string_pretty(&outcome.counters)?);
    Ok(())
}
