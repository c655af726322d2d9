use std::env;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::time::{sleep, Duration};
use tracing::info;
use vigil_alert::{AlertSink, LogTonePlayer};
use vigil_analysis::ClientFactory;
use vigil_capture::{FrameProvider, FrameSource, SyntheticCamera};
use vigil_ops::{init_tracing, ConfigStore, MemoryConfigStore};
use vigil_orchestrator::Orchestrator;
use vigil_types::config::VigilConfig;

#[derive(Parser)]
#[command(name = "vigil", about = "Wearable danger-detection pipeline")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, default_value = "configs/dev.toml")]
    config: String,
    /// Inference API key; overrides VIGIL_API_KEY and the config file.
    #[arg(long)]
    api_key: Option<String>,
    /// Seconds between detection iterations (minimum 2).
    #[arg(long)]
    interval: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run continuous danger detection until Ctrl-C.
    Run,
    /// Capture and encode a single frame, printing its size.
    Capture,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_tracing(&config.ops)?;

    let store = MemoryConfigStore::new();
    let key = cli
        .api_key
        .or_else(|| env::var("VIGIL_API_KEY").ok())
        .or_else(|| config.detection.api_key.clone());
    if let Some(key) = key {
        store.set_api_key(&key);
    }
    store.set_interval(cli.interval.unwrap_or(config.detection.interval_seconds));

    match cli.command {
        Command::Run => run_detection(&config, &store).await,
        Command::Capture => capture_once(&config).await,
    }
}

async fn run_detection(config: &VigilConfig, store: &MemoryConfigStore) -> Result<()> {
    if !store.is_configured() {
        bail!("no API key configured; pass --api-key or set VIGIL_API_KEY");
    }

    let camera = SyntheticCamera::new(config.capture.width, config.capture.height);
    let frames = FrameSource::new(camera, config.capture.clone());
    let analyzers = ClientFactory::new(config.analysis.clone());
    let alerts = AlertSink::new(LogTonePlayer, config.alert.clone());
    let orchestrator = Orchestrator::new(frames, analyzers, alerts, config.capture.clone());

    store.set_enabled(true);
    orchestrator.start(store.pipeline_config()).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    orchestrator.stop().await;
    store.set_enabled(false);
    Ok(())
}

async fn capture_once(config: &VigilConfig) -> Result<()> {
    let camera = SyntheticCamera::new(config.capture.width, config.capture.height);
    let frames = FrameSource::new(camera, config.capture.clone());
    frames.open().await?;

    let mut attempts = 0;
    while !frames.is_ready() && attempts < config.capture.warmup_retries {
        sleep(Duration::from_millis(config.capture.warmup_delay_ms)).await;
        attempts += 1;
    }
    if !frames.is_ready() {
        frames.close().await;
        bail!("camera did not become ready");
    }

    frames.request_frame();
    let frame = frames
        .poll_frame(Duration::from_millis(config.capture.frame_timeout_ms))
        .await;
    frames.close().await;

    match frame {
        Some(frame) => {
            println!(
                "captured {} bytes at {}",
                frame.jpeg.len(),
                frame.encoded_at
            );
            Ok(())
        }
        None => bail!("capture timed out"),
    }
}

fn load_config(path: &str) -> VigilConfig {
    match VigilConfig::from_file(path) {
        Ok(config) => {
            if let Err(err) = config.validate() {
                eprintln!("Invalid config in '{path}': {err}. Falling back to internal defaults.");
                VigilConfig::default()
            } else {
                config
            }
        }
        Err(err) => {
            eprintln!("Failed to load config from '{path}': {err}. Falling back to internal defaults.");
            VigilConfig::default()
        }
    }
}
