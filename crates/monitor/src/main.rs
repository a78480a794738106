//! Attention Monitor - Main Entry Point

use alerting::{AlertStateMachine, DigitalIo};
use anyhow::Context;
use camera_capture::{FrameDelivery, ReplaySource};
use clap::Parser;
use dms::DmsModule;
use metrics_exporter_prometheus::PrometheusBuilder;
use monitor::{init_logging, spawn_reporter, AppConfig, MonitorStatus, Orchestrator, SimulatedGpio, SysfsGpio};
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Real-time driver attention monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Directory of recorded frames, overrides camera.frames_dir
    #[arg(short, long)]
    frames: Option<String>,

    /// Use in-memory GPIO lines instead of sysfs
    #[arg(long)]
    simulate_gpio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(frames) = cli.frames {
        config.camera.frames_dir = Some(frames);
    }
    init_logging(&config.logging)?;

    info!("=== Attention Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &config.status.metrics_addr {
        let addr: SocketAddr = addr.parse().context("Invalid status.metrics_addr")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exporter listening on {}/metrics", addr);
    }

    let dms = DmsModule::new(config.dms.clone()).map_err(|e| {
        error!("Failed to initialize driver monitoring: {}", e);
        e
    })?;
    let alerts = AlertStateMachine::new(config.alerting.clone())?;

    let (frame_tx, frame_rx) = frame_channel::channel();
    let (capture_tx, capture_rx) = watch::channel(0.0f32);
    let (status_tx, status_rx) = watch::channel(MonitorStatus::default());

    let delivery = FrameDelivery::new(frame_tx, config.camera.width, config.camera.height)
        .with_rate_publisher(capture_tx);
    let source = ReplaySource::spawn(&config.camera, delivery).map_err(|e| {
        error!("Failed to start frame source: {}", e);
        e
    })?;

    let _detection = if cli.simulate_gpio {
        info!("Using simulated GPIO");
        spawn_detection(Orchestrator::new(frame_rx, dms, alerts, SimulatedGpio::default(), status_tx))
    } else {
        let gpio = SysfsGpio::open(&config.gpio).map_err(|e| {
            error!("Failed to initialize GPIO: {}", e);
            e
        })?;
        spawn_detection(Orchestrator::new(frame_rx, dms, alerts, gpio, status_tx))
    }?;

    let _reporter = spawn_reporter(status_rx, capture_rx, config.status.interval());

    info!("Monitoring started ({} frames in replay)", source.frame_count());

    let mut watchdog = tokio::time::interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("Shutting down");
                return Ok(());
            }
            _ = watchdog.tick() => {
                if !source.is_streaming() {
                    error!("Frame source stopped");
                    anyhow::bail!("frame source stopped");
                }
            }
        }
    }
}

/// The detection loop blocks on the frame channel, so it gets its own thread
fn spawn_detection<Io: DigitalIo + 'static>(
    orchestrator: Orchestrator<Io>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("detection".into())
        .spawn(move || orchestrator.run())
        .context("Failed to spawn detection thread")
}
