//! Driver Attention Monitor
//!
//! Wires the frame source, driver monitoring and alerting into a single
//! detection loop, with GPIO backends, configuration loading and status
//! reporting.

pub mod config;
pub mod gpio;
pub mod orchestrator;
pub mod status;

pub use config::{AppConfig, LoggingConfig, StatusConfig};
pub use gpio::{GpioConfig, SimulatedGpio, SysfsGpio};
pub use orchestrator::{FrameOutcome, Orchestrator};
pub use status::{spawn_reporter, MonitorStatus};

use alerting::AlertError;
use camera_capture::CameraError;
use dms::DmsError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Dms(#[from] DmsError),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), MonitorError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| MonitorError::Config(format!("unknown log level '{}'", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| MonitorError::Logging(e.to_string()))
}
