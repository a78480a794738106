//! Application configuration
//!
//! Loaded once at startup from an optional file, overlaid by environment
//! variables such as `ATTENTION__ALERTING__ALARM_DELAY_MS=250`.

use crate::gpio::GpioConfig;
use crate::MonitorError;
use alerting::AlertConfig;
use camera_capture::CameraConfig;
use config::{Config, Environment, File};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ATTENTION";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub dms: DmsConfig,
    pub alerting: AlertConfig,
    pub gpio: GpioConfig,
    pub logging: LoggingConfig,
    pub status: StatusConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Status reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Period of the status log line
    pub interval_ms: u64,
    /// Prometheus exporter listen address, disabled when unset
    pub metrics_addr: Option<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            metrics_addr: None,
        }
    }
}

impl StatusConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    /// Load from `path` (any format the `config` crate knows) and the
    /// environment, then validate.
    pub fn load(path: Option<&str>) -> Result<Self, MonitorError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MonitorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(MonitorError::Config("capture geometry must be non-empty".into()));
        }
        if self.camera.fps == 0 {
            return Err(MonitorError::Config("camera fps must be positive".into()));
        }
        if self.status.interval_ms == 0 {
            return Err(MonitorError::Config("status interval must be positive".into()));
        }
        self.dms.validate()?;
        self.alerting.validate()?;
        Ok(())
    }
}
