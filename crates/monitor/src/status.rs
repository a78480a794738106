//! Status feed
//!
//! The detection loop publishes a snapshot per processed frame and the
//! producer publishes its capture rate; a background task logs both
//! periodically.

use dms::Rect;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Latest per-frame state of the monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorStatus {
    /// Sequence number of the last processed frame
    pub sequence: u32,
    pub frames_processed: u64,
    pub face: Option<Rect>,
    /// Calibrated safe zone, if any
    pub safe_zone: Option<Rect>,
    pub out_of_bound: bool,
    /// `None` when eye detection was skipped
    pub eyes_detected: Option<bool>,
    /// Detection loop rate
    pub detection_fps: f32,
    /// Share of captured frames replaced before detection could take them
    pub drop_ratio: f64,
    pub alarm: bool,
    /// How long the current alarm has lasted
    pub alarm_ms: Option<u64>,
    pub buzzer: bool,
    pub muted: bool,
}

impl MonitorStatus {
    /// One-line summary for the periodic status log
    pub fn summary(&self, capture_fps: f32) -> String {
        let face = match &self.face {
            Some(r) => format!("{}x{}@({},{})", r.width, r.height, r.x, r.y),
            None => "none".to_string(),
        };
        let zone = match &self.safe_zone {
            Some(r) => format!("{}x{}@({},{})", r.width, r.height, r.x, r.y),
            None => "uncalibrated".to_string(),
        };
        let alarm = match self.alarm_ms {
            Some(ms) => format!("{} ({} ms)", self.alarm, ms),
            None => self.alarm.to_string(),
        };
        format!(
            "frame {} | capture {:.1} fps | detect {:.1} fps | dropped {:.0}% | face {} | zone {} | out {} | alarm {} | buzzer {}{}",
            self.sequence,
            capture_fps,
            self.detection_fps,
            self.drop_ratio * 100.0,
            face,
            zone,
            self.out_of_bound,
            alarm,
            self.buzzer,
            if self.muted { " (muted)" } else { "" }
        )
    }
}

/// Log a combined status line every `interval` until the status
/// publisher goes away
pub fn spawn_reporter(
    mut status: watch::Receiver<MonitorStatus>,
    capture_fps: watch::Receiver<f32>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if status.has_changed().is_err() {
                info!("Status publisher closed, stopping reporter");
                break;
            }
            let line = status.borrow_and_update().summary(*capture_fps.borrow());
            info!("{}", line);
        }
    })
}
