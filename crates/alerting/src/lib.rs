//! Alerting System
//!
//! Turns per-frame detection results into buzzer and presence outputs:
//! alarm condition tracking, mute and turn-signal gating, the periodic
//! recalibration timer, and edge sampling of the driver's controls.

mod io;
mod machine;
mod timer;

pub use io::{DigitalIo, InputLine, InputSampler, InputSnapshot, OutputLine};
pub use machine::{AlertConfig, AlertInputs, AlertOutputs, AlertStateMachine};
pub use timer::Timer;

use thiserror::Error;

/// Alerting errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Invalid alert configuration: {0}")]
    Config(String),
}
