//! Digital I/O seam and control sampling

use serde::{Deserialize, Serialize};

/// Driver controls and vehicle signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputLine {
    TurnLeft,
    TurnRight,
    /// Push button toggling buzzer mute
    MuteToggle,
    /// Push button requesting a safe-zone recalibration
    Recalibrate,
}

/// Physical outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputLine {
    Buzzer,
    /// Face-present indicator
    Presence,
}

/// Digital I/O, infallible at this layer
pub trait DigitalIo: Send {
    fn read_input(&mut self, line: InputLine) -> bool;
    fn write_output(&mut self, line: OutputLine, level: bool);
}

/// Controls sampled once per loop iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub turn_left: bool,
    pub turn_right: bool,
    /// Rising edge on the mute button since the last sample
    pub mute_toggled: bool,
    /// Rising edge on the recalibrate button since the last sample
    pub recalibrate_requested: bool,
}

impl InputSnapshot {
    pub fn turn_signal_active(&self) -> bool {
        self.turn_left || self.turn_right
    }
}

/// Samples the controls, turning the push buttons into rising edges.
///
/// Turn signals are level-triggered.
#[derive(Debug, Clone, Default)]
pub struct InputSampler {
    last_mute: bool,
    last_recalibrate: bool,
}

impl InputSampler {
    pub fn sample(&mut self, io: &mut dyn DigitalIo) -> InputSnapshot {
        let mute = io.read_input(InputLine::MuteToggle);
        let recalibrate = io.read_input(InputLine::Recalibrate);

        let snapshot = InputSnapshot {
            turn_left: io.read_input(InputLine::TurnLeft),
            turn_right: io.read_input(InputLine::TurnRight),
            mute_toggled: mute && !self.last_mute,
            recalibrate_requested: recalibrate && !self.last_recalibrate,
        };

        self.last_mute = mute;
        self.last_recalibrate = recalibrate;
        snapshot
    }
}
