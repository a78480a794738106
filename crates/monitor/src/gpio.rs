//! GPIO backends for the driver controls, buzzer and presence indicator

use crate::MonitorError;
use alerting::{DigitalIo, InputLine, OutputLine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Pin assignment (BCM numbering)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// Root of the sysfs GPIO interface
    pub sysfs_root: String,
    pub buzzer: u32,
    pub presence: u32,
    pub mute: u32,
    pub recalibrate: u32,
    pub turn_left: u32,
    pub turn_right: u32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            sysfs_root: "/sys/class/gpio".to_string(),
            buzzer: 17,
            presence: 4,
            mute: 22,
            recalibrate: 27,
            turn_left: 23,
            turn_right: 24,
        }
    }
}

impl GpioConfig {
    pub fn input_pin(&self, line: InputLine) -> u32 {
        match line {
            InputLine::TurnLeft => self.turn_left,
            InputLine::TurnRight => self.turn_right,
            InputLine::MuteToggle => self.mute,
            InputLine::Recalibrate => self.recalibrate,
        }
    }

    pub fn output_pin(&self, line: OutputLine) -> u32 {
        match line {
            OutputLine::Buzzer => self.buzzer,
            OutputLine::Presence => self.presence,
        }
    }
}

const INPUTS: [InputLine; 4] = [
    InputLine::TurnLeft,
    InputLine::TurnRight,
    InputLine::MuteToggle,
    InputLine::Recalibrate,
];

const OUTPUTS: [OutputLine; 2] = [OutputLine::Buzzer, OutputLine::Presence];

/// Linux sysfs GPIO (`/sys/class/gpio`)
pub struct SysfsGpio {
    root: PathBuf,
    config: GpioConfig,
    /// Last level written per output
    levels: HashMap<OutputLine, bool>,
}

impl SysfsGpio {
    /// Export every configured pin, set directions and drive outputs low
    pub fn open(config: &GpioConfig) -> Result<Self, MonitorError> {
        let root = PathBuf::from(&config.sysfs_root);
        if !root.is_dir() {
            return Err(MonitorError::Gpio(format!("{} not found", root.display())));
        }

        let mut gpio = Self {
            root,
            config: config.clone(),
            levels: HashMap::new(),
        };

        for line in INPUTS {
            gpio.setup_pin(gpio.config.input_pin(line), "in")?;
        }
        for line in OUTPUTS {
            let pin = gpio.config.output_pin(line);
            gpio.setup_pin(pin, "out")?;
            fs::write(gpio.value_path(pin), "0")
                .map_err(|e| MonitorError::Gpio(format!("gpio{}: {}", pin, e)))?;
            gpio.levels.insert(line, false);
        }

        info!("GPIO ready under {}", gpio.root.display());
        Ok(gpio)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.pin_dir(pin).join("value")
    }

    fn setup_pin(&self, pin: u32, direction: &str) -> Result<(), MonitorError> {
        if !self.pin_dir(pin).exists() {
            debug!("Exporting gpio{}", pin);
            write_attr(&self.root.join("export"), &pin.to_string())?;
        }
        write_attr(&self.pin_dir(pin).join("direction"), direction)
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), MonitorError> {
    fs::write(path, value).map_err(|e| MonitorError::Gpio(format!("{}: {}", path.display(), e)))
}

impl DigitalIo for SysfsGpio {
    fn read_input(&mut self, line: InputLine) -> bool {
        let pin = self.config.input_pin(line);
        match fs::read_to_string(self.value_path(pin)) {
            Ok(value) => value.trim() == "1",
            Err(e) => {
                warn!("Failed to read {:?} (gpio{}): {}", line, pin, e);
                false
            }
        }
    }

    fn write_output(&mut self, line: OutputLine, level: bool) {
        if self.levels.get(&line) == Some(&level) {
            return;
        }
        let pin = self.config.output_pin(line);
        match fs::write(self.value_path(pin), if level { "1" } else { "0" }) {
            Ok(()) => {
                debug!("{:?} (gpio{}) -> {}", line, pin, level);
                self.levels.insert(line, level);
            }
            Err(e) => warn!("Failed to write {:?} (gpio{}): {}", line, pin, e),
        }
    }
}

#[derive(Debug, Default)]
struct Lines {
    inputs: HashMap<InputLine, bool>,
    outputs: HashMap<OutputLine, bool>,
}

/// In-memory lines; clones share state so a test or operator console can
/// drive inputs while the detection loop owns another handle
#[derive(Debug, Clone, Default)]
pub struct SimulatedGpio {
    lines: Arc<Mutex<Lines>>,
}

impl SimulatedGpio {
    pub fn set_input(&self, line: InputLine, level: bool) {
        self.lock().inputs.insert(line, level);
    }

    pub fn output(&self, line: OutputLine) -> bool {
        self.lock().outputs.get(&line).copied().unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DigitalIo for SimulatedGpio {
    fn read_input(&mut self, line: InputLine) -> bool {
        self.lock().inputs.get(&line).copied().unwrap_or(false)
    }

    fn write_output(&mut self, line: OutputLine, level: bool) {
        let previous = self.lock().outputs.insert(line, level);
        if previous != Some(level) {
            info!("[simulated] {:?} -> {}", line, if level { "on" } else { "off" });
        }
    }
}
