//! DMS configuration

use serde::{Deserialize, Deserializer, Serialize};

use crate::DmsError;

/// Tuning for one sliding-window detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorTuning {
    /// ONNX patch classifier
    pub model_path: Option<String>,
    /// Window growth between scan passes
    pub scale_factor: f32,
    /// Overlapping hits a candidate needs (beyond itself) to be reported
    pub min_neighbors: usize,
    /// Smallest window side (pixels, detection scale)
    pub min_window: u32,
    /// Largest window side (pixels, detection scale)
    pub max_window: u32,
    /// Classifier score needed for a window to count as a hit
    pub score_threshold: f32,
    /// Side of the square patch fed to the classifier
    pub patch_size: u32,
}

impl DetectorTuning {
    /// Face detector defaults
    pub fn face() -> Self {
        Self {
            model_path: None,
            scale_factor: 1.4,
            min_neighbors: 3,
            min_window: 100,
            max_window: 150,
            score_threshold: 0.5,
            patch_size: 24,
        }
    }

    /// Eye detector defaults
    pub fn eyes() -> Self {
        Self {
            model_path: None,
            scale_factor: 1.1,
            min_neighbors: 2,
            min_window: 20,
            max_window: 50,
            score_threshold: 0.5,
            patch_size: 24,
        }
    }

    /// Reject tunings the window scan cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.scale_factor <= 1.0 {
            return Err(DmsError::Config(format!(
                "scale_factor must be > 1.0, got {}",
                self.scale_factor
            )));
        }
        if self.min_window == 0 || self.max_window < self.min_window {
            return Err(DmsError::Config(format!(
                "invalid window range {}..{}",
                self.min_window, self.max_window
            )));
        }
        if self.patch_size == 0 {
            return Err(DmsError::Config("patch_size must be positive".into()));
        }
        Ok(())
    }
}

/// Partial tuning as written in configuration; unset fields keep the
/// defaults of the detector it applies to
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TuningOverrides {
    model_path: Option<String>,
    scale_factor: Option<f32>,
    min_neighbors: Option<usize>,
    min_window: Option<u32>,
    max_window: Option<u32>,
    score_threshold: Option<f32>,
    patch_size: Option<u32>,
}

impl TuningOverrides {
    fn apply(self, base: DetectorTuning) -> DetectorTuning {
        DetectorTuning {
            model_path: self.model_path.or(base.model_path),
            scale_factor: self.scale_factor.unwrap_or(base.scale_factor),
            min_neighbors: self.min_neighbors.unwrap_or(base.min_neighbors),
            min_window: self.min_window.unwrap_or(base.min_window),
            max_window: self.max_window.unwrap_or(base.max_window),
            score_threshold: self.score_threshold.unwrap_or(base.score_threshold),
            patch_size: self.patch_size.unwrap_or(base.patch_size),
        }
    }
}

fn face_tuning<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DetectorTuning, D::Error> {
    TuningOverrides::deserialize(deserializer).map(|o| o.apply(DetectorTuning::face()))
}

fn eye_tuning<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DetectorTuning, D::Error> {
    TuningOverrides::deserialize(deserializer).map(|o| o.apply(DetectorTuning::eyes()))
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Face detections averaged into the first safe zone
    pub calibration_samples: usize,

    /// Detection-scale width
    pub detect_width: u32,

    /// Detection-scale height
    pub detect_height: u32,

    /// Equalize histograms before detection
    pub equalize: bool,

    #[serde(deserialize_with = "face_tuning")]
    pub face: DetectorTuning,

    #[serde(deserialize_with = "eye_tuning")]
    pub eyes: DetectorTuning,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            calibration_samples: 20,
            detect_width: 320,
            detect_height: 180,
            equalize: true,
            face: DetectorTuning::face(),
            eyes: DetectorTuning::eyes(),
        }
    }
}

impl DmsConfig {
    /// Check values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.calibration_samples == 0 {
            return Err(DmsError::Config("calibration_samples must be positive".into()));
        }
        if self.detect_width == 0 || self.detect_height == 0 {
            return Err(DmsError::Config("detection geometry must be non-empty".into()));
        }
        self.face.validate()?;
        self.eyes.validate()
    }
}
