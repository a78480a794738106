//! Driver Monitoring System (DMS)
//!
//! Per-frame driver attention analysis:
//! - Face detection at detection scale
//! - Safe-zone calibration (averaged, then single-sample recalibration)
//! - Safe-zone containment
//! - Eye detection on the face region, only when it can matter

pub mod analysis;
pub mod calibration;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod zone;

pub use analysis::DmsAnalysis;
pub use calibration::{CalibrationEvent, CalibrationTracker, SafeZone};
pub use classifier::TractClassifier;
pub use config::{DetectorTuning, DmsConfig};
pub use detector::{Detector, Rect, SlidingWindowDetector, WindowClassifier};
pub use zone::is_out_of_bound;

use camera_capture::VideoFrame;
use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::contrast::equalize_histogram_mut;
use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

/// Driver monitoring module
pub struct DmsModule {
    config: DmsConfig,
    face_detector: Box<dyn Detector>,
    eye_detector: Box<dyn Detector>,
    calibration: CalibrationTracker,
    /// Most recent face, used for eye detection on faceless frames
    last_face: Option<Rect>,
    /// Carried over frames without a face or zone
    out_of_bound: bool,
}

impl DmsModule {
    /// Create a DMS module with ONNX-backed face and eye detectors.
    ///
    /// Fails if either model is missing or cannot be loaded.
    pub fn new(config: DmsConfig) -> Result<Self, DmsError> {
        config.validate()?;
        let face = build_detector("face", &config.face)?;
        let eyes = build_detector("eye", &config.eyes)?;
        info!(
            "DMS ready: detection at {}x{}, {} calibration samples",
            config.detect_width, config.detect_height, config.calibration_samples
        );
        Ok(Self::with_detectors(config, face, eyes))
    }

    /// Create a DMS module around caller-supplied detectors
    pub fn with_detectors(
        config: DmsConfig,
        face_detector: Box<dyn Detector>,
        eye_detector: Box<dyn Detector>,
    ) -> Self {
        Self {
            calibration: CalibrationTracker::new(config.calibration_samples),
            face_detector,
            eye_detector,
            last_face: None,
            out_of_bound: false,
            config,
        }
    }

    /// Analyze a single frame.
    ///
    /// On error nothing is committed: calibration, containment and the last
    /// face stay as they were before the call.
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<DmsAnalysis, DmsError> {
        let image = self.preprocess(frame)?;

        let faces = self.face_detector.detect(&image)?;
        let face = faces.first().copied();

        let mut calibration = self.calibration.clone();
        let mut out_of_bound = self.out_of_bound;
        let mut calibration_event = None;

        if let Some(face) = &face {
            calibration_event = calibration.observe(face);
            if calibration.zone().calibrated {
                out_of_bound = is_out_of_bound(face, calibration.zone());
            }
        }

        // Eye detection only runs when its result can change the verdict.
        let eyes_detected = if face.is_some() || out_of_bound {
            let region = face.or(self.last_face);
            Some(match region {
                Some(region) => self.detect_eyes(&image, &region)?,
                None => false,
            })
        } else {
            None
        };

        self.calibration = calibration;
        self.out_of_bound = out_of_bound;
        if face.is_some() {
            self.last_face = face;
        }

        debug!(
            "Frame {}: face={:?} out_of_bound={} eyes={:?}",
            frame.sequence, face, out_of_bound, eyes_detected
        );

        Ok(DmsAnalysis {
            face_detected: face.is_some(),
            face_bbox: face,
            out_of_bound,
            eyes_detected,
            safe_zone: *self.calibration.zone(),
            calibration_event,
        })
    }

    /// Latch a single-sample recalibration for the next frame with a face
    pub fn request_recalibration(&mut self) {
        if !self.calibration.is_recalibration_requested() {
            debug!("Recalibration requested");
        }
        self.calibration.request_recalibration();
    }

    /// Current safe zone
    pub fn safe_zone(&self) -> &SafeZone {
        self.calibration.zone()
    }

    /// Scale to detection geometry and equalize
    fn preprocess(&self, frame: &VideoFrame) -> Result<GrayImage, DmsError> {
        let image = frame.to_image().ok_or_else(|| {
            DmsError::ImageProcessing(format!(
                "frame {} holds {} bytes for {}x{}",
                frame.sequence,
                frame.data.len(),
                frame.width,
                frame.height
            ))
        })?;

        let (width, height) = (self.config.detect_width, self.config.detect_height);
        let mut scaled = if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        };
        if self.config.equalize {
            equalize_histogram_mut(&mut scaled);
        }
        Ok(scaled)
    }

    fn detect_eyes(&mut self, image: &GrayImage, face: &Rect) -> Result<bool, DmsError> {
        let (width, height) = image.dimensions();
        let Some((x, y, w, h)) = face.clamp_to(width, height) else {
            return Ok(false);
        };

        let mut crop = imageops::crop_imm(image, x, y, w, h).to_image();
        if self.config.equalize {
            equalize_histogram_mut(&mut crop);
        }
        Ok(!self.eye_detector.detect(&crop)?.is_empty())
    }
}

fn build_detector(kind: &str, tuning: &DetectorTuning) -> Result<Box<dyn Detector>, DmsError> {
    let path = tuning
        .model_path
        .as_deref()
        .ok_or_else(|| DmsError::Config(format!("no {} model configured", kind)))?;
    let classifier = TractClassifier::load(path, tuning.patch_size)?;
    Ok(Box::new(SlidingWindowDetector::new(classifier, tuning.clone())?))
}
