//! Safe-zone calibration
//!
//! The first zone is the padded average of a run of face detections. After
//! that the zone is replaced from a single detection whenever a
//! recalibration has been requested (periodic drift correction or manual
//! request); the request stays latched until a frame with a face arrives.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Rect;

/// Calibrated region the face is expected to stay inside
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeZone {
    pub rect: Rect,
    /// `rect` is meaningless until this is set
    pub calibrated: bool,
}

impl SafeZone {
    /// The zone rectangle, if calibration has completed
    pub fn calibrated_rect(&self) -> Option<&Rect> {
        self.calibrated.then_some(&self.rect)
    }
}

/// How the zone was last (re)computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationEvent {
    /// Averaged over a full run of samples
    Averaged,
    /// Taken from one detection
    Single,
}

/// Accumulates detections into a safe zone
#[derive(Debug, Clone)]
pub struct CalibrationTracker {
    /// Samples per averaged calibration
    samples: usize,
    sum_x: i64,
    sum_y: i64,
    sum_w: i64,
    sum_h: i64,
    count: usize,
    zone: SafeZone,
    recalibration_requested: bool,
}

impl CalibrationTracker {
    /// Create a tracker averaging `samples` detections
    pub fn new(samples: usize) -> Self {
        Self {
            samples: samples.max(1),
            sum_x: 0,
            sum_y: 0,
            sum_w: 0,
            sum_h: 0,
            count: 0,
            zone: SafeZone::default(),
            recalibration_requested: false,
        }
    }

    /// Add one detection to the running sums.
    ///
    /// Ignored once the run is full. Returns `true` when the run is full and
    /// ready for [`finalize`](Self::finalize).
    pub fn accumulate(&mut self, rect: &Rect) -> bool {
        if self.count < self.samples {
            self.sum_x += rect.x as i64;
            self.sum_y += rect.y as i64;
            self.sum_w += rect.width as i64;
            self.sum_h += rect.height as i64;
            self.count += 1;
        }
        self.is_ready()
    }

    /// Check whether a full run has been accumulated
    pub fn is_ready(&self) -> bool {
        self.count >= self.samples
    }

    /// Turn a full run into the safe zone and reset the sums.
    ///
    /// Every field is computed in floating point from the sums and truncated
    /// toward zero once.
    pub fn finalize(&mut self) -> Option<SafeZone> {
        if !self.is_ready() {
            return None;
        }

        let n = self.count as f64;
        let (sx, sy) = (self.sum_x as f64, self.sum_y as f64);
        let (sw, sh) = (self.sum_w as f64, self.sum_h as f64);
        let rect = Rect::new(
            ((sx - 0.075 * sw) / n) as i32,
            ((sy - 0.015 * sh) / n) as i32,
            (1.3 * sw / n) as i32,
            (1.25 * sh / n) as i32,
        );
        self.reset_accumulator();

        self.zone = SafeZone {
            rect,
            calibrated: true,
        };
        info!("Safe zone calibrated from {} samples: {:?}", self.samples, rect);
        Some(self.zone)
    }

    /// Replace the zone from one detection.
    ///
    /// Width and height are truncated first; x and y are then offset by a
    /// share of the truncated size and truncated again.
    pub fn recalibrate_from_single(&mut self, rect: &Rect) -> SafeZone {
        let width = (rect.width as f64 * 1.30) as i32;
        let height = (rect.height as f64 * 1.25) as i32;
        let y = (rect.y as f64 - height as f64 * 0.05) as i32;
        let x = (rect.x as f64 - width as f64 * 0.075) as i32;

        self.zone = SafeZone {
            rect: Rect::new(x, y, width, height),
            calibrated: true,
        };
        self.recalibration_requested = false;
        debug!("Safe zone recalibrated: {:?}", self.zone.rect);
        self.zone
    }

    /// Latch a recalibration for the next frame with a face
    pub fn request_recalibration(&mut self) {
        self.recalibration_requested = true;
    }

    /// Check whether a recalibration is latched
    pub fn is_recalibration_requested(&self) -> bool {
        self.recalibration_requested
    }

    /// Feed the face of the current frame.
    ///
    /// Accumulates (and finalizes) while uncalibrated; once calibrated, a
    /// latched request is consumed and the zone taken from this face.
    pub fn observe(&mut self, face: &Rect) -> Option<CalibrationEvent> {
        let mut event = None;

        if !self.zone.calibrated && self.accumulate(face) && self.finalize().is_some() {
            event = Some(CalibrationEvent::Averaged);
        }

        if self.zone.calibrated && self.recalibration_requested {
            self.recalibrate_from_single(face);
            event = Some(CalibrationEvent::Single);
        }

        event
    }

    /// Current zone
    pub fn zone(&self) -> &SafeZone {
        &self.zone
    }

    fn reset_accumulator(&mut self) {
        self.sum_x = 0;
        self.sum_y = 0;
        self.sum_w = 0;
        self.sum_h = 0;
        self.count = 0;
    }
}
