//! DMS analysis results

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationEvent, SafeZone};
use crate::detector::Rect;

/// Result of analyzing one frame, valid for that frame only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Whether a face was detected
    pub face_detected: bool,

    /// Face bounding box (if detected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_bbox: Option<Rect>,

    /// Face lies outside the calibrated safe zone
    pub out_of_bound: bool,

    /// At least one eye visible; `None` when eye detection was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes_detected: Option<bool>,

    /// Safe zone after this frame
    pub safe_zone: SafeZone,

    /// Set when this frame (re)calibrated the zone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_event: Option<CalibrationEvent>,
}

impl DmsAnalysis {
    /// Eyes were checked and found
    pub fn eyes_visible(&self) -> bool {
        self.eyes_detected.unwrap_or(false)
    }
}
