//! Safe-zone containment

use crate::{Rect, SafeZone};

/// Check whether any edge of `face` lies outside `zone`.
///
/// An uncalibrated zone never reports out-of-bound.
pub fn is_out_of_bound(face: &Rect, zone: &SafeZone) -> bool {
    let Some(zone) = zone.calibrated_rect() else {
        return false;
    };
    face.x < zone.x
        || face.right() > zone.right()
        || face.y < zone.y
        || face.bottom() > zone.bottom()
}
