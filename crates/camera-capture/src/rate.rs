//! Frame rate estimation

use std::time::Instant;

/// Recompute the rate every this many observations
pub const DEFAULT_CADENCE: u64 = 10;

/// Frames-per-second estimate: observations since start over elapsed time.
///
/// The ratio is refreshed every `cadence` observations so the reported
/// value does not jitter frame to frame.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    start: Option<Instant>,
    count: u64,
    cadence: u64,
    rate: f32,
}

impl RateEstimator {
    /// Create an estimator refreshing every `cadence` observations
    pub fn new(cadence: u64) -> Self {
        Self {
            start: None,
            count: 0,
            cadence: cadence.max(1),
            rate: 0.0,
        }
    }

    /// Record one frame and return the current estimate
    pub fn observe(&mut self, timestamp: Instant) -> f32 {
        let start = *self.start.get_or_insert(timestamp);
        self.count += 1;

        if self.count % self.cadence == 0 {
            let elapsed = timestamp.saturating_duration_since(start).as_secs_f32();
            self.rate = if elapsed > 0.0 {
                self.count as f32 / elapsed
            } else {
                self.count as f32
            };
        }
        self.rate
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CADENCE)
    }
}
