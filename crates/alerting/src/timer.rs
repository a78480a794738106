//! Monotonic timers

use std::time::{Duration, Instant};

/// Stopwatch on the monotonic clock; unset until started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    started: Option<Instant>,
}

impl Timer {
    /// (Re)start at `now`
    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// Start at `now` unless already running; returns `true` if it started
    pub fn start_if_idle(&mut self, now: Instant) -> bool {
        if self.started.is_some() {
            return false;
        }
        self.started = Some(now);
        true
    }

    /// Unset
    pub fn reset(&mut self) {
        self.started = None;
    }

    /// Start instant, `None` when unset
    pub fn started_at(&self) -> Option<Instant> {
        self.started
    }

    /// Time since start, `None` when unset
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.started.map(|t| now.saturating_duration_since(t))
    }

    /// Running for at least `duration`
    pub fn has_elapsed(&self, now: Instant, duration: Duration) -> bool {
        self.elapsed(now).map_or(false, |e| e >= duration)
    }
}
