//! Coalescing Frame Channel
//!
//! Connects an asynchronous, non-blockable producer to a synchronous
//! consumer through a single slot. A push never waits on the consumer;
//! frames that arrive faster than they are drained overwrite each other and
//! only the latest one is delivered.

mod mailbox;

pub use mailbox::{channel, FrameReceiver, FrameSender, PushOutcome};

use serde::{Deserialize, Serialize};

/// Channel counters, shared by both ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Frames handed to `push`
    pub pushed: usize,
    /// Pushes that overwrote an undelivered frame
    pub replaced: usize,
    /// Frames returned by `pull`
    pub delivered: usize,
}

impl ChannelStats {
    /// Fraction of pushed frames that were never delivered
    pub fn drop_ratio(&self) -> f64 {
        if self.pushed == 0 {
            return 0.0;
        }
        self.replaced as f64 / self.pushed as f64
    }
}
