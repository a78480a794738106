//! Single-Slot Mailbox Implementation

use crate::ChannelStats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The slot was empty; the consumer has been notified
    Stored,
    /// An undelivered frame was overwritten; no extra notification
    Replaced,
}

/// State shared between the two ends.
struct Shared<T> {
    /// At most one undelivered frame.
    slot: Mutex<Option<T>>,
    /// Signalled on every empty -> full transition of `slot`.
    available: Condvar,
    pushed: AtomicUsize,
    replaced: AtomicUsize,
    delivered: AtomicUsize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // The slot holds plain data, a panic elsewhere cannot leave it torn.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> ChannelStats {
        ChannelStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

/// Create a connected sender/receiver pair.
///
/// Neither end is `Clone`: the channel is for exactly one producer and one
/// consumer.
pub fn channel<T>() -> (FrameSender<T>, FrameReceiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(None),
        available: Condvar::new(),
        pushed: AtomicUsize::new(0),
        replaced: AtomicUsize::new(0),
        delivered: AtomicUsize::new(0),
    });
    (
        FrameSender {
            shared: Arc::clone(&shared),
        },
        FrameReceiver { shared },
    )
}

/// Producer end
pub struct FrameSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameSender<T> {
    /// Offer a frame, replacing any frame the consumer has not picked up yet.
    ///
    /// Never waits for the consumer: the lock is only ever held for a slot
    /// swap on either side.
    pub fn push(&self, frame: T) -> PushOutcome {
        let previous = self.shared.lock().replace(frame);
        self.shared.pushed.fetch_add(1, Ordering::Relaxed);

        match previous {
            None => {
                self.shared.available.notify_one();
                PushOutcome::Stored
            }
            Some(stale) => {
                self.shared.replaced.fetch_add(1, Ordering::Relaxed);
                // Released outside the lock.
                drop(stale);
                PushOutcome::Replaced
            }
        }
    }

    /// Get channel statistics
    pub fn stats(&self) -> ChannelStats {
        self.shared.stats()
    }
}

/// Consumer end
pub struct FrameReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameReceiver<T> {
    /// Block until a frame is pending, then take it.
    ///
    /// Suspends on a condition variable; there is no timeout and no
    /// cancellation.
    pub fn pull(&self) -> T {
        let mut slot = self.shared.lock();
        loop {
            if let Some(frame) = slot.take() {
                self.shared.delivered.fetch_add(1, Ordering::Relaxed);
                return frame;
            }
            slot = self
                .shared
                .available
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Get channel statistics
    pub fn stats(&self) -> ChannelStats {
        self.shared.stats()
    }
}
