//! Producer-side frame delivery

use std::time::Instant;

use frame_channel::{FrameSender, PushOutcome};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{CameraError, PooledBuffer, RateEstimator, VideoFrame};

/// The only entry point the capture callback has into the pipeline.
///
/// Copies each capture buffer into a fresh [`VideoFrame`], offers it to the
/// frame channel and gives the buffer back to its pool before returning.
pub struct FrameDelivery {
    sender: FrameSender<VideoFrame>,
    width: u32,
    height: u32,
    sequence: u32,
    rate: RateEstimator,
    rate_tx: Option<watch::Sender<f32>>,
}

impl FrameDelivery {
    /// Create a delivery endpoint for frames of the given geometry
    pub fn new(sender: FrameSender<VideoFrame>, width: u32, height: u32) -> Self {
        Self {
            sender,
            width,
            height,
            sequence: 0,
            rate: RateEstimator::default(),
            rate_tx: None,
        }
    }

    /// Publish the capture rate on every delivery
    pub fn with_rate_publisher(mut self, rate_tx: watch::Sender<f32>) -> Self {
        self.rate_tx = Some(rate_tx);
        self
    }

    /// Deliver one captured buffer.
    ///
    /// The buffer is released before this returns, whether the frame was
    /// stored, replaced a pending frame or was rejected.
    pub fn deliver(
        &mut self,
        buffer: PooledBuffer,
        timestamp: Instant,
    ) -> Result<PushOutcome, CameraError> {
        let size = self.width as usize * self.height as usize;
        if buffer.len() < size {
            return Err(CameraError::Format(format!(
                "capture buffer holds {} bytes, frame needs {}",
                buffer.len(),
                size
            )));
        }

        let frame = VideoFrame::new(
            buffer[..size].to_vec(),
            self.width,
            self.height,
            timestamp,
            self.sequence,
        );
        drop(buffer);

        let outcome = self.sender.push(frame);
        if outcome == PushOutcome::Replaced {
            debug!("Frame {} replaced an undelivered frame", self.sequence);
        }
        self.sequence = self.sequence.wrapping_add(1);

        let fps = self.rate.observe(timestamp);
        if let Some(tx) = &self.rate_tx {
            tx.send_replace(fps);
        }

        Ok(outcome)
    }

    /// Deliver if a buffer could be obtained, otherwise log and drop the frame
    pub fn deliver_or_drop(&mut self, buffer: Option<PooledBuffer>, timestamp: Instant) {
        let Some(buffer) = buffer else {
            warn!("{}, dropping frame {}", CameraError::Buffer, self.sequence);
            self.sequence = self.sequence.wrapping_add(1);
            return;
        };
        if let Err(e) = self.deliver(buffer, timestamp) {
            warn!("Dropping frame {}: {}", self.sequence, e);
        }
    }
}
