//! Camera Capture Library for the Attention Monitor
//!
//! The producer side of the pipeline:
//! - Luma video frames handed to the detection loop
//! - Fixed-size capture buffer pool with RAII release
//! - Frame delivery into the coalescing frame channel
//! - Frame rate estimation (shared by producer and consumer)
//! - Replay source feeding recorded frames at a fixed rate

pub mod delivery;
pub mod frame;
pub mod pool;
pub mod rate;
pub mod source;

pub use delivery::FrameDelivery;
pub use frame::VideoFrame;
pub use pool::{BufferPool, PooledBuffer};
pub use rate::RateEstimator;
pub use source::ReplaySource;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open frame source: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Capture buffer pool exhausted")]
    Buffer,

    #[error("Streaming error: {0}")]
    Stream(String),
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Directory of recorded frames for the replay source
    pub frames_dir: Option<String>,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Number of capture buffers owned by the producer
    pub buffer_count: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frames_dir: None,
            width: 1280,
            height: 720,
            fps: 30,
            buffer_count: 1,
        }
    }
}

impl CameraConfig {
    /// Bytes in one luma frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
