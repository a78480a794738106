//! Video frame types

use image::GrayImage;
use std::time::Instant;

/// Luma video frame (the Y plane of the camera output)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Luma pixel data (width * height)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Monotonic capture timestamp
    pub timestamp: Instant,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw luma data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp: Instant, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp,
            sequence,
        }
    }

    /// Borrow the frame as an image, `None` if the buffer does not match the geometry
    pub fn to_image(&self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
    }
}
