//! Replay frame source
//!
//! Plays a directory of recorded frames into the pipeline on its own
//! thread, looping forever at the configured frame rate. Stands in for the
//! camera firmware's delivery callback.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use tracing::{debug, info};

use crate::{BufferPool, CameraConfig, CameraError, FrameDelivery};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "tif", "tiff"];

/// Running replay producer
pub struct ReplaySource {
    frame_count: usize,
    handle: JoinHandle<()>,
}

impl ReplaySource {
    /// Load every frame in `config.frames_dir` and start delivering them.
    ///
    /// Fails if the directory cannot be read, holds no frames, or a frame
    /// cannot be decoded.
    pub fn spawn(config: &CameraConfig, delivery: FrameDelivery) -> Result<Self, CameraError> {
        let dir = config
            .frames_dir
            .as_deref()
            .ok_or_else(|| CameraError::Open("no frames directory configured".into()))?;
        let frames = load_frames(Path::new(dir), config.width, config.height)?;
        let frame_count = frames.len();
        info!(
            "Replaying {} frames from {} at {} fps ({}x{})",
            frame_count, dir, config.fps, config.width, config.height
        );

        let pool = BufferPool::new(config.buffer_count.max(1), config.frame_size());
        let interval = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);

        let handle = thread::Builder::new()
            .name("camera-replay".into())
            .spawn(move || run(frames, pool, delivery, interval))
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        Ok(Self {
            frame_count,
            handle,
        })
    }

    /// Number of distinct frames in the replay loop
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Check whether the producer thread is still alive
    pub fn is_streaming(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn run(frames: Vec<Vec<u8>>, pool: BufferPool, mut delivery: FrameDelivery, interval: Duration) {
    let mut next = Instant::now();
    for pixels in frames.iter().cycle() {
        let buffer = pool.acquire().map(|mut buffer| {
            buffer[..pixels.len()].copy_from_slice(pixels);
            buffer
        });
        delivery.deliver_or_drop(buffer, Instant::now());

        next += interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

/// Decode the frames of `dir` (sorted by file name) to luma at capture geometry
fn load_frames(dir: &Path, width: u32, height: u32) -> Result<Vec<Vec<u8>>, CameraError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_frame_file(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(CameraError::Open(format!("no frames in {}", dir.display())));
    }

    paths
        .iter()
        .map(|path| {
            let luma = image::open(path)
                .map_err(|e| CameraError::Format(format!("{}: {}", path.display(), e)))?
                .to_luma8();
            let luma = if luma.dimensions() == (width, height) {
                luma
            } else {
                debug!("Scaling {} to {}x{}", path.display(), width, height);
                imageops::resize(&luma, width, height, FilterType::Triangle)
            };
            Ok(luma.into_raw())
        })
        .collect()
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
