//! Face and eye detection

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DetectorTuning, DmsError};

/// Cascade-style grouping tolerance
const GROUP_EPS: f32 = 0.2;

/// Axis-aligned rectangle in detection-scale pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the right edge
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// One past the bottom edge
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Intersection with a `width`x`height` image as `(x, y, w, h)`, `None` if empty
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.right().min(width as i32);
        let y1 = self.bottom().min(height as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    fn similar(&self, other: &Rect, eps: f32) -> bool {
        let delta = eps
            * (self.width.min(other.width) + self.height.min(other.height)) as f32
            * 0.5;
        (self.x - other.x).abs() as f32 <= delta
            && (self.y - other.y).abs() as f32 <= delta
            && (self.right() - other.right()).abs() as f32 <= delta
            && (self.bottom() - other.bottom()).abs() as f32 <= delta
    }
}

/// Object detector: zero or more rectangles per image, best first
pub trait Detector: Send {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Rect>, DmsError>;
}

/// Scores a square grayscale patch
pub trait WindowClassifier: Send {
    /// Probability (0-1) that the patch shows the target
    fn score(&mut self, patch: &GrayImage) -> Result<f32, DmsError>;
}

/// Multi-scale sliding-window detector over a patch classifier.
///
/// Windows start at `min_window`, grow by `scale_factor` per pass up to
/// `max_window`, and step by an eighth of their side. Hits are grouped the
/// way cascade detectors group them; a group needs more than
/// `min_neighbors` members to be reported.
pub struct SlidingWindowDetector<C> {
    classifier: C,
    tuning: DetectorTuning,
}

impl<C: WindowClassifier> SlidingWindowDetector<C> {
    pub fn new(classifier: C, tuning: DetectorTuning) -> Result<Self, DmsError> {
        tuning.validate()?;
        Ok(Self { classifier, tuning })
    }

    /// Window sides scanned for an image of the given size
    fn window_sizes(&self, width: u32, height: u32) -> Vec<u32> {
        let limit = self.tuning.max_window.min(width).min(height);
        let mut sizes = Vec::new();
        let mut side = self.tuning.min_window as f32;
        loop {
            let size = side.round() as u32;
            if size > limit {
                break;
            }
            if sizes.last() != Some(&size) {
                sizes.push(size);
            }
            side *= self.tuning.scale_factor;
        }
        sizes
    }
}

impl<C: WindowClassifier> Detector for SlidingWindowDetector<C> {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Rect>, DmsError> {
        let (width, height) = image.dimensions();
        let mut hits = Vec::new();

        for size in self.window_sizes(width, height) {
            let stride = (size / 8).max(1) as usize;
            for y in (0..=height - size).step_by(stride) {
                for x in (0..=width - size).step_by(stride) {
                    let patch = imageops::crop_imm(image, x, y, size, size).to_image();
                    if self.classifier.score(&patch)? >= self.tuning.score_threshold {
                        hits.push(Rect::new(x as i32, y as i32, size as i32, size as i32));
                    }
                }
            }
        }

        let raw = hits.len();
        let grouped = group_rectangles(hits, self.tuning.min_neighbors);
        debug!("{} window hits grouped into {} detections", raw, grouped.len());
        Ok(grouped)
    }
}

/// Cluster similar rectangles and average each cluster.
///
/// Clusters of `min_neighbors` or fewer members are discarded; the rest are
/// returned largest cluster first. With `min_neighbors == 0` the input is
/// returned untouched.
pub fn group_rectangles(rects: Vec<Rect>, min_neighbors: usize) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects;
    }

    let mut parent: Vec<usize> = (0..rects.len()).collect();
    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].similar(&rects[j], GROUP_EPS) {
                let (a, b) = (root(&mut parent, i), root(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    // (count, sum x, sum y, sum w, sum h) per root
    let mut clusters: Vec<(usize, [i64; 5])> = Vec::new();
    let mut slot_of_root = vec![usize::MAX; rects.len()];
    for (i, rect) in rects.iter().enumerate() {
        let r = root(&mut parent, i);
        if slot_of_root[r] == usize::MAX {
            slot_of_root[r] = clusters.len();
            clusters.push((r, [0; 5]));
        }
        let sums = &mut clusters[slot_of_root[r]].1;
        sums[0] += 1;
        sums[1] += rect.x as i64;
        sums[2] += rect.y as i64;
        sums[3] += rect.width as i64;
        sums[4] += rect.height as i64;
    }

    let mut grouped: Vec<(i64, Rect)> = clusters
        .into_iter()
        .map(|(_, s)| s)
        .filter(|s| s[0] as usize > min_neighbors)
        .map(|s| {
            let n = s[0] as f64;
            let avg = |v: i64| (v as f64 / n).round() as i32;
            (s[0], Rect::new(avg(s[1]), avg(s[2]), avg(s[3]), avg(s[4])))
        })
        .collect();

    grouped.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.area().cmp(&a.1.area())));
    grouped.into_iter().map(|(_, rect)| rect).collect()
}
