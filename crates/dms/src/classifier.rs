//! ONNX patch classifier (tract)

use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use tracing::{error, info};
use tract_onnx::prelude::*;

use crate::detector::WindowClassifier;
use crate::DmsError;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Patch classifier backed by an ONNX model.
///
/// The model takes a `1x1xSxS` tensor of luma in `[0, 1]` and returns either
/// one probability or two-class logits (`[background, target]`).
pub struct TractClassifier {
    model: Plan,
    patch_size: u32,
}

impl TractClassifier {
    /// Load and optimize the model at `path`
    pub fn load(path: &str, patch_size: u32) -> Result<Self, DmsError> {
        if !Path::new(path).is_file() {
            error!("Classifier model not found: {}", path);
            return Err(DmsError::ModelLoad(format!("{} does not exist", path)));
        }

        info!("Loading classifier model from {}", path);
        let side = patch_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, 1, side, side]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| {
                error!("Failed to load classifier model {}: {}", path, e);
                DmsError::ModelLoad(e.to_string())
            })?;

        Ok(Self { model, patch_size })
    }
}

impl WindowClassifier for TractClassifier {
    fn score(&mut self, patch: &GrayImage) -> Result<f32, DmsError> {
        let side = self.patch_size;
        let resized = if patch.dimensions() == (side, side) {
            patch.clone()
        } else {
            imageops::resize(patch, side, side, FilterType::Triangle)
        };

        let input: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 1, side as usize, side as usize),
            |(_, _, y, x)| resized.get_pixel(x as u32, y as u32)[0] as f32 / 255.0,
        )
        .into();

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let values: Vec<f32> = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        probability(&values)
    }
}

/// Target probability from the raw model output
fn probability(values: &[f32]) -> Result<f32, DmsError> {
    match values {
        [p] => Ok(p.clamp(0.0, 1.0)),
        [background, target] => {
            let max = background.max(*target);
            let (b, t) = ((background - max).exp(), (target - max).exp());
            Ok(t / (b + t))
        }
        other => Err(DmsError::Inference(format!(
            "expected 1 or 2 classifier outputs, got {}",
            other.len()
        ))),
    }
}
