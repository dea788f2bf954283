#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::FaceLocator;
use crate::detect::result::FaceBox;

const MODEL_WIDTH: usize = 320;
const MODEL_HEIGHT: usize = 240;

/// UltraFace-style ONNX face locator.
///
/// Expects a `1x3x240x320` input and two outputs: scores `[1, N, 2]`
/// (background, face) and boxes `[1, N, 4]` as normalised corners. The gray
/// frame is nearest-resampled to the model size and replicated over the
/// three channels.
pub struct TractLocator {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl TractLocator {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, MODEL_HEIGHT, MODEL_WIDTH)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            confidence_threshold: 0.7,
            nms_threshold: 0.3,
        })
    }

    fn build_input(&self, gray: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let (width, height) = (width as usize, height as usize);
        if width == 0 || height == 0 || gray.len() != width * height {
            return Err(anyhow!(
                "expected {} gray bytes, received {}",
                width * height,
                gray.len()
            ));
        }
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, MODEL_HEIGHT, MODEL_WIDTH),
            |(_, _, y, x)| {
                let sx = x * width / MODEL_WIDTH;
                let sy = y * height / MODEL_HEIGHT;
                (gray[sy * width + sx] as f32 - 127.0) / 128.0
            },
        );
        Ok(input.into_tensor())
    }

    fn extract_faces(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<FaceBox>> {
        let scores = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no score output"))?
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;
        let boxes = outputs
            .get(1)
            .ok_or_else(|| anyhow!("model produced no box output"))?
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;

        let scores = scores
            .as_slice()
            .ok_or_else(|| anyhow!("score tensor is not contiguous"))?;
        let boxes = boxes
            .as_slice()
            .ok_or_else(|| anyhow!("box tensor is not contiguous"))?;
        if scores.len() / 2 != boxes.len() / 4 {
            return Err(anyhow!(
                "score/box count mismatch: {} vs {}",
                scores.len() / 2,
                boxes.len() / 4
            ));
        }

        let mut candidates: Vec<(f32, [f32; 4])> = scores
            .chunks_exact(2)
            .zip(boxes.chunks_exact(4))
            .filter(|(score, _)| score[1] >= self.confidence_threshold)
            .map(|(score, corners)| (score[1], [corners[0], corners[1], corners[2], corners[3]]))
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let (w, h) = (width as f32, height as f32);
        Ok(suppress(candidates, self.nms_threshold)
            .into_iter()
            .map(|[x1, y1, x2, y2]| {
                let x1 = (x1 * w).clamp(0.0, w);
                let y1 = (y1 * h).clamp(0.0, h);
                let x2 = (x2 * w).clamp(0.0, w);
                let y2 = (y2 * h).clamp(0.0, h);
                FaceBox::new(x1 as i32, y1 as i32, (x2 - x1) as i32, (y2 - y1) as i32)
            })
            .collect())
    }
}

/// Greedy non-maximum suppression over score-sorted corner boxes.
fn suppress(candidates: Vec<(f32, [f32; 4])>, threshold: f32) -> Vec<[f32; 4]> {
    let mut kept: Vec<[f32; 4]> = Vec::new();
    for (_, candidate) in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

impl FaceLocator for TractLocator {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_faces(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>> {
        let input = self.build_input(gray, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_faces(outputs, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; MODEL_WIDTH * MODEL_HEIGHT];
        self.detect_faces(&blank, MODEL_WIDTH as u32, MODEL_HEIGHT as u32)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_boxes_are_suppressed() {
        let kept = suppress(
            vec![
                (0.9, [0.1, 0.1, 0.5, 0.5]),
                (0.8, [0.12, 0.12, 0.52, 0.52]),
                (0.7, [0.6, 0.6, 0.9, 0.9]),
            ],
            0.3,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        assert_eq!(iou(&[0.0, 0.0, 0.1, 0.1], &[0.5, 0.5, 0.6, 0.6]), 0.0);
    }
}
