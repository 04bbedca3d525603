#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::coco_label;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Tract-based backend for SSD-style COCO detectors exported to ONNX.
///
/// Model contract:
/// - input 0: `u8[1, H, W, 3]` RGB
/// - output 0: boxes `f32[1, N, 4]` as normalized `ymin, xmin, ymax, xmax`
/// - output 1: class ids `f32[1, N]` (COCO 1-based ids)
/// - output 2: scores `f32[1, N]`
///
/// Frames are resized to the model input and boxes are scaled back to frame pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, input_height as usize, input_width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            confidence_threshold: 0.5,
            max_detections: 20,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_image()?;
        let resized = if image.dimensions() == (self.input_width, self.input_height) {
            image
        } else {
            imageops::resize(
                &image,
                self.input_width,
                self.input_height,
                FilterType::Triangle,
            )
        };

        let input = tract_ndarray::Array4::from_shape_vec(
            (1, self.input_height as usize, self.input_width as usize, 3),
            resized.into_raw(),
        )
        .context("resized frame does not match model input shape")?;
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "expected boxes, classes and scores outputs, model produced {}",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("boxes output was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("classes output was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("scores output was not f32")?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        if boxes.len() != scores.len() * 4 || classes.len() != scores.len() {
            return Err(anyhow!(
                "output shapes disagree: {} box values, {} classes, {} scores",
                boxes.len(),
                classes.len(),
                scores.len()
            ));
        }

        let (fw, fh) = (frame.width as f32, frame.height as f32);
        let mut detections: Vec<Detection> = scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score >= self.confidence_threshold)
            .filter_map(|(i, score)| {
                let label = coco_label(classes[i].round().max(0.0) as usize)?;
                let b = &boxes[i * 4..i * 4 + 4];
                let (ymin, xmin) = (b[0].clamp(0.0, 1.0), b[1].clamp(0.0, 1.0));
                let (ymax, xmax) = (b[2].clamp(0.0, 1.0), b[3].clamp(0.0, 1.0));
                Some(Detection::new(
                    label,
                    *score,
                    xmin * fw,
                    ymin * fh,
                    (xmax - xmin).max(0.0) * fw,
                    (ymax - ymin).max(0.0) * fh,
                ))
            })
            .collect();

        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(self.max_detections);
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_width, self.input_height, [0, 0, 0], 0)?;
        self.detect(&blank).map(|_| ())
    }
}
