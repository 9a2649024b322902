#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{decode_yolo_output, non_max_suppression, FrameMapping, YoloLayout};
use crate::frame::{Detection, Frame};

/// Square input edge of YOLOv8 exports.
pub const YOLO_INPUT_SIZE: u32 = 640;
/// Upper bound on detections kept per frame after NMS.
pub const MAX_DETECTIONS: usize = 300;

/// Tract-based backend running a YOLOv8 ONNX detection model.
///
/// The model is loaded from a local file; inference runs on the CPU.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    confidence_threshold: f32,
    iou_threshold: f32,
    /// Size of the class name table the ids will be resolved against.
    known_classes: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, known_classes: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = YOLO_INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            known_classes,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = imageops::resize(
            frame.image(),
            YOLO_INPUT_SIZE,
            YOLO_INPUT_SIZE,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, YOLO_INPUT_SIZE as usize, YOLO_INPUT_SIZE as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn infer(&self, frame: &Frame) -> Result<(Vec<f32>, YoloLayout)> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!(
                "expected YOLO output of shape [1, 4 + classes, anchors], got {:?}",
                shape
            ));
        }
        let layout = YoloLayout {
            attributes: shape[1],
            anchors: shape[2],
        };
        Ok((view.iter().copied().collect(), layout))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (data, layout) = self.infer(frame)?;
        let mapping = FrameMapping::new(YOLO_INPUT_SIZE, frame.width(), frame.height());
        let candidates = decode_yolo_output(&data, layout, self.confidence_threshold, mapping)?;
        Ok(non_max_suppression(
            candidates,
            self.iou_threshold,
            MAX_DETECTIONS,
        ))
    }

    /// Runs one blank frame and checks the model's class count against the
    /// class name table.
    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(
            image::RgbImage::new(YOLO_INPUT_SIZE, YOLO_INPUT_SIZE),
            0,
        );
        let (_, layout) = self.infer(&blank)?;
        if layout.num_classes() > self.known_classes {
            return Err(anyhow!(
                "model predicts {} classes but the class name table has {}",
                layout.num_classes(),
                self.known_classes
            ));
        }
        log::info!(
            "tract backend ready: {} classes, {} anchors",
            layout.num_classes(),
            layout.anchors
        );
        Ok(())
    }
}
