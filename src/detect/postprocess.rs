//! YOLOv8 output decoding and non-maximum suppression.

use anyhow::{anyhow, Result};

use crate::frame::{BoundingBox, Detection};

/// Shape of a YOLOv8 detection head: `[1, 4 + classes, anchors]`.
///
/// Rows 0..4 hold `cx, cy, w, h` in model-input pixels; the remaining rows
/// hold one score per class. Data is row-major, so attribute `a` of anchor
/// `i` lives at `a * anchors + i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YoloLayout {
    pub attributes: usize,
    pub anchors: usize,
}

impl YoloLayout {
    pub fn num_classes(&self) -> usize {
        self.attributes.saturating_sub(4)
    }
}

/// Maps model-input coordinates back onto the source frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameMapping {
    pub scale_x: f32,
    pub scale_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl FrameMapping {
    pub fn new(input_size: u32, frame_width: u32, frame_height: u32) -> Self {
        Self {
            scale_x: frame_width as f32 / input_size as f32,
            scale_y: frame_height as f32 / input_size as f32,
            frame_width,
            frame_height,
        }
    }
}

/// Keep the best class per anchor above `confidence_threshold` and map the
/// box into frame pixels.
pub fn decode_yolo_output(
    data: &[f32],
    layout: YoloLayout,
    confidence_threshold: f32,
    mapping: FrameMapping,
) -> Result<Vec<Detection>> {
    if layout.attributes <= 4 {
        return Err(anyhow!(
            "YOLO output needs more than 4 attributes per anchor, got {}",
            layout.attributes
        ));
    }
    let expected = layout
        .attributes
        .checked_mul(layout.anchors)
        .ok_or_else(|| anyhow!("YOLO output dimensions overflow"))?;
    if data.len() != expected {
        return Err(anyhow!(
            "YOLO output length mismatch: expected {}, got {}",
            expected,
            data.len()
        ));
    }

    let n = layout.anchors;
    let mut detections = Vec::new();
    for i in 0..n {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..layout.num_classes() {
            let score = data[(4 + c) * n + i];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < confidence_threshold {
            continue;
        }

        let cx = data[i] * mapping.scale_x;
        let cy = data[n + i] * mapping.scale_y;
        let w = data[2 * n + i] * mapping.scale_x;
        let h = data[3 * n + i] * mapping.scale_y;
        let bbox = BoundingBox::from_center(cx, cy, w, h)
            .clamp_to(mapping.frame_width, mapping.frame_height);

        detections.push(Detection::new(best_class, best_score.min(1.0), bbox));
    }
    Ok(detections)
}

/// Greedy class-agnostic NMS: sort by confidence, drop any box overlapping a
/// kept box by more than `iou_threshold`, whatever its class.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
