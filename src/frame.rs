//! Frame and detection types.
//!
//! - `Frame`: Owned RGB pixel buffer for one loop iteration. Not `Clone`.
//! - `BoundingBox`: Axis-aligned box in the pixel space of the current frame.
//! - `Detection`: One detector output (class id, confidence, box).
//!
//! A `Frame` is produced by a `FrameSource`, read by the detector, drawn on in
//! place by the overlay, shown by a `FrameSink`, then dropped. Nothing keeps a
//! frame past its iteration.

use anyhow::{anyhow, Result};
use image::RgbImage;

// ----------------------------------------------------------------------------
// Frame: owned pixel buffer
// ----------------------------------------------------------------------------

/// One captured image. Owned exclusively by the capture loop and moved
/// through it, never duplicated.
///
/// ```compile_fail
/// use object_counter::Frame;
///
/// let frame = Frame::new(image::RgbImage::new(2, 2), 1);
/// let _copy = frame.clone();
/// ```
pub struct Frame {
    image: RgbImage,
    /// Sequence number assigned by the source (1-based).
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    /// Wrap a packed RGB24 buffer. The length must be exactly `width * height * 3`.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("invalid {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Packed RGB24 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

// ----------------------------------------------------------------------------
// Detection types
// ----------------------------------------------------------------------------

/// Bounding box in frame pixel coordinates (left, top, right, bottom).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build from a YOLO-style center box.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// True when all coordinates are finite and the box has positive extent.
    pub fn is_well_formed(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.right > self.left
            && self.bottom > self.top
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            left: self.left.clamp(0.0, w),
            top: self.top.clamp(0.0, h),
            right: self.right.clamp(0.0, w),
            bottom: self.bottom.clamp(0.0, h),
        }
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.left.max(other.left);
        let iy1 = self.top.max(other.top);
        let ix2 = self.right.min(other.right);
        let iy2 = self.bottom.min(other.bottom);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

/// One detector output for the current frame. No identity across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: usize, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 1).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 1).is_err());
    }

    #[test]
    fn frame_exposes_dimensions() -> Result<()> {
        let frame = Frame::from_rgb(vec![7u8; 4 * 3 * 3], 4, 3, 9)?;
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.sequence, 9);
        assert_eq!(frame.pixels().len(), 36);
        Ok(())
    }

    #[test]
    fn malformed_boxes_are_detected() {
        assert!(BoundingBox::new(10.0, 10.0, 50.0, 80.0).is_well_formed());
        assert!(!BoundingBox::new(50.0, 10.0, 10.0, 80.0).is_well_formed());
        assert!(!BoundingBox::new(10.0, 10.0, 10.0, 80.0).is_well_formed());
        assert!(!BoundingBox::new(f32::NAN, 10.0, 50.0, 80.0).is_well_formed());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);

        let half = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let clamped = BoundingBox::new(-5.0, -1.0, 700.0, 500.0).clamp_to(640, 480);
        assert_eq!(clamped, BoundingBox::new(0.0, 0.0, 640.0, 480.0));
    }
}
