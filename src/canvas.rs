//! `Canvas` implementation over a real frame.
//!
//! Rectangles go through `imageproc`; text is rasterized with an `ab_glyph`
//! font loaded once at startup.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing;
use imageproc::rect::Rect;
use std::path::Path;

use crate::frame::{BoundingBox, Detection, Frame};
use crate::overlay::{Annotator, Canvas, ClassCountSummary, FrameProcessor, TextStyle};

/// Load a TrueType/OpenType font for overlay text.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read overlay font {}", path.display()))?;
    FontArc::try_from_vec(bytes)
        .map_err(|e| anyhow!("invalid overlay font {}: {}", path.display(), e))
}

/// Draws directly into a frame's pixel buffer.
pub struct ImageCanvas<'a> {
    image: &'a mut RgbImage,
    font: &'a FontArc,
}

impl<'a> ImageCanvas<'a> {
    pub fn new(frame: &'a mut Frame, font: &'a FontArc) -> Self {
        Self {
            image: frame.image_mut(),
            font,
        }
    }
}

impl Canvas for ImageCanvas<'_> {
    fn draw_box(&mut self, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
        draw_box_on(self.image, bbox, color, thickness);
    }

    fn draw_text(&mut self, text: &str, x: i32, baseline: i32, style: &TextStyle) {
        let scale = PxScale::from(style.scale);
        let ascent = self.font.as_scaled(scale).ascent();
        let top = baseline - ascent.round() as i32;
        drawing::draw_text_mut(&mut *self.image, style.color, x, top, scale, self.font, text);
    }
}

/// `Annotator` that renders the overlay onto the frame itself.
pub struct OverlayRenderer {
    processor: FrameProcessor,
    font: FontArc,
}

impl OverlayRenderer {
    pub fn new(processor: FrameProcessor, font: FontArc) -> Self {
        Self { processor, font }
    }
}

impl Annotator for OverlayRenderer {
    fn annotate(
        &mut self,
        frame: &mut Frame,
        detections: &[Detection],
    ) -> Result<ClassCountSummary> {
        let mut canvas = ImageCanvas::new(frame, &self.font);
        self.processor.process(&mut canvas, detections)
    }
}

/// Hollow rectangle `thickness` pixels wide, growing inward from the box edge.
///
/// Malformed boxes are skipped; parts outside the image are clipped.
pub fn draw_box_on(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    if !bbox.is_well_formed() {
        log::trace!("skipping malformed box {:?}", bbox);
        return;
    }
    let left = bbox.left.round() as i32;
    let top = bbox.top.round() as i32;
    let right = bbox.right.round() as i32;
    let bottom = bbox.bottom.round() as i32;

    for t in 0..thickness.max(1) as i32 {
        let width = right - left - 2 * t;
        let height = bottom - top - 2 * t;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(left + t, top + t).of_size(width as u32, height as u32);
        drawing::draw_hollow_rect_mut(image, rect, color);
    }
}
