//! Per-frame overlay: boxes, labels, per-class counts and the total line.
//!
//! Drawing goes through the `Canvas` trait so the same code renders onto a
//! real frame (`canvas::ImageCanvas`) or into a recorder in tests. The four
//! steps always run in the same order (boxes, labels, per-class counts,
//! total); later draws may overlap earlier ones.

use anyhow::Result;
use image::Rgb;
use std::fmt;

use crate::classes::ClassNames;
use crate::frame::{BoundingBox, Detection, Frame};

/// Box colors, indexed by class id modulo the palette length.
pub const BOX_PALETTE: [Rgb<u8>; 21] = [
    Rgb([0xA3, 0x51, 0xFB]),
    Rgb([0xFF, 0x40, 0x40]),
    Rgb([0xFF, 0xA1, 0xA0]),
    Rgb([0xFF, 0x76, 0x33]),
    Rgb([0xFF, 0xB6, 0x33]),
    Rgb([0xD1, 0xD4, 0x35]),
    Rgb([0x4C, 0xFB, 0x12]),
    Rgb([0x94, 0xCF, 0x1A]),
    Rgb([0x40, 0xDE, 0x8A]),
    Rgb([0x1B, 0x96, 0x40]),
    Rgb([0x00, 0xD6, 0xC1]),
    Rgb([0x2E, 0x9C, 0xAA]),
    Rgb([0x00, 0xC4, 0xFF]),
    Rgb([0x36, 0x47, 0x97]),
    Rgb([0x66, 0x75, 0xFF]),
    Rgb([0x00, 0x19, 0xEF]),
    Rgb([0x86, 0x3A, 0xFF]),
    Rgb([0x53, 0x00, 0x87]),
    Rgb([0xCD, 0x3A, 0xFF]),
    Rgb([0xFF, 0x97, 0xCA]),
    Rgb([0xFF, 0x39, 0xC9]),
];

pub fn box_color(class_id: usize) -> Rgb<u8> {
    BOX_PALETTE[class_id % BOX_PALETTE.len()]
}

// ----------------------------------------------------------------------------
// Canvas
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub color: Rgb<u8>,
    /// Glyph height in pixels.
    pub scale: f32,
}

/// Drawing surface for the overlay.
pub trait Canvas {
    /// Draw a hollow rectangle. Malformed or fully off-canvas boxes are ignored.
    fn draw_box(&mut self, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32);

    /// Draw one line of text whose baseline starts at `(x, baseline)`.
    fn draw_text(&mut self, text: &str, x: i32, baseline: i32, style: &TextStyle);
}

/// Layout and colors for the overlay.
#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub box_thickness: u32,
    /// Pixels between a box's top edge and its label baseline.
    pub label_margin: i32,
    pub label: TextStyle,
    pub summary_x: i32,
    /// Baseline of the first summary line.
    pub summary_top: i32,
    pub summary_line_height: i32,
    pub class_line: TextStyle,
    pub total_line: TextStyle,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            box_thickness: 2,
            label_margin: 10,
            label: TextStyle {
                color: Rgb([0, 255, 0]),
                scale: 20.0,
            },
            summary_x: 20,
            summary_top: 40,
            summary_line_height: 40,
            class_line: TextStyle {
                color: Rgb([255, 0, 0]),
                scale: 30.0,
            },
            total_line: TextStyle {
                color: Rgb([0, 0, 255]),
                scale: 30.0,
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Errors and summary
// ----------------------------------------------------------------------------

/// A detection referenced a class id missing from the name table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownClassId {
    pub class_id: usize,
    pub table_len: usize,
}

impl fmt::Display for UnknownClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "class id {} is not in the class name table ({} entries)",
            self.class_id, self.table_len
        )
    }
}

impl std::error::Error for UnknownClassId {}

fn resolve<'a>(class_names: &'a ClassNames, class_id: usize) -> Result<&'a str, UnknownClassId> {
    class_names.get(class_id).ok_or(UnknownClassId {
        class_id,
        table_len: class_names.len(),
    })
}

/// Per-frame detection counts by class name.
///
/// Entries keep first-appearance order, which is also the on-screen order.
/// No entry has a zero count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassCountSummary {
    entries: Vec<(String, usize)>,
}

impl ClassCountSummary {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(&mut self, name: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((name.to_string(), 1)),
        }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, count)| *count)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// Number of distinct classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), *c))
    }
}

// ----------------------------------------------------------------------------
// Overlay steps
// ----------------------------------------------------------------------------

/// Draw one box per detection.
pub fn draw_detections<C: Canvas + ?Sized>(
    canvas: &mut C,
    detections: &[Detection],
    style: &OverlayStyle,
) {
    for det in detections {
        canvas.draw_box(&det.bbox, box_color(det.class_id), style.box_thickness);
    }
}

pub fn format_label(name: &str, confidence: f32) -> String {
    format!("{} {:.2}", name, confidence)
}

/// Label anchor for a box: its left edge, `margin` pixels above its top edge.
pub fn label_origin(bbox: &BoundingBox, margin: i32) -> (i32, i32) {
    (bbox.left as i32, (bbox.top as i32).saturating_sub(margin))
}

/// Draw `"<name> <confidence>"` above each box.
pub fn draw_labels<C: Canvas + ?Sized>(
    canvas: &mut C,
    detections: &[Detection],
    class_names: &ClassNames,
    style: &OverlayStyle,
) -> Result<()> {
    for det in detections {
        let name = resolve(class_names, det.class_id)?;
        let label = format_label(name, det.confidence);
        let (x, y) = label_origin(&det.bbox, style.label_margin);
        canvas.draw_text(&label, x, y, &style.label);
    }
    Ok(())
}

/// Tally detections by resolved class name.
pub fn count_classes(
    detections: &[Detection],
    class_names: &ClassNames,
) -> Result<ClassCountSummary> {
    let mut summary = ClassCountSummary::new();
    for det in detections {
        summary.increment(resolve(class_names, det.class_id)?);
    }
    Ok(summary)
}

pub fn format_total(total: usize) -> String {
    format!("Total Objects: {}", total)
}

/// Draw one line per class followed by the total line. Returns the number of
/// lines drawn; the total line is always drawn, and always last.
pub fn render_summary<C: Canvas + ?Sized>(
    canvas: &mut C,
    summary: &ClassCountSummary,
    style: &OverlayStyle,
) -> usize {
    let mut y = style.summary_top;
    let mut lines = 0;
    for (name, count) in summary.iter() {
        canvas.draw_text(
            &format!("{}: {}", name, count),
            style.summary_x,
            y,
            &style.class_line,
        );
        y += style.summary_line_height;
        lines += 1;
    }
    canvas.draw_text(
        &format_total(summary.total()),
        style.summary_x,
        y,
        &style.total_line,
    );
    lines + 1
}

// ----------------------------------------------------------------------------
// FrameProcessor
// ----------------------------------------------------------------------------

/// Draws the overlay for one frame in place and returns its counts.
pub trait Annotator {
    fn annotate(&mut self, frame: &mut Frame, detections: &[Detection])
        -> Result<ClassCountSummary>;
}

/// Turns (frame, detections) into an annotated frame plus its count summary.
#[derive(Clone, Debug)]
pub struct FrameProcessor {
    class_names: ClassNames,
    style: OverlayStyle,
}

impl FrameProcessor {
    pub fn new(class_names: ClassNames) -> Self {
        Self {
            class_names,
            style: OverlayStyle::default(),
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Boxes, then labels, then per-class counts, then the total.
    pub fn process<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        detections: &[Detection],
    ) -> Result<ClassCountSummary> {
        draw_detections(canvas, detections, &self.style);
        draw_labels(canvas, detections, &self.class_names, &self.style)?;
        let summary = count_classes(detections, &self.class_names)?;
        render_summary(canvas, &summary, &self.style);
        Ok(summary)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Op {
        Box(BoundingBox, Rgb<u8>),
        Text(String, i32, i32, Rgb<u8>),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl Canvas for Recorder {
        fn draw_box(&mut self, bbox: &BoundingBox, color: Rgb<u8>, _thickness: u32) {
            self.ops.push(Op::Box(*bbox, color));
        }

        fn draw_text(&mut self, text: &str, x: i32, baseline: i32, style: &TextStyle) {
            self.ops
                .push(Op::Text(text.to_string(), x, baseline, style.color));
        }
    }

    fn det(class_id: usize, confidence: f32, l: f32, t: f32, r: f32, b: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(l, t, r, b))
    }

    fn scene() -> Vec<Detection> {
        vec![
            det(0, 0.91, 10.0, 10.0, 50.0, 80.0),
            det(0, 0.80, 100.0, 20.0, 140.0, 90.0),
            det(16, 0.77, 200.0, 50.0, 260.0, 120.0),
        ]
    }

    #[test]
    fn counts_scene_by_name() -> Result<()> {
        let summary = count_classes(&scene(), &ClassNames::coco())?;
        assert_eq!(summary.get("person"), Some(2));
        assert_eq!(summary.get("dog"), Some(1));
        assert_eq!(summary.get("cat"), None);
        assert_eq!(summary.total(), 3);
        let order: Vec<_> = summary.iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["person", "dog"]);
        Ok(())
    }

    #[test]
    fn counting_is_repeatable() -> Result<()> {
        let names = ClassNames::coco();
        let detections = scene();
        assert_eq!(
            count_classes(&detections, &names)?,
            count_classes(&detections, &names)?
        );
        Ok(())
    }

    #[test]
    fn no_detections_count_to_an_empty_summary() -> Result<()> {
        let summary = count_classes(&[], &ClassNames::coco())?;
        assert!(summary.is_empty());
        assert_eq!(summary.total(), 0);
        Ok(())
    }

    #[test]
    fn process_without_detections_draws_only_total() -> Result<()> {
        let processor = FrameProcessor::new(ClassNames::coco());
        let mut canvas = Recorder::default();
        let summary = processor.process(&mut canvas, &[])?;
        assert_eq!(summary.total(), 0);
        assert_eq!(
            canvas.ops,
            vec![Op::Text(
                "Total Objects: 0".to_string(),
                20,
                40,
                Rgb([0, 0, 255])
            )]
        );
        Ok(())
    }

    #[test]
    fn counts_cover_every_detection_without_zero_entries() -> Result<()> {
        let names = ClassNames::coco();
        let id_lists: [&[usize]; 7] = [
            &[5],
            &[2, 2, 2, 2],
            &[0, 1, 2, 3, 4, 5, 6, 7],
            &[79, 0, 79, 0, 79],
            &[16, 0, 16, 2, 0, 0, 58, 16],
            &[3, 3, 1, 3, 1, 3, 9],
            &[0, 16],
        ];
        for ids in id_lists {
            let detections: Vec<_> = ids
                .iter()
                .enumerate()
                .map(|(i, &id)| det(id, 0.5, i as f32, 0.0, i as f32 + 5.0, 5.0))
                .collect();
            let summary = count_classes(&detections, &names)?;

            assert_eq!(summary.total(), detections.len(), "ids {:?}", ids);
            assert!(summary.iter().all(|(_, count)| count > 0), "ids {:?}", ids);

            let mut distinct = ids.to_vec();
            distinct.sort_unstable();
            distinct.dedup();
            assert_eq!(summary.len(), distinct.len(), "ids {:?}", ids);
            for id in distinct {
                let expected = ids.iter().filter(|&&other| other == id).count();
                assert_eq!(summary.get(names.get(id).unwrap()), Some(expected));
            }
        }
        Ok(())
    }

    #[test]
    fn unknown_class_id_is_an_error() {
        let names = ClassNames::coco();
        let err = count_classes(&[det(80, 0.5, 0.0, 0.0, 1.0, 1.0)], &names).unwrap_err();
        let unknown = err.downcast_ref::<UnknownClassId>().unwrap();
        assert_eq!(unknown.class_id, 80);
        assert_eq!(unknown.table_len, 80);
    }

    #[test]
    fn labels_sit_above_box_with_two_decimals() -> Result<()> {
        let mut canvas = Recorder::default();
        let style = OverlayStyle::default();
        draw_labels(&mut canvas, &scene()[..1], &ClassNames::coco(), &style)?;
        assert_eq!(
            canvas.ops,
            vec![Op::Text("person 0.91".to_string(), 10, 0, Rgb([0, 255, 0]))]
        );
        Ok(())
    }

    #[test]
    fn label_origin_truncates_like_integer_pixels() {
        let bbox = BoundingBox::new(12.9, 33.7, 40.0, 60.0);
        assert_eq!(label_origin(&bbox, 10), (12, 23));
    }

    #[test]
    fn empty_summary_draws_only_total() {
        let mut canvas = Recorder::default();
        let lines = render_summary(
            &mut canvas,
            &ClassCountSummary::new(),
            &OverlayStyle::default(),
        );
        assert_eq!(lines, 1);
        assert_eq!(
            canvas.ops,
            vec![Op::Text(
                "Total Objects: 0".to_string(),
                20,
                40,
                Rgb([0, 0, 255])
            )]
        );
    }

    #[test]
    fn summary_lines_stack_and_end_with_total() -> Result<()> {
        let mut canvas = Recorder::default();
        let summary = count_classes(&scene(), &ClassNames::coco())?;
        let lines = render_summary(&mut canvas, &summary, &OverlayStyle::default());
        assert_eq!(lines, 3);
        assert_eq!(
            canvas.ops,
            vec![
                Op::Text("person: 2".to_string(), 20, 40, Rgb([255, 0, 0])),
                Op::Text("dog: 1".to_string(), 20, 80, Rgb([255, 0, 0])),
                Op::Text("Total Objects: 3".to_string(), 20, 120, Rgb([0, 0, 255])),
            ]
        );
        Ok(())
    }

    #[test]
    fn process_draws_in_fixed_order() -> Result<()> {
        let processor = FrameProcessor::new(ClassNames::coco());
        let mut canvas = Recorder::default();
        let summary = processor.process(&mut canvas, &scene())?;
        assert_eq!(summary.total(), 3);

        let kinds: Vec<&str> = canvas
            .ops
            .iter()
            .map(|op| match op {
                Op::Box(..) => "box",
                Op::Text(text, ..) if text.starts_with("Total") => "total",
                Op::Text(text, ..) if text.contains(':') => "count",
                Op::Text(..) => "label",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["box", "box", "box", "label", "label", "label", "count", "count", "total"]
        );
        Ok(())
    }

    #[test]
    fn box_color_follows_class_id() {
        let mut canvas = Recorder::default();
        draw_detections(&mut canvas, &scene(), &OverlayStyle::default());
        assert_eq!(
            canvas.ops[2],
            Op::Box(BoundingBox::new(200.0, 50.0, 260.0, 120.0), box_color(16))
        );
        assert_eq!(box_color(0), box_color(BOX_PALETTE.len()));
    }
}
