use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::frame::{BoundingBox, Detection, Frame};

/// Demo scene in normalized `[left, top, right, bottom]` coordinates:
/// two persons and a dog. The synthetic source paints blocks at the same spots.
pub const DEMO_SCENE: [(usize, f32, [f32; 4]); 3] = [
    (0, 0.91, [0.03125, 0.04167, 0.15625, 0.33333]),
    (0, 0.80, [0.3125, 0.08333, 0.4375, 0.375]),
    (16, 0.77, [0.625, 0.20833, 0.8125, 0.5]),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coordinates {
    Pixels,
    /// Scaled by the frame size at detect time.
    Normalized,
}

/// Stub backend for tests and demos. Replays a script of per-frame
/// detection lists, cycling when it runs out.
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    coordinates: Coordinates,
    calls: u64,
}

impl StubBackend {
    /// Script in frame pixel coordinates.
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            coordinates: Coordinates::Pixels,
            calls: 0,
        }
    }

    /// A backend that never detects anything.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Every frame shows `DEMO_SCENE`, scaled to the frame.
    pub fn demo() -> Self {
        let scene = DEMO_SCENE
            .iter()
            .map(|(class_id, confidence, [l, t, r, b])| {
                Detection::new(*class_id, *confidence, BoundingBox::new(*l, *t, *r, *b))
            })
            .collect();
        Self {
            script: vec![scene],
            coordinates: Coordinates::Normalized,
            calls: 0,
        }
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let index = self.calls as usize;
        self.calls += 1;
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let mut detections = self.script[index % self.script.len()].clone();
        if self.coordinates == Coordinates::Normalized {
            let w = frame.width() as f32;
            let h = frame.height() as f32;
            for det in &mut detections {
                det.bbox = BoundingBox::new(
                    det.bbox.left * w,
                    det.bbox.top * h,
                    det.bbox.right * w,
                    det.bbox.bottom * h,
                );
            }
        }
        Ok(detections)
    }
}
