use anyhow::Result;

use crate::frame::{Detection, Frame};

/// Detector backend trait.
///
/// A backend is a black box from frame to detections. Boxes come back in the
/// pixel space of the frame that was passed in; class ids index the class
/// name table the backend was configured with.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Implementations must treat the frame as read-only and must not keep
    /// any reference to its pixels after returning.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the capture loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
