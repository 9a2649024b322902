//! Frame sources.
//!
//! This module provides the sources the capture loop can read from:
//! - Synthetic scenes (`stub://...`, always available)
//! - USB webcams through V4L2 (feature: ingest-v4l2)
//! - Local video files through FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Every source produces owned `Frame`s in packed RGB24. `next_frame` returns
//! `Ok(None)` at end of stream; an `Err` means the acquisition failed. Both
//! end the capture loop.

#[cfg(feature = "ingest-file-ffmpeg")]
pub mod file;
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
pub use file::FileSource;
pub use normalize::{normalize_to_rgb, strip_row_padding, PixelFormat};
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use crate::config::CaptureSettings;
use crate::frame::Frame;

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
    /// Negotiated frame size (may differ from the requested one).
    pub width: u32,
    pub height: u32,
}

/// A capture device or stream.
pub trait FrameSource {
    /// Open the underlying device.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Must be safe to call more than once.
    fn release(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Kind of source a device string refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Camera(String),
    File(String),
}

/// Classify a device string.
///
/// - `stub://...` is a synthetic scene
/// - a bare integer `N` is camera index N (`/dev/videoN`)
/// - `/dev/video*` is a camera node
/// - anything else without a URL scheme is a local video file
pub fn classify_device(device: &str) -> Result<SourceKind> {
    let device = device.trim();
    if device.is_empty() {
        return Err(anyhow!("capture device must not be empty"));
    }
    if device.starts_with("stub://") {
        return Ok(SourceKind::Synthetic);
    }
    if let Ok(index) = device.parse::<u32>() {
        return Ok(SourceKind::Camera(format!("/dev/video{}", index)));
    }
    if device.starts_with("/dev/video") {
        return Ok(SourceKind::Camera(device.to_string()));
    }
    if device.contains("://") {
        return Err(anyhow!(
            "capture device '{}' looks like a URL; only local cameras and files are supported",
            device
        ));
    }
    Ok(SourceKind::File(device.to_string()))
}

/// Open the configured frame source (not yet connected).
pub fn open_source(settings: &CaptureSettings) -> Result<Box<dyn FrameSource>> {
    match classify_device(&settings.device)? {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(settings.clone())?)),
        SourceKind::Camera(path) => open_camera(settings, path),
        SourceKind::File(path) => open_file(settings, path),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_camera(settings: &CaptureSettings, path: String) -> Result<Box<dyn FrameSource>> {
    let settings = CaptureSettings {
        device: path,
        ..settings.clone()
    };
    Ok(Box::new(V4l2Source::new(settings)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_camera(_settings: &CaptureSettings, path: String) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera capture from {} requires the ingest-v4l2 feature",
        path
    ))
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file(settings: &CaptureSettings, path: String) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FileSource::new(path, settings.target_fps)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file(_settings: &CaptureSettings, path: String) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "video file input {} requires the ingest-file-ffmpeg feature",
        path
    ))
}
