//! Display sinks for annotated frames.
//!
//! - `WindowSink`: on-screen window, ESC or close stops the loop (feature: display-window)
//! - `SnapshotSink`: writes every Nth frame as JPEG
//! - `NullSink`: headless, discards frames

#[cfg(feature = "display-window")]
pub mod window;

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "display-window")]
pub use window::WindowSink;

use crate::config::DisplaySettings;
use crate::frame::Frame;

/// Window title for the on-screen display.
pub const WINDOW_TITLE: &str = "YOLOv8n Object Counter";

/// Destination for annotated frames.
pub trait FrameSink {
    /// Present one annotated frame.
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Polled once per iteration after `show`. True ends the capture loop.
    fn stop_requested(&mut self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayMode {
    Window,
    Snapshot,
    Headless,
}

impl DisplayMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "window" => Ok(Self::Window),
            "snapshot" => Ok(Self::Snapshot),
            "headless" | "none" => Ok(Self::Headless),
            other => Err(anyhow!(
                "unknown display mode '{}' (expected window, snapshot or headless)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Snapshot => "snapshot",
            Self::Headless => "headless",
        }
    }
}

/// Build the configured sink.
pub fn open_sink(settings: &DisplaySettings) -> Result<Box<dyn FrameSink>> {
    match settings.mode {
        DisplayMode::Window => open_window(),
        DisplayMode::Snapshot => Ok(Box::new(SnapshotSink::new(
            &settings.snapshot_dir,
            settings.snapshot_every,
        )?)),
        DisplayMode::Headless => Ok(Box::new(NullSink::default())),
    }
}

#[cfg(feature = "display-window")]
fn open_window() -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(WindowSink::new(WINDOW_TITLE)))
}

#[cfg(not(feature = "display-window"))]
fn open_window() -> Result<Box<dyn FrameSink>> {
    Err(anyhow!(
        "window display requires the display-window feature (use headless or snapshot)"
    ))
}

// ----------------------------------------------------------------------------
// NullSink
// ----------------------------------------------------------------------------

/// Headless sink. Counts frames and drops them.
#[derive(Debug, Default)]
pub struct NullSink {
    pub frames_shown: u64,
}

impl FrameSink for NullSink {
    fn show(&mut self, _frame: &Frame) -> Result<()> {
        self.frames_shown += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// SnapshotSink
// ----------------------------------------------------------------------------

/// Writes every `every`-th annotated frame to `dir/frame_<seq>.jpg`.
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    seen: u64,
    written: u64,
}

impl SnapshotSink {
    pub fn new(dir: &Path, every: u64) -> Result<Self> {
        if every == 0 {
            return Err(anyhow!("snapshot interval must be at least 1"));
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            every,
            seen: 0,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn path_for(&self, frame: &Frame) -> PathBuf {
        self.dir.join(format!("frame_{:06}.jpg", frame.sequence))
    }
}

impl FrameSink for SnapshotSink {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let due = self.seen % self.every == 0;
        self.seen += 1;
        if !due {
            return Ok(());
        }
        let path = self.path_for(frame);
        frame
            .image()
            .save(&path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        self.written += 1;
        log::debug!("snapshot written to {}", path.display());
        Ok(())
    }
}
