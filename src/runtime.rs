//! Capture loop.
//!
//! One frame at a time: acquire, detect, annotate, show, poll for stop.
//! The loop has two states, running and stopped. It stops on a stop signal
//! (Ctrl-C or the sink's stop key), on end of stream, on a failed
//! acquisition, or after an optional frame limit. Any other error is fatal
//! and propagates. The capture device is released on every exit path.

use anyhow::{Context, Result};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::DetectorBackend;
use crate::display::FrameSink;
use crate::ingest::FrameSource;
use crate::overlay::{Annotator, ClassCountSummary};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// LoopControl
// ----------------------------------------------------------------------------

/// Explicit loop state shared with the signal handler.
#[derive(Clone, Debug, Default)]
pub struct LoopControl {
    stop: Arc<AtomicBool>,
    max_frames: Option<u64>,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Handle for a signal handler running on another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Route Ctrl-C to the stop flag. Can be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let stop = self.stop_handle();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn max_frames(&self) -> Option<u64> {
        self.max_frames
    }
}

// ----------------------------------------------------------------------------
// CaptureGuard
// ----------------------------------------------------------------------------

/// Owns the frame source and releases it when dropped.
pub struct CaptureGuard {
    source: Box<dyn FrameSource>,
}

impl CaptureGuard {
    /// Take ownership of `source` and connect it. If connecting fails the
    /// source is still released.
    pub fn connect(source: Box<dyn FrameSource>) -> Result<Self> {
        let mut guard = Self { source };
        guard.source.connect().context("failed to open capture source")?;
        Ok(guard)
    }
}

impl Deref for CaptureGuard {
    type Target = dyn FrameSource;

    fn deref(&self) -> &Self::Target {
        self.source.as_ref()
    }
}

impl DerefMut for CaptureGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.source.as_mut()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.source.release();
    }
}

// ----------------------------------------------------------------------------
// run
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl-C or the display's stop key.
    StopSignal,
    EndOfStream,
    AcquisitionFailed,
    FrameLimit,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub detections_total: u64,
    pub stop_reason: StopReason,
    /// Counts of the last processed frame.
    pub last_counts: ClassCountSummary,
}

/// Run the capture loop until it stops. Consumes the capture guard, so the
/// source is released before this returns, on success or error.
pub fn run(
    mut capture: CaptureGuard,
    detector: &mut dyn DetectorBackend,
    annotator: &mut dyn Annotator,
    sink: &mut dyn FrameSink,
    control: &LoopControl,
) -> Result<RunSummary> {
    let started = Instant::now();
    let mut last_health_log = Instant::now();
    let mut frames_processed = 0u64;
    let mut detections_total = 0u64;
    let mut last_counts = ClassCountSummary::new();

    let stop_reason = loop {
        if control.is_stopped() {
            log::info!("stop signal received");
            break StopReason::StopSignal;
        }
        if control
            .max_frames()
            .is_some_and(|limit| frames_processed >= limit)
        {
            log::info!("frame limit of {} reached", frames_processed);
            break StopReason::FrameLimit;
        }

        let mut frame = match capture.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("end of stream after {} frames", frames_processed);
                break StopReason::EndOfStream;
            }
            Err(err) => {
                log::warn!("frame acquisition failed: {:#}", err);
                break StopReason::AcquisitionFailed;
            }
        };

        let detections = detector.detect(&frame).with_context(|| {
            format!(
                "{} detection failed on frame {}",
                detector.name(),
                frame.sequence
            )
        })?;
        let counts = annotator
            .annotate(&mut frame, &detections)
            .with_context(|| format!("annotating frame {}", frame.sequence))?;
        sink.show(&frame)?;

        frames_processed += 1;
        detections_total += counts.total() as u64;
        log::debug!(
            "frame {}: {} objects {:?}",
            frame.sequence,
            counts.total(),
            counts.iter().collect::<Vec<_>>()
        );
        last_counts = counts;

        if sink.stop_requested() {
            log::info!("stop requested by display");
            break StopReason::StopSignal;
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = capture.stats();
            let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
            log::info!(
                "capture health={} frames={} source={} ({}x{}) fps={:.1}",
                capture.is_healthy(),
                stats.frames_captured,
                stats.source,
                stats.width,
                stats.height,
                frames_processed as f64 / elapsed
            );
            last_health_log = Instant::now();
        }
    };

    Ok(RunSummary {
        frames_processed,
        detections_total,
        stop_reason,
        last_counts,
    })
}
