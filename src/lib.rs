//! Live object counter.
//!
//! Pulls frames from a camera (or a synthetic/file source), runs an object
//! detector on each frame, and draws an overlay: a box and a
//! `"<class> <confidence>"` label per detection, a per-class count list,
//! and a `"Total Objects: N"` line.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB frames, bounding boxes, detections
//! - `classes`: class-id to name table (COCO by default)
//! - `overlay`: the Frame Processor (draw, count, render summary) over a `Canvas`
//! - `canvas`: `Canvas` on a frame buffer (imageproc + ab_glyph)
//! - `detect`: detector backends (scripted stub, YOLOv8 ONNX via tract)
//! - `ingest`: frame sources (synthetic, V4L2 camera, FFmpeg file)
//! - `display`: frame sinks (window, JPEG snapshots, headless)
//! - `runtime`: the capture loop, stop control, capture release guard
//! - `config`: JSON file + environment configuration
//! - `ui`: startup stage reporting

pub mod canvas;
pub mod classes;
pub mod config;
pub mod detect;
pub mod display;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod runtime;
pub mod ui;

pub use canvas::{load_font, ImageCanvas, OverlayRenderer};
pub use classes::{ClassNames, COCO_CLASS_NAMES};
pub use config::{CaptureSettings, CounterConfig, DetectorSettings, DisplaySettings};
pub use detect::{build_backend, DetectorBackend, StubBackend};
pub use display::{open_sink, DisplayMode, FrameSink, NullSink, SnapshotSink};
pub use frame::{BoundingBox, Detection, Frame};
pub use ingest::{open_source, FrameSource, SourceStats, SyntheticSource};
pub use overlay::{
    Annotator, Canvas, ClassCountSummary, FrameProcessor, OverlayStyle, TextStyle, UnknownClassId,
};
pub use runtime::{run, CaptureGuard, LoopControl, RunSummary, StopReason};
