use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use object_counter::config::CaptureSettings;
use object_counter::{
    run, Annotator, BoundingBox, Canvas, CaptureGuard, ClassCountSummary, ClassNames, Detection,
    Frame, FrameProcessor, FrameSink, FrameSource, LoopControl, NullSink, SourceStats, StopReason,
    StubBackend, SyntheticSource, TextStyle, UnknownClassId,
};

enum Step {
    Frame,
    End,
    Fail,
}

/// Source that replays a fixed script and counts `release` calls.
struct ScriptedSource {
    steps: VecDeque<Step>,
    /// Keep producing frames once the script is exhausted.
    endless: bool,
    fail_connect: bool,
    sequence: u64,
    released: Rc<Cell<u32>>,
}

impl ScriptedSource {
    fn new(steps: Vec<Step>, released: Rc<Cell<u32>>) -> Self {
        Self {
            steps: steps.into(),
            endless: false,
            fail_connect: false,
            sequence: 0,
            released,
        }
    }

    fn endless(released: Rc<Cell<u32>>) -> Self {
        Self {
            endless: true,
            ..Self::new(Vec::new(), released)
        }
    }
}

impl FrameSource for ScriptedSource {
    fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(anyhow!("camera busy"));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let step = match self.steps.pop_front() {
            Some(step) => step,
            None if self.endless => Step::Frame,
            None => Step::End,
        };
        match step {
            Step::Frame => {
                self.sequence += 1;
                Ok(Some(Frame::new(RgbImage::new(64, 48), self.sequence)))
            }
            Step::End => Ok(None),
            Step::Fail => Err(anyhow!("device unplugged")),
        }
    }

    fn release(&mut self) {
        self.released.set(self.released.get() + 1);
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.sequence,
            source: "scripted".to_string(),
            width: 64,
            height: 48,
        }
    }
}

#[derive(Default)]
struct CountingAnnotator {
    calls: u64,
}

impl Annotator for CountingAnnotator {
    fn annotate(
        &mut self,
        _frame: &mut Frame,
        _detections: &[Detection],
    ) -> Result<ClassCountSummary> {
        self.calls += 1;
        Ok(ClassCountSummary::new())
    }
}

struct NoopCanvas;

impl Canvas for NoopCanvas {
    fn draw_box(&mut self, _bbox: &BoundingBox, _color: Rgb<u8>, _thickness: u32) {}
    fn draw_text(&mut self, _text: &str, _x: i32, _baseline: i32, _style: &TextStyle) {}
}

/// Runs the real frame processor without a font.
struct ProcessorAnnotator(FrameProcessor);

impl Annotator for ProcessorAnnotator {
    fn annotate(
        &mut self,
        _frame: &mut Frame,
        detections: &[Detection],
    ) -> Result<ClassCountSummary> {
        self.0.process(&mut NoopCanvas, detections)
    }
}

/// Requests a stop after `stop_after` frames.
struct StoppingSink {
    shown: u64,
    stop_after: u64,
}

impl FrameSink for StoppingSink {
    fn show(&mut self, _frame: &Frame) -> Result<()> {
        self.shown += 1;
        Ok(())
    }

    fn stop_requested(&mut self) -> bool {
        self.shown >= self.stop_after
    }
}

fn guard(source: ScriptedSource) -> Result<CaptureGuard> {
    CaptureGuard::connect(Box::new(source))
}

#[test]
fn end_of_stream_stops_gracefully() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let source = ScriptedSource::new(
        vec![Step::Frame, Step::Frame, Step::Frame, Step::End],
        released.clone(),
    );
    let mut detector = StubBackend::empty();
    let mut annotator = CountingAnnotator::default();
    let mut sink = NullSink::default();

    let summary = run(
        guard(source)?,
        &mut detector,
        &mut annotator,
        &mut sink,
        &LoopControl::new(),
    )?;

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(annotator.calls, 3);
    assert_eq!(sink.frames_shown, 3);
    assert_eq!(released.get(), 1);
    Ok(())
}

#[test]
fn failed_first_acquisition_never_reaches_the_processor() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let source = ScriptedSource::new(vec![Step::Fail], released.clone());
    let mut detector = StubBackend::empty();
    let mut annotator = CountingAnnotator::default();
    let mut sink = NullSink::default();

    let summary = run(
        guard(source)?,
        &mut detector,
        &mut annotator,
        &mut sink,
        &LoopControl::new(),
    )?;

    assert_eq!(summary.stop_reason, StopReason::AcquisitionFailed);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(detector.calls(), 0);
    assert_eq!(annotator.calls, 0);
    assert_eq!(sink.frames_shown, 0);
    assert_eq!(released.get(), 1);
    Ok(())
}

#[test]
fn stop_key_ends_the_loop_after_showing_the_frame() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let source = ScriptedSource::endless(released.clone());
    let mut detector = StubBackend::empty();
    let mut annotator = CountingAnnotator::default();
    let mut sink = StoppingSink { shown: 0, stop_after: 2 };

    let summary = run(
        guard(source)?,
        &mut detector,
        &mut annotator,
        &mut sink,
        &LoopControl::new(),
    )?;

    assert_eq!(summary.stop_reason, StopReason::StopSignal);
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(sink.shown, 2);
    assert_eq!(released.get(), 1);
    Ok(())
}

#[test]
fn stop_signal_before_first_frame() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let source = ScriptedSource::endless(released.clone());
    let mut detector = StubBackend::empty();
    let mut annotator = CountingAnnotator::default();
    let mut sink = NullSink::default();
    let control = LoopControl::new();
    control.request_stop();

    let summary = run(guard(source)?, &mut detector, &mut annotator, &mut sink, &control)?;

    assert_eq!(summary.stop_reason, StopReason::StopSignal);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(detector.calls(), 0);
    assert_eq!(released.get(), 1);
    Ok(())
}

#[test]
fn stop_during_startup_survives_configuration() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let control = LoopControl::new();
    control.install_ctrlc_handler()?;
    // Ctrl-C arrives while the model is still loading.
    control.stop_handle().store(true, std::sync::atomic::Ordering::SeqCst);
    let control = control.with_max_frames(Some(3));

    let source = ScriptedSource::endless(released.clone());
    let mut detector = StubBackend::empty();
    let mut annotator = CountingAnnotator::default();
    let mut sink = NullSink::default();
    let summary = run(guard(source)?, &mut detector, &mut annotator, &mut sink, &control)?;

    assert_eq!(summary.stop_reason, StopReason::StopSignal);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(annotator.calls, 0);
    assert_eq!(released.get(), 1);
    // only one handler per process
    assert!(LoopControl::new().install_ctrlc_handler().is_err());
    Ok(())
}

#[test]
fn stop_handle_is_shared_with_the_control() {
    let control = LoopControl::new();
    let handle = control.stop_handle();
    assert!(!control.is_stopped());
    handle.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(control.is_stopped());
}

#[test]
fn frame_limit_stops_the_loop() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let source = ScriptedSource::endless(released.clone());
    let mut detector = StubBackend::empty();
    let mut annotator = CountingAnnotator::default();
    let mut sink = NullSink::default();
    let control = LoopControl::new().with_max_frames(Some(5));

    let summary = run(guard(source)?, &mut detector, &mut annotator, &mut sink, &control)?;

    assert_eq!(summary.stop_reason, StopReason::FrameLimit);
    assert_eq!(summary.frames_processed, 5);
    assert_eq!(released.get(), 1);
    Ok(())
}

#[test]
fn unknown_class_id_is_fatal_and_still_releases() -> Result<()> {
    let released = Rc::new(Cell::new(0));
    let source = ScriptedSource::endless(released.clone());
    let mut detector = StubBackend::new(vec![vec![Detection::new(
        99,
        0.6,
        BoundingBox::new(1.0, 1.0, 10.0, 10.0),
    )]]);
    let mut annotator = ProcessorAnnotator(FrameProcessor::new(ClassNames::coco()));
    let mut sink = NullSink::default();

    let result = run(
        guard(source)?,
        &mut detector,
        &mut annotator,
        &mut sink,
        &LoopControl::new(),
    );
    let err = match result {
        Ok(summary) => panic!("expected a fatal error, loop ended with {:?}", summary.stop_reason),
        Err(err) => err,
    };

    let unknown = err
        .downcast_ref::<UnknownClassId>()
        .expect("UnknownClassId in error chain");
    assert_eq!(unknown.class_id, 99);
    assert_eq!(unknown.table_len, 80);
    assert_eq!(sink.frames_shown, 0);
    assert_eq!(released.get(), 1);
    Ok(())
}

#[test]
fn failed_connect_still_releases() {
    let released = Rc::new(Cell::new(0));
    let mut source = ScriptedSource::new(Vec::new(), released.clone());
    source.fail_connect = true;

    assert!(guard(source).is_err());
    assert_eq!(released.get(), 1);
}

#[test]
fn synthetic_demo_pipeline_counts_every_frame() -> Result<()> {
    let settings = CaptureSettings {
        device: "stub://webcam?frames=4".to_string(),
        width: 320,
        height: 240,
        target_fps: 30,
    };
    let capture = CaptureGuard::connect(Box::new(SyntheticSource::new(settings)?))?;
    let mut detector = StubBackend::demo();
    let mut annotator = ProcessorAnnotator(FrameProcessor::new(ClassNames::coco()));
    let mut sink = NullSink::default();

    let summary = run(capture, &mut detector, &mut annotator, &mut sink, &LoopControl::new())?;

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.detections_total, 12);
    let counts: Vec<_> = summary.last_counts.iter().collect();
    assert_eq!(counts, vec![("person", 2), ("dog", 1)]);
    Ok(())
}
