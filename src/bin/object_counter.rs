//! object_counter - live per-class object counting
//!
//! Opens the configured camera, runs the detector on every frame, draws
//! boxes, labels and per-class counts, and shows the annotated frame until
//! ESC, Ctrl-C, or the end of the stream.

use anyhow::{Context, Result};
use clap::Parser;

use object_counter::config::CounterConfig;
use object_counter::ui::Ui;
use object_counter::{
    build_backend, load_font, open_sink, open_source, run, CaptureGuard, FrameProcessor,
    LoopControl, OverlayRenderer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "YOLOv8 live object counter")]
struct Args {
    /// Capture resolution [default: 1280 720]
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    webcam_resolution: Option<Vec<u32>>,
}

impl Args {
    fn resolution(&self) -> Option<(u32, u32)> {
        match self.webcam_resolution.as_deref() {
            Some([width, height]) => Some((*width, *height)),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_env();

    // Installed before any device or model is opened.
    let control = LoopControl::new();
    control.install_ctrlc_handler()?;

    let cfg = {
        let _stage = ui.stage("Load config");
        CounterConfig::load(args.resolution())?
    };
    log::info!(
        "capture {} at {}x{}, detector {}, display {}",
        cfg.capture.device,
        cfg.capture.width,
        cfg.capture.height,
        cfg.detector.backend,
        cfg.display.mode.as_str()
    );

    let class_names = cfg.detector.class_names()?;

    let capture = {
        let _stage = ui.stage("Open capture");
        CaptureGuard::connect(open_source(&cfg.capture)?)?
    };

    let mut detector = {
        let _stage = ui.stage("Load detector");
        let mut detector = build_backend(&cfg.detector, &class_names)?;
        detector
            .warm_up()
            .with_context(|| format!("{} detector warm-up failed", detector.name()))?;
        detector
    };

    let mut annotator = {
        let _stage = ui.stage("Load font");
        let font = load_font(&cfg.font_path)?;
        OverlayRenderer::new(FrameProcessor::new(class_names), font)
    };

    let mut sink = open_sink(&cfg.display)?;

    let control = control.with_max_frames(cfg.max_frames);

    log::info!("object_counter running (ESC or Ctrl-C to stop)");
    let summary = run(
        capture,
        detector.as_mut(),
        &mut annotator,
        sink.as_mut(),
        &control,
    )?;

    log::info!(
        "stopped ({:?}) after {} frames, {} detections",
        summary.stop_reason,
        summary.frames_processed,
        summary.detections_total
    );
    for (name, count) in summary.last_counts.iter() {
        log::info!("last frame: {} {}", name, count);
    }
    Ok(())
}
