use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classes::ClassNames;
use crate::detect::BACKEND_NAMES;
use crate::display::DisplayMode;

#[cfg(feature = "ingest-v4l2")]
const DEFAULT_DEVICE: &str = "0";
#[cfg(not(feature = "ingest-v4l2"))]
const DEFAULT_DEVICE: &str = "stub://webcam";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_TARGET_FPS: u32 = 30;
#[cfg(feature = "backend-tract")]
const DEFAULT_BACKEND: &str = "tract";
#[cfg(not(feature = "backend-tract"))]
const DEFAULT_BACKEND: &str = "stub";
#[cfg(feature = "backend-tract")]
const DEFAULT_MODEL_PATH: Option<&str> = Some("yolov8n.onnx");
#[cfg(not(feature = "backend-tract"))]
const DEFAULT_MODEL_PATH: Option<&str> = None;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_SNAPSHOT_EVERY: u64 = 30;
const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "OBJECT_COUNTER_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    display: Option<DisplayConfigFile>,
    overlay: Option<OverlayConfigFile>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    class_names_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mode: Option<String>,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub capture: CaptureSettings,
    pub detector: DetectorSettings,
    pub display: DisplaySettings,
    pub font_path: PathBuf,
    /// Stop after this many frames (unbounded when `None`).
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// `stub://...`, a camera index, a `/dev/video*` node, or a local video file.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Names file; the COCO table is used when unset.
    pub class_names_path: Option<PathBuf>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: DEFAULT_MODEL_PATH.map(PathBuf::from),
            confidence_threshold: DEFAULT_CONFIDENCE,
            iou_threshold: DEFAULT_IOU,
            class_names_path: None,
        }
    }
}

impl DetectorSettings {
    pub fn class_names(&self) -> Result<ClassNames> {
        match &self.class_names_path {
            Some(path) => ClassNames::load(path),
            None => Ok(ClassNames::coco()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySettings {
    pub mode: DisplayMode,
    pub snapshot_dir: PathBuf,
    pub snapshot_every: u64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            mode: default_display_mode(),
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
        }
    }
}

fn default_display_mode() -> DisplayMode {
    if cfg!(feature = "display-window") {
        DisplayMode::Window
    } else {
        DisplayMode::Headless
    }
}

impl CounterConfig {
    /// Load config: JSON file (if `OBJECT_COUNTER_CONFIG` is set), then env
    /// overrides, then the command-line resolution, then validation.
    pub fn load(resolution: Option<(u32, u32)>) -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        if let Some((width, height)) = resolution {
            cfg.capture.width = width;
            cfg.capture.height = height;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            device: capture_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: capture_file.width.unwrap_or(DEFAULT_WIDTH),
            height: capture_file.height.unwrap_or(DEFAULT_HEIGHT),
            target_fps: capture_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector_file
                .model_path
                .or_else(|| DEFAULT_MODEL_PATH.map(PathBuf::from)),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE),
            iou_threshold: detector_file.iou_threshold.unwrap_or(DEFAULT_IOU),
            class_names_path: detector_file.class_names_path,
        };

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            mode: match display_file.mode.as_deref() {
                Some(mode) => DisplayMode::parse(mode)?,
                None => default_display_mode(),
            },
            snapshot_dir: display_file
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            snapshot_every: display_file
                .snapshot_every
                .unwrap_or(DEFAULT_SNAPSHOT_EVERY),
        };

        let font_path = file
            .overlay
            .and_then(|overlay| overlay.font_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_PATH));

        Ok(Self {
            capture,
            detector,
            display,
            font_path,
            max_frames: file.max_frames,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = env_nonempty("OBJECT_COUNTER_DEVICE") {
            self.capture.device = device;
        }
        if let Some(backend) = env_nonempty("OBJECT_COUNTER_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = env_nonempty("OBJECT_COUNTER_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(confidence) = env_nonempty("OBJECT_COUNTER_CONFIDENCE") {
            self.detector.confidence_threshold = confidence.parse().map_err(|_| {
                anyhow!("OBJECT_COUNTER_CONFIDENCE must be a number between 0 and 1")
            })?;
        }
        if let Some(mode) = env_nonempty("OBJECT_COUNTER_DISPLAY") {
            self.display.mode = DisplayMode::parse(&mode)?;
        }
        if let Some(font) = env_nonempty("OBJECT_COUNTER_FONT") {
            self.font_path = PathBuf::from(font);
        }
        if let Some(max_frames) = env_nonempty("OBJECT_COUNTER_MAX_FRAMES") {
            let frames: u64 = max_frames.parse().map_err(|_| {
                anyhow!("OBJECT_COUNTER_MAX_FRAMES must be a non-negative integer")
            })?;
            self.max_frames = Some(frames);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        crate::ingest::classify_device(&self.capture.device)?;
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture resolution must be non-zero, got {}x{}",
                self.capture.width,
                self.capture.height
            ));
        }
        if !BACKEND_NAMES.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {:?})",
                self.detector.backend,
                BACKEND_NAMES
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("tract backend requires detector.model_path"));
        }
        for (name, value) in [
            ("confidence threshold", self.detector.confidence_threshold),
            ("IoU threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.display.snapshot_every == 0 {
            return Err(anyhow!("display.snapshot_every must be at least 1"));
        }
        Ok(())
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            detector: DetectorSettings::default(),
            display: DisplaySettings::default(),
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            max_frames: None,
        }
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
