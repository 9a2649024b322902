mod backend;
mod backends;
mod postprocess;

use anyhow::{anyhow, Result};

pub use backend::DetectorBackend;
pub use backends::{StubBackend, DEMO_SCENE};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use postprocess::{decode_yolo_output, non_max_suppression, FrameMapping, YoloLayout};

use crate::classes::ClassNames;
use crate::config::DetectorSettings;

/// Backend names accepted in configuration.
pub const BACKEND_NAMES: [&str; 2] = ["stub", "tract"];

/// Build the configured detector backend.
pub fn build_backend(
    settings: &DetectorSettings,
    class_names: &ClassNames,
) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::demo())),
        "tract" => build_tract(settings, class_names),
        other => Err(anyhow!(
            "unknown detector backend '{}' (expected one of {:?})",
            other,
            BACKEND_NAMES
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(
    settings: &DetectorSettings,
    class_names: &ClassNames,
) -> Result<Box<dyn DetectorBackend>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
    let backend = TractBackend::new(model_path, class_names.len())?
        .with_threshold(settings.confidence_threshold)
        .with_iou_threshold(settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(
    _settings: &DetectorSettings,
    _class_names: &ClassNames,
) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "tract detector backend requires the backend-tract feature"
    ))
}
