//! Detector construction from configuration.

use std::{path::Path, sync::Arc};

use anyhow::Result;
use ml_core::{Detector, FrameDetector, ObjectModel};
#[cfg(not(feature = "with-tch"))]
use tracing::warn;

use crate::config::AppConfig;

pub const STREAM_ONLY: &str = "disabled (stream only mode)";

#[cfg(feature = "with-tch")]
fn load_model(path: &Path, min_confidence: f32) -> Result<Option<Box<dyn ObjectModel>>> {
    use anyhow::Context;
    use ml_core::TorchScriptModel;

    // Pre-filter below the allow-list threshold so NMS sees every candidate.
    let model = TorchScriptModel::load(path)
        .with_context(|| format!("failed to load detection model {}", path.display()))?
        .with_confidence_threshold(min_confidence.min(0.25));
    Ok(Some(Box::new(model)))
}

#[cfg(not(feature = "with-tch"))]
fn load_model(path: &Path, _min_confidence: f32) -> Result<Option<Box<dyn ObjectModel>>> {
    warn!(
        "Model {} configured but this build lacks the `with-tch` feature; running stream only",
        path.display()
    );
    Ok(None)
}

/// Build the configured detector. `Ok(None)` means stream-only mode.
pub fn build_detector(config: &AppConfig) -> Result<Option<Arc<dyn FrameDetector>>> {
    let Some(path) = config.model_path.as_deref() else {
        return Ok(None);
    };
    let Some(model) = load_model(path, config.min_confidence)? else {
        return Ok(None);
    };
    let detector = Detector::new(model, config.label_filter()).with_frame_width(config.frame_width);
    Ok(Some(Arc::new(detector)))
}

/// Human-readable model status for logs and the dashboard.
pub fn model_status(config: &AppConfig, detection_enabled: bool) -> String {
    match (&config.model_path, detection_enabled) {
        (Some(path), true) => path.display().to_string(),
        _ => STREAM_ONLY.to_string(),
    }
}
