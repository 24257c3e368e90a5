//! Object detection around an opaque model: label filtering, box clamping,
//! and frame annotation.
//!
//! Enable the `with-tch` feature for the YOLOv8 TorchScript backend.

pub mod annotation;
pub mod detection;
pub mod detector;
#[cfg(feature = "with-tch")]
pub mod torchscript;

pub use detection::{BoundingBox, Detection, RawDetection, non_max_suppression};
pub use detector::{Detector, FrameDetector, LabelFilter, ObjectModel};
#[cfg(feature = "with-tch")]
pub use torchscript::TorchScriptModel;
