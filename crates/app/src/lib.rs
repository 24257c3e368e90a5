//! Camera streaming service: captures frames, optionally detects birds, and
//! serves an MJPEG feed plus the latest detections over HTTP.
//!
//! - `pipeline`: capture → detect → snapshot loop with bounded recovery.
//! - `stream`: JPEG encoding and multipart framing.
//! - `summary`: the shared detection snapshot and its read-only view.
//! - `server`: Actix Web routes.
//! - `config`: CLI/environment configuration.
//! - `model`: detector construction.
//! - `telemetry`: tracing and Prometheus setup.

pub mod config;
pub mod html;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod stream;
pub mod summary;
pub mod telemetry;

pub use config::{AppConfig, CliArgs, labels_to_display};
pub use pipeline::{
    FramePipeline, PipelineError, PipelineState, ProcessedFrame, RecoveryPolicy, SharedPipeline,
};
pub use server::AppState;
pub use stream::{StreamPublisher, encode_jpeg, mjpeg_part};
pub use summary::{DetectionSnapshot, DetectionSummary, SharedSnapshot, SummaryReader};
