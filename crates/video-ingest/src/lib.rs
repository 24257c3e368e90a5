//! Camera capture sources producing canonical BGR frames.
//!
//! - `source`: the [`FrameSource`] contract and the [`CaptureDevice`] variants.
//! - `grabber`: generic frame grabber (OpenCV or FFmpeg engine).
//! - `board`: libcamera single-board-computer camera.
//! - `convert`: device-native pixel layouts to BGR.

pub use board::BoardCamera;
pub use convert::to_bgr;
pub use grabber::GrabberSource;
pub use source::{
    CaptureDevice, CaptureDriver, CaptureSettings, FrameSource, GrabberBackend, SourceId,
};
pub use types::{CaptureError, Frame, FrameFormat};

mod board;
#[cfg(feature = "opencv")]
mod camera;
mod convert;
mod ffmpeg;
mod grabber;
mod process;
mod source;
mod types;
