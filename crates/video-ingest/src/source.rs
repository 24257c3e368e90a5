//! Capture source contract and the closed set of device variants.

use std::fmt;

use tracing::{info, warn};

use crate::{
    board::BoardCamera,
    grabber::GrabberSource,
    types::{CaptureError, Frame},
};

/// A camera handle that can be opened, read, and closed repeatedly.
///
/// `open` on an open source is a no-op, `close` is safe in any state, and a
/// closed source may be opened again.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CaptureError>;
    /// Read the next frame in canonical BGR layout.
    fn read(&mut self) -> Result<Frame, CaptureError>;
    fn is_open(&self) -> bool;
    fn close(&mut self);
}

/// Device index or URI/path identifying a grabber input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceId {
    Index(i32),
    Uri(String),
}

impl SourceId {
    /// Integers and `/dev/videoN` paths become device indices; blank input
    /// selects device 0; everything else is passed through as a URI.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return SourceId::Index(0);
        }
        match parse_device_index(trimmed) {
            Some(index) => SourceId::Index(index),
            None => SourceId::Uri(trimmed.to_string()),
        }
    }
}

impl Default for SourceId {
    fn default() -> Self {
        SourceId::Index(0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Index(index) => write!(f, "/dev/video{index}"),
            SourceId::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

/// Which capture variant to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureDriver {
    /// Generic frame grabber (OpenCV or FFmpeg).
    #[default]
    Grabber,
    /// Single-board-computer camera driven through libcamera.
    Board,
}

impl CaptureDriver {
    /// Resolve a configured driver name, falling back to the grabber.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "opencv" | "grabber" => CaptureDriver::Grabber,
            "picamera2" | "picamera" | "libcamera" | "board" => CaptureDriver::Board,
            other => {
                warn!("Unknown camera driver '{other}', falling back to the generic grabber");
                CaptureDriver::Grabber
            }
        }
    }
}

/// Transport hint for the generic grabber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrabberBackend {
    V4l2,
    Gstreamer,
    Ffmpeg,
}

impl GrabberBackend {
    /// Recognise a backend hint; unknown hints are dropped.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "v4l2" | "v4l" => Some(GrabberBackend::V4l2),
            "gstreamer" | "gst" => Some(GrabberBackend::Gstreamer),
            "ffmpeg" => Some(GrabberBackend::Ffmpeg),
            other => {
                warn!("Unknown video backend '{other}', using the default backend");
                None
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GrabberBackend::V4l2 => "v4l2",
            GrabberBackend::Gstreamer => "gstreamer",
            GrabberBackend::Ffmpeg => "ffmpeg",
        }
    }
}

/// Device parameters fixed at pipeline construction.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub driver: CaptureDriver,
    pub source: SourceId,
    pub backend: Option<GrabberBackend>,
    /// Requested frame size (width, height).
    pub resolution: (i32, i32),
    pub framerate: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            driver: CaptureDriver::Grabber,
            source: SourceId::default(),
            backend: None,
            resolution: (1280, 720),
            framerate: 30,
        }
    }
}

/// The capture variants behind one [`FrameSource`] interface.
pub enum CaptureDevice {
    Grabber(GrabberSource),
    Board(BoardCamera),
}

impl CaptureDevice {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        match settings.driver {
            CaptureDriver::Board => {
                info!(
                    "Using board camera driver with resolution {}x{} @ {}fps",
                    settings.resolution.0, settings.resolution.1, settings.framerate
                );
                CaptureDevice::Board(BoardCamera::new(settings.resolution, settings.framerate))
            }
            CaptureDriver::Grabber => {
                info!(
                    "Using frame grabber on {} (backend: {})",
                    settings.source,
                    settings.backend.map(GrabberBackend::label).unwrap_or("default")
                );
                CaptureDevice::Grabber(GrabberSource::new(
                    settings.source.clone(),
                    settings.backend,
                    settings.resolution,
                    settings.framerate,
                ))
            }
        }
    }

    fn inner(&self) -> &dyn FrameSource {
        match self {
            CaptureDevice::Grabber(source) => source,
            CaptureDevice::Board(camera) => camera,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameSource {
        match self {
            CaptureDevice::Grabber(source) => source,
            CaptureDevice::Board(camera) => camera,
        }
    }
}

impl FrameSource for CaptureDevice {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.inner_mut().open()
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.inner_mut().read()
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }

    fn close(&mut self) {
        self.inner_mut().close()
    }
}
