//! OpenCV-backed grabber engine.

use opencv::{
    core::{self, Mat, MatTraitConst, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::warn;

use crate::{
    source::{GrabberBackend, SourceId},
    types::{CaptureError, Frame},
};

pub(crate) struct OpenCvCapture {
    cap: VideoCapture,
    frame: Mat,
}

impl OpenCvCapture {
    /// Open `source` with the hinted API preference, falling back to `CAP_ANY`.
    pub(crate) fn open(
        source: &SourceId,
        backend: Option<GrabberBackend>,
        frame_size: (i32, i32),
        fps: u32,
    ) -> Result<Self, CaptureError> {
        let preferred = match backend {
            Some(GrabberBackend::V4l2) => Some(videoio::CAP_V4L2),
            Some(GrabberBackend::Gstreamer) => Some(videoio::CAP_GSTREAMER),
            Some(GrabberBackend::Ffmpeg) | None => None,
        };

        if let Some(api) = preferred {
            match open_video_capture(source, api) {
                Ok(mut cap) => {
                    configure_camera(&mut cap, frame_size, fps);
                    return Ok(Self::wrap(cap));
                }
                Err(err) => {
                    warn!(
                        "Backend {} could not open {source} ({err}); falling back to default backend",
                        backend.map(GrabberBackend::label).unwrap_or("default")
                    );
                }
            }
        }

        let mut cap = open_video_capture(source, videoio::CAP_ANY)?;
        configure_camera(&mut cap, frame_size, fps);
        Ok(Self::wrap(cap))
    }

    fn wrap(cap: VideoCapture) -> Self {
        Self {
            cap,
            frame: Mat::default(),
        }
    }

    pub(crate) fn is_opened(&self) -> bool {
        self.cap.is_opened().unwrap_or(false)
    }

    pub(crate) fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Err(CaptureError::Read("device returned no frame".into()));
        }

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::Read("device returned an empty frame".into()));
        }
        if self.frame.typ() != core::CV_8UC3 {
            return Err(CaptureError::Read(format!(
                "unexpected OpenCV frame type {}",
                self.frame.typ()
            )));
        }

        let data = if self.frame.is_continuous() {
            self.frame
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec()
        } else {
            self.frame
                .try_clone()
                .map_err(|e| CaptureError::Other(e.into()))?
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec()
        };

        Ok(Frame::bgr(data, size.width, size.height))
    }
}

impl Drop for OpenCvCapture {
    fn drop(&mut self) {
        if self.is_opened() {
            if let Err(err) = self.cap.release() {
                warn!("Failed to release OpenCV capture cleanly: {err}");
            }
        }
    }
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(source: &SourceId, api: i32) -> Result<VideoCapture, CaptureError> {
    let opened = match source {
        SourceId::Index(index) => VideoCapture::new(*index, api),
        SourceId::Uri(uri) => VideoCapture::from_file(uri, api),
    };
    match opened {
        Ok(cap) => {
            if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                Ok(cap)
            } else {
                Err(CaptureError::Open {
                    uri: source.to_string(),
                    reason: format!("backend {api} reported the device closed"),
                })
            }
        }
        Err(err) => Err(CaptureError::Open {
            uri: source.to_string(),
            reason: err.to_string(),
        }),
    }
}

/// Apply common capture settings (resolution, fps, preferred pixel format).
fn configure_camera(cap: &mut VideoCapture, frame_size: (i32, i32), fps: u32) {
    let mut fourcc_set = false;
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
            fourcc_set = true;
        }
    }
    if !fourcc_set {
        if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
        }
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, frame_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, frame_size.1 as f64);
    if fps > 0 && !matches!(cap.set(videoio::CAP_PROP_FPS, fps as f64), Ok(true)) {
        warn!("Camera ignored the requested {fps} fps");
    }
}
