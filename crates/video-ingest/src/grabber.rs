//! Generic frame grabber: OpenCV `VideoCapture` when built with the `opencv`
//! feature, an FFmpeg child process otherwise (or when asked for explicitly).

use tracing::{info, warn};

#[cfg(feature = "opencv")]
use crate::camera::OpenCvCapture;
use crate::{
    ffmpeg,
    process::{FRAME_TIMEOUT, ProcessReader},
    source::{FrameSource, GrabberBackend, SourceId},
    types::{CaptureError, Frame, FrameFormat},
};

enum Engine {
    #[cfg(feature = "opencv")]
    OpenCv(OpenCvCapture),
    Process(ProcessReader),
}

pub struct GrabberSource {
    source: SourceId,
    backend: Option<GrabberBackend>,
    frame_size: (i32, i32),
    framerate: u32,
    engine: Option<Engine>,
}

impl GrabberSource {
    pub fn new(
        source: SourceId,
        backend: Option<GrabberBackend>,
        frame_size: (i32, i32),
        framerate: u32,
    ) -> Self {
        Self {
            source,
            backend,
            frame_size,
            framerate,
            engine: None,
        }
    }

    #[cfg(feature = "opencv")]
    fn open_default(&self) -> Result<Engine, CaptureError> {
        OpenCvCapture::open(&self.source, self.backend, self.frame_size, self.framerate)
            .map(Engine::OpenCv)
    }

    #[cfg(not(feature = "opencv"))]
    fn open_default(&self) -> Result<Engine, CaptureError> {
        if self.backend == Some(GrabberBackend::Gstreamer) {
            warn!(
                "GStreamer backend requires the `opencv` feature; falling back to FFmpeg for {}",
                self.source
            );
        }
        self.open_ffmpeg()
    }

    fn open_ffmpeg(&self) -> Result<Engine, CaptureError> {
        let cmd = ffmpeg::grabber_command(
            &self.source,
            self.backend,
            self.frame_size,
            self.framerate,
        );
        let frame_len = FrameFormat::Bgr8.buffer_len(self.frame_size.0, self.frame_size.1);
        ProcessReader::start(cmd, frame_len, "ffmpeg", FRAME_TIMEOUT).map(Engine::Process)
    }
}

impl FrameSource for GrabberSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.engine.is_some() {
            return Ok(());
        }
        let engine = match self.backend {
            Some(GrabberBackend::Ffmpeg) => self.open_ffmpeg(),
            _ => self.open_default(),
        }
        .map_err(|err| match err {
            CaptureError::Open { reason, .. } => CaptureError::Open {
                uri: self.source.to_string(),
                reason,
            },
            other => other,
        })?;
        info!("Opened video source {}", self.source);
        self.engine = Some(engine);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        match self.engine.as_mut() {
            None => Err(CaptureError::NotOpen),
            #[cfg(feature = "opencv")]
            Some(Engine::OpenCv(capture)) => capture.read_frame(),
            Some(Engine::Process(reader)) => {
                let data = reader.next_frame()?;
                let frame = Frame::bgr(data, self.frame_size.0, self.frame_size.1);
                frame.validate()?;
                Ok(frame)
            }
        }
    }

    fn is_open(&self) -> bool {
        match self.engine.as_ref() {
            None => false,
            #[cfg(feature = "opencv")]
            Some(Engine::OpenCv(capture)) => capture.is_opened(),
            Some(Engine::Process(_)) => true,
        }
    }

    fn close(&mut self) {
        if self.engine.take().is_some() {
            info!("Closed video source {}", self.source);
        }
    }
}

impl Drop for GrabberSource {
    fn drop(&mut self) {
        if self.engine.is_some() {
            warn!("Video source {} dropped while open", self.source);
        }
    }
}
