//! Single-board-computer camera driven through the libcamera `rpicam-vid`
//! tool.
//!
//! `rpicam-vid` streams planar YUV 4:2:0 frames; they are converted to the
//! canonical BGR layout before leaving [`BoardCamera::read`]. The ISP pads
//! rows to 64-byte strides, so widths should be multiples of 64.

use std::process::Command;

use tracing::{info, warn};

use crate::{
    convert::to_bgr,
    process::{FRAME_TIMEOUT, ProcessReader},
    source::FrameSource,
    types::{CaptureError, Frame, FrameFormat},
};

const DEFAULT_PROGRAM: &str = "rpicam-vid";

pub struct BoardCamera {
    program: String,
    resolution: (i32, i32),
    framerate: u32,
    reader: Option<ProcessReader>,
}

impl BoardCamera {
    pub fn new(resolution: (i32, i32), framerate: u32) -> Self {
        if resolution.0 % 64 != 0 {
            warn!(
                "Board camera width {} is not a multiple of 64; frames may be misaligned",
                resolution.0
            );
        }
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            resolution,
            framerate,
            reader: None,
        }
    }

    /// Use a different libcamera streaming binary (e.g. `libcamera-vid`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, with_framerate: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--timeout")
            .arg("0")
            .arg("--nopreview")
            .arg("--codec")
            .arg("yuv420")
            .arg("--width")
            .arg(self.resolution.0.to_string())
            .arg("--height")
            .arg(self.resolution.1.to_string());
        if with_framerate {
            cmd.arg("--framerate").arg(self.framerate.to_string());
        }
        cmd.arg("--output").arg("-");
        cmd
    }

    fn start(&self, with_framerate: bool) -> Result<ProcessReader, CaptureError> {
        let frame_len = FrameFormat::I420.buffer_len(self.resolution.0, self.resolution.1);
        ProcessReader::start(
            self.command(with_framerate),
            frame_len,
            "board-camera",
            FRAME_TIMEOUT,
        )
    }
}

impl FrameSource for BoardCamera {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.reader.is_some() {
            return Ok(());
        }
        let reader = match self.start(true) {
            Ok(reader) => reader,
            Err(err) => {
                warn!(
                    "Board camera did not start with framerate control at {} fps ({err}); retrying without it",
                    self.framerate
                );
                self.start(false)?
            }
        };
        info!(
            "Board camera started at {}x{}",
            self.resolution.0, self.resolution.1
        );
        self.reader = Some(reader);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let reader = self.reader.as_mut().ok_or(CaptureError::NotOpen)?;
        let data = reader.next_frame()?;
        let mut frame = Frame::bgr(data, self.resolution.0, self.resolution.1);
        frame.format = FrameFormat::I420;
        to_bgr(frame)
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            info!("Board camera stopped");
        }
    }
}
