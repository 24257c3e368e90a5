use std::time::Duration;

use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw frame captured from a video source.
///
/// Frames leaving a [`crate::FrameSource`] are always [`FrameFormat::Bgr8`].
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Wrap a packed BGR buffer captured now.
    pub fn bgr(data: Vec<u8>, width: i32, height: i32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    /// Number of bytes the buffer must hold for its format and dimensions.
    pub fn expected_len(&self) -> usize {
        self.format.buffer_len(self.width, self.height)
    }

    /// Check that the buffer length matches the declared layout.
    pub fn validate(&self) -> Result<(), CaptureError> {
        let expected = self.expected_len();
        if self.width <= 0 || self.height <= 0 || self.data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                format: self.format,
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Pixel layout of a [`Frame`] buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed 8-bit blue, green, red. The canonical layout.
    Bgr8,
    /// Packed 8-bit red, green, blue.
    Rgb8,
    /// Planar YUV 4:2:0 (Y plane, then U, then V).
    I420,
}

impl FrameFormat {
    pub fn buffer_len(self, width: i32, height: i32) -> usize {
        let w = width.max(0) as usize;
        let h = height.max(0) as usize;
        match self {
            FrameFormat::Bgr8 | FrameFormat::Rgb8 => w * h * 3,
            FrameFormat::I420 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}: {reason}")]
    Open { uri: String, reason: String },
    #[error("video source is not open")]
    NotOpen,
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("no frame received within {0:?}")]
    Timeout(Duration),
    #[error("{0} is not available in this build")]
    Unsupported(&'static str),
    #[error(
        "invalid {format:?} frame {width}x{height}: expected {expected} bytes, got {actual}"
    )]
    InvalidFrame {
        format: FrameFormat,
        width: i32,
        height: i32,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Other(#[from] Error),
}
