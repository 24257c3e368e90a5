//! JPEG stream over the frame pipeline, framed for `multipart/x-mixed-replace`.

use std::{iter::FusedIterator, sync::PoisonError};

use image::{ImageBuffer, Rgb, codecs::jpeg::JpegEncoder};
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};
use video_ingest::{Frame, FrameFormat};

use crate::pipeline::SharedPipeline;

pub const MJPEG_BOUNDARY: &str = "frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode {0:?} frame")]
    Format(FrameFormat),
    #[error("frame buffer does not match {width}x{height}")]
    Layout { width: i32, height: i32 },
    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Encode a BGR frame as JPEG. `quality` is clamped to 1..=100.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if frame.format != FrameFormat::Bgr8 {
        return Err(EncodeError::Format(frame.format));
    }
    let rgb: Vec<u8> = frame
        .data
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect();
    let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
        frame.width.max(0) as u32,
        frame.height.max(0) as u32,
        rgb,
    )
    .ok_or(EncodeError::Layout {
        width: frame.width,
        height: frame.height,
    })?;

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&image)?;
    Ok(buffer)
}

/// Wrap one JPEG payload as a multipart part.
pub fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--");
    part.extend_from_slice(MJPEG_BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Pull-based, fused sequence of JPEG payloads.
///
/// Every `next` call drives one pipeline iteration (and may block on the
/// camera). Frames that fail to encode are skipped; the sequence ends for good
/// the first time the pipeline yields no frame.
pub struct StreamPublisher {
    pipeline: SharedPipeline,
    quality: u8,
    finished: bool,
}

impl StreamPublisher {
    pub fn new(pipeline: SharedPipeline, quality: u8) -> Self {
        Self {
            pipeline,
            quality: quality.clamp(1, 100),
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Iterator for StreamPublisher {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let processed = self
                .pipeline
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .next_frame();
            let Some(processed) = processed else {
                info!("Frame pipeline yielded no frame; ending stream");
                self.finished = true;
                break;
            };
            match encode_jpeg(&processed.frame, self.quality) {
                Ok(jpeg) => return Some(jpeg),
                Err(err) => {
                    counter!("cctv_encode_errors_total").increment(1);
                    warn!("Dropping frame: {err}");
                }
            }
        }
        None
    }
}

impl FusedIterator for StreamPublisher {}
