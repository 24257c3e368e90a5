use std::{
    borrow::Cow,
    collections::BTreeSet,
    sync::{Mutex, PoisonError},
};

use anyhow::{Result, anyhow};
use image::{ImageBuffer, Rgb, imageops::FilterType};
use tracing::debug;
use video_ingest::Frame;

use crate::{
    annotation::annotate,
    detection::{BoundingBox, Detection, RawDetection},
};

/// An object-detection model with its own label vocabulary.
///
/// Implementations need not be reentrant; [`Detector`] never calls `infer`
/// concurrently.
pub trait ObjectModel: Send {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// Detect objects in a BGR frame, returning an annotated copy and the kept
/// detections.
pub trait FrameDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)>;
}

/// Label allow-list plus minimum confidence.
#[derive(Debug, Clone)]
pub struct LabelFilter {
    labels: BTreeSet<String>,
    min_confidence: f32,
}

impl LabelFilter {
    pub fn new<I, S>(labels: I, min_confidence: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels = labels
            .into_iter()
            .map(|label| label.as_ref().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        Self {
            labels,
            min_confidence,
        }
    }

    pub fn accepts(&self, label: &str, confidence: f32) -> bool {
        confidence >= self.min_confidence && self.labels.contains(&label.to_lowercase())
    }

    /// Allow-listed labels, lower-cased and sorted.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

pub struct Detector {
    model: Mutex<Box<dyn ObjectModel>>,
    filter: LabelFilter,
    frame_width: Option<u32>,
}

impl Detector {
    pub fn new(model: Box<dyn ObjectModel>, filter: LabelFilter) -> Self {
        Self {
            model: Mutex::new(model),
            filter,
            frame_width: None,
        }
    }

    /// Resize frames to `width` (keeping aspect ratio) before inference.
    pub fn with_frame_width(mut self, width: Option<u32>) -> Self {
        self.frame_width = width.filter(|w| *w > 0);
        self
    }

    fn prepare<'a>(&self, frame: &'a Frame) -> Result<Cow<'a, Frame>> {
        let Some(target_width) = self.frame_width else {
            return Ok(Cow::Borrowed(frame));
        };
        if frame.width as u32 == target_width {
            return Ok(Cow::Borrowed(frame));
        }
        let ratio = target_width as f64 / frame.width as f64;
        let target_height = ((frame.height as f64 * ratio) as u32).max(1);

        // Resampling is channel-order agnostic, so BGR data can ride in an Rgb buffer.
        let buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
            frame.width as u32,
            frame.height as u32,
            frame.data.clone(),
        )
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized =
            image::imageops::resize(&buffer, target_width, target_height, FilterType::Triangle);

        Ok(Cow::Owned(Frame {
            data: resized.into_raw(),
            width: target_width as i32,
            height: target_height as i32,
            ..frame.clone()
        }))
    }

    fn keep(&self, raw: Vec<RawDetection>, width: i32, height: i32) -> Vec<Detection> {
        raw.into_iter()
            .filter(|candidate| self.filter.accepts(&candidate.label, candidate.confidence))
            .filter_map(|candidate| {
                let Some(bbox) = BoundingBox::clamped(candidate.bbox_xyxy, width, height) else {
                    debug!("Dropping degenerate box for {}", candidate.label);
                    return None;
                };
                Some(Detection {
                    label: candidate.label,
                    confidence: candidate.confidence.clamp(0.0, 1.0),
                    bbox,
                })
            })
            .collect()
    }
}

impl FrameDetector for Detector {
    fn detect(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        let frame = self.prepare(frame)?;
        let raw = {
            // A panic inside `infer` leaves no partial state behind the lock.
            let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
            model.infer(&frame)?
        };
        let detections = self.keep(raw, frame.width, frame.height);
        let annotated = annotate(&frame, &detections)?;
        Ok((annotated, detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel {
        results: Vec<RawDetection>,
    }

    impl ObjectModel for FixedModel {
        fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
            Ok(self.results.clone())
        }
    }

    fn raw(label: &str, confidence: f32, bbox: [f32; 4]) -> RawDetection {
        RawDetection {
            label: label.into(),
            confidence,
            bbox_xyxy: bbox,
        }
    }

    fn detector(results: Vec<RawDetection>) -> Detector {
        let model = FixedModel { results };
        Detector::new(Box::new(model), LabelFilter::new(["Bird"], 0.4))
    }

    fn frame(width: i32, height: i32) -> Frame {
        Frame::bgr(vec![10; (width * height * 3) as usize], width, height)
    }

    #[test]
    fn filter_is_case_insensitive() {
        let filter = LabelFilter::new([" Bird ", "", "squirrel"], 0.5);
        assert!(filter.accepts("BIRD", 0.5));
        assert!(!filter.accepts("bird", 0.49));
        assert!(!filter.accepts("pigeon", 0.99));
        assert_eq!(filter.labels().collect::<Vec<_>>(), vec!["bird", "squirrel"]);
    }

    #[test]
    fn only_allow_listed_confident_detections_survive() {
        let detector = detector(vec![
            raw("bird", 0.9, [10.0, 10.0, 30.0, 30.0]),
            raw("pigeon", 0.95, [40.0, 10.0, 60.0, 30.0]),
            raw("bird", 0.2, [5.0, 5.0, 15.0, 15.0]),
        ]);
        let input = frame(64, 48);
        let (annotated, detections) = detector.detect(&input).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "bird");
        assert_eq!(detections[0].bbox, BoundingBox { x1: 10, y1: 10, x2: 30, y2: 30 });

        // The rejected pigeon box must not be drawn.
        let offset = ((20 * 64 + 40) * 3) as usize;
        assert_eq!(&annotated.data[offset..offset + 3], &[10, 10, 10]);
        let offset = ((20 * 64 + 10) * 3) as usize;
        assert_eq!(&annotated.data[offset..offset + 3], &[0, 255, 0]);
    }

    #[test]
    fn out_of_frame_boxes_are_clamped_or_dropped() {
        let detector = detector(vec![
            raw("bird", 1.0, [-5.0, -5.0, 100.0, 20.0]),
            raw("bird", 0.8, [70.0, 0.0, 90.0, 10.0]),
        ]);
        let input = frame(64, 48);
        let (_, detections) = detector.detect(&input).unwrap();
        assert_eq!(detections.len(), 1);
        assert!(detections.iter().all(|d| d.is_valid_for(64, 48)));
    }

    #[test]
    fn frames_are_resized_to_configured_width() {
        let detector = detector(vec![raw("bird", 0.9, [0.0, 0.0, 500.0, 500.0])])
            .with_frame_width(Some(32));
        let (annotated, detections) = detector.detect(&frame(64, 48)).unwrap();
        assert_eq!((annotated.width, annotated.height), (32, 24));
        assert_eq!(annotated.data.len(), 32 * 24 * 3);
        assert_eq!(detections[0].bbox, BoundingBox { x1: 0, y1: 0, x2: 32, y2: 24 });
    }

    #[test]
    fn model_errors_propagate() {
        struct Failing;
        impl ObjectModel for Failing {
            fn infer(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
                Err(anyhow!("inference failed"))
            }
        }
        let detector = Detector::new(Box::new(Failing), LabelFilter::new(["bird"], 0.4));
        assert!(detector.detect(&frame(8, 8)).is_err());
    }
}
