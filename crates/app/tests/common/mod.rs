#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use bird_cctv::RecoveryPolicy;
use ml_core::{BoundingBox, Detection, FrameDetector};
use video_ingest::{CaptureError, Frame, FrameSource};

pub const WIDTH: i32 = 16;
pub const HEIGHT: i32 = 12;

pub fn frame() -> Frame {
    Frame::bgr(vec![90; (WIDTH * HEIGHT * 3) as usize], WIDTH, HEIGHT)
}

pub fn fast_policy(max_read_failures: u32) -> RecoveryPolicy {
    RecoveryPolicy {
        max_read_failures,
        backoff: Duration::ZERO,
        ..RecoveryPolicy::default()
    }
}

/// Counters shared with a [`ScriptedSource`] after it is boxed into a pipeline.
#[derive(Default, Debug)]
pub struct SourceLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
}

impl SourceLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Source whose reads succeed or fail following a script, then `fallback`.
pub struct ScriptedSource {
    script: VecDeque<bool>,
    fallback: bool,
    open: bool,
    open_fails: bool,
    reports_closed: bool,
    log: Arc<SourceLog>,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = bool>, fallback: bool) -> (Self, Arc<SourceLog>) {
        let log = Arc::new(SourceLog::default());
        let source = Self {
            script: script.into_iter().collect(),
            fallback,
            open: false,
            open_fails: false,
            reports_closed: false,
            log: log.clone(),
        };
        (source, log)
    }

    pub fn failing_open() -> Self {
        let (mut source, _) = Self::new([], true);
        source.open_fails = true;
        source
    }

    pub fn never_open() -> Self {
        let (mut source, _) = Self::new([], true);
        source.reports_closed = true;
        source
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        if self.open_fails {
            return Err(CaptureError::Open {
                uri: "scripted".into(),
                reason: "no device".into(),
            });
        }
        self.open = !self.reports_closed;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.log.reads.fetch_add(1, Ordering::SeqCst);
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        let ok = self.script.pop_front().unwrap_or(self.fallback);
        if ok {
            Ok(frame())
        } else {
            Err(CaptureError::Read("scripted failure".into()))
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }
}

pub fn detection(label: &str, bbox: BoundingBox) -> Detection {
    Detection {
        label: label.into(),
        confidence: 0.9,
        bbox,
    }
}

/// Detector that always returns an error.
pub struct FailingDetector;

impl FrameDetector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        Err(anyhow!("model exploded"))
    }
}

/// Detector that panics on every call.
pub struct PanickingDetector;

impl FrameDetector for PanickingDetector {
    fn detect(&self, _frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        panic!("inference crashed")
    }
}

/// Detector returning a fixed set of detections and the frame unchanged.
pub struct FixedDetector(pub Vec<Detection>);

impl FrameDetector for FixedDetector {
    fn detect(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        Ok((frame.clone(), self.0.clone()))
    }
}

/// Detector whose n-th call returns n copies of a detection labelled `n`.
#[derive(Default)]
pub struct CountingDetector {
    calls: AtomicUsize,
}

impl FrameDetector for CountingDetector {
    fn detect(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) % 8 + 1;
        let bbox = BoundingBox { x1: 0, y1: 0, x2: 4, y2: 4 };
        let detections = (0..n).map(|_| detection(&n.to_string(), bbox)).collect();
        Ok((frame.clone(), detections))
    }
}

/// Detector that returns an undecodable frame on its first call only.
#[derive(Default)]
pub struct CorruptFirstFrame {
    calls: AtomicUsize,
}

impl FrameDetector for CorruptFirstFrame {
    fn detect(&self, frame: &Frame) -> Result<(Frame, Vec<Detection>)> {
        let mut out = frame.clone();
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            out.data.truncate(7);
        }
        Ok((out, Vec::new()))
    }
}
