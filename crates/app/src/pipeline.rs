//! Capture → detect → publish state machine with bounded recovery.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant, SystemTime},
};

use metrics::{counter, histogram};
use ml_core::{Detection, FrameDetector};
use thiserror::Error;
use tracing::{debug, info, warn};
use video_ingest::{CaptureError, Frame, FrameSource};

use crate::summary::{DetectionSnapshot, SharedSnapshot};

pub type SharedPipeline = Arc<Mutex<FramePipeline>>;

/// How read failures are retried. Fixed for the lifetime of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Consecutive failed calls tolerated before the stream ends.
    pub max_read_failures: u32,
    /// Pause between closing and reopening the source.
    pub backoff: Duration,
    /// Reopen-and-read attempts made by one failing call.
    pub retries_per_failure: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_read_failures: 5,
            backoff: Duration::from_secs(1),
            retries_per_failure: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Recovering,
    /// Failure threshold passed; the source is left as is and no frames follow.
    Exhausted,
    Stopped,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unable to open video source")]
    Open(#[source] CaptureError),
    #[error("video source reported closed right after opening")]
    NotOpen,
}

/// A processed frame and the detections drawn on it.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

pub struct FramePipeline {
    source: Box<dyn FrameSource>,
    detector: Option<Arc<dyn FrameDetector>>,
    snapshot: SharedSnapshot,
    policy: RecoveryPolicy,
    state: PipelineState,
    failures: u32,
    frames: u64,
}

impl FramePipeline {
    /// Open `source` and start in the running state. Failing to open is fatal,
    /// so a pipeline is never observable before its source is open.
    pub fn new(
        mut source: Box<dyn FrameSource>,
        detector: Option<Arc<dyn FrameDetector>>,
        policy: RecoveryPolicy,
    ) -> Result<Self, PipelineError> {
        source.open().map_err(PipelineError::Open)?;
        if !source.is_open() {
            return Err(PipelineError::NotOpen);
        }
        info!(
            "Frame pipeline running (detection {})",
            if detector.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self {
            source,
            detector,
            snapshot: SharedSnapshot::default(),
            policy,
            state: PipelineState::Running,
            failures: 0,
            frames: 0,
        })
    }

    pub fn into_shared(self) -> SharedPipeline {
        Arc::new(Mutex::new(self))
    }

    /// Handle to the live detection snapshot, for summary readers.
    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn detection_enabled(&self) -> bool {
        self.detector.is_some()
    }

    /// Run one iteration. `None` means no frame this time; once the pipeline
    /// is exhausted or stopped every later call returns `None` as well.
    pub fn next_frame(&mut self) -> Option<ProcessedFrame> {
        if matches!(self.state, PipelineState::Exhausted | PipelineState::Stopped) {
            return None;
        }
        let started = Instant::now();

        let frame = match self.source.read() {
            Ok(frame) => frame,
            Err(err) => {
                counter!("cctv_read_failures_total").increment(1);
                self.failures += 1;
                if self.failures > self.policy.max_read_failures {
                    warn!(
                        "Video source failed {} consecutive reads; ending stream",
                        self.failures
                    );
                    self.state = PipelineState::Exhausted;
                    return None;
                }
                warn!(
                    "Failed to read frame ({err}); failure {}/{}",
                    self.failures, self.policy.max_read_failures
                );
                self.recover()?
            }
        };
        self.failures = 0;

        let processed = self.process(frame);
        histogram!("cctv_iteration_seconds").record(started.elapsed().as_secs_f64());
        Some(processed)
    }

    /// Close, pause, reopen and retry the read. The state returns to running
    /// whatever the outcome.
    fn recover(&mut self) -> Option<Frame> {
        self.state = PipelineState::Recovering;
        let mut recovered = None;
        for attempt in 1..=self.policy.retries_per_failure {
            info!(
                "Reopening video source (attempt {attempt}/{})",
                self.policy.retries_per_failure
            );
            self.source.close();
            thread::sleep(self.policy.backoff);
            if let Err(err) = self.source.open() {
                warn!("Reopening video source failed: {err}");
                continue;
            }
            if !self.source.is_open() {
                warn!("Video source still closed after reopen");
                continue;
            }
            match self.source.read() {
                Ok(frame) => {
                    recovered = Some(frame);
                    break;
                }
                Err(err) => warn!("Read after reopen failed: {err}"),
            }
        }
        let outcome = if recovered.is_some() { "success" } else { "failure" };
        counter!("cctv_recoveries_total", "outcome" => outcome).increment(1);
        self.state = PipelineState::Running;
        recovered
    }

    fn process(&mut self, frame: Frame) -> ProcessedFrame {
        let (frame, detections) = match self.detector.clone() {
            Some(detector) => run_detector(detector.as_ref(), frame),
            None => (frame, Vec::new()),
        };
        self.frames += 1;
        counter!("cctv_frames_total").increment(1);
        counter!("cctv_detections_total").increment(detections.len() as u64);

        let snapshot = DetectionSnapshot::new(detections.clone(), SystemTime::now());
        self.snapshot.install(snapshot);
        ProcessedFrame { frame, detections }
    }

    /// Stop the pipeline and close the source. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        if self.source.is_open() {
            self.source.close();
        }
        self.state = PipelineState::Stopped;
        info!("Frame pipeline stopped after {} frames", self.frames);
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.release();
    }
}

/// Detection never fails the iteration: errors and panics degrade to the raw
/// frame with no detections.
fn run_detector(detector: &dyn FrameDetector, frame: Frame) -> (Frame, Vec<Detection>) {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(&frame))) {
        Ok(Ok((annotated, detections))) => {
            let (width, height) = (annotated.width, annotated.height);
            let detections = detections
                .into_iter()
                .filter(|detection| {
                    let valid = detection.is_valid_for(width, height);
                    if !valid {
                        debug!("Dropping out-of-bounds detection {detection:?}");
                    }
                    valid
                })
                .collect();
            (annotated, detections)
        }
        Ok(Err(err)) => {
            counter!("cctv_detection_errors_total").increment(1);
            warn!("Detection failed; continuing with raw frame: {err:#}");
            (frame, Vec::new())
        }
        Err(_) => {
            counter!("cctv_detection_errors_total").increment(1);
            warn!("Detector panicked; continuing with raw frame");
            (frame, Vec::new())
        }
    }
}
