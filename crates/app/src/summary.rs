//! Latest detection snapshot shared between the pipeline and HTTP readers.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Local};
use ml_core::Detection;
use serde::Serialize;

/// Detections from one pipeline iteration plus the time they were recorded.
#[derive(Clone, Debug, Default)]
pub struct DetectionSnapshot {
    pub detections: Vec<Detection>,
    pub captured_at: Option<SystemTime>,
}

impl DetectionSnapshot {
    pub fn new(detections: Vec<Detection>, captured_at: SystemTime) -> Self {
        Self {
            detections,
            captured_at: Some(captured_at),
        }
    }
}

/// Single-writer cell holding the live [`DetectionSnapshot`].
///
/// Snapshots are replaced wholesale, so a poisoned lock still guards a
/// consistent value and is recovered rather than propagated.
#[derive(Clone, Debug, Default)]
pub struct SharedSnapshot(Arc<Mutex<DetectionSnapshot>>);

impl SharedSnapshot {
    fn guard(&self) -> MutexGuard<'_, DetectionSnapshot> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the live snapshot. The new value is built before the lock is taken.
    pub fn install(&self, snapshot: DetectionSnapshot) {
        *self.guard() = snapshot;
    }

    pub fn load(&self) -> DetectionSnapshot {
        self.guard().clone()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DetectionSummary {
    pub count: usize,
    pub labels: BTreeMap<String, usize>,
    pub detections: Vec<Detection>,
    /// Seconds since the Unix epoch.
    pub last_updated: Option<f64>,
}

impl DetectionSummary {
    fn from_snapshot(snapshot: DetectionSnapshot) -> Self {
        let mut labels = BTreeMap::new();
        for detection in &snapshot.detections {
            *labels.entry(detection.label.clone()).or_insert(0) += 1;
        }
        let last_updated = snapshot
            .captured_at
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs_f64());
        Self {
            count: snapshot.detections.len(),
            labels,
            detections: snapshot.detections,
            last_updated,
        }
    }

    /// Local time as `%Y-%m-%d %H:%M:%S`, or `N/A` before the first frame.
    pub fn last_updated_text(&self) -> String {
        self.last_updated
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| {
                let whole = secs.trunc() as i64;
                let nanos = (secs.fract() * 1e9) as u32;
                DateTime::from_timestamp(whole, nanos)
            })
            .map(|utc| {
                utc.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Read-only view over the pipeline's [`SharedSnapshot`].
#[derive(Clone, Debug)]
pub struct SummaryReader {
    shared: SharedSnapshot,
}

impl SummaryReader {
    pub fn new(shared: SharedSnapshot) -> Self {
        Self { shared }
    }

    pub fn snapshot(&self) -> DetectionSummary {
        DetectionSummary::from_snapshot(self.shared.load())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ml_core::BoundingBox;

    use super::*;

    fn detection(label: &str) -> Detection {
        Detection {
            label: label.into(),
            confidence: 0.9,
            bbox: BoundingBox { x1: 0, y1: 0, x2: 4, y2: 4 },
        }
    }

    #[test]
    fn empty_snapshot_has_no_timestamp() {
        let reader = SummaryReader::new(SharedSnapshot::default());
        let summary = reader.snapshot();
        assert_eq!(summary.count, 0);
        assert!(summary.labels.is_empty());
        assert_eq!(summary.last_updated, None);
        assert_eq!(summary.last_updated_text(), "N/A");

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json["last_updated"].is_null());
    }

    #[test]
    fn labels_are_counted() {
        let shared = SharedSnapshot::default();
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        shared.install(DetectionSnapshot::new(
            vec![detection("bird"), detection("crow"), detection("bird")],
            at,
        ));

        let summary = SummaryReader::new(shared).snapshot();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.labels.get("bird"), Some(&2));
        assert_eq!(summary.labels.get("crow"), Some(&1));
        assert_eq!(summary.detections.len(), 3);
        let secs = summary.last_updated.unwrap();
        assert!((secs - 1_700_000_000.25).abs() < 1e-6);
        assert_ne!(summary.last_updated_text(), "N/A");
    }

    #[test]
    fn install_replaces_the_whole_snapshot() {
        let shared = SharedSnapshot::default();
        shared.install(DetectionSnapshot::new(vec![detection("bird")], SystemTime::now()));
        shared.install(DetectionSnapshot::new(Vec::new(), SystemTime::now()));
        let snapshot = shared.load();
        assert!(snapshot.detections.is_empty());
        assert!(snapshot.captured_at.is_some());
    }
}
