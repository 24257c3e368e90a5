use serde::Serialize;

/// Integer pixel box with `x1 < x2` and `y1 < y2`. Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Truncate a float box to pixels and clamp it to a `width`×`height`
    /// frame. Returns `None` when nothing of the box is left.
    pub fn clamped(xyxy: [f32; 4], width: i32, height: i32) -> Option<Self> {
        let x1 = (xyxy[0] as i32).clamp(0, width);
        let y1 = (xyxy[1] as i32).clamp(0, height);
        let x2 = (xyxy[2] as i32).clamp(0, width);
        let y2 = (xyxy[3] as i32).clamp(0, height);
        let bbox = Self { x1, y1, x2, y2 };
        bbox.is_within(width, height).then_some(bbox)
    }

    pub fn is_within(&self, width: i32, height: i32) -> bool {
        0 <= self.x1 && self.x1 < self.x2 && self.x2 <= width
            && 0 <= self.y1 && self.y1 < self.y2 && self.y2 <= height
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
    }
}

/// A labeled, confidence-scored box found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn is_valid_for(&self, width: i32, height: i32) -> bool {
        (0.0..=1.0).contains(&self.confidence) && self.bbox.is_within(width, height)
    }
}

/// Unfiltered model output in the model's own vocabulary and frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox_xyxy: [f32; 4],
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy per-label non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = kept.iter().any(|existing| {
            existing.label == candidate.label
                && iou(&existing.bbox_xyxy, &candidate.bbox_xyxy) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
