use tracing::debug;

use crate::detection::{BoundingBox, Detection};

/// Intersection-over-union of two boxes, in `[0, 1]`.
///
/// Disjoint or edge-touching boxes score exactly 0; the empty-intersection
/// case is decided before any area is computed, so no negative areas or
/// zero-union divisions can occur.
#[must_use]
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let left = a.left().max(b.left());
    let top = a.top().max(b.top());
    let right = a.right().min(b.right());
    let bottom = a.bottom().min(b.bottom());

    if right <= left || bottom <= top {
        return 0.0;
    }

    let intersection = (right - left) * (bottom - top);
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Outcome tag assigned to every candidate during the greedy pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Kept,
    Suppressed,
}

/// Greedy non-maximum suppression.
///
/// Candidates are ranked by confidence descending, equal confidences
/// keeping their input order, so the result is deterministic for a fixed
/// input list. Each candidate is assigned a [`Fate`] exactly once; a kept
/// candidate suppresses every lower-ranked undecided candidate whose
/// overlap exceeds the applicable threshold: `nms_iou` for the same label,
/// `cross_class_iou` for differing labels. Comparison is strictly greater,
/// so a pair exactly at the threshold suppresses.
///
/// A pure filter: survivors are returned unmodified, in acceptance
/// (confidence-descending) order.
#[must_use]
pub fn suppress(detections: Vec<Detection>, nms_iou: f32, cross_class_iou: f32) -> Vec<Detection> {
    if detections.len() <= 1 {
        return detections;
    }

    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });

    let mut fates: Vec<Option<Fate>> = vec![None; detections.len()];
    for (rank, &index) in order.iter().enumerate() {
        if fates[index].is_some() {
            continue;
        }
        fates[index] = Some(Fate::Kept);

        let kept = &detections[index];
        for &other in &order[rank + 1..] {
            if fates[other].is_some() {
                continue;
            }
            let candidate = &detections[other];
            let threshold = if kept.label == candidate.label {
                nms_iou
            } else {
                cross_class_iou
            };
            if iou(&kept.bbox, &candidate.bbox) > threshold {
                fates[other] = Some(Fate::Suppressed);
            }
        }
    }

    let input_count = detections.len();
    let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
    let survivors: Vec<Detection> = order
        .iter()
        .filter(|&&index| fates[index] == Some(Fate::Kept))
        .filter_map(|&index| slots[index].take())
        .collect();

    debug!(
        input = input_count,
        kept = survivors.len(),
        "suppression complete"
    );

    survivors
}
