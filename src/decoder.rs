use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConfigError, DetectorConfig};
use crate::detection::{BoundingBox, Detection, FrameSize};
use crate::labels::LabelTable;
use crate::tensor::RawTensor;
use crate::COCO_CLASS_COUNT;

/// Row width of the model variant that carries a separate object-presence
/// score at position 4, ahead of the class scores.
pub const ROW_WIDTH_WITH_OBJECTNESS: usize = 85;

/// Hard floor on normalized box width/height. Survives clamping so a
/// zero-area box can never reach corner conversion.
const SIZE_FLOOR: f32 = 0.01;

/// Coordinate convention of the geometry slots in a candidate row.
///
/// Declared once per model from its description metadata. The old value-range
/// sniffing is kept only as per-row error recovery for models whose metadata
/// turns out to be wrong; every such row is counted in
/// [`DecodeStats::convention_fallbacks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordSpace {
    /// Geometry is fractions of frame width/height in `[0, 1]`.
    #[default]
    Normalized,
    /// Geometry is in source-frame pixels.
    Pixel,
}

/// Per-decode rejection counters, one bump per skipped row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct DecodeStats {
    /// Candidate rows visited.
    pub rows_seen: usize,
    /// Rows with fewer than 4 values.
    pub malformed: usize,
    /// Rows with NaN/infinite geometry or confidence.
    pub non_finite: usize,
    /// Rows whose final confidence missed the threshold.
    pub below_threshold: usize,
    /// Rows whose best class index fell outside the known class range.
    pub invalid_class: usize,
    /// Rows whose box collapsed after clamping.
    pub degenerate: usize,
    /// Rows whose box came out smaller than the speckle floor.
    pub below_min_size: usize,
    /// Rows that contradicted the declared coordinate convention and were
    /// re-read as pixel geometry.
    pub convention_fallbacks: usize,
}

impl DecodeStats {
    /// Total rows dropped, for log summaries.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.malformed
            + self.non_finite
            + self.below_threshold
            + self.invalid_class
            + self.degenerate
            + self.below_min_size
    }
}

/// Result of decoding one tensor: surviving candidates plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct DecodeOutput {
    pub detections: Vec<Detection>,
    pub stats: DecodeStats,
}

/// Turns raw model output rows into calibrated, frame-space detections.
///
/// Stateless across frames: one decode is a pure function of the tensor,
/// the frame size, the injected label table and the validated config.
#[derive(Debug, Clone)]
pub struct Decoder {
    labels: Arc<LabelTable>,
    config: DetectorConfig,
    coord_space: CoordSpace,
}

impl Decoder {
    pub fn new(
        labels: Arc<LabelTable>,
        config: DetectorConfig,
        coord_space: CoordSpace,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        Ok(Self {
            labels,
            config,
            coord_space,
        })
    }

    #[must_use]
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Decodes every candidate row of `tensor` against `frame`.
    ///
    /// Never fails: every malformed or unwanted row is skipped and counted,
    /// and an empty tensor decodes to an empty list. Survivors keep the
    /// tensor's row order.
    pub fn decode(&self, tensor: &RawTensor, frame: FrameSize) -> DecodeOutput {
        let mut detections = Vec::new();
        let mut stats = DecodeStats::default();

        let row_width = tensor.row_width();
        let has_objectness = row_width == ROW_WIDTH_WITH_OBJECTNESS;
        let class_start = if has_objectness { 5 } else { 4 };
        let valid_class_end = (class_start + COCO_CLASS_COUNT).min(row_width);
        let min_side = self.config.min_box_ratio * frame.min_side();

        for row in tensor.rows() {
            stats.rows_seen += 1;

            let Some([cx, cy, w, h]) = row.geometry() else {
                stats.malformed += 1;
                continue;
            };
            if !cx.is_finite() || !cy.is_finite() || !w.is_finite() || !h.is_finite() {
                stats.non_finite += 1;
                continue;
            }

            // Best class: linear scan keeping strictly-greater updates only,
            // so ties resolve to the lowest class index.
            let mut max_score = f32::NEG_INFINITY;
            let mut class_index = 0;
            for position in class_start..valid_class_end {
                let score = row.get(position);
                if score > max_score {
                    max_score = score;
                    class_index = position - class_start;
                }
            }
            if class_index >= COCO_CLASS_COUNT {
                stats.invalid_class += 1;
                continue;
            }

            let confidence = if has_objectness {
                row.get(4).clamp(0.0, 1.0) * max_score
            } else {
                max_score
            };
            if !confidence.is_finite() {
                stats.non_finite += 1;
                continue;
            }
            if confidence < self.config.confidence_threshold {
                stats.below_threshold += 1;
                continue;
            }

            let all_fractional = cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0;
            let read_as_pixels = match self.coord_space {
                CoordSpace::Pixel => true,
                CoordSpace::Normalized if all_fractional => false,
                CoordSpace::Normalized => {
                    stats.convention_fallbacks += 1;
                    true
                }
            };

            let (cx, cy, w, h) = if read_as_pixels {
                (
                    cx / frame.width(),
                    cy / frame.height(),
                    w / frame.width(),
                    h / frame.height(),
                )
            } else {
                (cx, cy, w, h)
            };

            let cx = cx.clamp(0.0, 1.0);
            let cy = cy.clamp(0.0, 1.0);
            let w = w.clamp(SIZE_FLOOR, 1.0);
            let h = h.clamp(SIZE_FLOOR, 1.0);

            let left = ((cx - w / 2.0) * frame.width()).clamp(0.0, frame.width());
            let top = ((cy - h / 2.0) * frame.height()).clamp(0.0, frame.height());
            let right = ((cx + w / 2.0) * frame.width()).clamp(0.0, frame.width());
            let bottom = ((cy + h / 2.0) * frame.height()).clamp(0.0, frame.height());

            let bbox = match BoundingBox::new(left, top, right, bottom) {
                Ok(bbox) => bbox,
                Err(_) => {
                    stats.degenerate += 1;
                    continue;
                }
            };
            if bbox.width() < min_side || bbox.height() < min_side {
                stats.below_min_size += 1;
                continue;
            }

            detections.push(Detection {
                label: self.labels.label_for(class_index),
                confidence,
                bbox,
                frame_width: frame.width(),
                frame_height: frame.height(),
            });
        }

        debug!(
            rows = stats.rows_seen,
            kept = detections.len(),
            rejected = stats.rejected(),
            below_threshold = stats.below_threshold,
            "tensor decoded"
        );
        if stats.convention_fallbacks > 0 {
            warn!(
                rows = stats.convention_fallbacks,
                declared = ?self.coord_space,
                "rows contradicted the declared coordinate convention"
            );
        }

        DecodeOutput { detections, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FRAME_W: f32 = 800.0;
    const FRAME_H: f32 = 600.0;

    fn decoder(config: DetectorConfig) -> Decoder {
        Decoder::new(Arc::new(LabelTable::coco()), config, CoordSpace::Normalized).unwrap()
    }

    fn frame() -> FrameSize {
        FrameSize::new(FRAME_W, FRAME_H).unwrap()
    }

    /// One 85-wide row: geometry, objectness, then 80 class scores.
    fn objectness_row(
        geometry: [f32; 4],
        objectness: f32,
        class: usize,
        score: f32,
    ) -> Vec<f32> {
        let mut row = vec![0.0; 85];
        row[..4].copy_from_slice(&geometry);
        row[4] = objectness;
        row[5 + class] = score;
        row
    }

    /// One 84-wide row: geometry then 80 class scores.
    fn scores_row(geometry: [f32; 4], class: usize, score: f32) -> Vec<f32> {
        let mut row = vec![0.0; 84];
        row[..4].copy_from_slice(&geometry);
        row[4 + class] = score;
        row
    }

    fn tensor_of(rows: Vec<Vec<f32>>) -> RawTensor {
        let width = rows[0].len();
        let count = rows.len();
        let data: Vec<f32> = rows.into_iter().flatten().collect();
        RawTensor::from_rows(count, width, data).unwrap()
    }

    #[test]
    fn objectness_row_decodes_to_expected_box() {
        // Center (0.5, 0.5), size (0.2, 0.2), objectness 0.9, class 0 at 0.9:
        // confidence 0.81, box (320, 240)-(480, 360) on 800x600.
        let tensor = tensor_of(vec![objectness_row([0.5, 0.5, 0.2, 0.2], 0.9, 0, 0.9)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        let detection = &output.detections[0];
        assert_eq!(detection.label, "person");
        assert!((detection.confidence - 0.81).abs() < 1e-6);
        assert!((detection.bbox.left() - 320.0).abs() < 1e-3);
        assert!((detection.bbox.top() - 240.0).abs() < 1e-3);
        assert!((detection.bbox.right() - 480.0).abs() < 1e-3);
        assert!((detection.bbox.bottom() - 360.0).abs() < 1e-3);
    }

    #[test]
    fn scores_only_row_skips_objectness_weighting() {
        let tensor = tensor_of(vec![scores_row([0.5, 0.5, 0.4, 0.4], 16, 0.7)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.detections[0].label, "dog");
        assert!((output.detections[0].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn below_threshold_rows_are_dropped_and_counted() {
        let tensor = tensor_of(vec![
            scores_row([0.5, 0.5, 0.3, 0.3], 2, 0.9),
            scores_row([0.5, 0.5, 0.3, 0.3], 2, 0.1),
        ]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.stats.below_threshold, 1);
    }

    #[test]
    fn objectness_weighting_can_push_below_threshold() {
        // Class score alone passes 0.25, but 0.3 * 0.6 = 0.18 does not.
        let tensor = tensor_of(vec![objectness_row([0.5, 0.5, 0.3, 0.3], 0.3, 0, 0.6)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());
        assert!(output.detections.is_empty());
        assert_eq!(output.stats.below_threshold, 1);
    }

    #[test]
    fn objectness_is_clamped_before_weighting() {
        let tensor = tensor_of(vec![objectness_row([0.5, 0.5, 0.3, 0.3], 7.5, 0, 0.8)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());
        assert_eq!(output.detections.len(), 1);
        assert!((output.detections[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn ties_resolve_to_lowest_class_index() {
        let mut row = scores_row([0.5, 0.5, 0.3, 0.3], 10, 0.8);
        row[4 + 40] = 0.8;
        let output = decoder(DetectorConfig::default()).decode(&tensor_of(vec![row]), frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.detections[0].label, LabelTable::coco().label_for(10));
    }

    #[test]
    fn pixel_space_rows_fall_back_and_are_counted() {
        // Geometry in frame pixels on a normalized-declared model: center
        // (400, 300), size (200, 150) -> same box as the 0.5/0.5 row.
        let tensor = tensor_of(vec![scores_row([400.0, 300.0, 200.0, 150.0], 0, 0.9)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.stats.convention_fallbacks, 1);
        let bbox = &output.detections[0].bbox;
        assert!((bbox.left() - 300.0).abs() < 1e-3);
        assert!((bbox.top() - 225.0).abs() < 1e-3);
        assert!((bbox.right() - 500.0).abs() < 1e-3);
        assert!((bbox.bottom() - 375.0).abs() < 1e-3);
    }

    #[test]
    fn pixel_declared_model_divides_without_fallback() {
        let labels = Arc::new(LabelTable::coco());
        let pixel_decoder =
            Decoder::new(labels, DetectorConfig::default(), CoordSpace::Pixel).unwrap();
        let tensor = tensor_of(vec![scores_row([400.0, 300.0, 200.0, 150.0], 0, 0.9)]);
        let output = pixel_decoder.decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.stats.convention_fallbacks, 0);
    }

    #[test]
    fn centers_clamp_and_corners_stay_inside_frame() {
        // Center beyond the right edge: the box clamps into the frame and
        // survives as long as it keeps enough visible area.
        let tensor = tensor_of(vec![scores_row([0.99, 0.5, 0.4, 0.4], 0, 0.9)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        let bbox = &output.detections[0].bbox;
        assert!(bbox.right() <= FRAME_W);
        assert!(bbox.left() >= 0.0);
    }

    #[test]
    fn speck_sized_boxes_are_dropped() {
        // 1% of the 600px short side is 6px; a box clamped to the size floor
        // lands exactly at the limit, so use a stricter ratio to reject it.
        let config = DetectorConfig::default().with_min_box_ratio(0.05);
        let tensor = tensor_of(vec![scores_row([0.5, 0.5, 0.012, 0.012], 0, 0.9)]);
        let output = decoder(config).decode(&tensor, frame());

        assert!(output.detections.is_empty());
        assert_eq!(output.stats.below_min_size, 1);
    }

    #[test]
    fn corner_box_shrinks_below_minimum_after_clamping() {
        // Center pinned to the top-left corner: half the floor-sized box
        // lies outside and clamping leaves a sliver below the minimum size.
        let tensor = tensor_of(vec![scores_row([0.0, 0.0, 0.01, 0.01], 0, 0.9)]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());
        assert!(output.detections.is_empty());
        assert_eq!(output.stats.below_min_size, 1);
    }

    #[test]
    fn non_finite_geometry_is_skipped() {
        let tensor = tensor_of(vec![
            scores_row([f32::NAN, 0.5, 0.3, 0.3], 0, 0.9),
            scores_row([0.5, 0.5, f32::INFINITY, 0.3], 0, 0.9),
            scores_row([0.5, 0.5, 0.3, 0.3], 0, 0.9),
        ]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.stats.non_finite, 2);
    }

    #[test]
    fn short_rows_are_malformed() {
        let tensor = RawTensor::from_shape(3, 3, vec![0.5; 9]).unwrap();
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        assert!(output.detections.is_empty());
        assert_eq!(output.stats.malformed, 3);
    }

    #[test]
    fn empty_tensor_decodes_to_empty_list() {
        let output = decoder(DetectorConfig::default()).decode(&RawTensor::empty(), frame());
        assert!(output.detections.is_empty());
        assert_eq!(output.stats.rows_seen, 0);
    }

    #[test]
    fn unknown_class_index_uses_synthetic_label() {
        let labels = Arc::new(LabelTable::new(["person"]));
        let short_table =
            Decoder::new(labels, DetectorConfig::default(), CoordSpace::Normalized).unwrap();
        let tensor = tensor_of(vec![scores_row([0.5, 0.5, 0.3, 0.3], 17, 0.9)]);
        let output = short_table.decode(&tensor, frame());

        assert_eq!(output.detections.len(), 1);
        assert_eq!(output.detections[0].label, "Class 17");
    }

    #[test]
    fn survivors_keep_row_order() {
        let tensor = tensor_of(vec![
            scores_row([0.2, 0.2, 0.2, 0.2], 0, 0.5),
            scores_row([0.5, 0.5, 0.2, 0.2], 1, 0.9),
            scores_row([0.8, 0.8, 0.2, 0.2], 2, 0.7),
        ]);
        let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

        let labels: Vec<&str> = output.detections.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn decode_is_deterministic() {
        let tensor = tensor_of(vec![
            objectness_row([0.5, 0.5, 0.2, 0.2], 0.9, 0, 0.9),
            objectness_row([0.3, 0.3, 0.2, 0.2], 0.8, 16, 0.6),
        ]);
        let decoder = decoder(DetectorConfig::default());
        let first = decoder.decode(&tensor, frame());
        let second = decoder.decode(&tensor, frame());
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn every_survivor_meets_the_threshold(
            threshold in 0.0f32..1.0,
            scores in proptest::collection::vec(0.0f32..1.0, 1..50),
        ) {
            let rows: Vec<Vec<f32>> = scores
                .iter()
                .map(|&s| scores_row([0.5, 0.5, 0.3, 0.3], 0, s))
                .collect();
            let tensor = tensor_of(rows);
            let config = DetectorConfig::default().with_confidence_threshold(threshold);
            let output = decoder(config).decode(&tensor, frame());

            for detection in &output.detections {
                prop_assert!(detection.confidence >= threshold);
            }
        }

        #[test]
        fn survivors_always_lie_inside_the_frame(
            cx in -0.5f32..1.5,
            cy in -0.5f32..1.5,
            w in 0.0f32..1.5,
            h in 0.0f32..1.5,
        ) {
            let tensor = tensor_of(vec![scores_row([cx, cy, w, h], 0, 0.9)]);
            let output = decoder(DetectorConfig::default()).decode(&tensor, frame());

            for detection in &output.detections {
                let bbox = &detection.bbox;
                prop_assert!(bbox.left() >= 0.0 && bbox.right() <= FRAME_W);
                prop_assert!(bbox.top() >= 0.0 && bbox.bottom() <= FRAME_H);
                prop_assert!(bbox.width() > 0.0 && bbox.height() > 0.0);
            }
        }
    }
}
