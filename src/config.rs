use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CROSS_CLASS_IOU, DEFAULT_MIN_BOX_RATIO, DEFAULT_NMS_IOU,
    MAX_NMS_CANDIDATES,
};

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a finite value in [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("max_nms_candidates must be at least 1")]
    ZeroNmsBound,
}

/// Tunable detection thresholds.
///
/// Values are caller input, so they are validated explicitly rather than
/// clamped: an out-of-range threshold is a caller bug and must fail loudly
/// before any frame is processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct DetectorConfig {
    /// Minimum final confidence for a candidate to survive decoding.
    pub confidence_threshold: f32,
    /// Same-label IOU above which the lower-confidence box is suppressed.
    pub nms_iou: f32,
    /// Cross-label IOU above which the lower-confidence box is suppressed.
    pub cross_class_iou: f32,
    /// Minimum box side as a fraction of the frame's shorter side.
    pub min_box_ratio: f32,
    /// Upper bound on candidates entering suppression, to bound O(n²) time.
    pub max_nms_candidates: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_iou: DEFAULT_NMS_IOU,
            cross_class_iou: DEFAULT_CROSS_CLASS_IOU,
            min_box_ratio: DEFAULT_MIN_BOX_RATIO,
            max_nms_candidates: MAX_NMS_CANDIDATES,
        }
    }
}

impl DetectorConfig {
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_nms_iou(mut self, threshold: f32) -> Self {
        self.nms_iou = threshold;
        self
    }

    pub fn with_cross_class_iou(mut self, threshold: f32) -> Self {
        self.cross_class_iou = threshold;
        self
    }

    pub fn with_min_box_ratio(mut self, ratio: f32) -> Self {
        self.min_box_ratio = ratio;
        self
    }

    pub fn with_max_nms_candidates(mut self, max: usize) -> Self {
        self.max_nms_candidates = max;
        self
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        check_unit_interval("confidence_threshold", self.confidence_threshold)?;
        check_unit_interval("nms_iou", self.nms_iou)?;
        check_unit_interval("cross_class_iou", self.cross_class_iou)?;
        check_unit_interval("min_box_ratio", self.min_box_ratio)?;
        if self.max_nms_candidates == 0 {
            return Err(ConfigError::ZeroNmsBound);
        }
        Ok(self)
    }
}

fn check_unit_interval(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
    }
    Ok(())
}
