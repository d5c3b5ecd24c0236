// lib.rs - Spotter shared core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod decoder;
pub mod detection;
#[cfg(feature = "ml")]
pub mod engine;
pub mod frame;
pub mod labels;
pub mod nms;
pub mod overlay;
pub mod pipeline;
pub mod tensor;

pub use config::{ConfigError, DetectorConfig};
pub use decoder::{CoordSpace, DecodeOutput, DecodeStats, Decoder};
pub use detection::{BoundingBox, Detection, FrameSize, GeometryError};
#[cfg(feature = "ml")]
pub use engine::OrtEngine;
pub use frame::{FrameError, RgbFrame};
pub use labels::LabelTable;
pub use nms::{iou, suppress};
pub use overlay::{project, OverlayBox, ScaleMode, ViewTransform};
pub use pipeline::{
    AnalyzeError, EngineError, FrameAnalysis, FrameAnalyzer, InferenceEngine, ModelSpec,
};
pub use tensor::{RawTensor, TensorError};

/// Standard confidence floor for this model family (25%).
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Same-label IOU above which the weaker box is suppressed.
pub const DEFAULT_NMS_IOU: f32 = 0.45;

/// Cross-label IOU above which near-duplicate boxes of different classes
/// are suppressed.
pub const DEFAULT_CROSS_CLASS_IOU: f32 = 0.70;

/// Minimum box side as a fraction of the frame's shorter side (1%).
pub const DEFAULT_MIN_BOX_RATIO: f32 = 0.01;

/// Class count of the COCO-trained model family.
pub const COCO_CLASS_COUNT: usize = 80;

/// Maximum candidates entering NMS to bound CPU time.
pub const MAX_NMS_CANDIDATES: usize = 300;

/// Maximum candidates accepted from a model output to prevent
/// allocation attacks.
pub const MAX_CANDIDATES: usize = 50_000;

/// Maximum frame pixel count accepted at the frame boundary.
pub const MAX_FRAME_PIXELS: u64 = 100_000_000;
