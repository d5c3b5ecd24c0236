use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, DetectorConfig};
use crate::decoder::{CoordSpace, DecodeOutput, DecodeStats, Decoder};
use crate::detection::Detection;
use crate::frame::RgbFrame;
use crate::labels::LabelTable;
use crate::nms::suppress;
use crate::tensor::RawTensor;

/// What an inference engine reports about its model, extracted once at
/// load time from the model-description metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct ModelSpec {
    /// Expected input width in pixels.
    pub input_width: u32,
    /// Expected input height in pixels.
    pub input_height: u32,
    /// Values per candidate row (84 or 85 for this model family).
    pub output_features: usize,
    /// Number of class scores per row.
    pub num_classes: usize,
    /// Declared coordinate convention of the geometry slots.
    pub coord_space: CoordSpace,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            output_features: 84,
            num_classes: 80,
            coord_space: CoordSpace::Normalized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine itself failed. Raw backend errors are logged at the
    /// source and surfaced sanitized.
    #[error("inference failed: {message}")]
    Inference { message: String },

    /// The model's declared structure is unusable. Raised at load time;
    /// not a per-frame condition.
    #[error("model configuration mismatch: {0}")]
    ModelMismatch(String),

    /// The output tensor for this frame had an unexpected shape.
    #[error("unexpected output shape: expected {expected}, got {got}")]
    BadOutputShape { expected: String, got: String },

    /// The frame could not be fed to the model.
    #[error("frame rejected by engine: {reason}")]
    BadFrame { reason: String },
}

impl EngineError {
    /// Whether the stream can continue with the next frame. Only a broken
    /// model configuration is terminal.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ModelMismatch(_))
    }
}

/// The opaque `infer(frame) -> tensor` collaborator.
///
/// Implementations run a fixed network over one frame and return its raw
/// output tensor. One call per frame, strictly sequential; the trait takes
/// `&mut self` so engines may keep internal scratch state without locking.
pub trait InferenceEngine {
    /// The model metadata extracted at load time.
    fn spec(&self) -> &ModelSpec;

    /// Runs the model over one frame.
    fn infer(&mut self, frame: &RgbFrame) -> Result<RawTensor, EngineError>;
}

/// Per-frame failure at the analyzer boundary.
///
/// Engine failures are kept distinct from precondition failures so the
/// calling pipeline can render "no detections" for the frame and carry on;
/// one bad frame never halts the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Everything one analyzed frame produces, for the shell and its debug HUD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct FrameAnalysis {
    /// Final detections, confidence-descending.
    pub detections: Vec<Detection>,
    /// Candidates that survived decoding, before suppression.
    pub candidates_before_nms: usize,
    /// True if the candidate list was cut to the suppression bound.
    pub truncated: bool,
    /// Decoder rejection counters.
    pub stats: DecodeStats,
    pub infer_ms: f64,
    pub decode_ms: f64,
    pub suppress_ms: f64,
}

/// The per-frame pipeline: infer, decode, suppress.
///
/// Owns its engine and decoder; processes exactly one frame per call with
/// no state carried between frames beyond the engine's own internals. The
/// caller is responsible for keep-latest backpressure when frames arrive
/// faster than analysis completes.
pub struct FrameAnalyzer<E> {
    engine: E,
    decoder: Decoder,
    config: DetectorConfig,
}

impl<E: InferenceEngine> FrameAnalyzer<E> {
    /// Builds the analyzer, validating `config` up front: thresholds are
    /// caller input and fail loudly here, not mid-stream.
    pub fn new(
        engine: E,
        labels: Arc<LabelTable>,
        config: DetectorConfig,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        let decoder = Decoder::new(labels, config, engine.spec().coord_space)?;
        Ok(Self {
            engine,
            decoder,
            config,
        })
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyzes one frame end to end.
    ///
    /// An engine failure surfaces as [`AnalyzeError::Engine`] and leaves the
    /// analyzer fully usable for the next frame.
    pub fn analyze(&mut self, frame: &RgbFrame) -> Result<FrameAnalysis, AnalyzeError> {
        let infer_start = Instant::now();
        let tensor = self.engine.infer(frame)?;
        let infer_ms = elapsed_ms(infer_start);

        let decode_start = Instant::now();
        let DecodeOutput {
            mut detections,
            stats,
        } = self.decoder.decode(&tensor, frame.size());
        let decode_ms = elapsed_ms(decode_start);

        let candidates_before_nms = detections.len();
        let truncated = detections.len() > self.config.max_nms_candidates;
        if truncated {
            warn!(
                candidates = detections.len(),
                limit = self.config.max_nms_candidates,
                "candidate list truncated before suppression"
            );
            // Keep the most confident candidates; stable so equal
            // confidences keep decode order.
            detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
            detections.truncate(self.config.max_nms_candidates);
        }

        let suppress_start = Instant::now();
        let detections = suppress(detections, self.config.nms_iou, self.config.cross_class_iou);
        let suppress_ms = elapsed_ms(suppress_start);

        debug!(
            detections = detections.len(),
            candidates_before_nms,
            truncated,
            infer_ms,
            decode_ms,
            suppress_ms,
            "frame analyzed"
        );

        Ok(FrameAnalysis {
            detections,
            candidates_before_nms,
            truncated,
            stats,
            infer_ms,
            decode_ms,
            suppress_ms,
        })
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
