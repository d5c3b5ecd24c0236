use image::{imageops, ImageBuffer, Rgb};
use ndarray::{Array, Array3, Axis};
use ort::session::Session;
use tracing::{debug, error};

use crate::decoder::{CoordSpace, ROW_WIDTH_WITH_OBJECTNESS};
use crate::frame::RgbFrame;
use crate::pipeline::{EngineError, InferenceEngine, ModelSpec};
use crate::tensor::RawTensor;
use crate::MAX_CANDIDATES;

/// Largest model input edge this adapter will accept.
const MAX_INPUT_DIMENSION: u32 = 4096;

// Raw backend errors can leak model internals into shell logs; log the full
// error here and surface a sanitized one.
impl From<ort::Error> for EngineError {
    fn from(e: ort::Error) -> Self {
        error!(error = %e, "onnx runtime error");
        EngineError::Inference {
            message: "internal inference error".into(),
        }
    }
}

/// ONNX Runtime backed [`InferenceEngine`].
///
/// Takes caller-supplied model bytes (locating and versioning weights is
/// the shell's concern) and validates the model structure once at load
/// time; per-frame shape anomalies are surfaced as recoverable errors.
pub struct OrtEngine {
    session: Session,
    spec: ModelSpec,
}

impl OrtEngine {
    /// Builds a session from in-memory model bytes and extracts its
    /// [`ModelSpec`].
    pub fn from_memory(model_bytes: &[u8]) -> Result<Self, EngineError> {
        let session = Session::builder()?.commit_from_memory(model_bytes)?;
        let spec = extract_model_spec(&session)?;

        debug!(
            input = %format!("{}x{}", spec.input_width, spec.input_height),
            output_features = spec.output_features,
            num_classes = spec.num_classes,
            "model session ready"
        );

        Ok(Self { session, spec })
    }

    /// Stretch-resizes the frame to the model input size and lays it out as
    /// a `[1, 3, H, W]` float tensor in `[0, 1]`.
    ///
    /// A plain stretch, not a letterbox: the decoder maps normalized
    /// geometry straight onto the source frame, which is only correct when
    /// the frame fills the model input completely.
    fn preprocess(
        &self,
        frame: &RgbFrame,
    ) -> Result<Array<f32, ndarray::Dim<[usize; 4]>>, EngineError> {
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or_else(|| EngineError::BadFrame {
                    reason: "buffer length does not match declared dimensions".into(),
                })?;

        Ok(chw_input(
            &buffer,
            self.spec.input_width,
            self.spec.input_height,
        ))
    }
}

impl InferenceEngine for OrtEngine {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, frame: &RgbFrame) -> Result<RawTensor, EngineError> {
        let input_tensor = self.preprocess(frame)?;
        let input_value = ort::value::Value::from_array(input_tensor)?;

        let outputs = self.session.run(ort::inputs![input_value])?;
        let output_tensor = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .ok_or_else(|| EngineError::ModelMismatch("model missing output node".into()))?;

        let (shape, data) = output_tensor.try_extract_tensor::<f32>()?;
        tensor_from_output(&shape, data, self.spec.output_features)
    }
}

/// Extracts and validates the model configuration from session metadata.
fn extract_model_spec(session: &Session) -> Result<ModelSpec, EngineError> {
    let input = session
        .inputs()
        .first()
        .ok_or_else(|| EngineError::ModelMismatch("model has no inputs".into()))?;

    let input_dims: Vec<i64> = input
        .dtype()
        .tensor_shape()
        .ok_or_else(|| EngineError::ModelMismatch("input is not a tensor".into()))?
        .to_vec();

    // Expected: [batch, channels, height, width]
    if input_dims.len() != 4 {
        return Err(EngineError::ModelMismatch(format!(
            "expected 4D input, got {}D",
            input_dims.len()
        )));
    }

    let (input_height, input_width) = (input_dims[2] as u32, input_dims[3] as u32);
    if input_height == 0
        || input_width == 0
        || input_height > MAX_INPUT_DIMENSION
        || input_width > MAX_INPUT_DIMENSION
    {
        return Err(EngineError::ModelMismatch(format!(
            "invalid input dimensions: {input_width}x{input_height}"
        )));
    }

    let output = session
        .outputs()
        .first()
        .ok_or_else(|| EngineError::ModelMismatch("model has no outputs".into()))?;

    let output_dims: Vec<i64> = output
        .dtype()
        .tensor_shape()
        .ok_or_else(|| EngineError::ModelMismatch("output is not a tensor".into()))?
        .to_vec();

    // Expected: [1, 84, 8400] or [1, 8400, 84]; the smaller non-batch axis
    // is the per-candidate feature count.
    if output_dims.len() != 3 {
        return Err(EngineError::ModelMismatch(format!(
            "expected 3D output, got {}D",
            output_dims.len()
        )));
    }

    let output_features = output_dims[1].min(output_dims[2]) as usize;
    if !(5..=ROW_WIDTH_WITH_OBJECTNESS).contains(&output_features) {
        return Err(EngineError::ModelMismatch(format!(
            "unsupported feature count: {output_features}"
        )));
    }

    let num_classes = if output_features == ROW_WIDTH_WITH_OBJECTNESS {
        output_features - 5
    } else {
        output_features - 4
    };

    Ok(ModelSpec {
        input_width,
        input_height,
        output_features,
        num_classes,
        coord_space: CoordSpace::Normalized,
    })
}

/// Resizes a packed RGB buffer to the model input size and converts it to
/// a CHW float tensor with a leading batch axis.
fn chw_input(
    buffer: &ImageBuffer<Rgb<u8>, Vec<u8>>,
    input_width: u32,
    input_height: u32,
) -> Array<f32, ndarray::Dim<[usize; 4]>> {
    let resized = imageops::resize(
        buffer,
        input_width,
        input_height,
        imageops::FilterType::Triangle,
    );

    let mut canvas = Array3::<f32>::zeros((3, input_height as usize, input_width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        canvas[[0, y as usize, x as usize]] = f32::from(r) / 255.0;
        canvas[[1, y as usize, x as usize]] = f32::from(g) / 255.0;
        canvas[[2, y as usize, x as usize]] = f32::from(b) / 255.0;
    }

    canvas.insert_axis(Axis(0))
}

/// Normalizes a raw output into a [`RawTensor`], bounding both axes against
/// allocation attacks and checking the feature axis against the model spec.
fn tensor_from_output(
    shape: &[i64],
    data: &[f32],
    expected_features: usize,
) -> Result<RawTensor, EngineError> {
    if shape.len() != 3 {
        return Err(EngineError::BadOutputShape {
            expected: "[batch, features, candidates] or [batch, candidates, features]".into(),
            got: format!("{shape:?}"),
        });
    }
    if shape.iter().any(|&dim| dim < 0) {
        return Err(EngineError::BadOutputShape {
            expected: "positive dimensions".into(),
            got: format!("{shape:?}"),
        });
    }

    let axis_a = shape[1] as usize;
    let axis_b = shape[2] as usize;
    if axis_a.max(axis_b) > MAX_CANDIDATES {
        return Err(EngineError::BadOutputShape {
            expected: format!("at most {MAX_CANDIDATES} candidates"),
            got: format!("{} candidates", axis_a.max(axis_b)),
        });
    }

    // The feature count is known here, so orientation is resolved against
    // it instead of the bare axis-size heuristic (which misreads outputs
    // with fewer candidates than features). A zero-sized axis is a valid
    // empty output.
    let tensor = if axis_a == 0 || axis_b == 0 {
        RawTensor::from_shape(axis_a, axis_b, data.to_vec())
    } else if axis_b == expected_features {
        RawTensor::from_rows(axis_a, axis_b, data.to_vec())
    } else if axis_a == expected_features {
        RawTensor::from_transposed(axis_a, axis_b, data.to_vec())
    } else {
        return Err(EngineError::BadOutputShape {
            expected: format!("feature axis = {expected_features}"),
            got: format!("{shape:?}"),
        });
    };

    tensor.map_err(|e| EngineError::BadOutputShape {
        expected: "shape matching the element count".into(),
        got: e.to_string(),
    })
}
