use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("declared shape [{axis_a}, {axis_b}] needs {expected} values, buffer has {actual}")]
    ShapeMismatch {
        axis_a: usize,
        axis_b: usize,
        expected: usize,
        actual: usize,
    },

    #[error("declared shape [{axis_a}, {axis_b}] overflows addressable size")]
    Oversized { axis_a: usize, axis_b: usize },
}

/// Immutable model output buffer, logically `[num_candidates][row_width]`.
///
/// Models in this family declare their output as `[1, A, B]` where `{A, B}`
/// is `{row_width, num_candidates}` in either order; the batch axis is
/// stripped by the engine adapter before construction. The smaller axis is
/// the row width. A transposed buffer (`[row_width][num_candidates]`) is
/// served through strided access rather than copied.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct RawTensor {
    data: Vec<f32>,
    candidates: usize,
    row_width: usize,
    transposed: bool,
}

impl RawTensor {
    /// Builds a tensor from its declared non-batch axes and a flat buffer.
    ///
    /// A zero-sized axis yields a valid, empty tensor. Equal axis sizes are
    /// ambiguous and resolve to the row-major `[num_candidates][row_width]`
    /// reading.
    pub fn from_shape(axis_a: usize, axis_b: usize, data: Vec<f32>) -> Result<Self, TensorError> {
        let expected = axis_a
            .checked_mul(axis_b)
            .ok_or(TensorError::Oversized { axis_a, axis_b })?;
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                axis_a,
                axis_b,
                expected,
                actual: data.len(),
            });
        }

        if axis_a == 0 || axis_b == 0 {
            return Ok(Self {
                data,
                candidates: 0,
                row_width: axis_a.max(axis_b),
                transposed: false,
            });
        }

        let transposed = axis_a < axis_b;
        let (row_width, candidates) = if transposed {
            (axis_a, axis_b)
        } else {
            (axis_b, axis_a)
        };

        Ok(Self {
            data,
            candidates,
            row_width,
            transposed,
        })
    }

    /// Builds a tensor from an explicit row-major
    /// `[num_candidates][row_width]` buffer, bypassing the axis-size
    /// heuristic. For callers that already know the orientation (fixtures,
    /// custom engines); the heuristic in [`RawTensor::from_shape`] would
    /// misread e.g. a single-candidate buffer.
    pub fn from_rows(
        num_candidates: usize,
        row_width: usize,
        data: Vec<f32>,
    ) -> Result<Self, TensorError> {
        let expected = num_candidates
            .checked_mul(row_width)
            .ok_or(TensorError::Oversized {
                axis_a: num_candidates,
                axis_b: row_width,
            })?;
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                axis_a: num_candidates,
                axis_b: row_width,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            candidates: num_candidates,
            row_width,
            transposed: false,
        })
    }

    /// Builds a tensor from an explicit feature-major
    /// `[row_width][num_candidates]` buffer, the transposed layout models
    /// in this family emit. Rows are served through strided access.
    pub fn from_transposed(
        row_width: usize,
        num_candidates: usize,
        data: Vec<f32>,
    ) -> Result<Self, TensorError> {
        let expected = row_width
            .checked_mul(num_candidates)
            .ok_or(TensorError::Oversized {
                axis_a: row_width,
                axis_b: num_candidates,
            })?;
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                axis_a: row_width,
                axis_b: num_candidates,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            candidates: num_candidates,
            row_width,
            transposed: true,
        })
    }

    /// An empty tensor: zero candidates, decodes to nothing.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            candidates: 0,
            row_width: 0,
            transposed: false,
        }
    }

    #[must_use]
    pub fn num_candidates(&self) -> usize {
        self.candidates
    }

    #[must_use]
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates == 0
    }

    #[must_use]
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    /// Value at `(candidate, position)` in the logical
    /// `[num_candidates][row_width]` orientation.
    #[must_use]
    pub fn value(&self, candidate: usize, position: usize) -> f32 {
        if self.transposed {
            self.data[position * self.candidates + candidate]
        } else {
            self.data[candidate * self.row_width + position]
        }
    }

    #[must_use]
    pub fn row(&self, candidate: usize) -> CandidateRow<'_> {
        CandidateRow {
            tensor: self,
            candidate,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = CandidateRow<'_>> + '_ {
        (0..self.candidates).map(move |candidate| self.row(candidate))
    }
}

/// Read-only view of one candidate row.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRow<'a> {
    tensor: &'a RawTensor,
    candidate: usize,
}

impl CandidateRow<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensor.row_width
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensor.row_width == 0
    }

    #[must_use]
    pub fn get(&self, position: usize) -> f32 {
        self.tensor.value(self.candidate, position)
    }

    /// The `(cx, cy, w, h)` slot, or `None` for a malformed row with fewer
    /// than 4 values.
    #[must_use]
    pub fn geometry(&self) -> Option<[f32; 4]> {
        if self.len() < 4 {
            return None;
        }
        Some([self.get(0), self.get(1), self.get(2), self.get(3)])
    }
}
