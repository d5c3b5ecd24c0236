use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry value is not finite (NaN or Infinity)")]
    NonFinite,

    #[error("box corners are inverted or zero-area: ({left}, {top})-({right}, {bottom})")]
    DegenerateBox {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    },

    #[error("frame dimensions must be finite and positive, got {width}x{height}")]
    InvalidFrameSize { width: f32, height: f32 },
}

/// Axis-aligned box in absolute frame pixels.
///
/// `left < right` and `top < bottom` always hold; a degenerate box cannot be
/// constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct BoundingBox {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Result<Self, GeometryError> {
        if !left.is_finite() || !top.is_finite() || !right.is_finite() || !bottom.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        if left >= right || top >= bottom {
            return Err(GeometryError::DegenerateBox {
                left,
                top,
                right,
                bottom,
            });
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    #[must_use]
    pub const fn left(&self) -> f32 {
        self.left
    }

    #[must_use]
    pub const fn top(&self) -> f32 {
        self.top
    }

    #[must_use]
    pub const fn right(&self) -> f32 {
        self.right
    }

    #[must_use]
    pub const fn bottom(&self) -> f32 {
        self.bottom
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Validated source-frame dimensions in pixels.
///
/// Construction is the precondition boundary for frame size: zero, negative
/// or non-finite dimensions are a caller bug and are rejected here, never
/// silently tolerated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct FrameSize {
    width: f32,
    height: f32,
}

impl FrameSize {
    pub fn new(width: f32, height: f32) -> Result<Self, GeometryError> {
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(GeometryError::InvalidFrameSize { width, height });
        }
        Ok(Self { width, height })
    }

    /// Internal constructor for dimensions already validated elsewhere
    /// (e.g. non-zero pixel counts from a decoded frame buffer).
    pub(crate) const fn from_validated(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    #[must_use]
    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }
}

/// One calibrated detection in absolute frame pixels.
///
/// Created by the decoder, filtered (never edited) by the suppressor,
/// handed to the shell as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Detection {
    pub label: String,
    /// Final confidence after any object-presence weighting.
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Source frame dimensions, carried so the shell can project the box
    /// into view coordinates without extra context.
    pub frame_width: f32,
    pub frame_height: f32,
}
