use thiserror::Error;

use crate::detection::FrameSize;
use crate::MAX_FRAME_PIXELS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error("frame too large: {width}x{height} pixels (max: {max})")]
    TooLarge { width: u32, height: u32, max: u64 },

    #[error("buffer length {actual} does not match {width}x{height} RGB frame ({expected} bytes)")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// An already-decoded, tightly-packed RGB8 camera frame.
///
/// The shell owns capture and pixel-format conversion; this type only
/// guards the handoff: dimensions must be non-zero and sane, and the buffer
/// length must match exactly. Frames are immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RgbFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbFrame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimension { width, height });
        }

        let pixels = u64::from(width) * u64::from(height);
        if pixels > MAX_FRAME_PIXELS {
            return Err(FrameError::TooLarge {
                width,
                height,
                max: MAX_FRAME_PIXELS,
            });
        }

        let expected = (pixels as usize) * Self::BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The frame's dimensions as the decoder's validated size type.
    pub fn size(&self) -> FrameSize {
        FrameSize::from_validated(self.width as f32, self.height as f32)
    }
}
