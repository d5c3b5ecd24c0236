use serde::{Deserialize, Serialize};

use crate::detection::{Detection, FrameSize, GeometryError};

/// How the shell's preview view scales the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Aspect-preserving, letterboxed inside the view.
    FitCenter,
    /// Aspect-preserving, cropped to cover the view (camera preview
    /// default on both platforms).
    #[default]
    FillCenter,
}

/// Mapping from frame pixels to view coordinates.
///
/// Both shells must draw boxes at identical positions, so the scale and
/// centering offsets are computed here rather than per platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct ViewTransform {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    view_width: f32,
    view_height: f32,
}

impl ViewTransform {
    pub fn new(
        frame: FrameSize,
        view_width: f32,
        view_height: f32,
        mode: ScaleMode,
    ) -> Result<Self, GeometryError> {
        // View dimensions carry the same constraints as frame dimensions.
        let view = FrameSize::new(view_width, view_height)?;

        let scale_w = view.width() / frame.width();
        let scale_h = view.height() / frame.height();
        let scale = match mode {
            ScaleMode::FitCenter => scale_w.min(scale_h),
            ScaleMode::FillCenter => scale_w.max(scale_h),
        };

        Ok(Self {
            scale,
            offset_x: (view.width() - frame.width() * scale) / 2.0,
            offset_y: (view.height() - frame.height() * scale) / 2.0,
            view_width: view.width(),
            view_height: view.height(),
        })
    }

    #[must_use]
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn apply_x(&self, x: f32) -> f32 {
        x * self.scale + self.offset_x
    }

    #[must_use]
    pub fn apply_y(&self, y: f32) -> f32 {
        y * self.scale + self.offset_y
    }
}

/// A detection box projected into view coordinates, ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct OverlayBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub label: String,
    pub confidence: f32,
    /// Display caption, e.g. `"dog: 87%"`.
    pub caption: String,
}

/// Projects detections into view coordinates, dropping boxes that fall
/// entirely outside the view (possible under `FillCenter` cropping).
#[must_use]
pub fn project(detections: &[Detection], transform: &ViewTransform) -> Vec<OverlayBox> {
    detections
        .iter()
        .filter_map(|detection| {
            let left = transform.apply_x(detection.bbox.left());
            let top = transform.apply_y(detection.bbox.top());
            let right = transform.apply_x(detection.bbox.right());
            let bottom = transform.apply_y(detection.bbox.bottom());

            let visible = left < transform.view_width
                && top < transform.view_height
                && right > 0.0
                && bottom > 0.0;
            if !visible {
                return None;
            }

            let percent = (detection.confidence * 100.0) as i32;
            Some(OverlayBox {
                left,
                top,
                right,
                bottom,
                label: detection.label.clone(),
                confidence: detection.confidence,
                caption: format!("{}: {}%", detection.label, percent),
            })
        })
        .collect()
}
