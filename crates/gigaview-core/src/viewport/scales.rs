use serde::{Deserialize, Serialize};

use crate::consts::{ORIGIN_SCALE, SCALE_EPSILON};
use crate::geometry::Size;

/// Policy for the resting (minimum) scale of a freshly bound image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Whole image visible.
    #[default]
    Fit,
    /// Surface fully covered, image cropped on one axis.
    Fill,
    /// One source pixel per device pixel.
    Origin,
}

impl std::fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fit => write!(f, "Fit"),
            Self::Fill => write!(f, "Fill"),
            Self::Origin => write!(f, "Origin"),
        }
    }
}

/// Scale presets and clamping bounds for one image/surface/rotation combination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleBounds {
    /// Whole image fits the surface.
    pub full: f64,
    /// Image covers the surface.
    pub fill: f64,
    pub origin: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for ScaleBounds {
    fn default() -> Self {
        Self {
            full: ORIGIN_SCALE,
            fill: ORIGIN_SCALE,
            origin: ORIGIN_SCALE,
            min: ORIGIN_SCALE,
            max: ORIGIN_SCALE,
        }
    }
}

impl ScaleBounds {
    /// `image` is the image size after rotation. Degenerate sizes yield the
    /// default 1:1 bounds.
    pub fn compute(image: Size, surface: Size, mode: ScaleMode, max_zoom_over_origin: f64) -> Self {
        if image.is_empty() || surface.is_empty() {
            return Self::default();
        }
        let sx = surface.width as f64 / image.width as f64;
        let sy = surface.height as f64 / image.height as f64;
        let full = sx.min(sy);
        let fill = sx.max(sy);
        let origin = ORIGIN_SCALE;
        let min = match mode {
            ScaleMode::Fit => full,
            ScaleMode::Fill => fill,
            ScaleMode::Origin => origin,
        };
        let max = (fill.max(origin) * max_zoom_over_origin).max(min);
        Self {
            full,
            fill,
            origin,
            min,
            max,
        }
    }

    pub fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min, self.max)
    }

    /// Double-tap cycle: distinct presets in ascending order.
    pub fn steps(&self) -> Vec<f64> {
        let mut steps: Vec<f64> = [self.min, self.fill, self.origin, self.max]
            .into_iter()
            .filter(|s| *s >= self.min - SCALE_EPSILON && *s <= self.max + SCALE_EPSILON)
            .collect();
        steps.sort_by(|a, b| a.total_cmp(b));
        steps.dedup_by(|a, b| (*a - *b).abs() < SCALE_EPSILON);
        steps
    }

    /// Next preset above `current`, wrapping back to the minimum.
    pub fn next_step(&self, current: f64) -> f64 {
        self.steps()
            .into_iter()
            .find(|s| *s > current + SCALE_EPSILON)
            .unwrap_or(self.min)
    }
}
