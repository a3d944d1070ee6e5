use crate::error::{GigaviewError, Result};
use crate::geometry::{PointF, Rect, RectF, Size};

/// Clockwise rotation of the image on the surface. Region decoders only
/// produce axis-aligned pixels, so quarter turns are the only ones allowed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalise any multiple of 90 (negative or > 360 included).
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(GigaviewError::InvalidRotation { degrees });
        }
        Ok(match degrees.rem_euclid(360) {
            0 => Self::Deg0,
            90 => Self::Deg90,
            180 => Self::Deg180,
            _ => Self::Deg270,
        })
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    /// Size of `size` after this rotation.
    pub fn apply(self, size: Size) -> Size {
        if self.swaps_axes() {
            size.transposed()
        } else {
            size
        }
    }

    /// Map a point in unrotated image space into rotated image space.
    pub fn rotate_point(self, p: PointF, image: Size) -> PointF {
        let w = image.width as f64;
        let h = image.height as f64;
        match self {
            Self::Deg0 => p,
            Self::Deg90 => PointF::new(h - p.y, p.x),
            Self::Deg180 => PointF::new(w - p.x, h - p.y),
            Self::Deg270 => PointF::new(p.y, w - p.x),
        }
    }

    /// Inverse of [`Rotation::rotate_point`].
    pub fn unrotate_point(self, q: PointF, image: Size) -> PointF {
        let w = image.width as f64;
        let h = image.height as f64;
        match self {
            Self::Deg0 => q,
            Self::Deg90 => PointF::new(q.y, h - q.x),
            Self::Deg180 => PointF::new(w - q.x, h - q.y),
            Self::Deg270 => PointF::new(w - q.y, q.x),
        }
    }
}

/// Snapshot of the affine mapping from source-image pixels to device pixels:
/// `device = rotate(source) * scale + translate`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub translate: PointF,
    pub rotation: Rotation,
    pub image_size: Size,
}

impl Transform {
    pub fn is_degenerate(&self) -> bool {
        !(self.scale.is_finite() && self.scale > 0.0)
            || !self.translate.is_finite()
            || self.image_size.is_empty()
    }

    pub fn map_point(&self, p: PointF) -> PointF {
        let q = self.rotation.rotate_point(p, self.image_size);
        PointF::new(
            q.x * self.scale + self.translate.x,
            q.y * self.scale + self.translate.y,
        )
    }

    /// Device point back to source space, `None` if the transform cannot be inverted.
    pub fn invert_point(&self, d: PointF) -> Option<PointF> {
        if self.is_degenerate() {
            return None;
        }
        let q = PointF::new(
            (d.x - self.translate.x) / self.scale,
            (d.y - self.translate.y) / self.scale,
        );
        let p = self.rotation.unrotate_point(q, self.image_size);
        p.is_finite().then_some(p)
    }

    /// Project a source rect to device space. `None` when the result is not finite.
    pub fn map_rect(&self, r: &Rect) -> Option<RectF> {
        let a = self.map_point(PointF::new(r.left as f64, r.top as f64));
        let b = self.map_point(PointF::new(r.right as f64, r.bottom as f64));
        let mapped = RectF::from_corners(a, b);
        mapped.is_finite().then_some(mapped)
    }

    /// Device rect back to a source rect, clipped to the image.
    pub fn invert_rect(&self, r: &RectF) -> Option<RectF> {
        let a = self.invert_point(PointF::new(r.left, r.top))?;
        let b = self.invert_point(PointF::new(r.right, r.bottom))?;
        RectF::from_corners(a, b).intersection(&Rect::from_size(self.image_size).to_f64())
    }
}
