mod animation;
pub mod scales;
pub mod transform;

use std::time::Duration;

use tracing::{debug, trace};

use crate::config::ViewerConfig;
use crate::consts::{FLING_MIN_VELOCITY, SCALE_EPSILON};
use crate::error::Result;
use crate::geometry::{PointF, Rect, RectF, Size};

use animation::{decay, ease, progress, Animation};
pub use scales::{ScaleBounds, ScaleMode};
pub use transform::{Rotation, Transform};

/// Emitted synchronously by every mutation that changed the transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportEvent {
    TransformChanged,
}

/// Affine view of one image on one surface.
///
/// Mutators clamp the scale to [`ScaleBounds`] and keep the image pinned to
/// the surface edges. Each effective change queues a
/// [`ViewportEvent::TransformChanged`], drained with [`Viewport::take_events`].
#[derive(Clone, Debug)]
pub struct Viewport {
    image_size: Size,
    surface_size: Size,
    mode: ScaleMode,
    max_zoom_over_origin: f64,
    zoom_animation: Duration,
    rotation: Rotation,
    bounds: ScaleBounds,
    scale: f64,
    translate: PointF,
    animation: Option<Animation>,
    events: Vec<ViewportEvent>,
}

impl Viewport {
    pub fn new(image_size: Size, surface_size: Size, mode: ScaleMode, config: &ViewerConfig) -> Self {
        let mut viewport = Self {
            image_size,
            surface_size,
            mode,
            max_zoom_over_origin: config.max_zoom_over_origin,
            zoom_animation: config.zoom_animation(),
            rotation: Rotation::Deg0,
            bounds: ScaleBounds::default(),
            scale: 1.0,
            translate: PointF::default(),
            animation: None,
            events: Vec::new(),
        };
        viewport.reset();
        viewport
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn image_size(&self) -> Size {
        self.image_size
    }

    pub fn surface_size(&self) -> Size {
        self.surface_size
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translate(&self) -> PointF {
        self.translate
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn bounds(&self) -> ScaleBounds {
        self.bounds
    }

    pub fn min_scale(&self) -> f64 {
        self.bounds.min
    }

    pub fn max_scale(&self) -> f64 {
        self.bounds.max
    }

    pub fn is_at_min_scale(&self) -> bool {
        self.scale <= self.bounds.min + SCALE_EPSILON
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Zero-area image or surface: nothing is visible.
    pub fn is_degenerate(&self) -> bool {
        self.image_size.is_empty() || self.surface_size.is_empty()
    }

    pub fn transform(&self) -> Transform {
        Transform {
            scale: self.scale,
            translate: self.translate,
            rotation: self.rotation,
            image_size: self.image_size,
        }
    }

    /// Part of the unrotated image currently on the surface, in source
    /// pixels. Empty when the viewport is degenerate.
    pub fn visible_source_rect(&self) -> Rect {
        if self.is_degenerate() {
            return Rect::default();
        }
        let surface = Rect::from_size(self.surface_size).to_f64();
        match self.transform().invert_rect(&surface) {
            Some(r) => r.round_out(self.image_size),
            None => Rect::default(),
        }
    }

    /// Where the image is drawn on the surface, in device pixels.
    pub fn draw_rect(&self) -> Option<RectF> {
        if self.is_degenerate() {
            return None;
        }
        self.transform().map_rect(&Rect::from_size(self.image_size))
    }

    /// Device point to image point; `None` outside the drawn image.
    pub fn device_to_source(&self, x: f64, y: f64) -> Option<PointF> {
        let p = self.transform().invert_point(PointF::new(x, y))?;
        let image = Rect::from_size(self.image_size).to_f64();
        image.contains_point(p).then_some(p)
    }

    /// Whether panning with a negative `direction` (towards the left edge) or
    /// positive `direction` (towards the right edge) would move the image.
    pub fn can_scroll_horizontally(&self, direction: i32) -> bool {
        let Some(draw) = self.draw_rect() else {
            return false;
        };
        if direction < 0 {
            draw.left < -SCALE_EPSILON
        } else {
            draw.right > self.surface_size.width as f64 + SCALE_EPSILON
        }
    }

    pub fn can_scroll_vertically(&self, direction: i32) -> bool {
        let Some(draw) = self.draw_rect() else {
            return false;
        };
        if direction < 0 {
            draw.top < -SCALE_EPSILON
        } else {
            draw.bottom > self.surface_size.height as f64 + SCALE_EPSILON
        }
    }

    /// Double-tap zoom presets in ascending order.
    pub fn step_zoom_scales(&self) -> Vec<f64> {
        self.bounds.steps()
    }

    pub fn take_events(&mut self) -> Vec<ViewportEvent> {
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    pub fn set_surface_size(&mut self, size: Size) {
        if self.surface_size == size {
            return;
        }
        self.surface_size = size;
        self.reset();
        self.emit();
    }

    pub fn set_image_size(&mut self, size: Size) {
        if self.image_size == size {
            return;
        }
        self.image_size = size;
        self.reset();
        self.emit();
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.reset();
        self.emit();
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        if self.is_degenerate() || !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let before = self.transform();
        self.translate.x += dx;
        self.translate.y += dy;
        self.constrain_translation();
        self.emit_if_changed(before);
    }

    /// Zoom so that the device point `(focus_x, focus_y)` stays put.
    pub fn zoom_to(&mut self, scale: f64, focus_x: f64, focus_y: f64, animate: bool) {
        if self.is_degenerate() || !scale.is_finite() {
            return;
        }
        let target = self.bounds.clamp(scale);
        let focus = PointF::new(focus_x, focus_y);
        if animate && !self.zoom_animation.is_zero() && (target - self.scale).abs() > SCALE_EPSILON {
            trace!(from = self.scale, to = target, "zoom animation started");
            self.animation = Some(Animation::Zoom {
                from: self.scale,
                to: target,
                focus,
                elapsed: Duration::ZERO,
                duration: self.zoom_animation,
            });
            return;
        }
        self.animation = None;
        self.apply_zoom(target, focus);
    }

    /// Relative zoom, as delivered by a pinch gesture.
    pub fn zoom_by(&mut self, factor: f64, focus_x: f64, focus_y: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.zoom_to(self.scale * factor, focus_x, focus_y, false);
        }
    }

    /// Rotate to an absolute quarter turn. The scale resets to the policy's
    /// base scale and the image is re-centred.
    pub fn rotate_to(&mut self, degrees: i32) -> Result<()> {
        let rotation = Rotation::from_degrees(degrees)?;
        if rotation == self.rotation {
            return Ok(());
        }
        debug!(degrees = rotation.degrees(), "rotate");
        self.rotation = rotation;
        self.reset();
        self.emit();
        Ok(())
    }

    pub fn rotate_by(&mut self, delta: i32) -> Result<()> {
        Rotation::from_degrees(delta)?;
        self.rotate_to(self.rotation.degrees() + delta.rem_euclid(360))
    }

    /// Centre the surface on a point of the unrotated image.
    pub fn locate(&mut self, x: f64, y: f64, animate: bool) {
        if self.is_degenerate() || !x.is_finite() || !y.is_finite() {
            return;
        }
        let q = self
            .rotation
            .rotate_point(PointF::new(x, y), self.image_size);
        let target = self.constrained(PointF::new(
            self.surface_size.width as f64 / 2.0 - q.x * self.scale,
            self.surface_size.height as f64 / 2.0 - q.y * self.scale,
        ));
        if animate && !self.zoom_animation.is_zero() {
            self.animation = Some(Animation::Translate {
                from: self.translate,
                to: target,
                elapsed: Duration::ZERO,
                duration: self.zoom_animation,
            });
            return;
        }
        let before = self.transform();
        self.animation = None;
        self.translate = target;
        self.emit_if_changed(before);
    }

    /// Start a decelerating pan with the given velocity in device px/s.
    pub fn fling(&mut self, velocity_x: f64, velocity_y: f64) {
        if self.is_degenerate() || velocity_x.hypot(velocity_y) < FLING_MIN_VELOCITY {
            return;
        }
        self.animation = Some(Animation::Fling {
            velocity: PointF::new(velocity_x, velocity_y),
        });
    }

    /// Stop any running animation where it is. The transform stays as the
    /// last step left it, so a settle event is queued.
    pub fn cancel_animation(&mut self) {
        if self.animation.take().is_some() {
            self.emit();
        }
    }

    /// Step the running animation by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        let Some(animation) = self.animation.take() else {
            return;
        };
        match animation {
            Animation::Zoom {
                from,
                to,
                focus,
                elapsed,
                duration,
            } => {
                let elapsed = elapsed + dt;
                let t = progress(elapsed, duration);
                self.apply_zoom(from + (to - from) * ease(t), focus);
                if t < 1.0 {
                    self.animation = Some(Animation::Zoom {
                        from,
                        to,
                        focus,
                        elapsed,
                        duration,
                    });
                } else {
                    self.emit();
                }
            }
            Animation::Translate {
                from,
                to,
                elapsed,
                duration,
            } => {
                let elapsed = elapsed + dt;
                let t = ease(progress(elapsed, duration));
                let before = self.transform();
                self.translate = self.constrained(PointF::new(
                    from.x + (to.x - from.x) * t,
                    from.y + (to.y - from.y) * t,
                ));
                self.emit_if_changed(before);
                if elapsed < duration {
                    self.animation = Some(Animation::Translate {
                        from,
                        to,
                        elapsed,
                        duration,
                    });
                } else {
                    self.emit();
                }
            }
            Animation::Fling { velocity } => {
                let secs = dt.as_secs_f64();
                let before = self.transform();
                self.translate.x += velocity.x * secs;
                self.translate.y += velocity.y * secs;
                self.constrain_translation();
                let moved = self.transform() != before;
                if moved {
                    self.emit();
                }
                match decay(velocity, dt) {
                    Some(next) if moved => self.animation = Some(Animation::Fling { velocity: next }),
                    _ => self.emit(),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn reset(&mut self) {
        self.animation = None;
        self.bounds = ScaleBounds::compute(
            self.rotation.apply(self.image_size),
            self.surface_size,
            self.mode,
            self.max_zoom_over_origin,
        );
        self.scale = self.bounds.min;
        let rotated = self.rotation.apply(self.image_size);
        self.translate = self.constrained(PointF::new(
            (self.surface_size.width as f64 - rotated.width as f64 * self.scale) / 2.0,
            (self.surface_size.height as f64 - rotated.height as f64 * self.scale) / 2.0,
        ));
    }

    fn apply_zoom(&mut self, target: f64, focus: PointF) {
        let before = self.transform();
        let ratio = target / self.scale;
        self.translate = PointF::new(
            focus.x - (focus.x - self.translate.x) * ratio,
            focus.y - (focus.y - self.translate.y) * ratio,
        );
        self.scale = target;
        self.constrain_translation();
        self.emit_if_changed(before);
    }

    fn constrain_translation(&mut self) {
        self.translate = self.constrained(self.translate);
    }

    /// Centre an axis whose scaled extent fits the surface; otherwise keep
    /// the image edges outside the surface.
    fn constrained(&self, t: PointF) -> PointF {
        let rotated = self.rotation.apply(self.image_size);
        let axis = |t: f64, image: u32, surface: u32| {
            let extent = image as f64 * self.scale;
            let surface = surface as f64;
            if extent <= surface {
                (surface - extent) / 2.0
            } else {
                t.clamp(surface - extent, 0.0)
            }
        };
        PointF::new(
            axis(t.x, rotated.width, self.surface_size.width),
            axis(t.y, rotated.height, self.surface_size.height),
        )
    }

    fn emit_if_changed(&mut self, before: Transform) {
        if self.transform() != before {
            self.emit();
        }
    }

    fn emit(&mut self) {
        self.events.push(ViewportEvent::TransformChanged);
    }
}
