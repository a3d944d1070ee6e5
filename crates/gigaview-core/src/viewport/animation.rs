use std::f64::consts::PI;
use std::time::Duration;

use crate::consts::{FLING_FRICTION_PER_SECOND, FLING_MIN_VELOCITY};
use crate::geometry::PointF;

/// A transform change spread over several frames.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Animation {
    Zoom {
        from: f64,
        to: f64,
        focus: PointF,
        elapsed: Duration,
        duration: Duration,
    },
    Translate {
        from: PointF,
        to: PointF,
        elapsed: Duration,
        duration: Duration,
    },
    Fling {
        velocity: PointF,
    },
}

/// Accelerate/decelerate easing on `[0, 1]`.
pub(crate) fn ease(t: f64) -> f64 {
    ((t + 1.0) * PI).cos() / 2.0 + 0.5
}

/// Fraction of `duration` covered by `elapsed`, in `[0, 1]`.
pub(crate) fn progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0)
}

/// Velocity after `dt` of friction; `None` once the fling has run out.
pub(crate) fn decay(velocity: PointF, dt: Duration) -> Option<PointF> {
    let factor = FLING_FRICTION_PER_SECOND.powf(dt.as_secs_f64());
    let next = PointF::new(velocity.x * factor, velocity.y * factor);
    (next.x.hypot(next.y) >= FLING_MIN_VELOCITY).then_some(next)
}
