#[allow(unused_imports)]
use micromath::F32Ext;

/// Sign with zero treated as positive, matching the telemetry convention of the
/// motor controller (`0 rpm` counts as forward).
#[inline]
pub fn sign(x: f32) -> f32 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Linear interpolation through `(x1, y1)` and `(x2, y2)` evaluated at `val`.
///
/// A degenerate range (`x1 == x2`) yields `y1`.
pub fn lerp(x1: f32, x2: f32, y1: f32, y2: f32, val: f32) -> f32 {
    if x2 - x1 == 0.0 {
        return y1;
    }
    let t = (val - x1) / (x2 - x1);
    y1 * (1.0 - t) + y2 * t
}

pub fn clampf(value: f32, min: f32, max: f32) -> f32 {
    let m = if value < min { min } else { value };
    if m > max {
        max
    } else {
        m
    }
}

/// Moves `value` towards `target` by at most `step`.
///
/// Snaps to `target` once the remaining distance is below `step`.
pub fn rate_limitf(value: &mut f32, target: f32, step: f32) {
    if (target - *value).abs() < step {
        *value = target;
    } else if target - *value > 0.0 {
        *value += step;
    } else {
        *value -= step;
    }
}
