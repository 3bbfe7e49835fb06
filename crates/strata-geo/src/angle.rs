//! Angle normalization helpers shared by rectangles and tiling schemes.

use std::f64::consts::PI;

/// A full turn in radians.
pub const TWO_PI: f64 = 2.0 * PI;

/// Tolerance used when comparing texture coordinates.
pub const EPSILON7: f64 = 1e-7;

/// Tolerance used when comparing longitudes against rectangle edges.
pub const EPSILON14: f64 = 1e-14;

/// Returns `true` if `a` and `b` differ by at most `epsilon`.
#[must_use]
pub fn equals_epsilon(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}

/// Wrap an angle into `[0, 2π]`.
///
/// Multiples of 2π other than zero map to 2π rather than 0 so that an
/// eastern edge at the antimeridian keeps its meaning.
#[must_use]
pub fn zero_to_two_pi(angle: f64) -> f64 {
    if (0.0..=TWO_PI).contains(&angle) {
        return angle;
    }
    let wrapped = angle.rem_euclid(TWO_PI);
    if wrapped.abs() < EPSILON14 && angle.abs() > EPSILON14 {
        return TWO_PI;
    }
    wrapped
}

/// Wrap an angle into `[-π, π]`.
#[must_use]
pub fn negative_pi_to_pi(angle: f64) -> f64 {
    if (-PI..=PI).contains(&angle) {
        return angle;
    }
    zero_to_two_pi(angle + PI) - PI
}
