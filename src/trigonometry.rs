//! Fast sine and cosine for the sampling path.
//!
//! The angle is wrapped to `[-pi, pi)` and evaluated with CORDIC on an
//! `I16F16` fixed point number. The absolute error stays below `1e-3`, well
//! inside what the current loop can resolve.

use core::f32::consts::{PI, TAU};

use fixed::types::I16F16;

use crate::units::Radians;

/// Wraps an angle into `[-pi, pi)`.
pub fn wrap_angle(angle: f32) -> f32 {
    angle - TAU * libm::floorf((angle + PI) / TAU)
}

/// Shortest signed distance from `previous` to `current`, for angles that
/// are themselves within `[-pi, pi]`.
pub fn angle_difference(current: f32, previous: f32) -> f32 {
    let difference = current - previous;

    if difference > PI {
        difference - TAU
    } else if difference < -PI {
        difference + TAU
    } else {
        difference
    }
}

/// Returns `(cos, sin)` of `angle`.
///
/// Non-finite angles return `(NaN, NaN)` so that a corrupted position sample
/// propagates instead of silently turning into a valid angle.
pub fn cos_sin(angle: Radians) -> (f32, f32) {
    let Some(angle) = I16F16::checked_from_num(wrap_angle(angle.value())) else {
        return (f32::NAN, f32::NAN);
    };

    let (sin, cos) = cordic::sin_cos(angle);
    (cos.to_num(), sin.to_num())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn assert_matches_libm(angle: f32) {
        let (cos, sin) = cos_sin(Radians(angle));
        dbg!(angle, cos, sin);

        assert!((cos - angle.cos()).abs() < 1e-3);
        assert!((sin - angle.sin()).abs() < 1e-3);
    }

    #[test]
    fn cos_sin_within_error_budget() {
        for step in -80..=80 {
            assert_matches_libm(step as f32 * 0.1);
        }
    }

    #[test]
    fn cos_sin_large_angles() {
        assert_matches_libm(100.0);
        assert_matches_libm(-250.5);
    }

    #[test]
    fn cos_sin_non_finite() {
        let (cos, sin) = cos_sin(Radians(f32::NAN));
        assert!(cos.is_nan() && sin.is_nan());

        let (cos, sin) = cos_sin(Radians(f32::INFINITY));
        assert!(cos.is_nan() && sin.is_nan());
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-5);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert!((wrap_angle(0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn angle_difference_takes_shortest_path() {
        assert!((angle_difference(-3.1, 3.1) - (TAU - 6.2)).abs() < 1e-5);
        assert!((angle_difference(3.1, -3.1) + (TAU - 6.2)).abs() < 1e-5);
        assert!((angle_difference(0.3, 0.1) - 0.2).abs() < 1e-6);
    }
}
