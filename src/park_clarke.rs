//! Park and Clarke transformations (along with their inverses).
//!
//! The algorithms implemented here are based on [Microsemi's suggested implementation](https://www.microsemi.com/document-portal/doc_view/132799-park-inverse-park-and-clarke-inverse-clarke-transformations-mss-software-implementation-user-guide),
//! extended to use all three phase samples so that a measurement offset on
//! one phase does not leak into the other axis.

use crate::{FRAC_1_SQRT_3, SQRT_3};

/// Rotor synchronous frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotatingFrame {
    pub d: f32,
    pub q: f32,
}

/// Stationary two axis frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TwoPhaseStationary {
    pub alpha: f32,
    pub beta: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThreePhase {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

/// Clarke transform
///
/// Amplitude invariant form of equations 3 and 4 from the Microsemi guide,
/// without assuming `a + b + c = 0`.
pub fn clarke(inputs: ThreePhase) -> TwoPhaseStationary {
    TwoPhaseStationary {
        alpha: (2.0 * inputs.a - inputs.b - inputs.c) / 3.0,
        beta: FRAC_1_SQRT_3 * (inputs.b - inputs.c),
    }
}

/// Inverse Clarke transform
///
/// Implements equations 5-7 from the Microsemi guide.
pub fn inverse_clarke(inputs: TwoPhaseStationary) -> ThreePhase {
    ThreePhase {
        // Eq5
        a: inputs.alpha,
        // Eq6
        b: (-inputs.alpha + SQRT_3 * inputs.beta) / 2.0,
        // Eq7
        c: (-inputs.alpha - SQRT_3 * inputs.beta) / 2.0,
    }
}

/// Park transform
///
/// Implements equations 8 and 9 from the Microsemi guide.
pub fn park(cos_angle: f32, sin_angle: f32, inputs: TwoPhaseStationary) -> RotatingFrame {
    RotatingFrame {
        // Eq8
        d: cos_angle * inputs.alpha + sin_angle * inputs.beta,
        // Eq9
        q: cos_angle * inputs.beta - sin_angle * inputs.alpha,
    }
}

/// Inverse Park transform
///
/// Implements equations 10 and 11 from the Microsemi guide.
pub fn inverse_park(cos_angle: f32, sin_angle: f32, inputs: RotatingFrame) -> TwoPhaseStationary {
    TwoPhaseStationary {
        // Eq10
        alpha: cos_angle * inputs.d - sin_angle * inputs.q,
        // Eq11
        beta: sin_angle * inputs.d + cos_angle * inputs.q,
    }
}

/// Clarke followed by Park, the measurement side of every controller.
pub fn clarke_park(cos_angle: f32, sin_angle: f32, inputs: ThreePhase) -> RotatingFrame {
    park(cos_angle, sin_angle, clarke(inputs))
}
