//! Online friction and inertia estimation.
//!
//! The rotor obeys `τ = J·dω/dt + B·ω + τ₀`, with the electromagnetic torque
//! `τ = Kt·iq`. Fitting `[dω/dt, ω, 1] → τ` with recursive least squares
//! yields `[J, B, τ₀]`.

use crate::estimator::{EstimationMetrics, RecursiveLeastSquares};
use crate::park_clarke::{clarke_park, ThreePhase};
use crate::trigonometry::cos_sin;
use crate::units::{
    Hertz, NewtonMeterPerAmpere, NewtonMeterSecondPerRadian, NewtonMeterSecondSquared,
    PhaseCurrents, Radians, RadiansPerSecond,
};

pub const DEFAULT_FORGETTING_FACTOR: f32 = 0.99;
pub(crate) const INITIAL_COVARIANCE: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrictionAndInertia {
    pub inertia: NewtonMeterSecondSquared,
    pub friction: NewtonMeterSecondPerRadian,
    pub metrics: EstimationMetrics,
}

pub trait FrictionAndInertiaEstimator {
    fn update(
        &mut self,
        currents: PhaseCurrents,
        speed: RadiansPerSecond,
        electrical_angle: Radians,
        torque_constant: NewtonMeterPerAmpere,
    ) -> FrictionAndInertia;
}

/// Fits the mechanical model once per call, at a fixed sampling frequency.
#[derive(Debug, Clone)]
pub struct RealTimeFrictionAndInertiaEstimator {
    rls: RecursiveLeastSquares<3>,
    sampling_frequency: f32,
    previous_speed: RadiansPerSecond,
}

impl RealTimeFrictionAndInertiaEstimator {
    pub fn new(forgetting_factor: f32, sampling_frequency: Hertz) -> Self {
        Self::with_sampling_frequency(forgetting_factor, sampling_frequency.value() as f32)
    }

    /// For outer loops whose rate is not a whole number of hertz.
    pub fn with_sampling_frequency(forgetting_factor: f32, sampling_frequency: f32) -> Self {
        Self {
            rls: RecursiveLeastSquares::new(INITIAL_COVARIANCE, forgetting_factor),
            sampling_frequency,
            previous_speed: RadiansPerSecond::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.rls.reset();
        self.previous_speed = RadiansPerSecond::ZERO;
    }
}

impl FrictionAndInertiaEstimator for RealTimeFrictionAndInertiaEstimator {
    fn update(
        &mut self,
        currents: PhaseCurrents,
        speed: RadiansPerSecond,
        electrical_angle: Radians,
        torque_constant: NewtonMeterPerAmpere,
    ) -> FrictionAndInertia {
        let (cos_angle, sin_angle) = cos_sin(electrical_angle);
        let iq = clarke_park(
            cos_angle,
            sin_angle,
            ThreePhase {
                a: currents.a.value(),
                b: currents.b.value(),
                c: currents.c.value(),
            },
        )
        .q;

        let acceleration = (speed - self.previous_speed).value() * self.sampling_frequency;
        self.previous_speed = speed;

        let metrics = self.rls.update(
            &[acceleration, speed.value(), 1.0],
            iq * torque_constant.value(),
        );
        let [inertia, friction, _] = *self.rls.coefficients();

        FrictionAndInertia {
            inertia: NewtonMeterSecondSquared(inertia),
            friction: NewtonMeterSecondPerRadian(friction),
            metrics,
        }
    }
}
