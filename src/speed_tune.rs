//! Continuous speed regulator tuning from the estimated mechanical model.
//!
//! Every outer loop tick feeds the friction and inertia estimator. Once the
//! estimate has converged the speed gains are placed at the outer loop
//! bandwidth `ωc = 2π·f`: `kp = ωc·J`, `ki = ωc·B`, `kd = 0`.

use core::f32::consts::TAU;

use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::controller::SpeedTunings;
use crate::driver::LowPriorityInterrupt;
use crate::estimator::{Convergence, RecursiveLeastSquares};
use crate::friction_inertia::{
    FrictionAndInertiaEstimator, RealTimeFrictionAndInertiaEstimator, DEFAULT_FORGETTING_FACTOR,
};
use crate::pid::PidTunings;
use crate::speed::{FocWithSpeedPid, SpeedLoopObserver, SpeedLoopSample};
use crate::units::{Ampere, Hertz, NewtonMeterPerAmpere, NyquistFactor};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedTuneConfig {
    pub innovation_threshold: f32,
    pub uncertainty_threshold: f32,
    /// Rate of the speed loop, in hertz.
    pub speed_sampling_frequency: f32,
    pub torque_constant: NewtonMeterPerAmpere,
    pub forgetting_factor: f32,
}

impl Default for SpeedTuneConfig {
    fn default() -> Self {
        Self {
            innovation_threshold: 0.001,
            uncertainty_threshold: 0.1,
            speed_sampling_frequency: 1000.0,
            torque_constant: NewtonMeterPerAmpere(0.1),
            forgetting_factor: DEFAULT_FORGETTING_FACTOR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealTimeSpeedPidTune<E = RealTimeFrictionAndInertiaEstimator> {
    estimator: E,
    config: SpeedTuneConfig,
    bandwidth: f32,
    tunings: Option<SpeedTunings>,
}

impl RealTimeSpeedPidTune {
    pub fn new(config: SpeedTuneConfig) -> Self {
        let estimator = RealTimeFrictionAndInertiaEstimator::with_sampling_frequency(
            config.forgetting_factor,
            config.speed_sampling_frequency,
        );
        Self::with_estimator(config, estimator)
    }
}

impl<E: FrictionAndInertiaEstimator> RealTimeSpeedPidTune<E> {
    pub fn with_estimator(config: SpeedTuneConfig, estimator: E) -> Self {
        Self {
            estimator,
            config,
            bandwidth: config.speed_sampling_frequency * TAU,
            tunings: None,
        }
    }

    /// Gains from the last converged estimate.
    pub fn tunings(&self) -> Option<SpeedTunings> {
        self.tunings
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }
}

impl<E: FrictionAndInertiaEstimator> SpeedLoopObserver for RealTimeSpeedPidTune<E> {
    fn speed_loop_tick(&mut self, sample: &SpeedLoopSample) -> Option<SpeedTunings> {
        let result = self.estimator.update(
            sample.currents,
            sample.speed,
            sample.electrical_angle,
            self.config.torque_constant,
        );

        match RecursiveLeastSquares::<3>::evaluate_convergence(
            &result.metrics,
            self.config.innovation_threshold,
            self.config.uncertainty_threshold,
        ) {
            Convergence::Converged => {
                let tunings = PidTunings::new(
                    self.bandwidth * result.inertia.value(),
                    self.bandwidth * result.friction.value(),
                    0.0,
                );
                debug!(
                    "speed tune: J = {} B = {} -> kp = {} ki = {}",
                    result.inertia.value(),
                    result.friction.value(),
                    tunings.kp,
                    tunings.ki
                );
                self.tunings = Some(tunings);
                Some(tunings)
            }
            Convergence::NotConverged => None,
        }
    }
}

/// Speed controller continuously retuned from its own measurements.
pub type FocWithSpeedPidAndRealTimeTune<I> = FocWithSpeedPid<I, RealTimeSpeedPidTune>;

impl<I: LowPriorityInterrupt> FocWithSpeedPid<I, RealTimeSpeedPidTune> {
    /// A speed controller whose tuner samples at the outer loop rate.
    pub fn with_real_time_tune(
        interrupt: I,
        max_current: Ampere,
        pwm_frequency: Hertz,
        nyquist: NyquistFactor,
    ) -> Self {
        let config = SpeedTuneConfig {
            speed_sampling_frequency: nyquist.outer_frequency(pwm_frequency),
            ..SpeedTuneConfig::default()
        };

        Self::with_observer(
            interrupt,
            max_current,
            pwm_frequency,
            nyquist,
            RealTimeSpeedPidTune::new(config),
        )
    }
}
