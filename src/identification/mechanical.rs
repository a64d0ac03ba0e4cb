//! Friction and inertia identification under closed loop speed control.

use log::{info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::controller::{FieldOrientedController, SpeedControl};
use crate::driver::{Completion, Drive, Encoder, Hardware, MotorDriver, PhaseCurrentsSubscriber};
use crate::estimator::{Convergence, RecursiveLeastSquares};
use crate::friction_inertia::{FrictionAndInertiaEstimator, RealTimeFrictionAndInertiaEstimator};
use crate::trigonometry::angle_difference;
use crate::units::{
    NewtonMeterPerAmpere, NewtonMeterSecondPerRadian, NewtonMeterSecondSquared, PhaseCurrents,
    Radians, RadiansPerSecond,
};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MechanicalIdentificationConfig {
    pub timeout: f32,
    pub forgetting_factor: f32,
    pub innovation_threshold: f32,
    pub uncertainty_threshold: f32,
}

impl Default for MechanicalIdentificationConfig {
    fn default() -> Self {
        Self {
            timeout: 5.0,
            forgetting_factor: 0.999,
            innovation_threshold: 1e-4,
            uncertainty_threshold: 1e-2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MechanicalParameters {
    pub friction: NewtonMeterSecondPerRadian,
    pub inertia: NewtonMeterSecondSquared,
}

/// What the session needs to know about the motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MechanicalTest {
    pub target_speed: RadiansPerSecond,
    pub torque_constant: NewtonMeterPerAmpere,
    pub pole_pairs: u8,
}

/// Spins the motor at the target speed and fits the mechanical model to
/// the measured speed and q axis current.
///
/// The speed controller runs on every sample; its low priority work still
/// has to be serviced through [`service_deferred`](Self::service_deferred).
#[derive(Debug)]
pub struct MechanicalParametersIdentification<
    D: MotorDriver,
    E: Encoder,
    C: FieldOrientedController,
> {
    drive: Drive<D, E>,
    controller: C,
    estimator: RealTimeFrictionAndInertiaEstimator,
    config: MechanicalIdentificationConfig,
    torque_constant: NewtonMeterPerAmpere,
    pole_pairs: f32,
    sampling_frequency: f32,
    previous_position: f32,
    elapsed: u32,
    timeout_samples: u32,
    completion: Completion<MechanicalParameters>,
}

impl<D: MotorDriver, E: Encoder, C: SpeedControl> MechanicalParametersIdentification<D, E, C> {
    /// Enables the controller at the target speed, then starts the bridge.
    pub fn new(
        mut hardware: Hardware<D, E>,
        mut controller: C,
        test: MechanicalTest,
        config: &MechanicalIdentificationConfig,
    ) -> Self {
        let previous_position = hardware.encoder.read().value();

        controller.enable();
        controller.set_point(test.target_speed);

        let mut drive = Drive::subscribe(hardware);
        let frequency = drive.base_frequency();
        drive.start();
        info!(
            "mechanical identification: spinning at {} rad/s",
            test.target_speed.value()
        );

        Self {
            drive,
            controller,
            estimator: RealTimeFrictionAndInertiaEstimator::new(
                config.forgetting_factor,
                frequency,
            ),
            config: *config,
            torque_constant: test.torque_constant,
            pole_pairs: f32::from(test.pole_pairs),
            sampling_frequency: frequency.value() as f32,
            previous_position,
            elapsed: 0,
            timeout_samples: frequency.samples_in(config.timeout),
            completion: Completion::Pending,
        }
    }
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController>
    MechanicalParametersIdentification<D, E, C>
{
    pub fn completion(&self) -> Completion<MechanicalParameters> {
        self.completion
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn service_deferred(&mut self) {
        self.controller.service_deferred();
    }

    /// Stops the drive and hands back the hardware and the disabled
    /// controller.
    pub fn into_parts(self) -> (Hardware<D, E>, C) {
        let Self {
            drive,
            mut controller,
            ..
        } = self;

        let hardware = drive.into_hardware();
        controller.disable();
        (hardware, controller)
    }

    fn finish(&mut self, result: Option<MechanicalParameters>) {
        self.drive.release();
        self.controller.disable();
        self.completion = Completion::Done(result);
    }
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController> PhaseCurrentsSubscriber
    for MechanicalParametersIdentification<D, E, C>
{
    fn phase_currents(&mut self, currents: PhaseCurrents) {
        let Some(hardware) = self.drive.hardware() else {
            return;
        };

        let position = hardware.encoder.read();
        let duty_cycles = self.controller.calculate(currents, position);
        hardware.driver.three_phase_pwm_output(duty_cycles);

        let speed = angle_difference(position.value(), self.previous_position)
            * self.sampling_frequency;
        self.previous_position = position.value();

        let estimate = self.estimator.update(
            currents,
            RadiansPerSecond(speed),
            Radians(position.value() * self.pole_pairs),
            self.torque_constant,
        );

        let converged = RecursiveLeastSquares::<3>::evaluate_convergence(
            &estimate.metrics,
            self.config.innovation_threshold,
            self.config.uncertainty_threshold,
        );

        self.elapsed += 1;
        if converged == Convergence::Converged {
            let parameters = MechanicalParameters {
                friction: estimate.friction,
                inertia: estimate.inertia,
            };
            info!(
                "mechanical identification: {:?} after {} samples",
                parameters, self.elapsed
            );
            self.finish(Some(parameters));
        } else if self.elapsed > self.timeout_samples {
            warn!("mechanical identification: timed out");
            self.finish(None);
        }
    }
}
