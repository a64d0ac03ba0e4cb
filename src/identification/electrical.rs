//! Winding resistance, inductance and pole pair identification.
//!
//! First a square wave voltage is applied on the alpha axis with the rotor
//! held at electrical angle zero, and `v = R·i + L·di/dt + c` is fitted to
//! the response. Then the voltage vector is rotated open loop through one
//! electrical revolution; the rotor follows it through `2π / p` mechanical
//! radians.

use core::f32::consts::TAU;

use log::{info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::driver::{Completion, Drive, Encoder, Hardware, MotorDriver, PhaseCurrentsSubscriber};
use crate::estimator::{Convergence, RecursiveLeastSquares};
use crate::friction_inertia::INITIAL_COVARIANCE;
use crate::park_clarke::{clarke, inverse_park, RotatingFrame, ThreePhase, TwoPhaseStationary};
use crate::svpwm::svpwm;
use crate::trigonometry::{angle_difference, cos_sin};
use crate::units::{MilliHenry, Ohm, PhaseCurrents, PhasePwmDutyCycles, Radians, Volts};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElectricalIdentificationConfig {
    /// Square wave amplitude, as a fraction of `vdc / sqrt(3)`.
    pub test_voltage: f32,
    /// Samples per half period of the square wave.
    pub square_wave_half_period: u32,
    /// Rotating vector amplitude, as a fraction of `vdc / sqrt(3)`.
    pub rotation_voltage: f32,
    /// Seconds held before and after the rotation.
    pub settle_time: f32,
    /// Seconds for one electrical revolution.
    pub rotation_time: f32,
    pub timeout: f32,
    pub forgetting_factor: f32,
    pub innovation_threshold: f32,
    pub uncertainty_threshold: f32,
}

impl Default for ElectricalIdentificationConfig {
    fn default() -> Self {
        Self {
            test_voltage: 0.1,
            square_wave_half_period: 10,
            rotation_voltage: 0.2,
            settle_time: 0.2,
            rotation_time: 1.0,
            timeout: 3.0,
            forgetting_factor: 0.999,
            innovation_threshold: 0.01,
            uncertainty_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElectricalParameters {
    pub resistance: Ohm,
    pub inductance: MilliHenry,
    pub pole_pairs: u8,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Winding {
        samples: u32,
        previous_current: f32,
        previous_voltage: f32,
    },
    Settle {
        remaining: u32,
    },
    Rotation {
        step: u32,
        previous_position: f32,
        travelled: f32,
    },
}

enum Step {
    Output(PhasePwmDutyCycles),
    Finish(Option<ElectricalParameters>),
}

#[derive(Debug)]
pub struct ElectricalParametersIdentification<D: MotorDriver, E: Encoder> {
    drive: Drive<D, E>,
    config: ElectricalIdentificationConfig,
    vdc: f32,
    sampling_frequency: f32,
    rls: RecursiveLeastSquares<3>,
    phase: Phase,
    winding: Option<(Ohm, MilliHenry)>,
    elapsed: u32,
    timeout_samples: u32,
    settle_samples: u32,
    rotation_samples: u32,
    completion: Completion<ElectricalParameters>,
}

impl<D: MotorDriver, E: Encoder> ElectricalParametersIdentification<D, E> {
    pub fn new(
        hardware: Hardware<D, E>,
        vdc: Volts,
        config: &ElectricalIdentificationConfig,
    ) -> Self {
        let mut drive = Drive::subscribe(hardware);
        let frequency = drive.base_frequency();
        drive.start();
        info!("electrical identification: started");

        Self {
            drive,
            config: *config,
            vdc: vdc.value(),
            sampling_frequency: frequency.value() as f32,
            rls: RecursiveLeastSquares::new(INITIAL_COVARIANCE, config.forgetting_factor),
            phase: Phase::Winding {
                samples: 0,
                previous_current: 0.0,
                previous_voltage: 0.0,
            },
            winding: None,
            elapsed: 0,
            timeout_samples: frequency.samples_in(config.timeout),
            settle_samples: frequency.samples_in(config.settle_time),
            rotation_samples: frequency.samples_in(config.rotation_time),
            completion: Completion::Pending,
        }
    }

    pub fn completion(&self) -> Completion<ElectricalParameters> {
        self.completion
    }

    pub fn into_hardware(self) -> Hardware<D, E> {
        self.drive.into_hardware()
    }

    fn advance(&mut self, currents: PhaseCurrents, position: Radians) -> Step {
        match self.phase {
            Phase::Winding {
                samples,
                previous_current,
                previous_voltage,
            } => self.winding_step(currents, samples, previous_current, previous_voltage),
            Phase::Settle { remaining } => {
                if remaining == 0 {
                    self.phase = Phase::Rotation {
                        step: 1,
                        previous_position: position.value(),
                        travelled: 0.0,
                    };
                    Step::Output(self.rotating_vector(1))
                } else {
                    self.phase = Phase::Settle {
                        remaining: remaining - 1,
                    };
                    Step::Output(self.rotating_vector(0))
                }
            }
            Phase::Rotation {
                step,
                previous_position,
                travelled,
            } => {
                let travelled = travelled + angle_difference(position.value(), previous_position);

                if step >= self.rotation_samples + self.settle_samples {
                    Step::Finish(self.finish(travelled))
                } else {
                    self.phase = Phase::Rotation {
                        step: step + 1,
                        previous_position: position.value(),
                        travelled,
                    };
                    Step::Output(self.rotating_vector(step + 1))
                }
            }
        }
    }

    /// The current measured now is the response to the voltage applied
    /// after the previous sample.
    fn winding_step(
        &mut self,
        currents: PhaseCurrents,
        samples: u32,
        previous_current: f32,
        previous_voltage: f32,
    ) -> Step {
        let current = clarke(ThreePhase {
            a: currents.a.value(),
            b: currents.b.value(),
            c: currents.c.value(),
        })
        .alpha;

        if samples > 0 {
            let metrics = self.rls.update(
                &[
                    0.5 * (current + previous_current),
                    (current - previous_current) * self.sampling_frequency,
                    1.0,
                ],
                previous_voltage,
            );

            let converged = RecursiveLeastSquares::<3>::evaluate_convergence(
                &metrics,
                self.config.innovation_threshold,
                self.config.uncertainty_threshold,
            );
            let [resistance, inductance, _] = *self.rls.coefficients();

            if converged == Convergence::Converged && resistance > 0.0 && inductance > 0.0 {
                info!(
                    "electrical identification: R = {} ohm, L = {} mH after {} samples",
                    resistance,
                    inductance * 1000.0,
                    samples
                );
                self.winding = Some((Ohm(resistance), MilliHenry(inductance * 1000.0)));
                self.phase = Phase::Settle {
                    remaining: self.settle_samples,
                };
                return Step::Output(self.rotating_vector(0));
            }
        }

        let level = if (samples / self.config.square_wave_half_period.max(1)) % 2 == 0 {
            self.config.test_voltage
        } else {
            -self.config.test_voltage
        };
        let duty_cycles = PhasePwmDutyCycles::from_fractions(svpwm(TwoPhaseStationary {
            alpha: level,
            beta: 0.0,
        }));

        self.phase = Phase::Winding {
            samples: samples + 1,
            previous_current: current,
            previous_voltage: applied_voltage(duty_cycles, self.vdc).alpha,
        };
        Step::Output(duty_cycles)
    }

    /// Voltage vector at `step / rotation_samples` of an electrical turn.
    fn rotating_vector(&self, step: u32) -> PhasePwmDutyCycles {
        let fraction = step.min(self.rotation_samples) as f32 / self.rotation_samples as f32;
        let (cos_angle, sin_angle) = cos_sin(Radians(TAU * fraction));

        PhasePwmDutyCycles::from_fractions(svpwm(inverse_park(
            cos_angle,
            sin_angle,
            RotatingFrame {
                d: self.config.rotation_voltage,
                q: 0.0,
            },
        )))
    }

    fn finish(&self, travelled: f32) -> Option<ElectricalParameters> {
        let (resistance, inductance) = self.winding?;
        let pole_pairs = libm::roundf(TAU / libm::fabsf(travelled));

        if !(1.0..=f32::from(u8::MAX)).contains(&pole_pairs) {
            warn!(
                "electrical identification: rotor travelled {} rad, no pole pair count",
                travelled
            );
            return None;
        }

        Some(ElectricalParameters {
            resistance,
            inductance,
            pole_pairs: pole_pairs as u8,
        })
    }
}

/// Alpha/beta voltage produced by the given duty cycles.
fn applied_voltage(duty_cycles: PhasePwmDutyCycles, vdc: f32) -> TwoPhaseStationary {
    let [a, b, c] = duty_cycles.as_array().map(|duty| f32::from(duty) * 0.01 * vdc);
    clarke(ThreePhase { a, b, c })
}

impl<D: MotorDriver, E: Encoder> PhaseCurrentsSubscriber
    for ElectricalParametersIdentification<D, E>
{
    fn phase_currents(&mut self, currents: PhaseCurrents) {
        let Some(hardware) = self.drive.hardware() else {
            return;
        };
        let position = hardware.encoder.read();

        self.elapsed += 1;
        let step = if self.elapsed > self.timeout_samples {
            warn!("electrical identification: timed out");
            Step::Finish(None)
        } else {
            self.advance(currents, position)
        };

        match step {
            Step::Output(duty_cycles) => {
                if let Some(hardware) = self.drive.hardware() {
                    hardware.driver.three_phase_pwm_output(duty_cycles);
                }
            }
            Step::Finish(result) => {
                self.drive.release();
                if let Some(parameters) = &result {
                    info!("electrical identification: {:?}", parameters);
                }
                self.completion = Completion::Done(result);
            }
        }
    }
}
