//! Rotor alignment.
//!
//! Holds a voltage vector on the d axis at electrical angle zero until the
//! rotor settles there, then reads the encoder. The reading is the offset
//! between the encoder zero and the electrical zero.

use log::info;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::driver::{Completion, Drive, Encoder, Hardware, MotorDriver, PhaseCurrentsSubscriber};
use crate::park_clarke::TwoPhaseStationary;
use crate::svpwm::svpwm;
use crate::units::{PhaseCurrents, PhasePwmDutyCycles, Radians};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlignmentConfig {
    /// Holding voltage, as a fraction of `vdc / sqrt(3)`.
    pub voltage: f32,
    /// Seconds to wait for the rotor to settle.
    pub settle_time: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            voltage: 0.2,
            settle_time: 0.5,
        }
    }
}

#[derive(Debug)]
pub struct MotorAlignment<D: MotorDriver, E: Encoder> {
    drive: Drive<D, E>,
    duty_cycles: PhasePwmDutyCycles,
    remaining: u32,
    completion: Completion<Radians>,
}

impl<D: MotorDriver, E: Encoder> MotorAlignment<D, E> {
    pub fn new(hardware: Hardware<D, E>, config: &AlignmentConfig) -> Self {
        let mut drive = Drive::subscribe(hardware);
        let samples = drive.base_frequency().samples_in(config.settle_time);

        let duty_cycles = PhasePwmDutyCycles::from_fractions(svpwm(TwoPhaseStationary {
            alpha: config.voltage,
            beta: 0.0,
        }));

        drive.start();
        info!("alignment: holding {:?} for {} samples", duty_cycles.as_array(), samples);

        Self {
            drive,
            duty_cycles,
            remaining: samples,
            completion: Completion::Pending,
        }
    }

    pub fn completion(&self) -> Completion<Radians> {
        self.completion
    }

    pub fn into_hardware(self) -> Hardware<D, E> {
        self.drive.into_hardware()
    }
}

impl<D: MotorDriver, E: Encoder> PhaseCurrentsSubscriber for MotorAlignment<D, E> {
    fn phase_currents(&mut self, _currents: PhaseCurrents) {
        let Some(hardware) = self.drive.hardware() else {
            return;
        };

        hardware.driver.three_phase_pwm_output(self.duty_cycles);
        self.remaining -= 1;

        if self.remaining == 0 {
            let offset = hardware.encoder.read();
            self.drive.release();
            self.completion = Completion::Done(Some(offset));
            info!("alignment: rotor offset {} rad", offset.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_doubles::{hardware, Event};
    use crate::units::Hertz;

    #[test]
    fn holds_the_d_axis_then_reports_the_offset() {
        let (hardware, log, encoder) = hardware(Hertz(1_000));
        let config = AlignmentConfig {
            voltage: 0.3,
            settle_time: 0.01,
        };
        let mut alignment = MotorAlignment::new(hardware, &config);
        assert_eq!(log.lifecycle(), [Event::Subscribe(Hertz(1_000)), Event::Start]);

        encoder.position.set(0.42);
        for _ in 0..9 {
            alignment.phase_currents(PhaseCurrents::default());
            assert_eq!(alignment.completion(), Completion::Pending);
        }
        alignment.phase_currents(PhaseCurrents::default());

        assert_eq!(alignment.completion(), Completion::Done(Some(Radians(0.42))));
        assert!(!log.is_running());
        assert_eq!(log.subscription(), None);

        let outputs = log.outputs();
        assert_eq!(outputs.len(), 10);
        let [a, b, c] = outputs[0].as_array();
        dbg!(a, b, c);
        assert!(a > b && b == c);
    }

    #[test]
    fn samples_after_completion_are_ignored() {
        let (hardware, log, _) = hardware(Hertz(1_000));
        let mut alignment = MotorAlignment::new(
            hardware,
            &AlignmentConfig {
                voltage: 0.2,
                settle_time: 0.0,
            },
        );

        alignment.phase_currents(PhaseCurrents::default());
        assert!(alignment.completion().is_done());

        alignment.phase_currents(PhaseCurrents::default());
        assert_eq!(log.outputs().len(), 1);
    }

    #[test]
    fn dropping_mid_alignment_stops_the_bridge() {
        let (hardware, log, _) = hardware(Hertz(1_000));
        let mut alignment = MotorAlignment::new(hardware, &AlignmentConfig::default());
        alignment.phase_currents(PhaseCurrents::default());

        drop(alignment);
        assert!(!log.is_running());
        assert_eq!(log.subscription(), None);
    }
}
