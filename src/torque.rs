//! Torque (current) control core, the innermost and fastest loop.

use crate::controller::{FieldOrientedController, IdAndIqPoint, IdAndIqTunings};
use crate::park_clarke::{clarke_park, inverse_park, RotatingFrame, ThreePhase};
use crate::pid::{Limits, PidIncremental, PidTunings};
use crate::svpwm::svpwm;
use crate::trigonometry::cos_sin;
use crate::units::{Ampere, PhaseCurrents, PhasePwmDutyCycles, Radians, Volts};
use crate::FRAC_1_SQRT_3;

/// Regulates the d and q currents with one PID each. The PID outputs are
/// normalized voltages fed straight into the modulator.
#[derive(Debug, Clone)]
pub struct FocTorque {
    d_pid: PidIncremental,
    q_pid: PidIncremental,
    pole_pairs: f32,
}

impl Default for FocTorque {
    fn default() -> Self {
        Self::new()
    }
}

impl FocTorque {
    pub fn new() -> Self {
        let mut d_pid = PidIncremental::new(PidTunings::default(), Limits::symmetric(1.0));
        let mut q_pid = PidIncremental::new(PidTunings::default(), Limits::symmetric(1.0));
        d_pid.enable();
        q_pid.enable();

        Self {
            d_pid,
            q_pid,
            pole_pairs: 1.0,
        }
    }

    /// Gains as applied, after bus voltage normalization.
    pub fn current_tunings(&self) -> IdAndIqTunings {
        IdAndIqTunings {
            d: self.d_pid.tunings(),
            q: self.q_pid.tunings(),
        }
    }

    pub fn current_set_point(&self) -> IdAndIqPoint {
        IdAndIqPoint {
            id: Ampere(self.d_pid.current_set_point()),
            iq: Ampere(self.q_pid.current_set_point()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.d_pid.is_enabled() && self.q_pid.is_enabled()
    }
}

impl FieldOrientedController for FocTorque {
    type SetPoint = IdAndIqPoint;

    fn set_pole_pairs(&mut self, pole_pairs: u8) {
        self.pole_pairs = f32::from(pole_pairs);
    }

    /// The regulators output a voltage normalized to `vdc / sqrt(3)`, so
    /// the gains are scaled by its inverse to stay independent of the bus.
    fn set_current_tunings(&mut self, vdc: Volts, tunings: &IdAndIqTunings) {
        let scale = 1.0 / (FRAC_1_SQRT_3 * vdc.value());

        self.d_pid.set_tunings(tunings.d.scaled(scale));
        self.q_pid.set_tunings(tunings.q.scaled(scale));
    }

    fn set_point(&mut self, set_point: IdAndIqPoint) {
        self.d_pid.set_point(set_point.id.value());
        self.q_pid.set_point(set_point.iq.value());
    }

    fn enable(&mut self) {
        self.d_pid.enable();
        self.q_pid.enable();
    }

    fn disable(&mut self) {
        self.d_pid.disable();
        self.q_pid.disable();
    }

    fn reset(&mut self) {
        self.disable();
        self.enable();
    }

    fn calculate(
        &mut self,
        currents: PhaseCurrents,
        mechanical_angle: Radians,
    ) -> PhasePwmDutyCycles {
        let electrical_angle = mechanical_angle * self.pole_pairs;
        let (cos_angle, sin_angle) = cos_sin(electrical_angle);

        let measured = clarke_park(
            cos_angle,
            sin_angle,
            ThreePhase {
                a: currents.a.value(),
                b: currents.b.value(),
                c: currents.c.value(),
            },
        );

        let voltage = RotatingFrame {
            d: self.d_pid.process(measured.d),
            q: self.q_pid.process(measured.q),
        };

        PhasePwmDutyCycles::from_fractions(svpwm(inverse_park(cos_angle, sin_angle, voltage)))
    }
}
