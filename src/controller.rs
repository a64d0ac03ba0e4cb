//! Interfaces shared by the control cores.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pid::PidTunings;
use crate::units::{Ampere, PhaseCurrents, PhasePwmDutyCycles, Radians, RadiansPerSecond, Volts};

/// Gains of the d and q current regulators.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdAndIqTunings {
    pub d: PidTunings,
    pub q: PidTunings,
}

impl IdAndIqTunings {
    /// The same gains on both axes.
    pub const fn both(tunings: PidTunings) -> Self {
        Self {
            d: tunings,
            q: tunings,
        }
    }
}

/// Current setpoint in the rotor frame. `id` stays at zero for surface
/// mounted magnets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdAndIqPoint {
    pub id: Ampere,
    pub iq: Ampere,
}

impl IdAndIqPoint {
    pub const fn new(id: Ampere, iq: Ampere) -> Self {
        Self { id, iq }
    }
}

/// Continuous time speed loop gains.
pub type SpeedTunings = PidTunings;

/// A control core that turns one sample of phase currents and rotor position
/// into duty cycles.
pub trait FieldOrientedController {
    type SetPoint: Copy;

    fn set_pole_pairs(&mut self, pole_pairs: u8);
    fn set_current_tunings(&mut self, vdc: Volts, tunings: &IdAndIqTunings);
    fn set_point(&mut self, set_point: Self::SetPoint);

    fn enable(&mut self);
    fn disable(&mut self);
    /// Re-arms every regulator with a clean history.
    fn reset(&mut self);

    /// Runs once per PWM period, from the sampling context.
    fn calculate(&mut self, currents: PhaseCurrents, mechanical_angle: Radians)
        -> PhasePwmDutyCycles;

    /// Low priority work requested from [`calculate`](Self::calculate).
    fn service_deferred(&mut self) {}
}

/// A controller regulating rotor speed.
pub trait SpeedControl: FieldOrientedController<SetPoint = RadiansPerSecond> {
    fn set_speed_tunings(&mut self, tunings: &SpeedTunings);
}
