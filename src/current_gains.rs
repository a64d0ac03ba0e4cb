//! Current loop gains from the winding resistance and inductance.
//!
//! The loop bandwidth is placed at `ωc = 2π·f_base / N`. The inductance
//! then sets the proportional gain and the resistance the integral gain,
//! cancelling the electrical pole of the winding.

use core::f32::consts::TAU;

use crate::controller::{FieldOrientedController, IdAndIqTunings};
use crate::pid::PidTunings;
use crate::units::{Hertz, MilliHenry, NyquistFactor, Ohm, Volts};

fn current_loop_bandwidth(base_frequency: Hertz, nyquist: NyquistFactor) -> f32 {
    nyquist.outer_frequency(base_frequency) * TAU
}

pub fn automatic_current_pid_gains(
    resistance: Ohm,
    inductance: MilliHenry,
    base_frequency: Hertz,
    nyquist: NyquistFactor,
) -> IdAndIqTunings {
    let wc = current_loop_bandwidth(base_frequency, nyquist);

    IdAndIqTunings::both(PidTunings::new(
        inductance.henry() * wc,
        resistance.value() * wc,
        0.0,
    ))
}

/// Computes the gains and applies them to `controller`.
pub fn set_current_pid_gains<C: FieldOrientedController + ?Sized>(
    controller: &mut C,
    vdc: Volts,
    resistance: Ohm,
    inductance: MilliHenry,
    base_frequency: Hertz,
    nyquist: NyquistFactor,
) -> IdAndIqTunings {
    let tunings = automatic_current_pid_gains(resistance, inductance, base_frequency, nyquist);
    controller.set_current_tunings(vdc, &tunings);
    tunings
}
