//! Field oriented control of permanent magnet motors.
//!
//! The sampling path ([`torque::FocTorque`], [`speed::FocWithSpeedPid`]) runs
//! once per PWM period from phase currents and the rotor position, without
//! allocating or locking. Around it sit online estimation of the mechanical
//! model, automatic gain selection, parameter identification sessions and the
//! [`state_machine::MotorStateMachine`] that hands the hardware from one
//! occupant to the next.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod alignment;
pub mod controller;
pub mod current_gains;
pub mod deferred;
pub mod driver;
pub mod error;
pub mod estimator;
pub mod friction_inertia;
pub mod identification;
pub mod park_clarke;
pub mod pid;
pub mod runner;
pub mod speed;
pub mod speed_tune;
pub mod state_machine;
pub mod svpwm;
pub mod torque;
pub mod trigonometry;
pub mod units;

#[cfg(test)]
mod test_doubles;

pub use controller::{FieldOrientedController, IdAndIqPoint, IdAndIqTunings, SpeedControl};
pub use driver::{
    Encoder, Hardware, LowPriorityInterrupt, MotorDriver, PhaseCurrentsSubscriber, Tracer,
};
pub use error::CommandError;
pub use speed::FocWithSpeedPid;
pub use speed_tune::FocWithSpeedPidAndRealTimeTune;
pub use state_machine::MotorStateMachine;
pub use torque::FocTorque;

/// 1/sqrt(3)
pub(crate) const FRAC_1_SQRT_3: f32 = 0.577_350_27;
/// sqrt(3)
pub(crate) const SQRT_3: f32 = 1.732_050_8;
