//! Board facing interfaces.
//!
//! The control core never touches peripherals directly. Board glue
//! implements these traits and routes every phase current sample to the
//! [`PhaseCurrentsSubscriber`] owning the drive, usually the
//! [`MotorStateMachine`](crate::state_machine::MotorStateMachine).

use core::fmt;

use crate::units::{Hertz, PhaseCurrents, PhasePwmDutyCycles, Radians};

pub trait MotorDriver {
    /// PWM frequency of the bridge.
    fn base_frequency(&self) -> Hertz;

    /// Requests phase current samples at `frequency`, replacing any previous
    /// request. Samples are delivered through
    /// [`PhaseCurrentsSubscriber::phase_currents`].
    fn phase_currents_ready(&mut self, frequency: Hertz);
    fn phase_currents_unsubscribe(&mut self);

    fn three_phase_pwm_output(&mut self, duty_cycles: PhasePwmDutyCycles);

    fn start(&mut self);
    fn stop(&mut self);
}

pub trait Encoder {
    /// Mechanical rotor position, within `[-pi, pi]`.
    fn read(&mut self) -> Radians;
}

/// Pends the low priority handler. The handler itself is the owner's
/// `service_deferred`.
pub trait LowPriorityInterrupt {
    fn trigger(&mut self);
}

/// Human readable reports for the terminal.
pub trait Tracer {
    fn trace(&mut self, args: fmt::Arguments<'_>);
}

/// Entry point of the sampling context.
pub trait PhaseCurrentsSubscriber {
    fn phase_currents(&mut self, currents: PhaseCurrents);
}

/// Progress of a bounded session driven by phase current samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion<T> {
    Pending,
    /// `None` when the session gave up, e.g. on timeout.
    Done(Option<T>),
}

impl<T> Completion<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn trace(&mut self, _args: fmt::Arguments<'_>) {}
}

/// The peripherals a single drive needs, moved between whichever state
/// currently owns the motor.
#[derive(Debug)]
pub struct Hardware<D, E> {
    pub driver: D,
    pub encoder: E,
}

impl<D: MotorDriver, E: Encoder> Hardware<D, E> {
    pub fn new(driver: D, encoder: E) -> Self {
        Self { driver, encoder }
    }

    /// Stops the bridge and the sampling. Safe to call repeatedly.
    pub fn shut_down(&mut self) {
        self.driver.stop();
        self.driver.phase_currents_unsubscribe();
    }
}

/// Hardware sampling on behalf of a bounded session. Dropping it stops the
/// bridge and ends the sampling.
#[derive(Debug)]
pub struct Drive<D: MotorDriver, E: Encoder> {
    hardware: Option<Hardware<D, E>>,
    active: bool,
}

impl<D: MotorDriver, E: Encoder> Drive<D, E> {
    /// Subscribes at the base frequency; the bridge stays off.
    pub fn subscribe(mut hardware: Hardware<D, E>) -> Self {
        let frequency = hardware.driver.base_frequency();
        hardware.driver.phase_currents_ready(frequency);

        Self {
            hardware: Some(hardware),
            active: true,
        }
    }

    pub fn base_frequency(&self) -> Hertz {
        self.hardware
            .as_ref()
            .map(|hardware| hardware.driver.base_frequency())
            .unwrap_or_default()
    }

    pub fn start(&mut self) {
        if let Some(hardware) = &mut self.hardware {
            hardware.driver.start();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Hardware of an active drive.
    pub fn hardware(&mut self) -> Option<&mut Hardware<D, E>> {
        if self.active {
            self.hardware.as_mut()
        } else {
            None
        }
    }

    /// Stops the bridge and the sampling, once.
    pub fn release(&mut self) {
        if self.active {
            if let Some(hardware) = &mut self.hardware {
                hardware.shut_down();
            }
            self.active = false;
        }
    }

    pub fn into_hardware(mut self) -> Hardware<D, E> {
        self.release();
        match self.hardware.take() {
            Some(hardware) => hardware,
            None => unreachable!("drive hardware is only taken once"),
        }
    }
}

impl<D: MotorDriver, E: Encoder> Drop for Drive<D, E> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_doubles::{hardware, Event};

    #[test]
    fn subscribing_leaves_the_bridge_off() {
        let (hardware, log, _) = hardware(Hertz(16_000));
        let drive = Drive::subscribe(hardware);

        assert!(drive.is_active());
        assert_eq!(drive.base_frequency(), Hertz(16_000));
        assert_eq!(log.lifecycle(), [Event::Subscribe(Hertz(16_000))]);
    }

    #[test]
    fn release_happens_once() {
        let (hardware, log, _) = hardware(Hertz(16_000));
        let mut drive = Drive::subscribe(hardware);
        drive.start();

        drive.release();
        drive.release();
        assert!(drive.hardware().is_none());

        drop(drive);
        assert_eq!(
            log.lifecycle(),
            [
                Event::Subscribe(Hertz(16_000)),
                Event::Start,
                Event::Stop,
                Event::Unsubscribe
            ]
        );
    }

    #[test]
    fn hardware_comes_back_quiet() {
        let (hardware, log, _) = hardware(Hertz(16_000));
        let mut drive = Drive::subscribe(hardware);
        drive.start();

        let mut hardware = drive.into_hardware();
        assert!(!log.is_running());
        assert_eq!(log.subscription(), None);

        let events = log.events().len();
        hardware.shut_down();
        assert_eq!(log.events().len(), events + 2);
        assert!(!log.is_running());
    }

    #[test]
    fn null_tracer_accepts_anything() {
        let mut tracer = NullTracer;
        tracer.trace(format_args!("{} {}", 1, "two"));

        assert!(Completion::<u8>::Done(None).is_done());
        assert!(!Completion::<u8>::Pending.is_done());
    }
}
