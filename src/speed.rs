//! Speed control core: an outer speed loop cascaded on the torque core.
//!
//! The outer loop runs once every `nyquist` PWM samples. It measures the
//! rotor speed over that period, regulates it with its own PID and hands the
//! resulting q-axis current to the torque core through a
//! [`DeferredSetpoint`], applied from the low priority context.

use crate::controller::{
    FieldOrientedController, IdAndIqPoint, IdAndIqTunings, SpeedControl, SpeedTunings,
};
use crate::deferred::DeferredSetpoint;
use crate::driver::LowPriorityInterrupt;
use crate::pid::{Limits, PidIncremental, PidTunings};
use crate::torque::FocTorque;
use crate::trigonometry::angle_difference;
use crate::units::{
    Ampere, Hertz, NyquistFactor, PhaseCurrents, PhasePwmDutyCycles, Radians, RadiansPerSecond,
    Volts,
};

/// What the outer loop saw on one of its ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLoopSample {
    pub currents: PhaseCurrents,
    pub speed: RadiansPerSecond,
    pub electrical_angle: Radians,
}

/// Hook run on every outer loop tick. Returned tunings are applied to the
/// speed regulator immediately.
pub trait SpeedLoopObserver {
    fn speed_loop_tick(&mut self, sample: &SpeedLoopSample) -> Option<SpeedTunings>;
}

impl SpeedLoopObserver for () {
    fn speed_loop_tick(&mut self, _sample: &SpeedLoopSample) -> Option<SpeedTunings> {
        None
    }
}

#[derive(Debug)]
pub struct FocWithSpeedPid<I, O = ()> {
    interrupt: I,
    observer: O,
    torque: FocTorque,
    speed_pid: PidIncremental,
    target_current: DeferredSetpoint,
    nyquist: u8,
    speed_loop_counter: u8,
    speed_loop_period: f32,
    previous_position: f32,
    pole_pairs: f32,
    speed: RadiansPerSecond,
}

impl<I: LowPriorityInterrupt> FocWithSpeedPid<I, ()> {
    /// # Panics
    ///
    /// If `max_current` is not positive.
    pub fn new(
        interrupt: I,
        max_current: Ampere,
        pwm_frequency: Hertz,
        nyquist: NyquistFactor,
    ) -> Self {
        Self::with_observer(interrupt, max_current, pwm_frequency, nyquist, ())
    }
}

impl<I: LowPriorityInterrupt, O: SpeedLoopObserver> FocWithSpeedPid<I, O> {
    /// # Panics
    ///
    /// If `max_current` is not positive.
    pub fn with_observer(
        interrupt: I,
        max_current: Ampere,
        pwm_frequency: Hertz,
        nyquist: NyquistFactor,
        observer: O,
    ) -> Self {
        assert!(max_current.value() > 0.0, "max current must be positive");

        let mut speed_pid = PidIncremental::new(
            PidTunings::default(),
            Limits::symmetric(max_current.value()),
        );
        speed_pid.enable();

        Self {
            interrupt,
            observer,
            torque: FocTorque::new(),
            speed_pid,
            target_current: DeferredSetpoint::new(),
            nyquist: nyquist.value(),
            speed_loop_counter: nyquist.value(),
            speed_loop_period: nyquist.outer_period(pwm_frequency),
            previous_position: 0.0,
            pole_pairs: 1.0,
            speed: RadiansPerSecond::ZERO,
        }
    }

    /// Outer loop period in seconds.
    pub fn speed_loop_period(&self) -> f32 {
        self.speed_loop_period
    }

    /// Speed measured on the last outer loop tick.
    pub fn speed(&self) -> RadiansPerSecond {
        self.speed
    }

    /// Discrete gains as applied to the speed regulator.
    pub fn applied_speed_tunings(&self) -> PidTunings {
        self.speed_pid.tunings()
    }

    pub fn torque(&self) -> &FocTorque {
        &self.torque
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn interrupt(&self) -> &I {
        &self.interrupt
    }

    fn speed_control_loop(&mut self, currents: PhaseCurrents, mechanical_angle: Radians) {
        let position = mechanical_angle.value();
        let speed = angle_difference(position, self.previous_position) / self.speed_loop_period;
        self.previous_position = position;
        self.speed = RadiansPerSecond(speed);

        self.target_current.store(self.speed_pid.process(speed));
        self.interrupt.trigger();

        let sample = SpeedLoopSample {
            currents,
            speed: self.speed,
            electrical_angle: mechanical_angle * self.pole_pairs,
        };
        if let Some(tunings) = self.observer.speed_loop_tick(&sample) {
            self.set_speed_tunings(&tunings);
        }
    }
}

impl<I: LowPriorityInterrupt, O: SpeedLoopObserver> FieldOrientedController
    for FocWithSpeedPid<I, O>
{
    type SetPoint = RadiansPerSecond;

    fn set_pole_pairs(&mut self, pole_pairs: u8) {
        self.pole_pairs = f32::from(pole_pairs);
        self.torque.set_pole_pairs(pole_pairs);
    }

    fn set_current_tunings(&mut self, vdc: Volts, tunings: &IdAndIqTunings) {
        self.torque.set_current_tunings(vdc, tunings);
    }

    fn set_point(&mut self, set_point: RadiansPerSecond) {
        self.speed_pid.set_point(set_point.value());
    }

    fn enable(&mut self) {
        self.torque.enable();
        self.speed_pid.enable();
    }

    fn disable(&mut self) {
        self.speed_pid.disable();
        self.torque.disable();
    }

    fn reset(&mut self) {
        self.speed_pid.disable();
        self.speed_pid.enable();
        self.torque.reset();
        self.target_current.clear();

        self.previous_position = 0.0;
        self.speed_loop_counter = self.nyquist;
        self.speed = RadiansPerSecond::ZERO;
    }

    fn calculate(
        &mut self,
        currents: PhaseCurrents,
        mechanical_angle: Radians,
    ) -> PhasePwmDutyCycles {
        if self.speed_loop_counter <= 1 {
            self.speed_loop_counter = self.nyquist;
            self.speed_control_loop(currents, mechanical_angle);
        } else {
            self.speed_loop_counter -= 1;
        }

        self.torque.calculate(currents, mechanical_angle)
    }

    fn service_deferred(&mut self) {
        if let Some(iq) = self.target_current.take() {
            self.torque.set_point(IdAndIqPoint::new(Ampere::ZERO, Ampere(iq)));
        }
    }
}

impl<I: LowPriorityInterrupt, O: SpeedLoopObserver> SpeedControl for FocWithSpeedPid<I, O> {
    /// Discretizes continuous gains over the outer loop period.
    fn set_speed_tunings(&mut self, tunings: &SpeedTunings) {
        self.speed_pid.set_tunings(PidTunings {
            kp: tunings.kp,
            ki: tunings.ki * self.speed_loop_period,
            kd: tunings.kd / self.speed_loop_period,
        });
    }
}
