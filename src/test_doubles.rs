//! Doubles for the board facing traits, shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::controller::{FieldOrientedController, IdAndIqTunings, SpeedControl, SpeedTunings};
use crate::driver::{Encoder, Hardware, LowPriorityInterrupt, MotorDriver, Tracer};
use crate::trigonometry::wrap_angle;
use crate::units::{Hertz, PhaseCurrents, PhasePwmDutyCycles, Radians, Volts};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Subscribe(Hertz),
    Unsubscribe,
    Output(PhasePwmDutyCycles),
    Start,
    Stop,
    ControllerEnable,
    ControllerDisable,
    ControllerReset,
}

/// Ordered record of everything the doubles observed.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    /// Events other than PWM outputs.
    pub fn lifecycle(&self) -> Vec<Event> {
        self.0
            .borrow()
            .iter()
            .copied()
            .filter(|event| !matches!(event, Event::Output(_)))
            .collect()
    }

    pub fn outputs(&self) -> Vec<PhasePwmDutyCycles> {
        self.0
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Output(duties) => Some(*duties),
                _ => None,
            })
            .collect()
    }

    pub fn last_output(&self) -> Option<PhasePwmDutyCycles> {
        self.0.borrow().iter().rev().find_map(|event| match event {
            Event::Output(duties) => Some(*duties),
            _ => None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.0
            .borrow()
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::Start => Some(true),
                Event::Stop => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn subscription(&self) -> Option<Hertz> {
        self.0
            .borrow()
            .iter()
            .rev()
            .find_map(|event| match event {
                Event::Subscribe(frequency) => Some(Some(*frequency)),
                Event::Unsubscribe => Some(None),
                _ => None,
            })
            .flatten()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug)]
pub struct RecordingDriver {
    pub base_frequency: Hertz,
    pub log: EventLog,
}

impl RecordingDriver {
    pub fn new(base_frequency: Hertz, log: EventLog) -> Self {
        Self {
            base_frequency,
            log,
        }
    }
}

impl MotorDriver for RecordingDriver {
    fn base_frequency(&self) -> Hertz {
        self.base_frequency
    }

    fn phase_currents_ready(&mut self, frequency: Hertz) {
        self.log.push(Event::Subscribe(frequency));
    }

    fn phase_currents_unsubscribe(&mut self) {
        self.log.push(Event::Unsubscribe);
    }

    fn three_phase_pwm_output(&mut self, duty_cycles: PhasePwmDutyCycles) {
        self.log.push(Event::Output(duty_cycles));
    }

    fn start(&mut self) {
        self.log.push(Event::Start);
    }

    fn stop(&mut self) {
        self.log.push(Event::Stop);
    }
}

/// Encoder whose position the test moves from the outside. Every read
/// advances it by `step`.
#[derive(Debug, Clone, Default)]
pub struct SharedEncoder {
    pub position: Rc<Cell<f32>>,
    pub step: Rc<Cell<f32>>,
}

impl Encoder for SharedEncoder {
    fn read(&mut self) -> Radians {
        let position = self.position.get();
        self.position.set(wrap_angle(position + self.step.get()));
        Radians(position)
    }
}

#[derive(Debug, Default)]
pub struct CountingInterrupt {
    pub triggers: usize,
}

impl LowPriorityInterrupt for CountingInterrupt {
    fn trigger(&mut self) {
        self.triggers += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectingTracer(pub Rc<RefCell<Vec<String>>>);

impl CollectingTracer {
    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.borrow().iter().any(|line| line.contains(needle))
    }
}

impl Tracer for CollectingTracer {
    fn trace(&mut self, args: fmt::Arguments<'_>) {
        self.0.borrow_mut().push(args.to_string());
    }
}

/// Wraps a controller and records its lifecycle calls into the shared log.
#[derive(Debug)]
pub struct Recorded<C> {
    pub inner: C,
    pub log: EventLog,
    pub calculations: usize,
}

impl<C> Recorded<C> {
    pub fn new(inner: C, log: EventLog) -> Self {
        Self {
            inner,
            log,
            calculations: 0,
        }
    }
}

impl<C: FieldOrientedController> FieldOrientedController for Recorded<C> {
    type SetPoint = C::SetPoint;

    fn set_pole_pairs(&mut self, pole_pairs: u8) {
        self.inner.set_pole_pairs(pole_pairs);
    }

    fn set_current_tunings(&mut self, vdc: Volts, tunings: &IdAndIqTunings) {
        self.inner.set_current_tunings(vdc, tunings);
    }

    fn set_point(&mut self, set_point: C::SetPoint) {
        self.inner.set_point(set_point);
    }

    fn enable(&mut self) {
        self.log.push(Event::ControllerEnable);
        self.inner.enable();
    }

    fn disable(&mut self) {
        self.log.push(Event::ControllerDisable);
        self.inner.disable();
    }

    fn reset(&mut self) {
        self.log.push(Event::ControllerReset);
        self.inner.reset();
    }

    fn calculate(
        &mut self,
        currents: PhaseCurrents,
        mechanical_angle: Radians,
    ) -> PhasePwmDutyCycles {
        self.calculations += 1;
        self.inner.calculate(currents, mechanical_angle)
    }

    fn service_deferred(&mut self) {
        self.inner.service_deferred();
    }
}

impl<C: SpeedControl> SpeedControl for Recorded<C> {
    fn set_speed_tunings(&mut self, tunings: &SpeedTunings) {
        self.inner.set_speed_tunings(tunings);
    }
}

pub type TestHardware = Hardware<RecordingDriver, SharedEncoder>;

pub fn hardware(base_frequency: Hertz) -> (TestHardware, EventLog, SharedEncoder) {
    let log = EventLog::default();
    let encoder = SharedEncoder::default();
    let hardware = Hardware::new(
        RecordingDriver::new(base_frequency, log.clone()),
        encoder.clone(),
    );
    (hardware, log, encoder)
}
