//! Binds a controller to the sampling path of the drive.

use log::info;

use crate::controller::FieldOrientedController;
use crate::driver::{Encoder, Hardware, MotorDriver, PhaseCurrentsSubscriber};
use crate::units::PhaseCurrents;

#[derive(Debug)]
struct Parts<D, E, C> {
    hardware: Hardware<D, E>,
    controller: C,
}

/// Owns the hardware and the controller while the motor runs closed loop.
///
/// Every sample reads the encoder, runs the controller and outputs the duty
/// cycles. Dropping the runner stops the bridge before anything else.
#[derive(Debug)]
pub struct Runner<D: MotorDriver, E: Encoder, C: FieldOrientedController> {
    parts: Option<Parts<D, E, C>>,
    enabled: bool,
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController> Runner<D, E, C> {
    /// Subscribes to phase currents at the driver's base frequency. The
    /// bridge stays off until [`enable`](Self::enable).
    pub fn new(mut hardware: Hardware<D, E>, controller: C) -> Self {
        let frequency = hardware.driver.base_frequency();
        hardware.driver.phase_currents_ready(frequency);

        Self {
            parts: Some(Parts {
                hardware,
                controller,
            }),
            enabled: false,
        }
    }

    /// Arms the controller, then lets current flow.
    pub fn enable(&mut self) {
        if let Some(parts) = &mut self.parts {
            parts.controller.enable();
            parts.hardware.driver.start();
            self.enabled = true;
            info!("runner: enabled");
        }
    }

    /// Cuts the bridge, then disarms the controller.
    pub fn disable(&mut self) {
        if let Some(parts) = &mut self.parts {
            parts.hardware.driver.stop();
            parts.controller.disable();
            if self.enabled {
                info!("runner: disabled");
            }
            self.enabled = false;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn controller(&self) -> Option<&C> {
        self.parts.as_ref().map(|parts| &parts.controller)
    }

    pub fn controller_mut(&mut self) -> Option<&mut C> {
        self.parts.as_mut().map(|parts| &mut parts.controller)
    }

    /// Low priority handler of the controller.
    pub fn service_deferred(&mut self) {
        if let Some(parts) = &mut self.parts {
            parts.controller.service_deferred();
        }
    }

    /// Stops the drive and hands back what the runner owned.
    pub fn into_parts(mut self) -> (Hardware<D, E>, C) {
        self.disable();
        match self.parts.take() {
            Some(mut parts) => {
                parts.hardware.driver.phase_currents_unsubscribe();
                (parts.hardware, parts.controller)
            }
            None => unreachable!("runner parts are only taken once"),
        }
    }
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController> PhaseCurrentsSubscriber
    for Runner<D, E, C>
{
    fn phase_currents(&mut self, currents: PhaseCurrents) {
        if let Some(Parts {
            hardware,
            controller,
        }) = &mut self.parts
        {
            let position = hardware.encoder.read();
            let duty_cycles = controller.calculate(currents, position);
            hardware.driver.three_phase_pwm_output(duty_cycles);
        }
    }
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController> Drop for Runner<D, E, C> {
    fn drop(&mut self) {
        self.disable();
        if let Some(parts) = &mut self.parts {
            parts.hardware.driver.phase_currents_unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::IdAndIqPoint;
    use crate::test_doubles::{
        hardware, Event, EventLog, Recorded, RecordingDriver, SharedEncoder, TestHardware,
    };
    use crate::torque::FocTorque;
    use crate::units::{Ampere, Hertz, PhasePwmDutyCycles};

    type TestRunner = Runner<RecordingDriver, SharedEncoder, Recorded<FocTorque>>;

    fn runner(log: &EventLog, hardware: TestHardware) -> TestRunner {
        Runner::new(hardware, Recorded::new(FocTorque::new(), log.clone()))
    }

    #[test]
    fn subscribes_at_base_frequency() {
        let (hardware, log, _) = hardware(Hertz(20_000));
        let _runner = runner(&log, hardware);

        assert_eq!(log.lifecycle(), [Event::Subscribe(Hertz(20_000))]);
    }

    #[test]
    fn enable_arms_controller_before_starting_driver() {
        let (hardware, log, _) = hardware(Hertz(20_000));
        let mut runner = runner(&log, hardware);
        log.clear();

        runner.enable();
        assert_eq!(log.lifecycle(), [Event::ControllerEnable, Event::Start]);
        assert!(runner.is_enabled());
    }

    #[test]
    fn disable_stops_driver_before_controller() {
        let (hardware, log, _) = hardware(Hertz(20_000));
        let mut runner = runner(&log, hardware);
        runner.enable();
        log.clear();

        runner.disable();
        assert_eq!(log.lifecycle(), [Event::Stop, Event::ControllerDisable]);
        assert!(!runner.is_enabled());
    }

    #[test]
    fn drop_disables() {
        let (hardware, log, _) = hardware(Hertz(20_000));
        let mut runner = runner(&log, hardware);
        runner.enable();
        log.clear();

        drop(runner);
        assert_eq!(
            log.lifecycle(),
            [Event::Stop, Event::ControllerDisable, Event::Unsubscribe]
        );
        assert!(!log.is_running());
        assert_eq!(log.subscription(), None);
    }

    #[test]
    fn every_sample_reaches_the_pwm_output() {
        let (hardware, log, encoder) = hardware(Hertz(20_000));
        encoder.step.set(0.01);
        let mut runner = runner(&log, hardware);
        runner.enable();

        for _ in 0..5 {
            runner.phase_currents(PhaseCurrents::default());
        }

        assert_eq!(log.outputs().len(), 5);
        assert_eq!(runner.controller().map(|c| c.calculations), Some(5));
        assert!((encoder.position.get() - 0.05).abs() < 1e-6);
        assert!(log
            .outputs()
            .iter()
            .all(|duties| *duties == PhasePwmDutyCycles::CENTERED));
    }

    #[test]
    fn set_point_reaches_the_controller() {
        let (hardware, log, _) = hardware(Hertz(20_000));
        let mut runner = runner(&log, hardware);
        runner.enable();

        let point = IdAndIqPoint::new(Ampere(0.0), Ampere(1.0));
        if let Some(controller) = runner.controller_mut() {
            controller.set_point(point);
        }
        assert_eq!(
            runner.controller().map(|c| c.inner.current_set_point()),
            Some(point)
        );
    }

    #[test]
    fn into_parts_returns_a_quiet_drive() {
        let (hardware, log, _) = hardware(Hertz(20_000));
        let mut runner = runner(&log, hardware);
        runner.enable();

        let (hardware, controller) = runner.into_parts();
        assert!(!log.is_running());
        assert_eq!(log.subscription(), None);
        assert_eq!(hardware.driver.base_frequency, Hertz(20_000));
        assert!(!controller.inner.is_enabled());

        // nothing more happens once the parts are out
        let events = log.events().len();
        drop(controller);
        assert_eq!(log.events().len(), events);
    }
}
