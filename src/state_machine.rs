//! Top level orchestration of a single motor.
//!
//! The state machine owns the hardware and the controller. Exactly one
//! occupant uses them at a time: nothing while idle, an alignment or
//! identification session, or the [`Runner`] in closed loop. Every command
//! tears the current occupant down (bridge stopped, sampling unsubscribed,
//! controller disabled) before building the next one.

use log::{info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::alignment::{AlignmentConfig, MotorAlignment};
use crate::controller::{FieldOrientedController, SpeedControl, SpeedTunings};
use crate::current_gains::set_current_pid_gains;
use crate::driver::{Completion, Encoder, Hardware, MotorDriver, PhaseCurrentsSubscriber, Tracer};
use crate::error::{CommandError, CommandResult};
use crate::identification::{
    ElectricalIdentificationConfig, ElectricalParameters, ElectricalParametersIdentification,
    MechanicalIdentificationConfig, MechanicalParameters, MechanicalParametersIdentification,
    MechanicalTest,
};
use crate::runner::Runner;
use crate::units::{
    MilliHenry, NewtonMeterPerAmpere, NyquistFactor, Ohm, PhaseCurrents, Radians,
    RadiansPerSecond, Volts,
};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateMachineConfig {
    pub vdc: Volts,
    /// Ratio between the PWM rate and the current loop bandwidth.
    pub current_nyquist_factor: u8,
    pub alignment: AlignmentConfig,
    pub electrical: ElectricalIdentificationConfig,
    pub mechanical: MechanicalIdentificationConfig,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            vdc: Volts(24.0),
            current_nyquist_factor: 15,
            alignment: AlignmentConfig::default(),
            electrical: ElectricalIdentificationConfig::default(),
            mechanical: MechanicalIdentificationConfig::default(),
        }
    }
}

/// Which occupant currently owns the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MotorStateKind {
    Idle,
    Aligning,
    IdentifyingElectricalParameters,
    IdentifyingMechanicalParameters,
    Running,
}

#[derive(Debug)]
enum MotorState<D: MotorDriver, E: Encoder, C: FieldOrientedController> {
    Idle(Hardware<D, E>, C),
    Aligning(MotorAlignment<D, E>, C),
    IdentifyingElectrical(ElectricalParametersIdentification<D, E>, C),
    IdentifyingMechanical(MechanicalParametersIdentification<D, E, C>),
    Running(Runner<D, E, C>),
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController> MotorState<D, E, C> {
    fn kind(&self) -> MotorStateKind {
        match self {
            Self::Idle(..) => MotorStateKind::Idle,
            Self::Aligning(..) => MotorStateKind::Aligning,
            Self::IdentifyingElectrical(..) => MotorStateKind::IdentifyingElectricalParameters,
            Self::IdentifyingMechanical(..) => MotorStateKind::IdentifyingMechanicalParameters,
            Self::Running(..) => MotorStateKind::Running,
        }
    }

    fn controller(&self) -> Option<&C> {
        match self {
            Self::Idle(_, controller)
            | Self::Aligning(_, controller)
            | Self::IdentifyingElectrical(_, controller) => Some(controller),
            Self::IdentifyingMechanical(identification) => Some(identification.controller()),
            Self::Running(runner) => runner.controller(),
        }
    }

    /// Stops whatever runs and returns the hardware and a disabled
    /// controller.
    fn into_parts(self) -> (Hardware<D, E>, C) {
        match self {
            Self::Idle(hardware, controller) => (hardware, controller),
            Self::Aligning(alignment, mut controller) => {
                controller.disable();
                (alignment.into_hardware(), controller)
            }
            Self::IdentifyingElectrical(identification, mut controller) => {
                controller.disable();
                (identification.into_hardware(), controller)
            }
            Self::IdentifyingMechanical(identification) => identification.into_parts(),
            Self::Running(runner) => runner.into_parts(),
        }
    }
}

/// Drives one motor from commands and phase current samples.
///
/// `T` receives a human readable line for every command error and every
/// finished session.
#[derive(Debug)]
pub struct MotorStateMachine<D: MotorDriver, E: Encoder, C: FieldOrientedController, T: Tracer> {
    state: Option<MotorState<D, E, C>>,
    tracer: T,
    config: StateMachineConfig,
    current_nyquist_factor: NyquistFactor,
    pole_pairs: u8,
    rotor_offset: Option<Radians>,
    electrical_parameters: Option<ElectricalParameters>,
    mechanical_parameters: Option<MechanicalParameters>,
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController, T: Tracer>
    MotorStateMachine<D, E, C, T>
{
    pub fn new(
        hardware: Hardware<D, E>,
        controller: C,
        tracer: T,
        config: StateMachineConfig,
    ) -> Self {
        let current_nyquist_factor = NyquistFactor::new(config.current_nyquist_factor);

        Self {
            state: Some(MotorState::Idle(hardware, controller)),
            tracer,
            config,
            current_nyquist_factor,
            pole_pairs: 1,
            rotor_offset: None,
            electrical_parameters: None,
            mechanical_parameters: None,
        }
    }

    pub fn state(&self) -> MotorStateKind {
        self.state
            .as_ref()
            .map_or(MotorStateKind::Idle, MotorState::kind)
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn controller(&self) -> Option<&C> {
        self.state.as_ref().and_then(MotorState::controller)
    }

    /// Encoder reading at electrical zero, from the last alignment.
    pub fn rotor_offset(&self) -> Option<Radians> {
        self.rotor_offset
    }

    pub fn electrical_parameters(&self) -> Option<ElectricalParameters> {
        self.electrical_parameters
    }

    pub fn mechanical_parameters(&self) -> Option<MechanicalParameters> {
        self.mechanical_parameters
    }

    pub fn align(&mut self) {
        let (hardware, controller) = self.tear_down();
        let alignment = MotorAlignment::new(hardware, &self.config.alignment);
        self.enter(MotorState::Aligning(alignment, controller));
    }

    /// Identifies resistance, inductance and pole pairs.
    pub fn identify_parameters(&mut self) {
        let (hardware, controller) = self.tear_down();
        let identification = ElectricalParametersIdentification::new(
            hardware,
            self.config.vdc,
            &self.config.electrical,
        );
        self.enter(MotorState::IdentifyingElectrical(identification, controller));
    }

    /// Closes the loop with current gains derived from
    /// `"<resistance_ohm> <inductance_mH>"`.
    pub fn start(&mut self, params: &str) -> CommandResult<()> {
        let (resistance, inductance) = self.report(parse_two_positive(
            params,
            CommandError::InvalidResistance,
            CommandError::InvalidInductance,
        ))?;

        let (hardware, mut controller) = self.tear_down();
        controller.reset();
        let tunings = set_current_pid_gains(
            &mut controller,
            self.config.vdc,
            Ohm(resistance),
            MilliHenry(inductance),
            hardware.driver.base_frequency(),
            self.current_nyquist_factor,
        );
        self.tracer.trace(format_args!(
            "Current loop: Kp = {}, Ki = {}",
            tunings.q.kp, tunings.q.ki
        ));

        let mut runner = Runner::new(hardware, controller);
        runner.enable();
        self.enter(MotorState::Running(runner));
        Ok(())
    }

    /// Forwards a set point to the running controller.
    pub fn set_point(&mut self, set_point: C::SetPoint) -> CommandResult<()> {
        match &mut self.state {
            Some(MotorState::Running(runner)) => {
                if let Some(controller) = runner.controller_mut() {
                    controller.set_point(set_point);
                }
                Ok(())
            }
            _ => self.report(Err(CommandError::NotRunning)),
        }
    }

    /// Low priority handler of the active controller.
    pub fn service_deferred(&mut self) {
        match &mut self.state {
            Some(MotorState::Running(runner)) => runner.service_deferred(),
            Some(MotorState::IdentifyingMechanical(identification)) => {
                identification.service_deferred()
            }
            _ => {}
        }
    }

    fn tear_down(&mut self) -> (Hardware<D, E>, C) {
        match self.state.take() {
            Some(state) => state.into_parts(),
            None => unreachable!("the motor state is restored after every transition"),
        }
    }

    fn enter(&mut self, state: MotorState<D, E, C>) {
        info!("motor state: {:?}", state.kind());
        self.state = Some(state);
    }

    fn report<V>(&mut self, result: CommandResult<V>) -> CommandResult<V> {
        if let Err(error) = &result {
            warn!("command rejected: {}", error);
            self.tracer.trace(format_args!("Error: {}", error));
        }
        result
    }

    /// Moves to idle once the active session completed.
    fn finish_session(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        let state = match state {
            MotorState::Aligning(alignment, controller) => {
                match alignment.completion() {
                    Completion::Done(Some(offset)) => {
                        self.rotor_offset = Some(offset);
                        let offset = offset.value();
                        self.tracer.trace(format_args!("Alignment done, offset {offset} rad"));
                    }
                    _ => self.tracer.trace(format_args!("Alignment failed")),
                }
                MotorState::Idle(alignment.into_hardware(), controller)
            }
            MotorState::IdentifyingElectrical(identification, mut controller) => {
                match identification.completion() {
                    Completion::Done(Some(parameters)) => {
                        controller.set_pole_pairs(parameters.pole_pairs);
                        self.pole_pairs = parameters.pole_pairs;
                        self.electrical_parameters = Some(parameters);
                        self.tracer.trace(format_args!(
                            "Resistance: {} ohm, inductance: {} mH, pole pairs: {}",
                            parameters.resistance.value(),
                            parameters.inductance.value(),
                            parameters.pole_pairs
                        ));
                    }
                    _ => self
                        .tracer
                        .trace(format_args!("Electrical parameters identification failed")),
                }
                MotorState::Idle(identification.into_hardware(), controller)
            }
            MotorState::IdentifyingMechanical(identification) => {
                match identification.completion() {
                    Completion::Done(Some(parameters)) => {
                        self.mechanical_parameters = Some(parameters);
                        self.tracer.trace(format_args!(
                            "Friction: {} Nm·s/rad, inertia: {} Nm·s²",
                            parameters.friction.value(),
                            parameters.inertia.value()
                        ));
                    }
                    _ => self
                        .tracer
                        .trace(format_args!("Mechanical parameters identification failed")),
                }
                let (hardware, controller) = identification.into_parts();
                MotorState::Idle(hardware, controller)
            }
            running_or_idle => running_or_idle,
        };

        self.enter(state);
    }
}

impl<D: MotorDriver, E: Encoder, C: SpeedControl, T: Tracer> MotorStateMachine<D, E, C, T> {
    /// Sets the speed loop gains of the running controller, or of the idle
    /// one so the next session starts with them.
    pub fn set_speed_tunings(&mut self, tunings: SpeedTunings) -> CommandResult<()> {
        match &mut self.state {
            Some(MotorState::Idle(_, controller)) => {
                controller.set_speed_tunings(&tunings);
                Ok(())
            }
            Some(MotorState::Running(runner)) => {
                if let Some(controller) = runner.controller_mut() {
                    controller.set_speed_tunings(&tunings);
                }
                Ok(())
            }
            _ => self.report(Err(CommandError::NotRunning)),
        }
    }

    /// Spins the motor under speed control and identifies friction and
    /// inertia, from `"<target_speed_rpm> <torque_constant_Nm_per_A>"`.
    ///
    /// Current gains from a previous electrical identification are applied
    /// first; otherwise the controller keeps the gains it has.
    pub fn identify_mechanical_parameters(&mut self, params: &str) -> CommandResult<()> {
        let (rpm, torque_constant) = self.report(parse_two_positive(
            params,
            CommandError::InvalidTargetSpeed,
            CommandError::InvalidTorqueConstant,
        ))?;

        let (hardware, mut controller) = self.tear_down();
        controller.reset();
        if let Some(parameters) = self.electrical_parameters {
            set_current_pid_gains(
                &mut controller,
                self.config.vdc,
                parameters.resistance,
                parameters.inductance,
                hardware.driver.base_frequency(),
                self.current_nyquist_factor,
            );
        }

        let test = MechanicalTest {
            target_speed: RadiansPerSecond::from_rpm(rpm),
            torque_constant: NewtonMeterPerAmpere(torque_constant),
            pole_pairs: self.pole_pairs,
        };
        let identification = MechanicalParametersIdentification::new(
            hardware,
            controller,
            test,
            &self.config.mechanical,
        );
        self.enter(MotorState::IdentifyingMechanical(identification));
        Ok(())
    }
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController, T: Tracer> PhaseCurrentsSubscriber
    for MotorStateMachine<D, E, C, T>
{
    fn phase_currents(&mut self, currents: PhaseCurrents) {
        let finished = match &mut self.state {
            Some(MotorState::Aligning(alignment, _)) => {
                alignment.phase_currents(currents);
                alignment.completion().is_done()
            }
            Some(MotorState::IdentifyingElectrical(identification, _)) => {
                identification.phase_currents(currents);
                identification.completion().is_done()
            }
            Some(MotorState::IdentifyingMechanical(identification)) => {
                identification.phase_currents(currents);
                identification.completion().is_done()
            }
            Some(MotorState::Running(runner)) => {
                runner.phase_currents(currents);
                false
            }
            Some(MotorState::Idle(..)) | None => false,
        };

        if finished {
            self.finish_session();
        }
    }
}

impl<D: MotorDriver, E: Encoder, C: FieldOrientedController, T: Tracer> Drop
    for MotorStateMachine<D, E, C, T>
{
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            let (mut hardware, _) = state.into_parts();
            hardware.shut_down();
        }
    }
}

/// Parses exactly two positive floats separated by whitespace.
fn parse_two_positive(
    params: &str,
    first_error: CommandError,
    second_error: CommandError,
) -> CommandResult<(f32, f32)> {
    let actual = params.split_whitespace().count();
    if actual != 2 {
        return Err(CommandError::InvalidNumberOfArguments {
            expected: 2,
            actual,
        });
    }

    let mut tokens = params.split_whitespace();
    let first = tokens.next().and_then(parse_positive).ok_or(first_error)?;
    let second = tokens.next().and_then(parse_positive).ok_or(second_error)?;
    Ok((first, second))
}

fn parse_positive(token: &str) -> Option<f32> {
    token
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
}
