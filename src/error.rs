//! Errors reported back to whoever issues commands to the motor.

use thiserror::Error;

/// A rejected command. The state machine is left as it was.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid number of arguments: expected {expected}, got {actual}")]
    InvalidNumberOfArguments { expected: usize, actual: usize },

    #[error("invalid resistance value. It should be a positive float.")]
    InvalidResistance,

    #[error("invalid inductance value. It should be a positive float.")]
    InvalidInductance,

    #[error("invalid target speed. It should be a positive float in rpm.")]
    InvalidTargetSpeed,

    #[error("invalid torque constant. It should be a positive float in Nm/A.")]
    InvalidTorqueConstant,

    /// Set points are only accepted while the controller runs.
    #[error("the motor is not running")]
    NotRunning,
}

pub type CommandResult<T> = Result<T, CommandError>;
