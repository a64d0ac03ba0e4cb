//! Motor parameter identification.
//!
//! Each session owns the hardware for its lifetime, runs from phase current
//! samples and always terminates: it completes with a result, or with
//! `None` once its timeout (counted in samples) expires. Either way the
//! bridge is stopped and the sampling unsubscribed on completion.

pub mod electrical;
pub mod mechanical;

pub use electrical::{
    ElectricalIdentificationConfig, ElectricalParameters, ElectricalParametersIdentification,
};
pub use mechanical::{
    MechanicalIdentificationConfig, MechanicalParameters, MechanicalParametersIdentification,
    MechanicalTest,
};
