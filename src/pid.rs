//! Incremental (velocity form) PID controller.
//!
//! Each sample computes the change of the output rather than the output
//! itself, so clamping the accumulated output is all the anti-windup the
//! loops need. Gains are discrete: `ki` and `kd` are per sample.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PidTunings {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidTunings {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    /// Multiplies all three gains by `factor`.
    pub fn scaled(self, factor: f32) -> Self {
        Self {
            kp: self.kp * factor,
            ki: self.ki * factor,
            kd: self.kd * factor,
        }
    }
}

/// Output range of a controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    min: f32,
    max: f32,
}

impl Limits {
    /// # Panics
    ///
    /// If `min` is not strictly below `max`.
    pub fn new(min: f32, max: f32) -> Self {
        assert!(min < max, "pid limits must satisfy min < max");
        Self { min, max }
    }

    /// `-limit..=limit`
    pub fn symmetric(limit: f32) -> Self {
        Self::new(-limit, limit)
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }
}

#[derive(Debug, Clone)]
pub struct PidIncremental {
    tunings: PidTunings,
    limits: Limits,
    set_point: f32,
    previous_error: f32,
    second_previous_error: f32,
    output: f32,
    enabled: bool,
}

impl PidIncremental {
    /// A disabled controller; call [`enable`](Self::enable) before use.
    pub fn new(tunings: PidTunings, limits: Limits) -> Self {
        Self {
            tunings,
            limits,
            set_point: 0.0,
            previous_error: 0.0,
            second_previous_error: 0.0,
            output: 0.0,
            enabled: false,
        }
    }

    pub fn set_tunings(&mut self, tunings: PidTunings) {
        self.tunings = tunings;
    }

    pub fn tunings(&self) -> PidTunings {
        self.tunings
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
        self.output = self.output.clamp(limits.min, limits.max);
    }

    pub fn set_point(&mut self, set_point: f32) {
        self.set_point = set_point;
    }

    pub fn current_set_point(&self) -> f32 {
        self.set_point
    }

    /// Starts regulating from a clean history. Enabling an enabled
    /// controller keeps its state.
    pub fn enable(&mut self) {
        if !self.enabled {
            self.clear_history();
            self.enabled = true;
        }
    }

    /// Stops regulating; [`process`](Self::process) returns zero until the
    /// next [`enable`](Self::enable).
    pub fn disable(&mut self) {
        self.enabled = false;
        self.clear_history();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Runs one sample with the latest `measurement` and returns the new
    /// clamped output.
    pub fn process(&mut self, measurement: f32) -> f32 {
        if !self.enabled {
            return 0.0;
        }

        let error = self.set_point - measurement;
        let PidTunings { kp, ki, kd } = self.tunings;

        let delta = kp * (error - self.previous_error)
            + ki * error
            + kd * (error - 2.0 * self.previous_error + self.second_previous_error);

        self.output = (self.output + delta).clamp(self.limits.min, self.limits.max);
        self.second_previous_error = self.previous_error;
        self.previous_error = error;

        self.output
    }

    fn clear_history(&mut self) {
        self.previous_error = 0.0;
        self.second_previous_error = 0.0;
        self.output = 0.0;
    }
}
