//! Strongly typed scalar quantities used throughout the control core.
//!
//! Every quantity wraps an `f32` (or an integer for [`Hertz`] and
//! [`Percent`]) so that a current can never be handed to an argument
//! expecting a voltage.

use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! unit {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub f32);

        impl $name {
            pub const ZERO: Self = Self(0.0);

            pub const fn new(value: f32) -> Self {
                Self(value)
            }

            pub const fn value(self) -> f32 {
                self.0
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                self.0 += rhs.0;
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                self.0 -= rhs.0;
            }
        }

        impl Neg for $name {
            type Output = Self;

            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Mul<f32> for $name {
            type Output = Self;

            fn mul(self, rhs: f32) -> Self {
                Self(self.0 * rhs)
            }
        }

        impl Div<f32> for $name {
            type Output = Self;

            fn div(self, rhs: f32) -> Self {
                Self(self.0 / rhs)
            }
        }
    };
}

unit!(
    /// Electric potential in volts.
    Volts
);
unit!(
    /// Electric current in amperes.
    Ampere
);
unit!(
    /// Resistance in ohms.
    Ohm
);
unit!(
    /// Inductance in millihenry, the unit motor datasheets use.
    MilliHenry
);
unit!(
    /// Angle in radians.
    Radians
);
unit!(
    /// Angular velocity.
    RadiansPerSecond
);
unit!(
    /// Torque.
    NewtonMeter
);
unit!(
    /// Torque constant, torque produced per ampere of q-axis current.
    NewtonMeterPerAmpere
);
unit!(
    /// Viscous friction (damping) coefficient.
    NewtonMeterSecondPerRadian
);
unit!(
    /// Rotor inertia, expressed as torque per unit of angular acceleration.
    NewtonMeterSecondSquared
);

impl MilliHenry {
    pub fn henry(self) -> f32 {
        self.0 * 0.001
    }
}

impl RadiansPerSecond {
    pub fn from_rpm(rpm: f32) -> Self {
        Self(rpm * core::f32::consts::TAU / 60.0)
    }
}

/// Frequency in whole hertz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hertz(pub u32);

impl Hertz {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Duration of one period in seconds.
    pub fn period(self) -> f32 {
        1.0 / self.0 as f32
    }

    /// Whole number of samples spanning `seconds`, at least one.
    pub fn samples_in(self, seconds: f32) -> u32 {
        // `as` saturates; NaN becomes 0
        (libm::roundf(seconds * self.0 as f32) as u32).max(1)
    }
}

/// Integer percentage, always within `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Percent(u8);

impl Percent {
    pub const HALF: Self = Self(50);

    /// Saturates values above 100.
    pub const fn new(value: u8) -> Self {
        if value > 100 {
            Self(100)
        } else {
            Self(value)
        }
    }

    /// Converts a `0.0..=1.0` fraction, rounding to the nearest percent.
    ///
    /// Out of range fractions saturate; a NaN fraction becomes 0 %.
    pub fn from_fraction(fraction: f32) -> Self {
        let percent = libm::roundf(fraction * 100.0).clamp(0.0, 100.0);
        // `as` saturates and maps NaN to zero
        Self(percent as u8)
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Three simultaneously sampled phase currents.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseCurrents {
    pub a: Ampere,
    pub b: Ampere,
    pub c: Ampere,
}

impl PhaseCurrents {
    pub const fn new(a: Ampere, b: Ampere, c: Ampere) -> Self {
        Self { a, b, c }
    }
}

/// Duty cycles for the three half bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhasePwmDutyCycles {
    pub a: Percent,
    pub b: Percent,
    pub c: Percent,
}

impl PhasePwmDutyCycles {
    /// All three bridges at 50 %, zero voltage across the windings.
    pub const CENTERED: Self = Self {
        a: Percent::HALF,
        b: Percent::HALF,
        c: Percent::HALF,
    };

    pub fn from_fractions([a, b, c]: [f32; 3]) -> Self {
        Self {
            a: Percent::from_fraction(a),
            b: Percent::from_fraction(b),
            c: Percent::from_fraction(c),
        }
    }

    pub fn as_array(&self) -> [u8; 3] {
        [self.a.value(), self.b.value(), self.c.value()]
    }
}

/// Ratio between the PWM (current loop) rate and an outer loop rate.
///
/// # Panics
///
/// Construction panics unless `1 <= factor < 20`: an out of range factor is
/// a configuration error, not something to recover from at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NyquistFactor(u8);

impl NyquistFactor {
    pub const fn new(factor: u8) -> Self {
        assert!(factor > 0 && factor < 20, "nyquist factor out of range");
        Self(factor)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// The outer loop frequency for a given PWM frequency.
    pub fn outer_frequency(self, pwm_frequency: Hertz) -> f32 {
        pwm_frequency.value() as f32 / self.0 as f32
    }

    /// The outer loop period in seconds for a given PWM frequency.
    pub fn outer_period(self, pwm_frequency: Hertz) -> f32 {
        self.0 as f32 / pwm_frequency.value() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_from_fraction_rounds_and_clamps() {
        assert_eq!(Percent::from_fraction(0.5).value(), 50);
        assert_eq!(Percent::from_fraction(0.494).value(), 49);
        assert_eq!(Percent::from_fraction(0.506).value(), 51);
        assert_eq!(Percent::from_fraction(1.7).value(), 100);
        assert_eq!(Percent::from_fraction(-0.3).value(), 0);
        assert_eq!(Percent::from_fraction(f32::NAN).value(), 0);
        assert_eq!(Percent::new(180).value(), 100);
    }

    #[test]
    fn unit_arithmetic() {
        let v = Volts(12.0) + Volts(3.0) - Volts(1.0);
        assert_eq!(v, Volts(14.0));
        assert_eq!(-Ampere(2.0) * 1.5, Ampere(-3.0));
        assert_eq!(Radians(1.0) / 2.0, Radians(0.5));
        assert!((MilliHenry(2.5).henry() - 0.0025).abs() < 1e-9);
    }

    #[test]
    fn rpm_conversion() {
        let speed = RadiansPerSecond::from_rpm(60.0);
        assert!((speed.value() - core::f32::consts::TAU).abs() < 1e-5);
    }

    #[test]
    fn samples_in_duration() {
        assert_eq!(Hertz(10_000).samples_in(3.0), 30_000);
        assert_eq!(Hertz(10_000).samples_in(0.00004), 1);
        assert_eq!(Hertz(1_000).samples_in(-1.0), 1);
    }

    #[test]
    fn nyquist_factor_periods() {
        let nyquist = NyquistFactor::new(5);
        assert!((nyquist.outer_period(Hertz(10_000)) - 0.0005).abs() < 1e-9);
        assert!((nyquist.outer_frequency(Hertz(10_000)) - 2000.0).abs() < 1e-3);
    }

    #[test]
    #[should_panic]
    fn nyquist_factor_zero_is_fatal() {
        NyquistFactor::new(0);
    }

    #[test]
    #[should_panic]
    fn nyquist_factor_twenty_is_fatal() {
        NyquistFactor::new(20);
    }
}
