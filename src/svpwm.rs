//! Space vector modulation: converts a voltage command in the two-phase
//! stationary orthogonal reference frame into three PWM duty fractions.

use crate::park_clarke::TwoPhaseStationary;
use crate::SQRT_3;

/// Returns the three duty fractions, one per half bridge, nominally in the
/// range `0.0..=1.0`.
///
/// `value` is normalized so that `1.0` corresponds to the largest voltage
/// the bridge produces without over modulation, `vdc / sqrt(3)`. Larger
/// commands produce fractions outside of the range; callers clamp.
pub fn svpwm(value: TwoPhaseStationary) -> [f32; 3] {
    // Convert alpha/beta to x/y/z
    let sqrt_3_alpha = SQRT_3 * value.alpha;
    let beta = value.beta;
    let x = beta;
    let y = (beta + sqrt_3_alpha) / 2.;
    let z = (beta - sqrt_3_alpha) / 2.;

    // Sign based sector detection, no trigonometry needed
    let sector: u8 = match (x >= 0., y >= 0., z >= 0.) {
        (true, true, false) => 1,
        (_, true, true) => 2,
        (true, false, true) => 3,
        (false, false, true) => 4,
        (_, false, false) => 5,
        (false, true, false) => 6,
    };

    let t = 1.;
    let (ta, tb, tc) = match sector {
        1 | 4 => (t + x - z, t + x + z, t - x + z),
        2 | 5 => (t + y - z, t + y + z, t - y - z),
        _ => (t + y - x, t - y + x, t - y - x),
    };

    [ta / 2., tb / 2., tc / 2.]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_vector_is_centered() {
        let duties = svpwm(TwoPhaseStationary::default());
        assert_eq!(duties, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn alpha_axis_drives_phase_a_highest() {
        let [a, b, c] = svpwm(TwoPhaseStationary {
            alpha: 0.5,
            beta: 0.0,
        });
        assert!(a > b && a > c);
        assert!((b - c).abs() < 1e-6);
    }

    #[test]
    fn unit_circle_stays_within_bridge_limits() {
        for step in 0..360 {
            let angle = (step as f32).to_radians();
            let duties = svpwm(TwoPhaseStationary {
                alpha: angle.cos(),
                beta: angle.sin(),
            });
            dbg!(step, duties);

            for duty in duties {
                assert!((-1e-5..=1.0 + 1e-5).contains(&duty));
            }
        }
    }

    #[test]
    fn opposite_vectors_mirror_around_center() {
        let forward = svpwm(TwoPhaseStationary {
            alpha: 0.3,
            beta: 0.4,
        });
        let backward = svpwm(TwoPhaseStationary {
            alpha: -0.3,
            beta: -0.4,
        });

        for (f, b) in forward.iter().zip(backward.iter()) {
            assert!((f + b - 1.0).abs() < 1e-5);
        }
    }
}
