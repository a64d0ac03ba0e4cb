//! Recursive least squares estimator.
//!
//! Fits `target = regressor · coefficients` online, one sample at a time:
//!
//! ```text
//! e(n) = y(n) - x(n)ᵀ θ(n-1)
//! k(n) = P(n-1) x(n) / (λ + x(n)ᵀ P(n-1) x(n))
//! θ(n) = θ(n-1) + k(n) e(n)
//! P(n) = (P(n-1) - k(n) x(n)ᵀ P(n-1)) / λ
//! ```
//!
//! where λ is the forgetting factor. Storage is fixed size, nothing
//! allocates.

use log::warn;

/// Diagnostics of a single [`RecursiveLeastSquares::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EstimationMetrics {
    /// A priori prediction error.
    pub innovation: f32,
    /// A posteriori prediction error.
    pub residual: f32,
    /// Trace of the covariance matrix.
    pub uncertainty: f32,
    /// The covariance had to be re-seeded during this update.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Converged,
    NotConverged,
}

#[derive(Debug, Clone)]
pub struct RecursiveLeastSquares<const N: usize> {
    coefficients: [f32; N],
    covariance: [[f32; N]; N],
    initial_covariance: f32,
    forgetting_factor: f32,
}

impl<const N: usize> RecursiveLeastSquares<N> {
    /// # Panics
    ///
    /// Unless `initial_covariance > 0` and `0 < forgetting_factor < 1`.
    pub fn new(initial_covariance: f32, forgetting_factor: f32) -> Self {
        assert!(initial_covariance > 0.0, "initial covariance must be positive");
        assert!(
            forgetting_factor > 0.0 && forgetting_factor < 1.0,
            "forgetting factor must be within (0, 1)"
        );

        Self {
            coefficients: [0.0; N],
            covariance: seeded(initial_covariance),
            initial_covariance,
            forgetting_factor,
        }
    }

    pub fn coefficients(&self) -> &[f32; N] {
        &self.coefficients
    }

    pub fn forgetting_factor(&self) -> f32 {
        self.forgetting_factor
    }

    /// Forgets everything learned so far.
    pub fn reset(&mut self) {
        self.coefficients = [0.0; N];
        self.covariance = seeded(self.initial_covariance);
    }

    pub fn update(&mut self, regressor: &[f32; N], target: f32) -> EstimationMetrics {
        let innovation = target - dot(regressor, &self.coefficients);

        let mut p_x = [0.0; N];
        for (row, p_x) in self.covariance.iter().zip(p_x.iter_mut()) {
            *p_x = dot(row, regressor);
        }

        let denominator = self.forgetting_factor + dot(regressor, &p_x);
        if !innovation.is_finite() || !denominator.is_finite() || denominator <= f32::EPSILON {
            return self.degrade(innovation);
        }

        let previous = self.coefficients;
        for (coefficient, p_x) in self.coefficients.iter_mut().zip(p_x.iter()) {
            *coefficient += p_x / denominator * innovation;
        }

        for i in 0..N {
            for j in 0..N {
                let updated = self.covariance[i][j] - p_x[i] * p_x[j] / denominator;
                self.covariance[i][j] = updated / self.forgetting_factor;
            }
        }
        symmetrize(&mut self.covariance);

        let uncertainty = self.limit_windup();

        if !uncertainty.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            self.coefficients = previous;
            return self.degrade(innovation);
        }

        EstimationMetrics {
            innovation,
            residual: target - dot(regressor, &self.coefficients),
            uncertainty,
            degraded: false,
        }
    }

    /// Converged only when both the innovation and the uncertainty are below
    /// their thresholds, and the update was numerically sound.
    pub fn evaluate_convergence(
        metrics: &EstimationMetrics,
        innovation_threshold: f32,
        uncertainty_threshold: f32,
    ) -> Convergence {
        if !metrics.degraded
            && libm::fabsf(metrics.innovation) < innovation_threshold
            && metrics.uncertainty < uncertainty_threshold
        {
            Convergence::Converged
        } else {
            Convergence::NotConverged
        }
    }

    /// Without excitation the forgetting factor inflates the covariance
    /// every sample; it is scaled back so it never exceeds the seed.
    fn limit_windup(&mut self) -> f32 {
        let maximum = self.initial_covariance * N as f32;
        let uncertainty = trace(&self.covariance);

        if uncertainty > maximum {
            let scale = maximum / uncertainty;
            for value in self.covariance.iter_mut().flatten() {
                *value *= scale;
            }
            maximum
        } else {
            uncertainty
        }
    }

    fn degrade(&mut self, innovation: f32) -> EstimationMetrics {
        warn!("rls: ill-conditioned update, covariance re-seeded");
        self.covariance = seeded(self.initial_covariance);

        EstimationMetrics {
            innovation,
            residual: innovation,
            uncertainty: trace(&self.covariance),
            degraded: true,
        }
    }
}

fn seeded<const N: usize>(value: f32) -> [[f32; N]; N] {
    let mut matrix = [[0.0; N]; N];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[i] = value;
    }
    matrix
}

fn dot<const N: usize>(lhs: &[f32; N], rhs: &[f32; N]) -> f32 {
    lhs.iter().zip(rhs.iter()).map(|(l, r)| l * r).sum()
}

fn trace<const N: usize>(matrix: &[[f32; N]; N]) -> f32 {
    (0..N).map(|i| matrix[i][i]).sum()
}

fn symmetrize<const N: usize>(matrix: &mut [[f32; N]; N]) {
    for i in 0..N {
        for j in (i + 1)..N {
            let mean = 0.5 * (matrix[i][j] + matrix[j][i]);
            matrix[i][j] = mean;
            matrix[j][i] = mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(innovation: f32, uncertainty: f32) -> EstimationMetrics {
        EstimationMetrics {
            innovation,
            residual: 0.0,
            uncertainty,
            degraded: false,
        }
    }

    #[test]
    fn identifies_a_linear_system() {
        let truth = [0.5, -0.3, 0.1];
        let mut rls = RecursiveLeastSquares::<3>::new(1000.0, 0.99);

        for i in 0..300 {
            let t = i as f32;
            let regressor = [(t * 0.7).sin(), (t * 0.31).cos(), 1.0];
            let target = dot(&truth, &regressor);
            rls.update(&regressor, target);
        }

        let coefficients = rls.coefficients();
        dbg!(coefficients);
        for (estimate, expected) in coefficients.iter().zip(truth.iter()) {
            assert!((estimate - expected).abs() < 0.01);
        }
    }

    #[test]
    fn innovation_shrinks_while_learning() {
        let mut rls = RecursiveLeastSquares::<2>::new(1000.0, 0.98);

        let first = rls.update(&[1.0, 2.0], 4.0);
        let mut last = first;
        for i in 0..200 {
            let x = (i as f32 * 0.5).sin();
            last = rls.update(&[x, 1.0], 3.0 * x + 1.0);
        }

        assert!(first.innovation.abs() > 1.0);
        assert!(last.innovation.abs() < 1e-3);
        assert!(last.residual.abs() <= last.innovation.abs() + 1e-6);
        assert!(last.uncertainty < first.uncertainty);
    }

    #[test]
    fn convergence_requires_both_thresholds() {
        type Rls = RecursiveLeastSquares<3>;

        assert_eq!(
            Rls::evaluate_convergence(&metrics(0.0001, 0.01), 0.001, 0.1),
            Convergence::Converged
        );
        assert_eq!(
            Rls::evaluate_convergence(&metrics(-0.0001, 0.01), 0.001, 0.1),
            Convergence::Converged
        );
        assert_eq!(
            Rls::evaluate_convergence(&metrics(0.01, 0.01), 0.001, 0.1),
            Convergence::NotConverged
        );
        assert_eq!(
            Rls::evaluate_convergence(&metrics(0.0001, 0.5), 0.001, 0.1),
            Convergence::NotConverged
        );
        assert_eq!(
            Rls::evaluate_convergence(&metrics(0.01, 0.5), 0.001, 0.1),
            Convergence::NotConverged
        );
    }

    #[test]
    fn degraded_updates_never_converge() {
        let mut degraded = metrics(0.0, 0.0);
        degraded.degraded = true;

        assert_eq!(
            RecursiveLeastSquares::<3>::evaluate_convergence(&degraded, 1.0, 1.0),
            Convergence::NotConverged
        );
    }

    #[test]
    fn non_finite_inputs_do_not_poison_the_estimate() {
        let mut rls = RecursiveLeastSquares::<2>::new(1000.0, 0.99);
        rls.update(&[1.0, 1.0], 2.0);
        let before = *rls.coefficients();

        let result = rls.update(&[f32::NAN, 1.0], 2.0);
        assert!(result.degraded);
        assert_eq!(*rls.coefficients(), before);

        let result = rls.update(&[1.0, 1.0], f32::INFINITY);
        assert!(result.degraded);
        assert_eq!(*rls.coefficients(), before);

        let result = rls.update(&[1.0, 1.0], 2.0);
        assert!(!result.degraded);
        assert!(rls.coefficients().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn covariance_windup_is_bounded() {
        let mut rls = RecursiveLeastSquares::<3>::new(100.0, 0.9);

        for _ in 0..1000 {
            let result = rls.update(&[0.0, 0.0, 0.0], 0.0);
            assert!(result.uncertainty <= 300.0 + 1e-3);
            assert!(!result.degraded);
        }
    }

    #[test]
    fn huge_regressors_stay_finite() {
        let mut rls = RecursiveLeastSquares::<3>::new(1000.0, 0.99);

        for i in 0..100 {
            let scale = if i % 2 == 0 { 1e12 } else { 1e-12 };
            let result = rls.update(&[scale, 1.0, scale], 1.0);
            assert!(result.uncertainty.is_finite());
        }
        assert!(rls.coefficients().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn reset_reseeds() {
        let mut rls = RecursiveLeastSquares::<2>::new(50.0, 0.99);
        rls.update(&[1.0, 0.5], 3.0);
        rls.reset();

        assert_eq!(*rls.coefficients(), [0.0, 0.0]);
        let result = rls.update(&[0.0, 0.0], 0.0);
        assert!((result.uncertainty - 100.0).abs() < 1e-3);
    }

    #[test]
    #[should_panic]
    fn forgetting_factor_of_one_is_fatal() {
        RecursiveLeastSquares::<3>::new(1000.0, 1.0);
    }
}
