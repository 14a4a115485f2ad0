//! Least-squares weight fitting.
//!
//! Every node scales its raw transform (or, for `Add`, each child) by
//! coefficients chosen to minimise
//!
//! ```text
//! Σ m_i (y_i - Σ_k w_k r_k,i)^2
//! ```
//!
//! over the masked training rows. With at most five regressors the normal
//! equations `A w = b` are tiny, so they are built explicitly and solved by LU
//! decomposition.
//!
//! Before factorising, `A` is equilibrated to unit diagonal
//! (`D^-1/2 A D^-1/2`, `D = diag(A)`). The singularity test then depends only
//! on how collinear the regressors are, not on their magnitudes.

use crate::config::SolverConfig;
use crate::data::Signal;
use crate::error::SolveError;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct WeightSolver {
    singular_tolerance: f64,
}

impl Default for WeightSolver {
    fn default() -> Self {
        Self::new(&SolverConfig::default())
    }
}

impl WeightSolver {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            singular_tolerance: config.singular_tolerance,
        }
    }

    /// Solve for `w` in `Σ w_k r_k ≈ target` over rows where `mask` is set.
    ///
    /// Returns one coefficient per regressor, or an error if the normal
    /// equations contain non-finite entries or have no unique solution.
    pub fn compute_weight(
        &self,
        regressors: &[&Signal],
        target: &Signal,
        mask: &Signal,
    ) -> Result<Vec<f64>, SolveError> {
        let k = regressors.len();
        if k == 0 {
            return Err(SolveError::NoRegressors);
        }
        let rows = target.len();
        for len in std::iter::once(mask.len()).chain(regressors.iter().map(|r| r.len())) {
            if len != rows {
                return Err(SolveError::LengthMismatch {
                    expected: rows,
                    actual: len,
                });
            }
        }

        let masked: Vec<Signal> = regressors.iter().map(|r| r.multiply(mask)).collect();

        let mut a = DMatrix::<f64>::zeros(k, k);
        for i in 0..k {
            for j in i..k {
                let v = masked[i].dot(&masked[j]);
                a[(i, j)] = v;
                a[(j, i)] = v;
            }
        }
        let b = DVector::from_iterator(k, masked.iter().map(|r| r.dot(target)));

        if !a.iter().all(|v| v.is_finite()) || !b.iter().all(|v| v.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        // A zero diagonal entry means an all-zero (masked) regressor.
        if a.diagonal().iter().any(|&d| d <= 0.0) {
            return Err(SolveError::Singular);
        }
        let scale = a.diagonal().map(|d| 1.0 / d.sqrt());
        let a_eq = DMatrix::from_fn(k, k, |i, j| a[(i, j)] * scale[i] * scale[j]);
        let b_eq = b.component_mul(&scale);

        let lu = a_eq.lu();
        if self.is_singular(&lu.u()) {
            return Err(SolveError::Singular);
        }
        let z = lu.solve(&b_eq).ok_or(SolveError::Singular)?;
        let w = z.component_mul(&scale);
        if !w.iter().all(|v| v.is_finite()) {
            return Err(SolveError::Singular);
        }

        Ok(w.iter().copied().collect())
    }

    fn is_singular(&self, u: &DMatrix<f64>) -> bool {
        let pivots = u.diagonal().map(f64::abs);
        let largest = pivots.max();
        let smallest = pivots.min();
        largest == 0.0 || smallest <= self.singular_tolerance * largest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(values: &[f64]) -> Signal {
        Signal::from(values)
    }

    #[test]
    fn test_recovers_exact_coefficients() {
        let a = signal(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = signal(&[2.0, -1.0, 0.5, 3.0, 1.0]);
        let y: Signal = a
            .iter()
            .zip(b.iter())
            .map(|(x, z)| 2.0 * x + 3.0 * z)
            .collect();
        let mask = Signal::constant(1.0, 5);

        let w = WeightSolver::default().compute_weight(&[&a, &b], &y, &mask).unwrap();
        assert_eq!(w.len(), 2);
        assert!((w[0] - 2.0).abs() < 1e-10);
        assert!((w[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_single_regressor_matches_target() {
        let x = signal(&[0.3, -1.2, 4.5, 2.0]);
        let mask = Signal::constant(1.0, 4);

        let w = WeightSolver::default().compute_weight(&[&x], &x, &mask).unwrap();
        assert!((w[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_regressor_fails() {
        let x = signal(&[1.0, f64::NAN, 3.0]);
        let y = signal(&[1.0, 2.0, 3.0]);
        let mask = Signal::constant(1.0, 3);

        let result = WeightSolver::default().compute_weight(&[&x], &y, &mask);
        assert_eq!(result, Err(SolveError::NonFinite));

        let x = signal(&[1.0, f64::INFINITY, 3.0]);
        let result = WeightSolver::default().compute_weight(&[&x], &y, &mask);
        assert_eq!(result, Err(SolveError::NonFinite));
    }

    #[test]
    fn test_linearly_dependent_regressors_are_singular() {
        let a = signal(&[1.0, 2.0, 0.0]);
        let b = signal(&[2.0, 4.0, 0.0]);
        let y = signal(&[0.0, 0.0, 1.0]);
        let mask = Signal::constant(1.0, 3);

        let result = WeightSolver::default().compute_weight(&[&a, &b], &y, &mask);
        assert_eq!(result, Err(SolveError::Singular));

        // Diagonals 4 and 16 equilibrate exactly, so the second pivot is 0.0.
        let a = signal(&[1.0, 1.0, 1.0, 1.0, 0.0]);
        let b = signal(&[2.0, 2.0, 2.0, 2.0, 0.0]);
        let y = signal(&[0.0, 0.0, 0.0, 0.0, 1.0]);
        let mask = Signal::constant(1.0, 5);
        let exact = WeightSolver::new(&SolverConfig {
            singular_tolerance: 0.0,
        });
        assert_eq!(exact.compute_weight(&[&a, &b], &y, &mask), Err(SolveError::Singular));
    }

    #[test]
    fn test_regressors_of_very_different_scale() {
        let big: Signal = (1..=20).map(|k| k as f64).collect();
        let small: Signal = (1..=20).map(|k| 1e-7 * ((k * k) % 7 + 1) as f64).collect();
        let y: Signal = big
            .iter()
            .zip(small.iter())
            .map(|(a, b)| 2.0 * a + 3.0 * b)
            .collect();
        let mask = Signal::constant(1.0, 20);

        let w = WeightSolver::default()
            .compute_weight(&[&big, &small], &y, &mask)
            .unwrap();
        assert!((w[0] - 2.0).abs() < 1e-8);
        assert!((w[1] - 3.0).abs() < 1e-4);

        let x: Signal = (1..=20).map(|k| k as f64).collect();
        let ex = x.exp();
        let y: Signal = ex
            .iter()
            .zip(x.iter())
            .map(|(e, v)| 0.5 * e + 2.0 * v)
            .collect();
        let w = WeightSolver::default()
            .compute_weight(&[&ex, &x], &y, &mask)
            .unwrap();
        assert!((w[0] - 0.5).abs() < 1e-9);
        assert!((w[1] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_rescaling_a_regressor_rescales_its_weight() {
        let a = signal(&[1.0, 2.0, 3.0, 4.0]);
        let b = signal(&[1.0, -1.0, 1.0, -1.0]);
        let y = signal(&[3.0, 1.0, 7.0, 5.0]);
        let mask = Signal::constant(1.0, 4);
        let solver = WeightSolver::default();

        let w = solver.compute_weight(&[&a, &b], &y, &mask).unwrap();
        let huge = a.scale(1e9);
        let w_huge = solver.compute_weight(&[&huge, &b], &y, &mask).unwrap();
        assert!((w_huge[0] * 1e9 - w[0]).abs() < 1e-9);
        assert!((w_huge[1] - w[1]).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_regressor_is_singular() {
        let x = Signal::zeros(3);
        let y = signal(&[1.0, 2.0, 3.0]);
        let mask = Signal::constant(1.0, 3);

        let result = WeightSolver::default().compute_weight(&[&x], &y, &mask);
        assert_eq!(result, Err(SolveError::Singular));
    }

    #[test]
    fn test_mask_excludes_rows() {
        // The last row is an outlier that only the mask keeps out of the fit.
        let x = signal(&[1.0, 2.0, 3.0, 4.0]);
        let y = signal(&[2.0, 4.0, 6.0, 100.0]);
        let mask = signal(&[1.0, 1.0, 1.0, 0.0]);

        let w = WeightSolver::default().compute_weight(&[&x], &y, &mask).unwrap();
        assert!((w[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let x = signal(&[1.0, 2.0]);
        let y = signal(&[1.0, 2.0, 3.0]);
        let mask = Signal::constant(1.0, 3);

        let result = WeightSolver::default().compute_weight(&[&x], &y, &mask);
        assert_eq!(
            result,
            Err(SolveError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            WeightSolver::default().compute_weight(&[], &y, &mask),
            Err(SolveError::NoRegressors)
        );
    }
}
