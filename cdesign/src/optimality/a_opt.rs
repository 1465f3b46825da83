use super::{Optimality, eigen_map, ridge_eigen};
use nalgebra::DMatrix;

#[cfg_attr(doc, katexit::katexit)]
/// A-Optimality is defined as the trace of the inverse of the regularized fisher-information
/// matrix.
///
/// $$ A_{opt} := \text{tr}(M^T M + \delta I)^{-1} = \sum_i \frac{1}{\lambda_i} $$
///
/// with model matrix $M$.
#[derive(Debug, Clone)]
pub struct AOptimality {
    delta: f64,
}

impl AOptimality {
    /// Instantizes [AOptimality]
    pub fn new(delta: f64) -> Self {
        Self { delta }
    }
}

impl Optimality for AOptimality {
    fn delta(&self) -> f64 {
        self.delta
    }

    fn val(&self, model: &DMatrix<f64>) -> f64 {
        let eig = ridge_eigen(model, self.delta);
        eig.eigenvalues
            .iter()
            .map(|l| 1. / l.max(f64::MIN_POSITIVE))
            .sum()
    }

    fn val_grad(&self, model: &DMatrix<f64>) -> (f64, DMatrix<f64>) {
        let eig = ridge_eigen(model, self.delta);
        let val = eig
            .eigenvalues
            .iter()
            .map(|l| 1. / l.max(f64::MIN_POSITIVE))
            .sum();
        let inv_two = eigen_map(&eig, |l| 1. / (l * l));
        (val, -2. * model * inv_two)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    #[test]
    fn a_crit_diagonal_information() -> Result<()> {
        // information matrix diag(2, 8)
        let model = DMatrix::from_row_slice(2, 2, &[1., 2., 1., -2.]);
        let a_opt = AOptimality::new(0.);
        assert!((a_opt.val(&model) - 0.625).abs() < 1e-12);
        let (val, grad) = a_opt.val_grad(&model);
        assert_eq!(val, a_opt.val(&model));
        let expected = DMatrix::from_row_slice(2, 2, &[-0.5, -1. / 16., -0.5, 1. / 16.]);
        assert!(grad.relative_eq(&expected, 1e-12, 1e-12));
        Ok(())
    }
}
