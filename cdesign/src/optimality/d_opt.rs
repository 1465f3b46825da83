use super::{Optimality, eigen_map, ridge_eigen};
use nalgebra::DMatrix;

#[cfg_attr(doc, katexit::katexit)]
/// D-Optimality is defined as the negative log determinant of the regularized
/// fisher-information matrix.
///
/// $$ D_{opt} := -\sum_i \log \lambda_i(M^T M + \delta I) $$
///
/// with model matrix $M$. The eigenvalues are used instead of the determinant itself, which keeps
/// the value finite for rank deficient designs. The gradient with respect to the model matrix is
/// $-2 M (M^T M + \delta I)^{-1}$.
#[derive(Debug, Clone)]
pub struct DOptimality {
    delta: f64,
}

impl DOptimality {
    /// Instantizes [DOptimality]
    pub fn new(delta: f64) -> Self {
        Self { delta }
    }
}

impl Optimality for DOptimality {
    fn delta(&self) -> f64 {
        self.delta
    }

    fn val(&self, model: &DMatrix<f64>) -> f64 {
        let eig = ridge_eigen(model, self.delta);
        -eig.eigenvalues
            .iter()
            .map(|l| l.max(f64::MIN_POSITIVE).ln())
            .sum::<f64>()
    }

    fn val_grad(&self, model: &DMatrix<f64>) -> (f64, DMatrix<f64>) {
        let eig = ridge_eigen(model, self.delta);
        let val = -eig
            .eigenvalues
            .iter()
            .map(|l| l.max(f64::MIN_POSITIVE).ln())
            .sum::<f64>();
        let inv = eigen_map(&eig, |l| 1. / l);
        (val, -2. * model * inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    #[test]
    fn d_crit_weight_consistency() -> Result<()> {
        // single column model [1, 2] has information 5
        let model = DMatrix::from_row_slice(2, 1, &[1., 2.]);
        let d_opt = DOptimality::new(0.);
        assert!((d_opt.val(&model) + 5_f64.ln()).abs() < 1e-12);
        let (val, grad) = d_opt.val_grad(&model);
        assert_eq!(val, d_opt.val(&model));
        assert!(grad.relative_eq(
            &DMatrix::from_row_slice(2, 1, &[-0.4, -0.8]),
            1e-12,
            1e-12
        ));
        Ok(())
    }

    #[test]
    fn d_crit_duplicated_rows() -> Result<()> {
        let model = DMatrix::from_row_slice(3, 2, &[1., 0.5, 1., 0.5, 1., 0.5]);
        let d_opt = DOptimality::new(1e-7);
        let (val, grad) = d_opt.val_grad(&model);
        assert!(val.is_finite());
        assert!(grad.iter().all(|g| g.is_finite()));
        Ok(())
    }
}
