use super::{Optimality, eigen_map, ridge_eigen};
use nalgebra::DMatrix;

#[cfg_attr(doc, katexit::katexit)]
/// G-Optimality is defined as the maximal leverage of the design points.
///
/// $$ G_{opt} := \max_k \left(M (M^T M + \delta I)^{-1} M^T\right)_{kk} $$
///
/// with model matrix $M$. The gradient is the one of the leverage attaining the maximum.
#[derive(Debug, Clone)]
pub struct GOptimality {
    delta: f64,
}

impl GOptimality {
    /// Instantizes [GOptimality]
    pub fn new(delta: f64) -> Self {
        Self { delta }
    }

    fn leverages(&self, model: &DMatrix<f64>) -> (DMatrix<f64>, Vec<f64>) {
        let inv = eigen_map(&ridge_eigen(model, self.delta), |l| 1. / l);
        let leverages = (0..model.nrows())
            .map(|k| {
                let m_k = model.row(k);
                (m_k * &inv * m_k.transpose())[(0, 0)]
            })
            .collect();
        (inv, leverages)
    }
}

fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(i_max, v_max), (i, v)| {
            if *v > v_max { (i, *v) } else { (i_max, v_max) }
        })
}

impl Optimality for GOptimality {
    fn delta(&self) -> f64 {
        self.delta
    }

    fn val(&self, model: &DMatrix<f64>) -> f64 {
        argmax(&self.leverages(model).1).1
    }

    fn val_grad(&self, model: &DMatrix<f64>) -> (f64, DMatrix<f64>) {
        let (inv, leverages) = self.leverages(model);
        let (k, val) = argmax(&leverages);
        let mut grad = DMatrix::zeros(model.nrows(), model.ncols());
        if model.nrows() == 0 {
            return (val, grad);
        }
        let v = &inv * model.row(k).transpose();
        let u = model * &v;
        grad -= 2. * &u * v.transpose();
        let mut row_k = grad.row_mut(k);
        row_k += 2. * v.transpose();
        (val, grad)
    }
}
