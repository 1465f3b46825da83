mod a_opt;
mod d_opt;
mod g_opt;
use crate::{
    Domain, Error, Formula, LinearModel, NLPFunctionTarget, PolytopeSampler, Result,
    SamplerOptions, utils::IntoDVector,
};
pub use a_opt::AOptimality;
pub use d_opt::DOptimality;
use faer::Mat;
use faer_ext::IntoFaer;
pub use g_opt::GOptimality;
use nalgebra::{DMatrix, DVector, Dyn, SymmetricEigen};
use std::sync::Arc;
use tracing::error;

/// Eigenvalue magnitude below which an information matrix direction counts as vanishing.
pub const ZERO_EIGVAL_EPS: f64 = 1e-7;

/// Supported design criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criterion {
    /// Maximizes the log determinant of the information matrix.
    #[default]
    D,
    /// Minimizes the trace of the inverse information matrix.
    A,
    /// Minimizes the maximal leverage of the design points.
    G,
}

impl Criterion {
    /// Ridge term used when none is configured.
    pub fn default_delta(&self) -> f64 {
        match self {
            Criterion::D => 1e-7,
            Criterion::A | Criterion::G => 1e-9,
        }
    }

    /// Optimality measure of the criterion with ridge term `delta`.
    pub fn optimality(&self, delta: f64) -> Arc<dyn Optimality + Send + Sync> {
        match self {
            Criterion::D => Arc::new(DOptimality::new(delta)),
            Criterion::A => Arc::new(AOptimality::new(delta)),
            Criterion::G => Arc::new(GOptimality::new(delta)),
        }
    }
}

/// Defines an optimality measure on the model matrix $M$ (rows = experiments, columns = model
/// terms), which is minimized.
pub trait Optimality {
    /// Ridge term added to the information matrix.
    fn delta(&self) -> f64;
    /// Returns the measure value.
    fn val(&self, model: &DMatrix<f64>) -> f64;
    /// Returns the measure value and its gradient with respect to every entry of the model
    /// matrix.
    fn val_grad(&self, model: &DMatrix<f64>) -> (f64, DMatrix<f64>);
}

#[cfg_attr(doc, katexit::katexit)]
/// Eigen decomposition of the regularized information matrix $M^T M + \delta I$.
pub(crate) fn ridge_eigen(model: &DMatrix<f64>, delta: f64) -> SymmetricEigen<f64, Dyn> {
    let p = model.ncols();
    let a = model.transpose() * model + DMatrix::<f64>::identity(p, p) * delta;
    a.symmetric_eigen()
}

/// Applies `f` to the eigenvalues and recomposes the matrix.
pub(crate) fn eigen_map(eig: &SymmetricEigen<f64, Dyn>, f: impl Fn(f64) -> f64) -> DMatrix<f64> {
    let d = DMatrix::from_diagonal(&eig.eigenvalues.map(|l| f(l.max(f64::MIN_POSITIVE))));
    &eig.eigenvectors * d * eig.eigenvectors.transpose()
}

/// Diagnostic optimality values of a design.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// Sum of the log eigenvalues of the information matrix, larger is better.
    pub d_optimality: f64,
    /// Sum of the reciprocal eigenvalues, smaller is better.
    pub a_optimality: f64,
    /// Maximal leverage, smaller is better.
    pub g_optimality: f64,
}

/// Computes all diagnostic values from a model matrix. Eigenvalues of $M^T M$ with magnitude
/// at most `delta` are ignored for D and A.
pub fn metrics(model: &DMatrix<f64>, delta: f64) -> Metrics {
    let fim = model.transpose() * model;
    let eigvals = fim.symmetric_eigenvalues();
    let relevant = eigvals.iter().filter(|l| l.abs() > delta);
    let d_optimality = relevant.clone().map(|l| l.ln()).sum();
    let a_optimality = relevant.map(|l| 1. / l).sum();
    let inv = eigen_map(&ridge_eigen(model, delta), |l| 1. / l);
    let hat = model * inv * model.transpose();
    let g_optimality = hat.diagonal().max();
    Metrics {
        d_optimality,
        a_optimality,
        g_optimality,
    }
}

/// Number of information matrix eigenvalues with magnitude at most `eps`.
pub fn count_small_eigvals(model: &DMatrix<f64>, eps: f64) -> usize {
    let fim = model.transpose() * model;
    fim.symmetric_eigenvalues()
        .iter()
        .filter(|l| l.abs() <= eps)
        .count()
}

/// Number of information matrix eigenvalues which vanish for every design because of equality
/// constraints, estimated on `n_terms + 3` polytope samples.
pub fn n_zero_eigvals(domain: &Domain, formula: &Formula, seed: u64) -> Result<usize> {
    let n = formula.len() + 3;
    let linear = domain.without_nonlinear();
    let mut sampler = PolytopeSampler::new(&linear, SamplerOptions::new().with_seed(seed));
    let samples = sampler.ask(n)?;
    let columns = domain.design_columns();
    let model = LinearModel::new(formula, &columns)?;
    let design = model.design(&samples.to_matrix(&columns)?)?;
    Ok(count_small_eigvals(&design, ZERO_EIGVAL_EPS))
}

#[cfg_attr(doc, katexit::katexit)]
/// Design objective over the flattened free design points.
///
/// The variable $x \in \mathbb R^{n \cdot m}$ holds `n_free` experiments with `m` inputs row
/// after row. Fixed experiments are appended to the model matrix but are not variables.
pub struct DesignObjective {
    model: Arc<LinearModel>,
    optimality: Arc<dyn Optimality + Send + Sync>,
    n_free: usize,
    fixed_points: DMatrix<f64>,
}

impl DesignObjective {
    /// Creates the objective, `fixed_points` needs one column per model input.
    pub fn new(
        model: Arc<LinearModel>,
        optimality: Arc<dyn Optimality + Send + Sync>,
        n_free: usize,
        fixed_points: DMatrix<f64>,
    ) -> Result<Self> {
        if fixed_points.ncols() != model.n_inputs() {
            return Err(Error::ShapeMismatch {
                mat1: "fixed points",
                mat2: "columns",
                dim1: 1,
                dim2: 0,
                shape1: fixed_points.shape(),
                shape2: (model.n_inputs(), 1),
            });
        }
        Ok(Self {
            model,
            optimality,
            n_free,
            fixed_points,
        })
    }

    /// Number of variables.
    pub fn n_vars(&self) -> usize {
        self.n_free * self.model.n_inputs()
    }

    /// All design points, free rows first.
    pub fn points(&self, flat_x: &[f64]) -> DMatrix<f64> {
        let m = self.model.n_inputs();
        let n_fixed = self.fixed_points.nrows();
        DMatrix::from_fn(self.n_free + n_fixed, m, |i, j| {
            if i < self.n_free {
                flat_x[i * m + j]
            } else {
                self.fixed_points[(i - self.n_free, j)]
            }
        })
    }

    /// Model matrix of all design points. Fails if `flat_x` does not hold `n_free` rows.
    pub fn model_matrix(&self, flat_x: &[f64]) -> Result<DMatrix<f64>> {
        if flat_x.len() != self.n_vars() {
            return Err(Error::ShapeMismatch {
                mat1: "flat design",
                mat2: "free design",
                dim1: 0,
                dim2: 0,
                shape1: (flat_x.len(), 1),
                shape2: (self.n_free, self.model.n_inputs()),
            });
        }
        self.model.design(&self.points(flat_x))
    }

    /// Objective value, infinite for a malformed design vector.
    pub fn evaluate(&self, flat_x: &[f64]) -> f64 {
        match self.model_matrix(flat_x) {
            Ok(model) => self.optimality.val(&model),
            Err(e) => {
                error!(%e, "objective of a malformed design");
                f64::INFINITY
            }
        }
    }

    /// Objective value and gradient with respect to every free design entry. A malformed
    /// design vector yields an infinite value and a zero gradient.
    pub fn evaluate_with_jacobian(&self, flat_x: &[f64]) -> (f64, DVector<f64>) {
        let m = self.model.n_inputs();
        let mut grad = DVector::zeros(self.n_vars());
        let model = match self.model_matrix(flat_x) {
            Ok(model) => model,
            Err(e) => {
                error!(%e, "objective of a malformed design");
                return (f64::INFINITY, grad);
            }
        };
        let (val, grad_model) = self.optimality.val_grad(&model);
        for i in 0..self.n_free {
            let jac_t = self.model.jac_t(&flat_x[i * m..(i + 1) * m]);
            let g = jac_t * grad_model.row(i).transpose();
            grad.rows_mut(i * m, m).copy_from(&g);
        }
        (val, grad)
    }

    /// Gradient with respect to every free design entry.
    pub fn evaluate_jacobian(&self, flat_x: &[f64]) -> DVector<f64> {
        self.evaluate_with_jacobian(flat_x).1
    }

    fn hessian(&self, flat_x: &[f64]) -> DMatrix<f64> {
        let n = self.n_vars();
        let mut hes = DMatrix::zeros(n, n);
        let mut x = flat_x.to_vec();
        for j in 0..n {
            let h = 1e-5 * (1. + flat_x[j].abs());
            x[j] = flat_x[j] + h;
            let g_plus = self.evaluate_jacobian(&x);
            x[j] = flat_x[j] - h;
            let g_minus = self.evaluate_jacobian(&x);
            x[j] = flat_x[j];
            hes.column_mut(j).copy_from(&((g_plus - g_minus) / (2. * h)));
        }
        (&hes + hes.transpose()) / 2.
    }
}

impl NLPFunctionTarget for DesignObjective {
    fn val(&self, x: &Mat<f64>) -> f64 {
        self.evaluate(x.into_dvector().as_slice())
    }

    fn val_grad(&self, x: &Mat<f64>) -> (f64, Mat<f64>) {
        let (val, grad) = self.evaluate_with_jacobian(x.into_dvector().as_slice());
        (val, grad.view_range(.., ..).into_faer().to_owned())
    }

    fn val_grad_hes(&self, x: &Mat<f64>) -> (f64, Mat<f64>, Mat<f64>) {
        let flat_x = x.into_dvector();
        let (val, grad) = self.val_grad(x);
        let hes = self.hessian(flat_x.as_slice());
        (val, grad, hes.view_range(.., ..).into_faer().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContinuousInput, Input, Result, assert_nlp_target_consistency, build_formula};

    const EQ_EPS: f64 = 1e-6;

    fn domain() -> Result<Domain> {
        let inputs = ["x1", "x2", "x3"]
            .iter()
            .map(|k| Ok(ContinuousInput::new(*k, 0., 1.)?.into()))
            .collect::<Result<Vec<Input>>>()?;
        Domain::new(inputs, vec![], vec![])
    }

    fn objective(criterion: Criterion, spec: &str, n: usize) -> Result<DesignObjective> {
        let d = domain()?;
        let formula = build_formula(spec, &d)?;
        let model = LinearModel::new(&formula, &d.design_columns())?;
        DesignObjective::new(
            model.into(),
            criterion.optimality(criterion.default_delta()),
            n,
            DMatrix::zeros(0, 3),
        )
    }

    #[test]
    fn identity_design_regression() -> Result<()> {
        let obj = objective(Criterion::D, "linear", 3)?;
        let x = [1., 0., 0., 0., 1., 0., 0., 0., 1.];
        let expected = -(4_f64.ln()) - (1e-7_f64).ln();
        assert!((obj.evaluate(&x) - expected).abs() < EQ_EPS);
        Ok(())
    }

    #[test]
    fn gradients_match_finite_differences() -> Result<()> {
        let x = [0.1, 0.7, 0.3, 0.9, 0.2, 0.5, 0.4, 0.4, 0.8, 0.6, 0.1, 0.2, 0.3, 0.9, 0.6];
        for criterion in [Criterion::D, Criterion::A, Criterion::G] {
            let obj = objective(criterion, "x1 + x2 + x3 + x1:x2 + {x3**2}", 5)?;
            let grad = obj.evaluate_jacobian(&x);
            for j in 0..x.len() {
                let h = 1e-6;
                let mut xp = x;
                xp[j] += h;
                let mut xm = x;
                xm[j] -= h;
                let fd = (obj.evaluate(&xp) - obj.evaluate(&xm)) / (2. * h);
                assert!(
                    (fd - grad[j]).abs() < 1e-4 * (1. + fd.abs()),
                    "{criterion:?} entry {j}: {fd} vs {}",
                    grad[j]
                );
            }
        }
        Ok(())
    }

    #[test]
    fn nlp_target_consistency() -> Result<()> {
        let obj = objective(Criterion::D, "linear", 4)?;
        let x = DVector::from_vec(vec![
            0.1, 0.7, 0.3, 0.9, 0.2, 0.5, 0.4, 0.4, 0.8, 0.6, 0.1, 0.2,
        ]);
        let x = x.view_range(.., ..).into_faer().to_owned();
        assert_nlp_target_consistency!(obj, &x);
        let (_, _, hes) = obj.val_grad_hes(&x);
        assert_eq!(hes.nrows(), 12);
        Ok(())
    }

    #[test]
    fn metrics_of_identity_design() -> Result<()> {
        let obj = objective(Criterion::D, "linear", 3)?;
        let model = obj.model_matrix(&[1., 0., 0., 0., 1., 0., 0., 0., 1.])?;
        let m = metrics(&model, 1e-7);
        assert!((m.d_optimality - 4_f64.ln()).abs() < EQ_EPS);
        assert!((m.a_optimality - 2.25).abs() < EQ_EPS);
        assert!((m.g_optimality - 1.).abs() < EQ_EPS);
        assert_eq!(count_small_eigvals(&model, ZERO_EIGVAL_EPS), 1);
        Ok(())
    }

    #[test]
    fn fixed_points_enter_model_matrix() -> Result<()> {
        let d = domain()?;
        let formula = build_formula("linear", &d)?;
        let model = LinearModel::new(&formula, &d.design_columns())?;
        let obj = DesignObjective::new(
            model.into(),
            Criterion::D.optimality(1e-7),
            1,
            DMatrix::from_row_slice(2, 3, &[1., 0., 0., 0., 1., 0.]),
        )?;
        let points = obj.points(&[0., 0., 1.]);
        assert_eq!(points.nrows(), 3);
        assert_eq!(points[(0, 2)], 1.);
        assert_eq!(points[(2, 1)], 1.);
        assert_eq!(obj.evaluate_jacobian(&[0., 0., 1.]).len(), 3);
        Ok(())
    }

    #[test]
    fn malformed_designs_are_rejected() -> Result<()> {
        let d = domain()?;
        let model: Arc<LinearModel> =
            LinearModel::new(&build_formula("linear", &d)?, &d.design_columns())?.into();
        let optimality = Criterion::D.optimality(1e-7);
        assert!(matches!(
            DesignObjective::new(model.clone(), optimality.clone(), 1, DMatrix::zeros(1, 2)),
            Err(Error::ShapeMismatch { .. })
        ));
        let obj = DesignObjective::new(model, optimality, 2, DMatrix::zeros(0, 3))?;
        assert!(matches!(obj.model_matrix(&[0.; 5]), Err(Error::ShapeMismatch { .. })));
        assert_eq!(obj.evaluate(&[0.; 5]), f64::INFINITY);
        let (val, grad) = obj.evaluate_with_jacobian(&[0.; 5]);
        assert_eq!(val, f64::INFINITY);
        assert!(grad.iter().all(|g| *g == 0.));
        Ok(())
    }

    #[test]
    fn zero_eigvals_from_mixture_constraint() -> Result<()> {
        let d = Domain::new(
            domain()?.inputs().to_vec(),
            vec![],
            vec![crate::Constraint::linear_equality(
                &["x1", "x2", "x3"],
                vec![1., 1., 1.],
                1.,
            )?],
        )?;
        let formula = build_formula("linear", &d)?;
        assert_eq!(n_zero_eigvals(&d, &formula, 42)?, 1);
        Ok(())
    }
}
