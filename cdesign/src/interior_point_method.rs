use crate::{Error, Result};
use faer::{Mat, linalg::solvers::Solve, unzip, zip};
use faer_ext::{IntoFaer, IntoNalgebra};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use tracing::{debug, trace};

/// Interface for functions of which values are minimized by proving value, gradient and hessian
/// methods.
pub trait NLPFunctionTarget {
    /// Returns the value of its function at x.
    fn val(&self, x: &Mat<f64>) -> f64;
    /// Returns the value and gradient of its function at x.
    fn val_grad(&self, x: &Mat<f64>) -> (f64, Mat<f64>);
    /// Returns the value, gradient and hessian of its function at x.
    fn val_grad_hes(&self, x: &Mat<f64>) -> (f64, Mat<f64>, Mat<f64>);
}

/// Interface for vector valued constraint functions $c:\mathbb R^n \to \mathbb R^k$.
pub trait NLPConstraintFunction {
    /// Returns the constraint values at x as column of length k.
    fn val(&self, x: &Mat<f64>) -> Mat<f64>;
    /// Returns the constraint values and the jacobian of shape k x n at x.
    fn val_jac(&self, x: &Mat<f64>) -> (Mat<f64>, Mat<f64>);
}

/// Ensures the consistency of of [NLPFunctionTarget] value, gradient and hessian methods.
#[macro_export]
macro_rules! assert_nlp_target_consistency {
    ($feature:ident, $x:expr) => {
        let val = $feature.val($x);
        let val_grad = $feature.val_grad($x);
        let val_grad_hes = $feature.val_grad_hes($x);
        assert_eq!(val, val_grad.0);
        assert_eq!(val, val_grad_hes.0);
        assert_eq!(val_grad.1, val_grad_hes.1);
    };
}

/// Configuration of [NLPSolver].
#[derive(Debug, Clone)]
pub struct NLPSolverOptions {
    barrier_prec: f64,
    newton_prec: f64,
    barrier_max_iter: u64,
    newton_max_iter: u64,
    backline_max_iter: u64,
    barrier_mu: f64,
    barrier_t0: f64,
    backline_a: f64,
    backline_b: f64,
    penalty_rho0: f64,
    penalty_rho_max: f64,
    feasibility_tol: f64,
}

impl Default for NLPSolverOptions {
    fn default() -> Self {
        Self {
            barrier_prec: 1e-8,
            newton_prec: 1e-6,
            barrier_max_iter: 100,
            newton_max_iter: 50,
            backline_max_iter: 30,
            barrier_mu: 10.,
            barrier_t0: 1.,
            backline_a: 0.01,
            backline_b: 0.5,
            penalty_rho0: 10.,
            penalty_rho_max: 1e8,
            feasibility_tol: 1e-6,
        }
    }
}

impl NLPSolverOptions {
    /// Creates a new nlp solver Configuration with its default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the options with the duality gap at which the barrier method stops.
    pub fn with_barrier_prec(mut self, barrier_prec: f64) -> Self {
        self.barrier_prec = barrier_prec;
        self
    }

    /// Returns the options with the maximal number of barrier iterations.
    pub fn with_barrier_max_iter(mut self, barrier_max_iter: u64) -> Self {
        self.barrier_max_iter = barrier_max_iter;
        self
    }

    /// Returns the options with the maximal number of newton steps per barrier iteration.
    pub fn with_newton_max_iter(mut self, newton_max_iter: u64) -> Self {
        self.newton_max_iter = newton_max_iter;
        self
    }

    /// Returns the options with the largest penalty weight of nonlinear constraints.
    pub fn with_penalty_rho_max(mut self, penalty_rho_max: f64) -> Self {
        self.penalty_rho_max = penalty_rho_max;
        self
    }

    /// Returns the options with the tolerance up to which a start point may violate bounds and
    /// linear inequalities.
    pub fn with_feasibility_tol(mut self, feasibility_tol: f64) -> Self {
        self.feasibility_tol = feasibility_tol;
        self
    }
}

/// Box constraint of x, infinite bounds are allowed.
pub struct NLPBound {
    /// Lower bounds.
    pub lower: Mat<f64>,
    /// Upper bounds.
    pub upper: Mat<f64>,
}

impl NLPBound {
    /// Creates the bound from nalgebra vectors.
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Self {
        let lower = lower.view_range(.., ..).into_faer().to_owned();
        let upper = upper.view_range(.., ..).into_faer().to_owned();
        Self { lower, upper }
    }
}

#[cfg_attr(doc, katexit::katexit)]
/// Define the linear equality constraint of [NLPSolver] by providing the matrix M of shape k x
/// m, where m is the size of x and k the number of constraints, and the right hand side b.
///
/// Linear equality constraint: $M x = b, M \in \mathbb R^{k \times m}, b \in \mathbb R^k$
///
/// Linear dependent rows are removed by the solver.
pub struct LinearEqualityConstraint {
    /// Linear equality constraint matrix.
    pub mat: DMatrix<f64>,
    /// Right hand side.
    pub rhs: DVector<f64>,
}

#[cfg_attr(doc, katexit::katexit)]
/// Linear inequality constraint $G x \le h$ handled by a logarithmic barrier.
pub struct LinearInequalityConstraint {
    /// Linear inequality constraint matrix.
    pub mat: DMatrix<f64>,
    /// Right hand side.
    pub rhs: DVector<f64>,
}

/// Nonlinear constraints, handled by a quadratic penalty.
#[derive(Clone)]
pub enum NonlinearConstraintFunction {
    /// $c(x) = 0$
    Equality(Arc<dyn NLPConstraintFunction + Send + Sync>),
    /// $c(x) \le 0$
    Inequality(Arc<dyn NLPConstraintFunction + Send + Sync>),
}

/// All constraint types for [NLPSolver].
#[derive(Default)]
pub struct NLPSolverConstraints {
    /// Cubic constraint for x.
    pub bound: Option<NLPBound>,
    /// Linear equality constraint.
    pub lin_equal: Option<LinearEqualityConstraint>,
    /// Linear inequality constraint.
    pub lin_inequal: Option<LinearInequalityConstraint>,
    /// Nonlinear equality and inequality constraints.
    pub nonlinear: Vec<NonlinearConstraintFunction>,
}

struct NLPPreComputation {
    // rows restricted to free variables, linear independent
    lin_equal_free: Option<Mat<f64>>,
    lin_equal_full: Option<Mat<f64>>,
    lin_equal_rhs: Option<Mat<f64>>,
    lin_inequal: Option<(Mat<f64>, Mat<f64>)>,
    lin_inequal_const: Vec<(DVector<f64>, f64)>,
}

/// Non linear programming solver that minimizes [NLPFunctionTarget] within given
/// [NLPSolverConstraints].
///
/// Bounds and linear inequalities are handled by logarithmic barriers, linear equalities by
/// equality constrained newton steps and nonlinear constraints by an increasing quadratic
/// penalty. Variables with equal lower and upper bound are kept fixed.
pub struct NLPSolver {
    options: NLPSolverOptions,
    constraints: NLPSolverConstraints,
    func: Arc<dyn NLPFunctionTarget + Send + Sync>,
    fixed: Vec<bool>,
    pre_computation: NLPPreComputation,
}

const FIXED_TOL: f64 = 1e-12;

impl NLPSolver {
    /// Initialize the NLP solver.
    pub fn new(
        options: NLPSolverOptions,
        constraints: NLPSolverConstraints,
        func: Arc<dyn NLPFunctionTarget + Send + Sync>,
    ) -> Self {
        let fixed = match &constraints.bound {
            Some(bound) => (0..bound.lower.nrows())
                .map(|i| bound.upper[(i, 0)] - bound.lower[(i, 0)] <= FIXED_TOL)
                .collect(),
            None => vec![],
        };
        let pre_computation = NLPSolver::pre_computation(&constraints, &fixed);
        Self {
            options,
            constraints,
            func,
            fixed,
            pre_computation,
        }
    }

    fn is_fixed(&self, i: usize) -> bool {
        self.fixed.get(i).copied().unwrap_or(false)
    }

    fn pre_computation(constraints: &NLPSolverConstraints, fixed: &[bool]) -> NLPPreComputation {
        let is_fixed = |j: usize| fixed.get(j).copied().unwrap_or(false);
        let mut pre = NLPPreComputation {
            lin_equal_free: None,
            lin_equal_full: None,
            lin_equal_rhs: None,
            lin_inequal: None,
            lin_inequal_const: vec![],
        };
        if let Some(lin_equal) = &constraints.lin_equal {
            let mut free = lin_equal.mat.clone();
            for j in 0..free.ncols() {
                if is_fixed(j) {
                    free.column_mut(j).fill(0.);
                }
            }
            let rows = independent_rows(&free);
            if !rows.is_empty() {
                let select = |m: &DMatrix<f64>| {
                    DMatrix::from_fn(rows.len(), m.ncols(), |i, j| m[(rows[i], j)])
                };
                let rhs = DVector::from_fn(rows.len(), |i, _| lin_equal.rhs[rows[i]]);
                pre.lin_equal_free = Some(select(&free).view_range(.., ..).into_faer().to_owned());
                pre.lin_equal_full = Some(
                    select(&lin_equal.mat)
                        .view_range(.., ..)
                        .into_faer()
                        .to_owned(),
                );
                pre.lin_equal_rhs = Some(rhs.view_range(.., ..).into_faer().to_owned());
            }
        }
        if let Some(lin_inequal) = &constraints.lin_inequal {
            let mut barrier_rows = vec![];
            for i in 0..lin_inequal.mat.nrows() {
                let row = lin_inequal.mat.row(i);
                let has_free = (0..row.len()).any(|j| !is_fixed(j) && row[j] != 0.);
                if has_free {
                    barrier_rows.push(i);
                } else {
                    pre.lin_inequal_const
                        .push((row.transpose().into_owned(), lin_inequal.rhs[i]));
                }
            }
            if !barrier_rows.is_empty() {
                let g = DMatrix::from_fn(barrier_rows.len(), lin_inequal.mat.ncols(), |i, j| {
                    lin_inequal.mat[(barrier_rows[i], j)]
                });
                let h =
                    DVector::from_fn(barrier_rows.len(), |i, _| lin_inequal.rhs[barrier_rows[i]]);
                pre.lin_inequal = Some((
                    g.view_range(.., ..).into_faer().to_owned(),
                    h.view_range(.., ..).into_faer().to_owned(),
                ));
            }
        }
        pre
    }

    /// Returns x that minimizes the [NLPFunctionTarget] within given [NLPSolverConstraints].
    ///
    /// Fails with [Error::InfeasibleRegion] if the start point violates bounds or linear
    /// inequalities by more than the feasibility tolerance.
    pub fn minimize(&self, x0: DVector<f64>) -> Result<DVector<f64>> {
        let x = self.initial_point(x0)?;
        let x = self.barrier_method(x);
        Ok(x.as_ref().into_nalgebra().column(0).into())
    }

    fn initial_point(&self, x0: DVector<f64>) -> Result<Mat<f64>> {
        let mut x = x0.view_range(.., ..).into_faer().to_owned();
        let tol = self.options.feasibility_tol;
        if let Some(bound) = &self.constraints.bound {
            if bound.lower.nrows() != x.nrows() {
                return Err(Error::ShapeMismatch {
                    mat1: "bound",
                    mat2: "x0",
                    dim1: 0,
                    dim2: 0,
                    shape1: (bound.lower.nrows(), 1),
                    shape2: (x.nrows(), 1),
                });
            }
            for i in 0..x.nrows() {
                let (l, u) = (bound.lower[(i, 0)], bound.upper[(i, 0)]);
                let v = x[(i, 0)];
                if v < l - tol * (1. + l.abs()) || v > u + tol * (1. + u.abs()) {
                    return Err(Error::InfeasibleRegion {
                        reason: format!("start value {v} of variable {i} is outside [{l}, {u}]"),
                    });
                }
                if self.is_fixed(i) {
                    x[(i, 0)] = l;
                    continue;
                }
                let margin = (1e-8 * (1. + v.abs())).min(if (u - l).is_finite() {
                    (u - l) / 4.
                } else {
                    f64::INFINITY
                });
                x[(i, 0)] = v.max(l + margin).min(u - margin);
            }
        }
        for (row, h) in &self.pre_computation.lin_inequal_const {
            let xn: DVector<f64> = x.as_ref().into_nalgebra().column(0).into();
            let v = row.dot(&xn);
            if v > h + tol * (1. + h.abs()) {
                return Err(Error::InfeasibleRegion {
                    reason: format!("fixed variables violate a linear inequality: {v} > {h}"),
                });
            }
        }
        if let Some((g, h)) = &self.pre_computation.lin_inequal {
            let gx = g * &x;
            for i in 0..gx.nrows() {
                if gx[(i, 0)] > h[(i, 0)] + tol * (1. + h[(i, 0)].abs()) {
                    return Err(Error::InfeasibleRegion {
                        reason: format!(
                            "start point violates linear inequality {i}: {} > {}",
                            gx[(i, 0)],
                            h[(i, 0)]
                        ),
                    });
                }
            }
        }
        Ok(x)
    }

    fn barrier_count(&self) -> usize {
        let mut m = 0;
        if let Some(bound) = &self.constraints.bound {
            for i in 0..bound.lower.nrows() {
                if !self.is_fixed(i) {
                    m += bound.lower[(i, 0)].is_finite() as usize;
                    m += bound.upper[(i, 0)].is_finite() as usize;
                }
            }
        }
        if let Some((g, _)) = &self.pre_computation.lin_inequal {
            m += g.nrows();
        }
        m.max(1)
    }

    fn barrier_method(&self, mut x: Mat<f64>) -> Mat<f64> {
        let m = self.barrier_count() as f64;
        // linear inequality rows which are tight at the start point get a small slack
        let h_shift = self.inequality_shift(&x);
        let mut t = self.options.barrier_t0;
        let mut rho = self.options.penalty_rho0;
        let mut i = 0;
        while i < self.options.barrier_max_iter && m / t >= self.options.barrier_prec {
            i += 1;
            x = self.newton_method(x, t, rho, &h_shift);
            t *= self.options.barrier_mu;
            rho = (rho * self.options.barrier_mu).min(self.options.penalty_rho_max);
        }
        debug!(
            barrier_iterations = i,
            t,
            value = self.func.val(&x),
            penalty = self.penalty(&x),
            "barrier method finished"
        );
        x
    }

    fn inequality_shift(&self, x: &Mat<f64>) -> Mat<f64> {
        match &self.pre_computation.lin_inequal {
            Some((g, h)) => {
                let gx = g * x;
                let mut shift = Mat::<f64>::zeros(h.nrows(), 1);
                for i in 0..h.nrows() {
                    let slack = h[(i, 0)] - gx[(i, 0)];
                    let min_slack = 1e-9 * (1. + h[(i, 0)].abs());
                    if slack < min_slack {
                        shift[(i, 0)] = min_slack - slack;
                    }
                }
                shift
            }
            None => Mat::<f64>::zeros(0, 1),
        }
    }

    fn newton_method(&self, mut x: Mat<f64>, t: f64, rho: f64, h_shift: &Mat<f64>) -> Mat<f64> {
        let x_size = x.nrows();
        let k = self
            .pre_computation
            .lin_equal_free
            .as_ref()
            .map(|a| a.nrows())
            .unwrap_or(0);
        let dim = x_size + k;

        let mut i = 0;
        let mut backline_exceeded = false;
        while i < self.options.newton_max_iter && !backline_exceeded {
            i += 1;
            let (merit, grad, hes) = self.merit_grad_hes(&x, t, rho, h_shift);

            let mut a = Mat::<f64>::zeros(dim, dim);
            let mut b = Mat::<f64>::zeros(dim, 1);
            b.as_mut()
                .submatrix_mut(0, 0, x_size, 1)
                .copy_from(-&grad);
            if let (Some(a_free), Some(a_full), Some(rhs)) = (
                &self.pre_computation.lin_equal_free,
                &self.pre_computation.lin_equal_full,
                &self.pre_computation.lin_equal_rhs,
            ) {
                a.as_mut()
                    .submatrix_mut(x_size, 0, k, x_size)
                    .copy_from(a_free.to_owned());
                a.as_mut()
                    .submatrix_mut(0, x_size, x_size, k)
                    .copy_from(a_free.transpose().to_owned());
                let residual = rhs - a_full * &x;
                b.as_mut()
                    .submatrix_mut(x_size, 0, k, 1)
                    .copy_from(residual);
            }

            let hes_scale = (0..x_size)
                .map(|j| hes[(j, j)].abs())
                .fold(0., f64::max)
                .max(1.);
            let mut tau = 0.;
            let mut dx = Mat::<f64>::zeros(x_size, 1);
            let mut descent = false;
            for attempt in 0..10 {
                let mut a_try = a.clone();
                let mut h_try = hes.clone();
                for j in 0..x_size {
                    h_try[(j, j)] += tau;
                }
                if attempt == 9 {
                    // projected gradient step
                    h_try = Mat::<f64>::zeros(x_size, x_size);
                    for j in 0..x_size {
                        h_try[(j, j)] = hes_scale;
                    }
                }
                self.fix_rows(&mut h_try);
                a_try
                    .as_mut()
                    .submatrix_mut(0, 0, x_size, x_size)
                    .copy_from(h_try);
                let dx_total = a_try.partial_piv_lu().solve(&b);
                dx = dx_total.submatrix(0, 0, x_size, 1).to_owned();
                let slope = (grad.transpose() * &dx)[(0, 0)];
                if dx.norm_l2().is_finite() && (slope < 0. || dx.norm_l2() < 1e-14) {
                    descent = true;
                    break;
                }
                tau = if tau == 0. { 1e-6 * hes_scale } else { tau * 10. };
            }
            if !descent {
                trace!(newton_iteration = i, "no descent direction");
                break;
            }
            let decrement = -(grad.transpose() * &dx)[(0, 0)];
            if decrement / 2. <= self.options.newton_prec && self.equality_residual(&x) < 1e-9
            {
                break;
            }
            self.backline_search(
                &mut x,
                dx,
                &mut backline_exceeded,
                merit,
                decrement,
                t,
                rho,
                h_shift,
            );
        }
        trace!(newton_iterations = i, t, rho, "newton method finished");
        x
    }

    fn fix_rows(&self, hes: &mut Mat<f64>) {
        for j in 0..hes.nrows() {
            if self.is_fixed(j) {
                for i in 0..hes.nrows() {
                    hes[(i, j)] = 0.;
                    hes[(j, i)] = 0.;
                }
                hes[(j, j)] = 1.;
            }
        }
    }

    fn equality_residual(&self, x: &Mat<f64>) -> f64 {
        match (
            &self.pre_computation.lin_equal_full,
            &self.pre_computation.lin_equal_rhs,
        ) {
            (Some(a), Some(rhs)) => (rhs - a * x).norm_l2(),
            _ => 0.,
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[inline(always)]
    fn backline_search(
        &self,
        x: &mut Mat<f64>,
        mut dx: Mat<f64>,
        backline_exceeded: &mut bool,
        old_merit: f64,
        decrement: f64,
        t: f64,
        rho: f64,
        h_shift: &Mat<f64>,
    ) {
        let residual = self.equality_residual(x);
        let mut a = self.max_step(x, &dx).min(1.);
        for j in 0..dx.nrows() {
            if self.is_fixed(j) {
                dx[(j, 0)] = 0.;
            }
        }
        let mut iter = 0;
        let mut search = true;
        while iter < self.options.backline_max_iter && search {
            iter += 1;
            let x_tmp = &*x + a * &dx;
            if self.feasibility_check(&x_tmp, h_shift) {
                let merit = self.merit(&x_tmp, t, rho, h_shift);
                let armijo = merit <= old_merit - self.options.backline_a * a * decrement;
                let residual_decrease = residual > 1e-9
                    && self.equality_residual(&x_tmp) < residual
                    && merit.is_finite();
                if armijo || residual_decrease {
                    *x = x_tmp;
                    search = false;
                    continue;
                }
            }
            a *= self.options.backline_b;
        }
        if search {
            *backline_exceeded = true;
        }
    }

    /// Largest step keeping x strictly inside the bounds and linear inequalities.
    fn max_step(&self, x: &Mat<f64>, dx: &Mat<f64>) -> f64 {
        let mut step = f64::INFINITY;
        if let Some(bound) = &self.constraints.bound {
            for i in 0..x.nrows() {
                if self.is_fixed(i) {
                    continue;
                }
                let d = dx[(i, 0)];
                if d < 0. && bound.lower[(i, 0)].is_finite() {
                    step = step.min((bound.lower[(i, 0)] - x[(i, 0)]) / d);
                } else if d > 0. && bound.upper[(i, 0)].is_finite() {
                    step = step.min((bound.upper[(i, 0)] - x[(i, 0)]) / d);
                }
            }
        }
        if let Some((g, _)) = &self.pre_computation.lin_inequal {
            let slack = self.inequality_slack(x);
            let gdx = g * dx;
            for i in 0..gdx.nrows() {
                if gdx[(i, 0)] > 0. {
                    step = step.min(slack[(i, 0)] / gdx[(i, 0)]);
                }
            }
        }
        0.99 * step
    }

    fn inequality_slack(&self, x: &Mat<f64>) -> Mat<f64> {
        match &self.pre_computation.lin_inequal {
            Some((g, h)) => h - g * x,
            None => Mat::<f64>::zeros(0, 1),
        }
    }

    #[inline(always)]
    fn feasibility_check(&self, x: &Mat<f64>, h_shift: &Mat<f64>) -> bool {
        if let Some(bound) = &self.constraints.bound {
            for i in 0..x.nrows() {
                if self.is_fixed(i) {
                    continue;
                }
                if x[(i, 0)] <= bound.lower[(i, 0)] || x[(i, 0)] >= bound.upper[(i, 0)] {
                    return false;
                }
            }
        }
        let slack = self.inequality_slack(x);
        (0..slack.nrows()).all(|i| slack[(i, 0)] + h_shift[(i, 0)] > 0.)
    }

    fn merit(&self, x: &Mat<f64>, t: f64, rho: f64, h_shift: &Mat<f64>) -> f64 {
        let mut val = t * (self.func.val(x) + rho * self.penalty(x));
        if let Some(bound) = &self.constraints.bound {
            for i in 0..x.nrows() {
                if self.is_fixed(i) {
                    continue;
                }
                if bound.lower[(i, 0)].is_finite() {
                    val -= (x[(i, 0)] - bound.lower[(i, 0)]).ln();
                }
                if bound.upper[(i, 0)].is_finite() {
                    val -= (bound.upper[(i, 0)] - x[(i, 0)]).ln();
                }
            }
        }
        let slack = self.inequality_slack(x);
        for i in 0..slack.nrows() {
            val -= (slack[(i, 0)] + h_shift[(i, 0)]).ln();
        }
        val
    }

    fn merit_grad_hes(
        &self,
        x: &Mat<f64>,
        t: f64,
        rho: f64,
        h_shift: &Mat<f64>,
    ) -> (f64, Mat<f64>, Mat<f64>) {
        let (func_val, mut grad, mut hes) = self.func.val_grad_hes(x);
        let (pen_val, pen_grad, pen_hes) = self.penalty_grad_hes(x);
        let mut val = t * (func_val + rho * pen_val);
        grad *= t;
        hes *= t;
        grad += (t * rho) * pen_grad;
        hes += (t * rho) * pen_hes;

        if let Some(bound) = &self.constraints.bound {
            let (bound_val, bound_grad, bound_hes) = self.log_barrier_bound_grad_hes(x, bound);
            val += bound_val;
            grad += bound_grad;
            hes += bound_hes;
        }
        if let Some((g, _)) = &self.pre_computation.lin_inequal {
            let slack = self.inequality_slack(x);
            for i in 0..slack.nrows() {
                let s = slack[(i, 0)] + h_shift[(i, 0)];
                val -= s.ln();
                for j in 0..x.nrows() {
                    grad[(j, 0)] += g[(i, j)] / s;
                }
                for j in 0..x.nrows() {
                    if g[(i, j)] == 0. {
                        continue;
                    }
                    for l in 0..x.nrows() {
                        hes[(j, l)] += g[(i, j)] * g[(i, l)] / (s * s);
                    }
                }
            }
        }
        for j in 0..x.nrows() {
            if self.is_fixed(j) {
                grad[(j, 0)] = 0.;
            }
        }
        (val, grad, hes)
    }

    fn penalty(&self, x: &Mat<f64>) -> f64 {
        self.constraints
            .nonlinear
            .iter()
            .map(|c| match c {
                NonlinearConstraintFunction::Equality(f) => {
                    let v = f.val(x);
                    (0..v.nrows()).map(|i| v[(i, 0)].powi(2)).sum::<f64>()
                }
                NonlinearConstraintFunction::Inequality(f) => {
                    let v = f.val(x);
                    (0..v.nrows()).map(|i| v[(i, 0)].max(0.).powi(2)).sum::<f64>()
                }
            })
            .sum()
    }

    /// Quadratic penalty with its gradient and gauss-newton hessian.
    fn penalty_grad_hes(&self, x: &Mat<f64>) -> (f64, Mat<f64>, Mat<f64>) {
        let n = x.nrows();
        let mut val = 0.;
        let mut grad = Mat::<f64>::zeros(n, 1);
        let mut hes = Mat::<f64>::zeros(n, n);
        for c in &self.constraints.nonlinear {
            let (f, inequality) = match c {
                NonlinearConstraintFunction::Equality(f) => (f, false),
                NonlinearConstraintFunction::Inequality(f) => (f, true),
            };
            let (mut v, mut jac) = f.val_jac(x);
            if inequality {
                for i in 0..v.nrows() {
                    if v[(i, 0)] <= 0. {
                        v[(i, 0)] = 0.;
                        for j in 0..n {
                            jac[(i, j)] = 0.;
                        }
                    }
                }
            }
            val += (0..v.nrows()).map(|i| v[(i, 0)].powi(2)).sum::<f64>();
            grad += 2. * (jac.transpose() * &v);
            hes += 2. * (jac.transpose() * &jac);
        }
        (val, grad, hes)
    }

    #[inline(always)]
    fn log_barrier_bound_grad_hes(
        &self,
        x: &Mat<f64>,
        bound: &NLPBound,
    ) -> (f64, Mat<f64>, Mat<f64>) {
        let mut val = 0.;
        let mut grad = Mat::<f64>::zeros(x.nrows(), 1);
        zip!(&mut grad, x, &bound.lower, &bound.upper).for_each(|unzip!(g, v, l, u)| {
            let mut d = 0.;
            if l.is_finite() && *u - *l > FIXED_TOL {
                d += 1.0 / (*l - *v);
            }
            if u.is_finite() && *u - *l > FIXED_TOL {
                d += 1.0 / (*u - *v);
            }
            *g = d;
        });
        let mut hes = Mat::<f64>::zeros(x.nrows(), x.nrows());
        for i in 0..hes.nrows() {
            if self.is_fixed(i) {
                continue;
            }
            let (l, u, v) = (bound.lower[(i, 0)], bound.upper[(i, 0)], x[(i, 0)]);
            if l.is_finite() {
                val -= (v - l).ln();
                hes[(i, i)] += 1.0 / (l - v).powi(2);
            }
            if u.is_finite() {
                val -= (u - v).ln();
                hes[(i, i)] += 1.0 / (u - v).powi(2);
            }
        }
        (val, grad, hes)
    }
}

/// Indices of a maximal set of linear independent rows, chosen greedily in row order.
fn independent_rows(mat: &DMatrix<f64>) -> Vec<usize> {
    let mut basis: Vec<DVector<f64>> = vec![];
    let mut rows = vec![];
    for i in 0..mat.nrows() {
        let row: DVector<f64> = mat.row(i).transpose().into_owned();
        let norm = row.norm();
        if norm < 1e-12 {
            continue;
        }
        let mut r = row.clone();
        for b in &basis {
            let proj = r.dot(b);
            r -= proj * b;
        }
        let r_norm = r.norm();
        if r_norm > 1e-9 * norm {
            basis.push(r / r_norm);
            rows.push(i);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use faer::mat;

    struct NLPTargetTest {}

    impl NLPFunctionTarget for NLPTargetTest {
        fn val(&self, x: &Mat<f64>) -> f64 {
            x[(0, 0)].powi(2)
        }

        fn val_grad(&self, x: &Mat<f64>) -> (f64, Mat<f64>) {
            (self.val(x), 2. * x)
        }
        fn val_grad_hes(&self, x: &Mat<f64>) -> (f64, Mat<f64>, Mat<f64>) {
            let vg = self.val_grad(x);
            (vg.0, vg.1, mat![[2.]])
        }
    }

    /// (x - 1)^2 + (y - 2)^2
    struct Paraboloid {}

    impl NLPFunctionTarget for Paraboloid {
        fn val(&self, x: &Mat<f64>) -> f64 {
            (x[(0, 0)] - 1.).powi(2) + (x[(1, 0)] - 2.).powi(2)
        }
        fn val_grad(&self, x: &Mat<f64>) -> (f64, Mat<f64>) {
            let mut grad = Mat::<f64>::zeros(2, 1);
            grad[(0, 0)] = 2. * (x[(0, 0)] - 1.);
            grad[(1, 0)] = 2. * (x[(1, 0)] - 2.);
            (self.val(x), grad)
        }
        fn val_grad_hes(&self, x: &Mat<f64>) -> (f64, Mat<f64>, Mat<f64>) {
            let (val, grad) = self.val_grad(x);
            (val, grad, mat![[2., 0.], [0., 2.]])
        }
    }

    /// x^2 + y^2 - 1
    struct Circle {}

    impl NLPConstraintFunction for Circle {
        fn val(&self, x: &Mat<f64>) -> Mat<f64> {
            mat![[x[(0, 0)].powi(2) + x[(1, 0)].powi(2) - 1.]]
        }
        fn val_jac(&self, x: &Mat<f64>) -> (Mat<f64>, Mat<f64>) {
            (self.val(x), mat![[2. * x[(0, 0)], 2. * x[(1, 0)]]])
        }
    }

    fn unit_box(size: usize) -> Option<NLPBound> {
        Some(NLPBound::new(
            DVector::from_element(size, 0.),
            DVector::from_element(size, 1.),
        ))
    }

    #[test]
    fn test_nlp_solver() -> Result<()> {
        let size = 1;
        for i in 0..10 {
            let lower = (i as f64) / 20.;
            let bound = Some(NLPBound::new(
                DVector::from_element(size, lower),
                DVector::from_element(size, 1.),
            ));
            let constraints = NLPSolverConstraints {
                bound,
                ..Default::default()
            };
            let options = NLPSolverOptions::new();

            let nlp_target: Arc<_> = NLPTargetTest {}.into();

            let solver = NLPSolver::new(options, constraints, nlp_target);
            let x0 = DVector::from_vec(vec![0.9]);
            let x_min = solver.minimize(x0)?;
            assert!(x_min.relative_eq(&DVector::from_vec(vec![lower]), 1e-4, 1e-4));
        }
        Ok(())
    }

    #[test]
    fn test_nlp_solver_start_outside() -> Result<()> {
        let constraints = NLPSolverConstraints {
            bound: unit_box(1),
            ..Default::default()
        };
        let nlp_target: Arc<_> = NLPTargetTest {}.into();
        let solver = NLPSolver::new(NLPSolverOptions::new(), constraints, nlp_target);
        let x0 = DVector::from_vec(vec![2.9]);
        assert!(matches!(
            solver.minimize(x0),
            Err(Error::InfeasibleRegion { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_nlp_solver_linear_constr() -> Result<()> {
        // x + y = 1 within the unit box, optimum at (0, 1)
        let lin_equal = Some(LinearEqualityConstraint {
            mat: DMatrix::from_row_slice(1, 2, &[1., 1.]),
            rhs: DVector::from_vec(vec![1.]),
        });
        let constraints = NLPSolverConstraints {
            bound: unit_box(2),
            lin_equal,
            ..Default::default()
        };
        let solver = NLPSolver::new(NLPSolverOptions::new(), constraints, Arc::new(Paraboloid {}));
        let x_min = solver.minimize(DVector::from_vec(vec![0.5, 0.5]))?;
        assert!(x_min.relative_eq(&DVector::from_vec(vec![0., 1.]), 1e-4, 1e-4));
        Ok(())
    }

    #[test]
    fn test_nlp_solver_dependent_equalities() -> Result<()> {
        let lin_equal = Some(LinearEqualityConstraint {
            mat: DMatrix::from_row_slice(2, 2, &[1., -1., 2., -2.]),
            rhs: DVector::from_vec(vec![0., 0.]),
        });
        let constraints = NLPSolverConstraints {
            bound: Some(NLPBound::new(
                DVector::from_element(2, -5.),
                DVector::from_element(2, 5.),
            )),
            lin_equal,
            ..Default::default()
        };
        let solver = NLPSolver::new(NLPSolverOptions::new(), constraints, Arc::new(Paraboloid {}));
        let x_min = solver.minimize(DVector::from_vec(vec![0., 0.]))?;
        assert!(x_min.relative_eq(&DVector::from_vec(vec![1.5, 1.5]), 1e-4, 1e-4));
        Ok(())
    }

    #[test]
    fn test_nlp_solver_linear_inequality() -> Result<()> {
        // x + y <= 1, optimum is the projection of (1, 2) onto the half space
        let lin_inequal = Some(LinearInequalityConstraint {
            mat: DMatrix::from_row_slice(1, 2, &[1., 1.]),
            rhs: DVector::from_vec(vec![1.]),
        });
        let constraints = NLPSolverConstraints {
            bound: Some(NLPBound::new(
                DVector::from_element(2, -5.),
                DVector::from_element(2, 5.),
            )),
            lin_inequal,
            ..Default::default()
        };
        let solver = NLPSolver::new(NLPSolverOptions::new(), constraints, Arc::new(Paraboloid {}));
        let x_min = solver.minimize(DVector::from_vec(vec![0., 0.]))?;
        assert!(x_min.relative_eq(&DVector::from_vec(vec![0., 1.]), 1e-4, 1e-4));
        Ok(())
    }

    #[test]
    fn test_nlp_solver_fixed_variable() -> Result<()> {
        let constraints = NLPSolverConstraints {
            bound: Some(NLPBound::new(
                DVector::from_vec(vec![0.25, 0.]),
                DVector::from_vec(vec![0.25, 5.]),
            )),
            ..Default::default()
        };
        let solver = NLPSolver::new(NLPSolverOptions::new(), constraints, Arc::new(Paraboloid {}));
        let x_min = solver.minimize(DVector::from_vec(vec![0.25, 4.]))?;
        assert!(x_min.relative_eq(&DVector::from_vec(vec![0.25, 2.]), 1e-4, 1e-4));
        Ok(())
    }

    #[test]
    fn test_nlp_solver_nonlinear_equality() -> Result<()> {
        // closest point to (1, 2) on the unit circle
        let constraints = NLPSolverConstraints {
            bound: Some(NLPBound::new(
                DVector::from_element(2, -2.),
                DVector::from_element(2, 2.),
            )),
            nonlinear: vec![NonlinearConstraintFunction::Equality(Arc::new(Circle {}))],
            ..Default::default()
        };
        let solver = NLPSolver::new(NLPSolverOptions::new(), constraints, Arc::new(Paraboloid {}));
        let x_min = solver.minimize(DVector::from_vec(vec![0.1, 0.1]))?;
        let norm = 5_f64.sqrt();
        assert!(x_min.relative_eq(
            &DVector::from_vec(vec![1. / norm, 2. / norm]),
            1e-3,
            1e-3
        ));
        Ok(())
    }

    #[test]
    fn test_independent_rows() {
        let m = DMatrix::from_row_slice(4, 2, &[1., 1., 2., 2., 0., 0., 1., 0.]);
        assert_eq!(independent_rows(&m), vec![0, 3]);
    }
}
