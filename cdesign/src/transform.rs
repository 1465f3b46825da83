use crate::{
    BoundOverrides, Constraint, Domain, Error, LinearConstraint, NLPConstraintFunction, Result,
    utils::{IntoColMat, IntoDVector, combinations},
};
use faer::Mat;
use faer_ext::IntoFaer;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, seq::SliceRandom};

#[cfg_attr(doc, katexit::katexit)]
/// Linear constraints $l \le A x \le u$ over the flattened design vector, where experiment `i`
/// occupies the entries `i * n_inputs .. (i + 1) * n_inputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraintMatrix {
    /// Coefficients, one row per constraint and experiment.
    pub mat: DMatrix<f64>,
    /// Lower bounds, `-inf` for inequalities.
    pub lower: DVector<f64>,
    /// Upper bounds.
    pub upper: DVector<f64>,
}

impl LinearConstraintMatrix {
    fn from_rows(rows: Vec<(Vec<(usize, f64)>, f64, f64)>, n_vars: usize) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let mut mat = DMatrix::zeros(rows.len(), n_vars);
        let mut lower = DVector::zeros(rows.len());
        let mut upper = DVector::zeros(rows.len());
        for (r, (entries, lb, ub)) in rows.into_iter().enumerate() {
            for (j, c) in entries {
                mat[(r, j)] += c;
            }
            lower[r] = lb;
            upper[r] = ub;
        }
        Some(Self { mat, lower, upper })
    }

    /// Number of constraint rows.
    pub fn nrows(&self) -> usize {
        self.mat.nrows()
    }

    /// Returns $A x$.
    pub fn evaluate(&self, flat_x: &[f64]) -> DVector<f64> {
        &self.mat * DVector::from_column_slice(flat_x)
    }
}

/// Whether a nonlinear block has to vanish or stay non-positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonlinearKind {
    /// $c(x) = 0$
    Equality,
    /// $c(x) \le 0$
    Inequality,
}

/// Per experiment evaluation of a nonlinear or NChooseK constraint over the flattened design
/// vector. Values are returned per experiment, jacobian entries are placed at the columns of
/// the constraint's features within each experiment block.
#[derive(Debug, Clone)]
pub struct NonlinearConstraintBlock {
    constraint: Constraint,
    indices: Vec<usize>,
    n_experiments: usize,
    n_inputs: usize,
    kind: NonlinearKind,
}

impl NonlinearConstraintBlock {
    /// Kind of the block.
    pub fn kind(&self) -> NonlinearKind {
        self.kind
    }

    /// Wrapped constraint.
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    fn row(&self, flat_x: &[f64], i: usize) -> Vec<f64> {
        self.indices
            .iter()
            .map(|j| flat_x[i * self.n_inputs + j])
            .collect()
    }

    /// Constraint value for every experiment.
    pub fn evaluate(&self, flat_x: &[f64]) -> DVector<f64> {
        DVector::from_fn(self.n_experiments, |i, _| {
            self.constraint.evaluate(&self.row(flat_x, i))
        })
    }

    /// Jacobian of shape `n_experiments x (n_experiments * n_inputs)`.
    pub fn jacobian(&self, flat_x: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.n_experiments, self.n_experiments * self.n_inputs);
        for i in 0..self.n_experiments {
            let row = self.row(flat_x, i);
            let grad = match &self.constraint {
                Constraint::NonlinearEquality(c) | Constraint::NonlinearInequality(c) => {
                    c.jacobian(&row)
                }
                Constraint::NChooseK(c) => c.jacobian(&row),
                _ => vec![0.; row.len()],
            };
            for (g, j) in grad.iter().zip(&self.indices) {
                jac[(i, i * self.n_inputs + j)] += g;
            }
        }
        jac
    }
}

impl NLPConstraintFunction for NonlinearConstraintBlock {
    fn val(&self, x: &Mat<f64>) -> Mat<f64> {
        self.evaluate(x.into_dvector().as_slice()).into_col_mat()
    }

    fn val_jac(&self, x: &Mat<f64>) -> (Mat<f64>, Mat<f64>) {
        let flat_x = x.into_dvector();
        let val = self.evaluate(flat_x.as_slice()).into_col_mat();
        let jac = self.jacobian(flat_x.as_slice());
        (val, jac.view_range(.., ..).into_faer().to_owned())
    }
}

/// Numeric constraints of a design with `n_experiments` rows.
#[derive(Debug, Clone, Default)]
pub struct NumericConstraints {
    /// Linear equalities including interpoint equalities, `lower == upper`.
    pub linear_equality: Option<LinearConstraintMatrix>,
    /// Linear inequalities with `lower = -inf`.
    pub linear_inequality: Option<LinearConstraintMatrix>,
    /// Nonlinear equalities and inequalities, NChooseK constraints unless ignored.
    pub nonlinear: Vec<NonlinearConstraintBlock>,
}

impl NumericConstraints {
    /// True if every constraint is fulfilled by `flat_x` within `tol`.
    pub fn is_fulfilled(&self, flat_x: &[f64], tol: f64) -> bool {
        let linear_ok = |m: &Option<LinearConstraintMatrix>| match m {
            Some(m) => {
                let v = m.evaluate(flat_x);
                (0..v.len()).all(|r| v[r] >= m.lower[r] - tol && v[r] <= m.upper[r] + tol)
            }
            None => true,
        };
        linear_ok(&self.linear_equality)
            && linear_ok(&self.linear_inequality)
            && self.nonlinear.iter().all(|b| {
                let v = b.evaluate(flat_x);
                v.iter().all(|c| match b.kind {
                    NonlinearKind::Equality => c.abs() <= tol,
                    NonlinearKind::Inequality => *c <= tol,
                })
            })
    }
}

/// Translates the domain constraints into constraints over the flattened design vector of
/// `n_experiments` rows in design column order.
///
/// Linear constraints are normalized by the L2 norm of their coefficients and repeated for every
/// experiment. NChooseK constraints are skipped if `ignore_nchoosek` is set and become nonlinear
/// inequalities otherwise.
pub fn transform_constraints(
    domain: &Domain,
    n_experiments: usize,
    ignore_nchoosek: bool,
) -> Result<NumericConstraints> {
    let columns = domain.design_columns();
    let n_inputs = columns.len();
    let n_vars = n_experiments * n_inputs;
    let indices_of = |c: &Constraint| {
        c.features()
            .iter()
            .map(|f| {
                columns
                    .iter()
                    .position(|k| k == f)
                    .ok_or_else(|| Error::NotImplemented {
                        what: format!("{} constraint on non numeric column `{f}`", c.kind()),
                    })
            })
            .collect::<Result<Vec<usize>>>()
    };

    let mut eq_rows = vec![];
    let mut ineq_rows = vec![];
    let mut nonlinear = vec![];
    for c in domain.constraints() {
        let indices = indices_of(c)?;
        match c {
            Constraint::LinearEquality(l) | Constraint::LinearInequality(l) => {
                let (coefficients, rhs) = l.normalized();
                let equality = matches!(c, Constraint::LinearEquality(_));
                for i in 0..n_experiments {
                    let entries = indices
                        .iter()
                        .zip(&coefficients)
                        .map(|(j, a)| (i * n_inputs + j, *a))
                        .collect();
                    match equality {
                        true => eq_rows.push((entries, rhs, rhs)),
                        false => ineq_rows.push((entries, f64::NEG_INFINITY, rhs)),
                    }
                }
            }
            Constraint::InterpointEquality(ip) => {
                let j = indices[0];
                for batch in ip.batches(n_experiments) {
                    for r in &batch[1..] {
                        eq_rows.push((
                            vec![(batch[0] * n_inputs + j, 1.), (r * n_inputs + j, -1.)],
                            0.,
                            0.,
                        ));
                    }
                }
            }
            Constraint::NonlinearEquality(_) | Constraint::NonlinearInequality(_) => {
                nonlinear.push(NonlinearConstraintBlock {
                    constraint: c.clone(),
                    indices,
                    n_experiments,
                    n_inputs,
                    kind: match c {
                        Constraint::NonlinearEquality(_) => NonlinearKind::Equality,
                        _ => NonlinearKind::Inequality,
                    },
                });
            }
            Constraint::NChooseK(_) => {
                if !ignore_nchoosek {
                    nonlinear.push(NonlinearConstraintBlock {
                        constraint: c.clone(),
                        indices,
                        n_experiments,
                        n_inputs,
                        kind: NonlinearKind::Inequality,
                    });
                }
            }
        }
    }
    Ok(NumericConstraints {
        linear_equality: LinearConstraintMatrix::from_rows(eq_rows, n_vars),
        linear_inequality: LinearConstraintMatrix::from_rows(ineq_rows, n_vars),
        nonlinear,
    })
}

/// Checks whether all NChooseK constraints of the domain can be expressed by pinning features to
/// zero: zero has to lie within the bounds of every constrained feature and no feature may be
/// shared by two NChooseK constraints.
pub fn check_nchoosek_constraints_as_bounds(domain: &Domain) -> Result<()> {
    let mut seen: Vec<&String> = vec![];
    for c in domain.nchoosek_constraints() {
        for f in c.features() {
            let (lower, upper) = domain.effective_bounds(f, &BoundOverrides::new())?;
            if lower > 0. || upper < 0. {
                return Err(Error::NChooseKNotAsBounds {
                    reason: format!("zero is not within the bounds [{lower}, {upper}] of `{f}`"),
                });
            }
            if seen.contains(&f) {
                return Err(Error::NChooseKNotAsBounds {
                    reason: format!("`{f}` is part of more than one NChooseK constraint"),
                });
            }
        }
        seen.extend(c.features());
    }
    Ok(())
}

/// Per experiment bound overrides realizing all NChooseK constraints.
///
/// For every constraint the combinations of `|features| - max_count` features are shuffled
/// once and experiment `i` pins the features of combination `i % n_combinations` to zero.
pub fn nchoosek_constraints_as_bounds<R: Rng + ?Sized>(
    domain: &Domain,
    n_experiments: usize,
    rng: &mut R,
) -> Result<Vec<BoundOverrides>> {
    check_nchoosek_constraints_as_bounds(domain)?;
    let mut overrides = vec![BoundOverrides::new(); n_experiments];
    for c in domain.nchoosek_constraints() {
        let mut ind = combinations(c.features().len(), c.features().len() - c.max_count());
        ind.shuffle(rng);
        if ind.is_empty() {
            continue;
        }
        for (i, o) in overrides.iter_mut().enumerate() {
            for j in &ind[i % ind.len()] {
                o.insert(&c.features()[*j], 0., 0.);
            }
        }
    }
    Ok(overrides)
}

const COLLAPSE_TOL: f64 = 1e-9;
const FEASIBILITY_TOL: f64 = 1e-6;

/// Narrows `overrides` by every linear inequality in which only one input is not fixed. Bounds
/// narrower than `1e-9` collapse to a single value, so inequalities like `q <= u * b` with a
/// binary `b` pinned to zero fix `q` instead of leaving an empty interior.
pub fn tighten_bounds(domain: &Domain, overrides: &BoundOverrides) -> Result<BoundOverrides> {
    let rows: Vec<&LinearConstraint> = domain
        .constraints()
        .iter()
        .filter_map(|c| match c {
            Constraint::LinearInequality(l) => Some(l),
            _ => None,
        })
        .collect();
    let mut tightened = overrides.clone();
    for _ in 0..=rows.len() {
        let mut changed = false;
        for l in &rows {
            let bounds = l
                .features()
                .iter()
                .map(|f| domain.effective_bounds(f, &tightened))
                .collect::<Result<Vec<_>>>()?;
            let is_open = |k: &usize| {
                l.coefficients()[*k] != 0. && bounds[*k].1 - bounds[*k].0 > COLLAPSE_TOL
            };
            let open: Vec<usize> = (0..bounds.len()).filter(is_open).collect();
            let [k] = open.as_slice() else {
                continue;
            };
            let rest: f64 = (0..bounds.len())
                .filter(|j| j != k && l.coefficients()[*j] != 0.)
                .map(|j| l.coefficients()[j] * bounds[j].0)
                .sum();
            let a = l.coefficients()[*k];
            let limit = (l.rhs() - rest) / a;
            let (lower, upper) = bounds[*k];
            let (mut new_lower, mut new_upper) = match a > 0. {
                true => (lower, upper.min(limit)),
                false => (lower.max(limit), upper),
            };
            if new_lower > new_upper + FEASIBILITY_TOL {
                return Err(Error::InfeasibleRegion {
                    reason: format!(
                        "`{}` has to lie within [{new_lower}, {new_upper}]",
                        l.features()[*k]
                    ),
                });
            }
            if new_upper - new_lower <= COLLAPSE_TOL {
                let v = (0.5 * (new_lower + new_upper)).clamp(lower, upper);
                (new_lower, new_upper) = (v, v);
            }
            if new_lower > lower + COLLAPSE_TOL || new_upper < upper - COLLAPSE_TOL {
                tightened.insert(&l.features()[*k], new_lower, new_upper);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(tightened)
}
