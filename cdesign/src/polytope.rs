use crate::{
    BoundOverrides, Column, Constraint, Domain, Error, Input, LinearInequalityConstraint,
    NLPFunctionTarget, NLPSolver, NLPSolverConstraints, NLPSolverOptions, Result, Table, Warning,
    transform::tighten_bounds,
    utils::count_unique_rows,
};
use faer::Mat;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng, seq::index};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::Arc;
use tracing::{debug, info};

const FIXED_TOL: f64 = 1e-12;
const FEASIBILITY_TOL: f64 = 1e-6;
const INTERIOR_EPS: f64 = 1e-9;
const NULLSPACE_EPS: f64 = 1e-10;

/// Configuration of [PolytopeSampler].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    n_burnin: usize,
    n_thinning: usize,
    seed: u64,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            n_burnin: 1000,
            n_thinning: 32,
            seed: 0,
        }
    }
}

impl SamplerOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit-and-run steps before the first sample is taken.
    pub fn with_n_burnin(mut self, n_burnin: usize) -> Self {
        self.n_burnin = n_burnin;
        self
    }

    /// Hit-and-run steps between two samples.
    pub fn with_n_thinning(mut self, n_thinning: usize) -> Self {
        self.n_thinning = n_thinning;
        self
    }

    /// Seed of the random generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Burn-in steps.
    pub fn n_burnin(&self) -> usize {
        self.n_burnin
    }

    /// Thinning steps.
    pub fn n_thinning(&self) -> usize {
        self.n_thinning
    }

    /// Seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Lifecycle of a [PolytopeSampler].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Created, no random generator yet.
    Idle,
    /// Random generator seeded, sampling in progress or failed.
    Seeded,
    /// At least one successful `ask`.
    Sampled,
    /// Warnings collected, the next `ask` reseeds.
    Done,
}

/// Hit-and-run sampler of the polytope spanned by the input bounds and the linear, interpoint
/// and NChooseK constraints of a domain.
///
/// NChooseK constraints are resolved by sampling per combination of unused features, with the
/// unused features pinned to zero through [BoundOverrides]. Linear equalities containing a
/// single free feature fix that feature. Categorical and discrete inputs are sampled uniformly.
///
/// ```
/// use cdesign::{Constraint, ContinuousInput, Domain, PolytopeSampler, SamplerOptions};
///
/// let domain = Domain::new(
///     vec![
///         ContinuousInput::new("x1", 0., 1.).unwrap().into(),
///         ContinuousInput::new("x2", 0., 1.).unwrap().into(),
///     ],
///     vec![],
///     vec![Constraint::linear_equality(&["x1", "x2"], vec![1., 1.], 1.).unwrap()],
/// )
/// .unwrap();
/// let mut sampler = PolytopeSampler::new(&domain, SamplerOptions::new().with_seed(1));
/// let samples = sampler.ask(5).unwrap();
/// let (x1, x2) = (samples.numeric("x1").unwrap(), samples.numeric("x2").unwrap());
/// assert!(x1.iter().zip(x2).all(|(a, b)| (a + b - 1.).abs() < 1e-9));
/// ```
pub struct PolytopeSampler<'a> {
    domain: &'a Domain,
    options: SamplerOptions,
    rng: Option<ChaCha8Rng>,
    state: SamplerState,
    warnings: Vec<Warning>,
}

impl<'a> PolytopeSampler<'a> {
    /// Creates an idle sampler.
    pub fn new(domain: &'a Domain, options: SamplerOptions) -> Self {
        Self {
            domain,
            options,
            rng: None,
            state: SamplerState::Idle,
            warnings: vec![],
        }
    }

    /// Current state.
    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Warnings raised so far.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Returns the collected warnings. A following `ask` starts again from the seed.
    pub fn finish(&mut self) -> Vec<Warning> {
        self.state = SamplerState::Done;
        self.rng = None;
        std::mem::take(&mut self.warnings)
    }

    /// Draws `n` samples. Subsequent calls continue the random stream of the sampler.
    ///
    /// Fails with [Error::NotImplemented] for domains with nonlinear constraints and with
    /// [Error::InfeasibleRegion] if the polytope has no interior.
    pub fn ask(&mut self, n: usize) -> Result<Table> {
        if let Some(c) = self.domain.constraints().iter().find(|c| {
            matches!(
                c,
                Constraint::NonlinearEquality(_) | Constraint::NonlinearInequality(_)
            )
        }) {
            return Err(Error::NotImplemented {
                what: format!("polytope sampling with {} constraints", c.kind()),
            });
        }
        if self.rng.is_none() {
            self.state = SamplerState::Seeded;
        }
        let seed = self.options.seed;
        let rng = self
            .rng
            .get_or_insert_with(|| ChaCha8Rng::seed_from_u64(seed));
        let table = match self.domain.nchoosek_constraints().next().is_some() && n > 0 {
            true => sample_nchoosek(self.domain, n, &self.options, rng, &mut self.warnings)?,
            false => sample_rows(
                self.domain,
                &vec![BoundOverrides::new(); n],
                &self.options,
                rng,
                &mut self.warnings,
            )?,
        };
        self.state = SamplerState::Sampled;
        Ok(table)
    }
}

/// Draws `n` samples of the domain polytope with a fresh sampler.
pub fn sample_polytope(
    domain: &Domain,
    n: usize,
    burn_in: usize,
    thinning: usize,
    seed: u64,
) -> Result<Table> {
    let options = SamplerOptions::new()
        .with_n_burnin(burn_in)
        .with_n_thinning(thinning)
        .with_seed(seed);
    PolytopeSampler::new(domain, options).ask(n)
}

fn sample_nchoosek<R: Rng + ?Sized>(
    domain: &Domain,
    n: usize,
    options: &SamplerOptions,
    rng: &mut R,
    warnings: &mut Vec<Warning>,
) -> Result<Table> {
    let (_, unused) = domain.nchoosek_combinations();
    if unused.is_empty() {
        return Err(Error::InfeasibleRegion {
            reason: "no feature combination fulfills all NChooseK constraints".to_string(),
        });
    }
    let reduced = domain.without_nchoosek();
    let (selected, per_combination): (Vec<&Vec<String>>, usize) = match n <= unused.len() {
        true => (
            index::sample(rng, unused.len(), n)
                .into_iter()
                .map(|i| &unused[i])
                .collect(),
            1,
        ),
        false => (unused.iter().collect(), n.div_ceil(unused.len())),
    };
    info!(
        n_combinations = selected.len(),
        per_combination, "sampling NChooseK combinations"
    );
    let mut table: Option<Table> = None;
    for features in selected {
        let mut overrides = BoundOverrides::new();
        for f in features {
            overrides.insert(f, 0., 0.);
        }
        let mut child = ChaCha8Rng::seed_from_u64(rng.random());
        let samples = sample_rows(
            &reduced,
            &vec![overrides; per_combination],
            options,
            &mut child,
            warnings,
        )?;
        match table.as_mut() {
            Some(t) => t.append(&samples)?,
            None => table = Some(samples),
        }
    }
    let table = table.unwrap_or_default();
    let rows = index::sample(rng, table.nrows(), n).into_vec();
    Ok(table.select_rows(&rows))
}

/// Samples one row per entry of `overrides`, row `i` within the bounds narrowed by
/// `overrides[i]`. Only linear and interpoint constraints are taken into account.
pub(crate) fn sample_rows<R: Rng + ?Sized>(
    domain: &Domain,
    overrides: &[BoundOverrides],
    options: &SamplerOptions,
    rng: &mut R,
    warnings: &mut Vec<Warning>,
) -> Result<Table> {
    let overrides = overrides
        .iter()
        .map(|o| tighten_bounds(domain, o))
        .collect::<Result<Vec<_>>>()?;
    let n = overrides.len();
    let keys: Vec<&str> = domain.continuous_inputs().map(|c| c.key()).collect();
    let d = keys.len();
    let has_linear = domain.constraints().iter().any(|c| {
        matches!(
            c,
            Constraint::LinearEquality(_)
                | Constraint::LinearInequality(_)
                | Constraint::InterpointEquality(_)
        )
    });

    // row-major values of the continuous inputs
    let mut values = vec![0.; n * d];
    let mut n_free = 0;
    if !has_linear {
        debug!(n, "sampling inputs independently");
        for (j, key) in keys.iter().enumerate() {
            for (i, o) in overrides.iter().enumerate() {
                let (lower, upper) = domain.effective_bounds(key, o)?;
                values[i * d + j] = match upper - lower <= FIXED_TOL {
                    true => lower,
                    false => {
                        n_free += 1;
                        lower + (upper - lower) * rng.random::<f64>()
                    }
                };
            }
        }
    } else if domain
        .constraints()
        .iter()
        .any(|c| matches!(c, Constraint::InterpointEquality(_)))
    {
        let all: Vec<&BoundOverrides> = overrides.iter().collect();
        let mut region = Region::new(domain, &keys, &all)?;
        n_free = region.dim();
        region.walk(options.n_burnin + options.n_thinning, rng);
        values = region.point();
    } else {
        let mut groups: Vec<(&BoundOverrides, Vec<usize>)> = vec![];
        for (i, o) in overrides.iter().enumerate() {
            match groups.iter_mut().find(|(g, _)| *g == o) {
                Some((_, rows)) => rows.push(i),
                None => groups.push((o, vec![i])),
            }
        }
        for (o, rows) in groups {
            let mut region = Region::new(domain, &keys, &[o])?;
            n_free = n_free.max(region.dim());
            region.walk(options.n_burnin, rng);
            for i in rows {
                region.walk(options.n_thinning, rng);
                values[i * d..(i + 1) * d].copy_from_slice(&region.point());
            }
        }
    }

    if d > 0 && n_free == 0 {
        warnings.push(Warning::DegenerateSample.emit());
    } else if d > 0 && n > 1 {
        let rows: Vec<Vec<f64>> = values.chunks(d).map(|r| r.to_vec()).collect();
        let unique = count_unique_rows(&rows, 0.);
        if unique < n {
            warnings.push(Warning::SamplesNotUnique { unique, requested: n }.emit());
        }
    }

    let mut table = Table::new(n);
    for input in domain.inputs() {
        let column = match input {
            Input::Continuous(c) => {
                let j = keys.iter().position(|k| *k == c.key()).unwrap_or_default();
                Column::Numeric((0..n).map(|i| values[i * d + j]).collect())
            }
            Input::Discrete(x) => Column::Numeric(x.sample(n, rng)),
            Input::Categorical(c) => Column::Categorical(c.sample(n, rng)),
            Input::CategoricalDescriptor(c) => Column::Categorical(c.categorical().sample(n, rng)),
        };
        table.push(input.key(), column)?;
    }
    Ok(table)
}

/// Polytope of `r` experiments in the coordinates `w` of the affine hull of the equalities,
/// $x_{free} = z_p + N w$ with orthonormal $N$, subject to $C w \le e$.
struct Region {
    fixed: Vec<Option<f64>>,
    free: Vec<usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    particular: DVector<f64>,
    basis: DMatrix<f64>,
    c: DMatrix<f64>,
    e: DVector<f64>,
    w: DVector<f64>,
}

type SparseRow = (Vec<(usize, f64)>, f64);

impl Region {
    fn new(domain: &Domain, keys: &[&str], overrides: &[&BoundOverrides]) -> Result<Self> {
        let d = keys.len();
        let r = overrides.len();
        let index_of = |f: &str| {
            keys.iter()
                .position(|k| *k == f)
                .ok_or_else(|| Error::NotImplemented {
                    what: format!("polytope sampling of the non continuous input `{f}`"),
                })
        };

        let mut lower = vec![0.; r * d];
        let mut upper = vec![0.; r * d];
        for (i, o) in overrides.iter().enumerate() {
            for (j, key) in keys.iter().enumerate() {
                (lower[i * d + j], upper[i * d + j]) = domain.effective_bounds(key, o)?;
            }
        }

        let mut equalities: Vec<SparseRow> = vec![];
        let mut inequalities: Vec<SparseRow> = vec![];
        for c in domain.constraints() {
            match c {
                Constraint::LinearEquality(l) | Constraint::LinearInequality(l) => {
                    let idx = l
                        .features()
                        .iter()
                        .map(|f| index_of(f.as_str()))
                        .collect::<Result<Vec<_>>>()?;
                    for i in 0..r {
                        let entries = idx
                            .iter()
                            .zip(l.coefficients())
                            .map(|(j, a)| (i * d + j, *a))
                            .collect();
                        match c {
                            Constraint::LinearEquality(_) => equalities.push((entries, l.rhs())),
                            _ => inequalities.push((entries, l.rhs())),
                        }
                    }
                }
                Constraint::InterpointEquality(ip) if r > 1 => {
                    let j = index_of(ip.feature())?;
                    for batch in ip.batches(r) {
                        for b in &batch[1..] {
                            equalities.push((vec![(batch[0] * d + j, 1.), (b * d + j, -1.)], 0.));
                        }
                    }
                }
                _ => {}
            }
        }

        let mut fixed: Vec<Option<f64>> = (0..r * d)
            .map(|j| (upper[j] - lower[j] <= FIXED_TOL).then_some(lower[j]))
            .collect();
        let residual = |(entries, rhs): &SparseRow, fixed: &[Option<f64>]| {
            rhs - entries
                .iter()
                .filter_map(|(j, a)| fixed[*j].map(|v| a * v))
                .sum::<f64>()
        };

        // fold equalities with a single free feature into fixed values
        let mut consumed = vec![false; equalities.len()];
        loop {
            let mut changed = false;
            for (k, row) in equalities.iter().enumerate() {
                if consumed[k] {
                    continue;
                }
                let open: Vec<&(usize, f64)> = row
                    .0
                    .iter()
                    .filter(|(j, a)| fixed[*j].is_none() && *a != 0.)
                    .collect();
                let rest = residual(row, &fixed);
                match open.as_slice() {
                    [] => {
                        if rest.abs() > FEASIBILITY_TOL {
                            return Err(Error::InfeasibleRegion {
                                reason: format!("linear equality is violated by {rest}"),
                            });
                        }
                        consumed[k] = true;
                    }
                    [(j, a)] => {
                        let v = rest / a;
                        if v < lower[*j] - FEASIBILITY_TOL || v > upper[*j] + FEASIBILITY_TOL {
                            return Err(Error::InfeasibleRegion {
                                reason: format!(
                                    "`{}` is fixed to {v} outside of [{}, {}]",
                                    keys[j % d],
                                    lower[*j],
                                    upper[*j]
                                ),
                            });
                        }
                        fixed[*j] = Some(v.clamp(lower[*j], upper[*j]));
                        consumed[k] = true;
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }

        let free: Vec<usize> = (0..r * d).filter(|j| fixed[*j].is_none()).collect();
        let f = free.len();
        let position = |j: usize| free.iter().position(|p| *p == j);
        let to_dense = |rows: Vec<&SparseRow>| {
            let mut mat = DMatrix::<f64>::zeros(rows.len(), f);
            let rhs = DVector::from_fn(rows.len(), |k, _| residual(rows[k], &fixed));
            for (k, (entries, _)) in rows.iter().enumerate() {
                for (j, a) in entries {
                    if let Some(p) = position(*j) {
                        mat[(k, p)] += a;
                    }
                }
            }
            (mat, rhs)
        };

        let mut barrier_rows = vec![];
        for row in &inequalities {
            match row.0.iter().any(|(j, a)| fixed[*j].is_none() && *a != 0.) {
                true => barrier_rows.push(row),
                false if residual(row, &fixed) < -FEASIBILITY_TOL => {
                    return Err(Error::InfeasibleRegion {
                        reason: "linear inequality is violated by fixed inputs".to_string(),
                    });
                }
                false => {}
            }
        }
        let (a, b) = to_dense(
            equalities
                .iter()
                .zip(&consumed)
                .filter(|(_, c)| !**c)
                .map(|(row, _)| row)
                .collect(),
        );
        let (g, h) = to_dense(barrier_rows);

        let (particular, basis) = match a.nrows() {
            0 => (DVector::zeros(f), DMatrix::identity(f, f)),
            _ => {
                let eig = (a.transpose() * &a).symmetric_eigen();
                let scale = eig.eigenvalues.iter().fold(1_f64, |m, l| m.max(l.abs()));
                let null: Vec<usize> = (0..f)
                    .filter(|i| eig.eigenvalues[*i].abs() <= NULLSPACE_EPS * scale)
                    .collect();
                let basis = DMatrix::from_fn(f, null.len(), |i, k| eig.eigenvectors[(i, null[k])]);
                let pinv = a
                    .clone()
                    .pseudo_inverse(NULLSPACE_EPS)
                    .map_err(|e| Error::InfeasibleRegion {
                        reason: e.to_string(),
                    })?;
                let particular = pinv * &b;
                if (&a * &particular - &b).norm() > FEASIBILITY_TOL * (1. + b.norm()) {
                    return Err(Error::InfeasibleRegion {
                        reason: "linear equalities are inconsistent".to_string(),
                    });
                }
                (particular, basis)
            }
        };

        let ng = g.nrows();
        let k = basis.ncols();
        let lower: Vec<f64> = free.iter().map(|j| lower[*j]).collect();
        let upper: Vec<f64> = free.iter().map(|j| upper[*j]).collect();
        let mut c = DMatrix::zeros(ng + 2 * f, k);
        let mut e = DVector::zeros(ng + 2 * f);
        if ng > 0 {
            c.rows_mut(0, ng).copy_from(&(&g * &basis));
            e.rows_mut(0, ng).copy_from(&(&h - &g * &particular));
        }
        for j in 0..f {
            c.row_mut(ng + 2 * j).copy_from(&basis.row(j));
            c.row_mut(ng + 2 * j + 1).copy_from(&(-basis.row(j)));
            e[ng + 2 * j] = upper[j] - particular[j];
            e[ng + 2 * j + 1] = particular[j] - lower[j];
        }

        let mid = DVector::from_fn(f, |j, _| 0.5 * (lower[j] + upper[j]));
        let w0 = basis.transpose() * (mid - &particular);
        let min_slack = (&e - &c * &w0).iter().fold(f64::INFINITY, |m, s| m.min(*s));
        let w = match k {
            _ if min_slack > INTERIOR_EPS => w0,
            0 if min_slack >= -FEASIBILITY_TOL => w0,
            0 => {
                return Err(Error::InfeasibleRegion {
                    reason: "fixed inputs violate the constraints".to_string(),
                });
            }
            _ => interior_point(&c, &e, w0, min_slack)?,
        };
        debug!(n_free = f, dim = k, n_inequalities = ng, "polytope prepared");
        Ok(Self {
            fixed,
            free,
            lower,
            upper,
            particular,
            basis,
            c,
            e,
            w,
        })
    }

    fn dim(&self) -> usize {
        self.basis.ncols()
    }

    fn walk<R: Rng + ?Sized>(&mut self, steps: usize, rng: &mut R) {
        let k = self.dim();
        if k == 0 {
            return;
        }
        for _ in 0..steps {
            let direction = DVector::<f64>::from_fn(k, |_, _| StandardNormal.sample(&mut *rng));
            let norm = direction.norm();
            if norm == 0. {
                continue;
            }
            let direction = direction / norm;
            let cd = &self.c * &direction;
            let slack = &self.e - &self.c * &self.w;
            let (mut t_min, mut t_max) = (f64::NEG_INFINITY, f64::INFINITY);
            for (s, a) in slack.iter().zip(cd.iter()) {
                let s = s.max(0.);
                if *a > 1e-14 {
                    t_max = t_max.min(s / a);
                } else if *a < -1e-14 {
                    t_min = t_min.max(s / a);
                }
            }
            if t_min.is_finite() && t_max.is_finite() && t_min < t_max {
                let t = rng.random_range(t_min..t_max);
                self.w += t * direction;
            }
        }
    }

    fn point(&self) -> Vec<f64> {
        let z = &self.particular + &self.basis * &self.w;
        let mut x: Vec<f64> = self.fixed.iter().map(|v| v.unwrap_or(0.)).collect();
        for (p, j) in self.free.iter().enumerate() {
            x[*j] = z[p].clamp(self.lower[p], self.upper[p]);
        }
        x
    }
}

/// Maximizes the last variable, the common slack of all inequalities.
struct MaxSlack {
    n: usize,
}

impl NLPFunctionTarget for MaxSlack {
    fn val(&self, x: &Mat<f64>) -> f64 {
        -x[(self.n - 1, 0)]
    }

    fn val_grad(&self, x: &Mat<f64>) -> (f64, Mat<f64>) {
        let mut grad = Mat::zeros(self.n, 1);
        grad[(self.n - 1, 0)] = -1.;
        (self.val(x), grad)
    }

    fn val_grad_hes(&self, x: &Mat<f64>) -> (f64, Mat<f64>, Mat<f64>) {
        let (val, grad) = self.val_grad(x);
        (val, grad, Mat::zeros(self.n, self.n))
    }
}

// phase one: max s subject to C w + s <= e, s <= 1
fn interior_point(
    c: &DMatrix<f64>,
    e: &DVector<f64>,
    w0: DVector<f64>,
    min_slack: f64,
) -> Result<DVector<f64>> {
    let (m, k) = c.shape();
    let mut mat = DMatrix::zeros(m + 1, k + 1);
    mat.view_mut((0, 0), (m, k)).copy_from(c);
    mat.view_mut((0, k), (m, 1)).fill(1.);
    mat[(m, k)] = 1.;
    let mut rhs = DVector::zeros(m + 1);
    rhs.rows_mut(0, m).copy_from(e);
    rhs[m] = 1.;
    let mut y0 = DVector::zeros(k + 1);
    y0.rows_mut(0, k).copy_from(&w0);
    y0[k] = (min_slack - 1.).min(0.);

    let solver = NLPSolver::new(
        NLPSolverOptions::new(),
        NLPSolverConstraints {
            lin_inequal: Some(LinearInequalityConstraint { mat, rhs }),
            ..Default::default()
        },
        Arc::new(MaxSlack { n: k + 1 }),
    );
    let y = solver.minimize(y0)?;
    debug!(slack = y[k], "phase one finished");
    if y[k] <= INTERIOR_EPS {
        return Err(Error::InfeasibleRegion {
            reason: "polytope has no interior point".to_string(),
        });
    }
    Ok(y.rows(0, k).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CategoricalInput, ContinuousInput, DiscreteInput, InterpointEqualityConstraint};

    const TOL: f64 = 1e-6;

    fn inputs(keys: &[&str]) -> Vec<Input> {
        keys.iter()
            .map(|k| ContinuousInput::new(*k, 0., 1.).unwrap().into())
            .collect()
    }

    fn rows(table: &Table, keys: &[&str]) -> Result<Vec<Vec<f64>>> {
        let columns = keys
            .iter()
            .map(|k| table.numeric(k))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..table.nrows())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect())
    }

    #[test]
    fn unconstrained_fallback() -> Result<()> {
        let mut all = inputs(&["x1", "x2"]);
        all.push(DiscreteInput::new("d", vec![1., 2., 4.])?.into());
        all.push(CategoricalInput::new("c", vec!["a".into(), "b".into()])?.into());
        let domain = Domain::new(all, vec![], vec![])?;
        let samples = sample_polytope(&domain, 20, 10, 2, 3)?;
        assert_eq!(samples.nrows(), 20);
        assert_eq!(samples.keys(), &["x1", "x2", "d", "c"]);
        domain.validate_candidates(&samples)?;
        assert_eq!(samples, sample_polytope(&domain, 20, 10, 2, 3)?);
        assert_ne!(samples, sample_polytope(&domain, 20, 10, 2, 4)?);
        Ok(())
    }

    #[test]
    fn mixture_with_inequality() -> Result<()> {
        let domain = Domain::new(
            inputs(&["x1", "x2", "x3"]),
            vec![],
            vec![
                Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?,
                Constraint::linear_inequality(&["x1", "x2"], vec![1., -1.], 0.)?,
            ],
        )?;
        let mut sampler = PolytopeSampler::new(&domain, SamplerOptions::new().with_seed(7));
        assert_eq!(sampler.state(), SamplerState::Idle);
        let samples = sampler.ask(30)?;
        assert_eq!(sampler.state(), SamplerState::Sampled);
        for r in rows(&samples, &["x1", "x2", "x3"])? {
            assert!((r.iter().sum::<f64>() - 1.).abs() < TOL);
            assert!(r[0] - r[1] <= TOL);
            assert!(r.iter().all(|v| *v >= 0. && *v <= 1.));
        }
        assert!(sampler.warnings().is_empty());
        assert!(sampler.finish().is_empty());
        assert_eq!(sampler.state(), SamplerState::Done);
        // reseeded after finish
        assert_eq!(sampler.ask(30)?, samples);
        Ok(())
    }

    #[test]
    fn pseudo_fixed_features() -> Result<()> {
        let domain = Domain::new(
            inputs(&["x1", "x2", "x3"]),
            vec![],
            vec![
                Constraint::linear_equality(&["x1"], vec![2.], 0.6)?,
                Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?,
            ],
        )?;
        let samples = sample_polytope(&domain, 10, 100, 4, 0)?;
        for r in rows(&samples, &["x1", "x2", "x3"])? {
            assert!((r[0] - 0.3).abs() < 1e-12);
            assert!((r[1] + r[2] - 0.7).abs() < TOL);
        }
        Ok(())
    }

    #[test]
    fn nchoosek_combinations_are_pinned() -> Result<()> {
        let domain = Domain::new(
            inputs(&["x1", "x2", "x3", "x4"]),
            vec![],
            vec![
                Constraint::linear_equality(&["x1", "x2", "x3", "x4"], vec![1.; 4], 1.)?,
                Constraint::nchoosek(&["x1", "x2", "x3"], 0, 1, true)?,
            ],
        )?;
        for n in [2, 10] {
            let samples = sample_polytope(&domain, n, 100, 4, 11)?;
            assert_eq!(samples.nrows(), n);
            for r in rows(&samples, &["x1", "x2", "x3", "x4"])? {
                assert!(r[..3].iter().filter(|v| v.abs() > TOL).count() <= 1);
                assert!((r.iter().sum::<f64>() - 1.).abs() < TOL);
            }
        }
        Ok(())
    }

    #[test]
    fn interpoint_batches() -> Result<()> {
        let domain = Domain::new(
            inputs(&["x1", "x2"]),
            vec![],
            vec![
                Constraint::InterpointEquality(InterpointEqualityConstraint::new("x1", Some(3))?),
                Constraint::linear_inequality(&["x1", "x2"], vec![1., 1.], 1.5)?,
            ],
        )?;
        let samples = sample_polytope(&domain, 6, 200, 10, 5)?;
        let x1 = samples.numeric("x1")?;
        assert!((x1[0] - x1[1]).abs() < TOL && (x1[0] - x1[2]).abs() < TOL);
        assert!((x1[3] - x1[4]).abs() < TOL && (x1[3] - x1[5]).abs() < TOL);
        assert!(domain.constraints_fulfilled(&samples, TOL)?.iter().all(|ok| *ok));
        Ok(())
    }

    #[test]
    fn infeasible_and_unsupported() -> Result<()> {
        let domain = Domain::new(
            inputs(&["x1", "x2"]),
            vec![],
            vec![Constraint::linear_inequality(&["x1", "x2"], vec![-1., -1.], -3.)?],
        )?;
        assert!(matches!(
            sample_polytope(&domain, 3, 10, 1, 0),
            Err(Error::InfeasibleRegion { .. })
        ));
        let domain = Domain::new(
            inputs(&["x1", "x2"]),
            vec![],
            vec![Constraint::NonlinearInequality(crate::NonlinearConstraint::new(
                "x1**2 + x2**2 - 1",
                vec!["x1".into(), "x2".into()],
            )?)],
        )?;
        assert!(matches!(
            sample_polytope(&domain, 3, 10, 1, 0),
            Err(Error::NotImplemented { .. })
        ));
        Ok(())
    }

    #[test]
    fn degenerate_and_duplicated_samples() -> Result<()> {
        let domain = Domain::new(
            vec![
                ContinuousInput::new("x1", 0.5, 0.5)?.into(),
                ContinuousInput::new("x2", 0.2, 0.2)?.into(),
            ],
            vec![],
            vec![],
        )?;
        let mut sampler = PolytopeSampler::new(&domain, SamplerOptions::new());
        let samples = sampler.ask(1)?;
        assert_eq!(samples.numeric("x1")?, &[0.5]);
        assert_eq!(sampler.warnings(), &[Warning::DegenerateSample]);

        let domain = Domain::new(
            inputs(&["x1", "x2"]),
            vec![],
            vec![Constraint::linear_equality(&["x1", "x2"], vec![1., -1.], 0.)?],
        )?;
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut warnings = vec![];
        let overrides = vec![BoundOverrides::new().fix("x1", 0.25); 2];
        let options = SamplerOptions::new();
        let samples = sample_rows(&domain, &overrides, &options, &mut rng, &mut warnings)?;
        assert_eq!(samples.numeric("x2")?, &[0.25, 0.25]);
        assert_eq!(warnings, vec![Warning::DegenerateSample]);
        Ok(())
    }
}
