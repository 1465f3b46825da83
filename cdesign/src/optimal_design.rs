use crate::{
    BoundOverrides, BranchAndBoundOptions, Choice, Constraint, Criterion, DesignObjective, Domain,
    Error, ExhaustiveOptions, Formula, LinearEqualityConstraint, LinearInequalityConstraint,
    LinearModel, Metrics, NLPBound, NLPFunctionTarget, NLPSolver, NLPSolverConstraints,
    NLPSolverOptions, NonlinearConstraintFunction, NonlinearKind, NumericConstraints,
    RelaxedProblem, RelaxedSolution, Result, SamplerOptions, SearchResult, Table, Warning,
    ZERO_EIGVAL_EPS, branch_and_bound, check_nchoosek_constraints_as_bounds, count_small_eigvals,
    exhaustive_search, metrics, n_assignments, n_zero_eigvals, nchoosek_constraints_as_bounds,
    polytope::sample_rows, relax_domain_with, tighten_bounds, transform_constraints,
    utils::count_unique_rows,
};
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::{fmt::Display, sync::Arc};
use tracing::{debug, info};

/// Distance below which two design rows count as identical.
const DUPLICATE_TOL: f64 = 1e-6;

/// How categorical groups and discrete inputs are resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchStrategy {
    /// Exhaustive search if the number of assignments fits into its default budget, branch and
    /// bound otherwise.
    #[default]
    Auto,
    /// Solve every assignment, see [exhaustive_search].
    Exhaustive(ExhaustiveOptions),
    /// Depth first branch and bound, see [branch_and_bound].
    BranchAndBound(BranchAndBoundOptions),
}

/// Configuration of [OptimalDesign].
#[derive(Debug, Clone)]
pub struct DesignOptions {
    criterion: Criterion,
    delta: Option<f64>,
    solver: NLPSolverOptions,
    sampler: SamplerOptions,
    seed: u64,
    strategy: SearchStrategy,
}

impl Default for DesignOptions {
    fn default() -> Self {
        Self {
            criterion: Criterion::D,
            delta: None,
            solver: NLPSolverOptions::new(),
            sampler: SamplerOptions::new().with_n_burnin(200).with_n_thinning(8),
            seed: 0,
            strategy: SearchStrategy::Auto,
        }
    }
}

impl DesignOptions {
    /// Default options, D-optimality with its default ridge term.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the options with the given criterion.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Returns the options with the ridge term added to the information matrix.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Returns the options with the given continuous solver options.
    pub fn with_solver(mut self, solver: NLPSolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Returns the options with the sampler options used for start points. Its seed is ignored.
    pub fn with_sampler(mut self, sampler: SamplerOptions) -> Self {
        self.sampler = sampler;
        self
    }

    /// Returns the options with the seed of all random decisions.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Returns the options with the given search strategy.
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Criterion.
    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    /// Ridge term, the default of the criterion if unset.
    pub fn delta(&self) -> f64 {
        self.delta.unwrap_or(self.criterion.default_delta())
    }
}

/// Result of [OptimalDesign::find].
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    /// Free experiments keyed by the input keys of the domain.
    pub table: Table,
    /// Free experiments in the relaxed design columns.
    pub relaxed: Table,
    /// Objective value of all experiments, fixed candidates included.
    pub value: f64,
    /// Diagnostic optimality values of all experiments.
    pub metrics: Metrics,
    /// Number of solved continuous problems.
    pub evaluated: usize,
    /// Issues found while computing the design.
    pub warnings: Vec<Warning>,
}

impl Display for Design {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\n{:-^40}\nObjective: {:.6}\nD-optimality: {:.6}\nA-optimality: {:.6}\n\
            G-optimality: {:.6}\nSolved relaxations: {}",
            self.table,
            " Statistics ",
            self.value,
            self.metrics.d_optimality,
            self.metrics.a_optimality,
            self.metrics.g_optimality,
            self.evaluated,
        )
    }
}

// continuous design problem of the relaxed domain
struct ContinuousProblem {
    domain: Domain,
    sampling_domain: Domain,
    columns: Vec<String>,
    n_free: usize,
    user: Vec<BoundOverrides>,
    objective: Arc<DesignObjective>,
    constraints: NumericConstraints,
    nonlinear: Vec<NonlinearConstraintFunction>,
    solver: NLPSolverOptions,
    sampler: SamplerOptions,
}

impl ContinuousProblem {
    // search overrides, then user overrides, narrowed by the linear inequalities
    fn row_overrides(&self, overrides: &[BoundOverrides]) -> Result<Vec<BoundOverrides>> {
        (0..self.n_free)
            .map(|i| {
                let o = overrides.get(i).cloned().unwrap_or_default();
                let o = match self.user.get(i) {
                    Some(u) => o.merge(u),
                    None => o,
                };
                tighten_bounds(&self.domain, &o)
            })
            .collect()
    }

    fn bounds(&self, overrides: &[BoundOverrides]) -> Result<NLPBound> {
        let m = self.columns.len();
        let mut lower = DVector::zeros(self.n_free * m);
        let mut upper = DVector::zeros(self.n_free * m);
        for (i, o) in overrides.iter().enumerate() {
            for (j, key) in self.columns.iter().enumerate() {
                let (lo, hi) = self.domain.effective_bounds(key, o)?;
                lower[i * m + j] = lo;
                upper[i * m + j] = hi;
            }
        }
        Ok(NLPBound::new(lower, upper))
    }
}

fn flatten(points: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(points.len(), points.transpose().iter().copied())
}

impl RelaxedProblem for ContinuousProblem {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn n_experiments(&self) -> usize {
        self.n_free
    }

    fn solve(&self, overrides: &[BoundOverrides], seed: u64) -> Result<RelaxedSolution> {
        let overrides = self.row_overrides(overrides)?;
        let bound = self.bounds(&overrides)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut warnings = vec![];
        let start = sample_rows(
            &self.sampling_domain,
            &overrides,
            &self.sampler,
            &mut rng,
            &mut warnings,
        )?;
        let x0 = flatten(&start.to_matrix(&self.columns)?);

        let constraints = NLPSolverConstraints {
            bound: Some(bound),
            lin_equal: self.constraints.linear_equality.as_ref().map(|l| {
                LinearEqualityConstraint {
                    mat: l.mat.clone(),
                    rhs: l.lower.clone(),
                }
            }),
            lin_inequal: self.constraints.linear_inequality.as_ref().map(|l| {
                LinearInequalityConstraint {
                    mat: l.mat.clone(),
                    rhs: l.upper.clone(),
                }
            }),
            nonlinear: self.nonlinear.clone(),
        };
        let func: Arc<dyn NLPFunctionTarget + Send + Sync> = self.objective.clone();
        let x = NLPSolver::new(self.solver.clone(), constraints, func).minimize(x0)?;
        let value = self.objective.evaluate(x.as_slice());
        debug!(value, seed, "solved continuous design");
        Ok(RelaxedSolution {
            points: DMatrix::from_row_slice(self.n_free, self.columns.len(), x.as_slice()),
            value,
        })
    }

    fn evaluate(&self, points: &DMatrix<f64>) -> Result<f64> {
        Ok(self.objective.evaluate(flatten(points).as_slice()))
    }
}

/// Optimal experimental design over a constrained domain.
///
/// Categorical and discrete inputs are relaxed into continuous ones, the continuous problem is
/// solved by [NLPSolver] from a polytope sample and the relaxed choices are resolved by an
/// [exhaustive_search] or by [branch_and_bound]. NChooseK constraints are turned into per
/// experiment bounds whenever possible and are penalized as nonlinear inequalities otherwise.
///
/// ```
/// use cdesign::{Constraint, ContinuousInput, Domain, OptimalDesign, Result, build_formula};
///
/// # fn main() -> Result<()> {
/// let inputs = vec![
///     ContinuousInput::new("x1", 0., 1.)?.into(),
///     ContinuousInput::new("x2", 0., 1.)?.into(),
///     ContinuousInput::new("x3", 0., 1.)?.into(),
/// ];
/// let mixture = Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?;
/// let domain = Domain::new(inputs, vec![], vec![mixture])?;
/// let formula = build_formula("linear", &domain)?;
/// let design = OptimalDesign::new(&domain, formula).with_n_experiments(4).find()?;
/// assert_eq!(design.table.nrows(), 4);
/// # Ok(())
/// # }
/// ```
pub struct OptimalDesign<'a> {
    domain: &'a Domain,
    formula: Formula,
    n_experiments: Option<usize>,
    options: DesignOptions,
    fixed_candidates: Option<Table>,
    partially_fixed: Vec<BoundOverrides>,
    relaxed_constraints: Vec<Constraint>,
}

impl<'a> OptimalDesign<'a> {
    /// Creates the design problem with default options.
    pub fn new(domain: &'a Domain, formula: Formula) -> Self {
        Self {
            domain,
            formula,
            n_experiments: None,
            options: DesignOptions::new(),
            fixed_candidates: None,
            partially_fixed: vec![],
            relaxed_constraints: vec![],
        }
    }

    /// Returns the problem with the number of free experiments. Defaults to the number of
    /// model terms minus the vanishing information directions plus three.
    pub fn with_n_experiments(mut self, n_experiments: usize) -> Self {
        self.n_experiments = Some(n_experiments);
        self
    }

    /// Returns the problem with given [DesignOptions].
    pub fn with_options(mut self, options: DesignOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the problem with already performed experiments, keyed by the input keys. They
    /// enter the information matrix but are not returned.
    pub fn with_fixed_candidates(mut self, candidates: Table) -> Self {
        self.fixed_candidates = Some(candidates);
        self
    }

    /// Returns the problem with bound overrides for the first free experiments, keyed by the
    /// relaxed design columns.
    pub fn with_partially_fixed(mut self, overrides: Vec<BoundOverrides>) -> Self {
        self.partially_fixed = overrides;
        self
    }

    /// Returns the problem with additional constraints over the relaxed design columns, e.g.
    /// the linking constraints of a [crate::QuantityGroup].
    pub fn with_relaxed_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.relaxed_constraints = constraints;
        self
    }

    /// Computes the design.
    pub fn find(&self) -> Result<Design> {
        let options = &self.options;
        let (relaxed, relaxation) =
            relax_domain_with(self.domain, self.relaxed_constraints.clone())?;
        let columns = relaxed.design_columns();
        let model = Arc::new(LinearModel::new(&self.formula, &columns)?);
        let n_zero = n_zero_eigvals(&relaxed, &self.formula, options.seed)?;
        let n = match self.n_experiments {
            Some(n) => n,
            None => (model.n_terms() + 3).saturating_sub(n_zero),
        };
        if self.partially_fixed.len() > n {
            return Err(Error::LengthMismatch {
                list1: "partially fixed experiments",
                list2: "experiments",
                len1: self.partially_fixed.len(),
                len2: n,
            });
        }
        info!(
            n_experiments = n,
            n_terms = model.n_terms(),
            n_zero_eigvals = n_zero,
            criterion = ?options.criterion,
            "optimal design"
        );

        let fixed_points = match &self.fixed_candidates {
            Some(candidates) => {
                self.domain.validate_candidates(candidates)?;
                relaxation.encode(candidates)?.to_matrix(&columns)?
            }
            None => DMatrix::zeros(0, columns.len()),
        };

        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let (base, ignore_nchoosek) = match check_nchoosek_constraints_as_bounds(&relaxed) {
            Ok(()) => (nchoosek_constraints_as_bounds(&relaxed, n, &mut rng)?, true),
            Err(Error::NChooseKNotAsBounds { reason }) => {
                debug!(reason, "NChooseK constraints are penalized");
                (vec![BoundOverrides::new(); n], false)
            }
            Err(e) => return Err(e),
        };
        // user overrides win, folding them in tells the search which rows are exchangeable
        let base: Vec<BoundOverrides> = base
            .iter()
            .enumerate()
            .map(|(i, o)| match self.partially_fixed.get(i) {
                Some(u) => o.merge(u),
                None => o.clone(),
            })
            .collect();
        let constraints = transform_constraints(&relaxed, n, ignore_nchoosek)?;
        let nonlinear = constraints
            .nonlinear
            .iter()
            .map(|b| {
                let block = Arc::new(b.clone());
                match b.kind() {
                    NonlinearKind::Equality => NonlinearConstraintFunction::Equality(block),
                    NonlinearKind::Inequality => NonlinearConstraintFunction::Inequality(block),
                }
            })
            .collect();
        let delta = options.delta();
        let objective = DesignObjective::new(
            model.clone(),
            options.criterion.optimality(delta),
            n,
            fixed_points.clone(),
        )?;
        let problem = ContinuousProblem {
            sampling_domain: relaxed.without_nchoosek().without_nonlinear(),
            domain: relaxed,
            columns: columns.clone(),
            n_free: n,
            user: self.partially_fixed.clone(),
            objective: Arc::new(objective),
            constraints,
            nonlinear,
            solver: options.solver.clone(),
            sampler: options.sampler.clone(),
        };

        let choices = Choice::from_relaxation(&relaxation);
        let search = match (&options.strategy, relaxation.is_trivial()) {
            (_, true) => SearchResult {
                solution: problem.solve(&base, options.seed)?,
                evaluated: 1,
                warnings: vec![],
            },
            (SearchStrategy::Exhaustive(o), false) => {
                exhaustive_search(&problem, &choices, &base, o, options.seed)?
            }
            (SearchStrategy::BranchAndBound(o), false) => {
                branch_and_bound(&problem, &choices, &base, o, options.seed)?
            }
            (SearchStrategy::Auto, false) => {
                let exhaustive = ExhaustiveOptions::new();
                match n_assignments(&choices, &base, n) <= exhaustive.max_combinations() {
                    true => {
                        exhaustive_search(&problem, &choices, &base, &exhaustive, options.seed)?
                    }
                    false => branch_and_bound(
                        &problem,
                        &choices,
                        &base,
                        &BranchAndBoundOptions::new(),
                        options.seed,
                    )?,
                }
            }
        };

        let points = &search.solution.points;
        let relaxed_table = Table::from_matrix(&columns, points)?;
        let table = relaxation.decode(&relaxed_table)?;
        let all_points = problem.objective.points(flatten(points).as_slice());
        let model_matrix = model.design(&all_points)?;

        let mut warnings = search.warnings;
        let rows: Vec<Vec<f64>> = points
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        let unique = count_unique_rows(&rows, DUPLICATE_TOL);
        if unique < n {
            warnings.push(Warning::DuplicateRows { count: n - unique }.emit());
        }
        let n_small = count_small_eigvals(&model_matrix, ZERO_EIGVAL_EPS);
        if n_small > n_zero {
            warnings.push(
                Warning::NumericalDegeneracy {
                    n_small_eigenvalues: n_small,
                    delta: ZERO_EIGVAL_EPS,
                }
                .emit(),
            );
        }
        info!(
            value = search.solution.value,
            evaluated = search.evaluated,
            "optimal design found"
        );
        Ok(Design {
            table,
            relaxed: relaxed_table,
            value: search.solution.value,
            metrics: metrics(&model_matrix, delta),
            evaluated: search.evaluated,
            warnings,
        })
    }
}

/// Computes `n_experiments` optimal experiments for `formula` with default options and returns
/// them keyed by the input keys of `domain`.
pub fn optimal_design(
    domain: &Domain,
    formula: &Formula,
    n_experiments: Option<usize>,
    criterion: Criterion,
    fixed_candidates: Option<&Table>,
) -> Result<Table> {
    let mut problem = OptimalDesign::new(domain, formula.clone())
        .with_options(DesignOptions::new().with_criterion(criterion));
    if let Some(n) = n_experiments {
        problem = problem.with_n_experiments(n);
    }
    if let Some(candidates) = fixed_candidates {
        problem = problem.with_fixed_candidates(candidates.clone());
    }
    Ok(problem.find()?.table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CategoricalInput, ContinuousInput, DiscreteInput, Input, build_formula};

    const EQ_EPS: f64 = 1e-5;

    fn cube(keys: &[&str]) -> Result<Vec<Input>> {
        keys.iter()
            .map(|k| Ok(ContinuousInput::new(*k, 0., 1.)?.into()))
            .collect()
    }

    #[test]
    fn linear_model_on_square_picks_corners() -> Result<()> {
        let domain = Domain::new(cube(&["x1", "x2"])?, vec![], vec![])?;
        let formula = build_formula("linear", &domain)?;
        let design = OptimalDesign::new(&domain, formula)
            .with_n_experiments(4)
            .find()?;
        assert_eq!(design.table.nrows(), 4);
        for key in ["x1", "x2"] {
            for v in design.table.numeric(key)? {
                assert!(v.abs() < 1e-3 || (v - 1.).abs() < 1e-3, "{key} = {v}");
            }
        }
        assert!(design.metrics.d_optimality.is_finite());
        Ok(())
    }

    #[test]
    fn default_number_of_experiments() -> Result<()> {
        let mixture = Constraint::linear_equality(&["x1", "x2", "x3"], vec![1., 1., 1.], 1.)?;
        let domain = Domain::new(cube(&["x1", "x2", "x3"])?, vec![], vec![mixture])?;
        let formula = build_formula("linear", &domain)?;
        let design = OptimalDesign::new(&domain, formula).find()?;
        // 4 terms, one vanishing direction
        assert_eq!(design.table.nrows(), 6);
        for r in 0..6 {
            let sum: f64 = ["x1", "x2", "x3"]
                .iter()
                .map(|k| Ok(design.table.numeric(k)?[r]))
                .sum::<Result<f64>>()?;
            assert!((sum - 1.).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn fixed_candidates_are_not_returned() -> Result<()> {
        let domain = Domain::new(cube(&["x1", "x2"])?, vec![], vec![])?;
        let formula = build_formula("linear", &domain)?;
        let fixed = Table::from_rows(&["x1", "x2"], &[vec![0., 0.], vec![1., 1.]])?;
        let table = optimal_design(&domain, &formula, Some(2), Criterion::D, Some(&fixed))?;
        assert_eq!(table.nrows(), 2);

        let outside = Table::from_rows(&["x1", "x2"], &[vec![2., 0.]])?;
        assert!(optimal_design(&domain, &formula, Some(2), Criterion::D, Some(&outside)).is_err());
        Ok(())
    }

    #[test]
    fn partially_fixed_rows() -> Result<()> {
        let domain = Domain::new(cube(&["x1", "x2"])?, vec![], vec![])?;
        let formula = build_formula("linear", &domain)?;
        let design = OptimalDesign::new(&domain, formula.clone())
            .with_n_experiments(3)
            .with_partially_fixed(vec![BoundOverrides::new().fix("x1", 0.5)])
            .find()?;
        assert!((design.table.numeric("x1")?[0] - 0.5).abs() < EQ_EPS);

        let too_many = OptimalDesign::new(&domain, formula)
            .with_n_experiments(1)
            .with_partially_fixed(vec![BoundOverrides::new(); 2])
            .find();
        assert!(matches!(too_many, Err(Error::LengthMismatch { .. })));
        Ok(())
    }

    #[test]
    fn categorical_and_discrete_inputs_are_integral() -> Result<()> {
        let mut inputs = cube(&["x"])?;
        inputs.push(CategoricalInput::new("c", vec!["a".into(), "b".into()])?.into());
        inputs.push(DiscreteInput::new("d", vec![0., 0.5, 1.])?.into());
        let domain = Domain::new(inputs, vec![], vec![])?;
        let formula = build_formula("linear", &domain)?;
        for strategy in [
            SearchStrategy::Exhaustive(ExhaustiveOptions::new()),
            SearchStrategy::BranchAndBound(BranchAndBoundOptions::new()),
        ] {
            let design = OptimalDesign::new(&domain, formula.clone())
                .with_n_experiments(4)
                .with_options(DesignOptions::new().with_strategy(strategy))
                .find()?;
            for label in design.table.categorical("c")? {
                assert!(label == "a" || label == "b");
            }
            for v in design.table.numeric("d")? {
                assert!([0., 0.5, 1.].contains(v));
            }
            for r in 0..4 {
                let a = design.relaxed.numeric("a")?[r];
                let b = design.relaxed.numeric("b")?[r];
                assert!((a + b - 1.).abs() < 1e-6);
            }
            assert!(design.value.is_finite());
        }
        Ok(())
    }

    #[test]
    fn nchoosek_as_bounds_limits_nonzeros() -> Result<()> {
        let nck = Constraint::nchoosek(&["x1", "x2", "x3"], 0, 2, true)?;
        let domain = Domain::new(cube(&["x1", "x2", "x3"])?, vec![], vec![nck])?;
        let formula = build_formula("linear", &domain)?;
        let design = OptimalDesign::new(&domain, formula)
            .with_n_experiments(6)
            .find()?;
        for r in 0..6 {
            let nonzero = ["x1", "x2", "x3"]
                .iter()
                .map(|k| Ok(design.table.numeric(k)?[r]))
                .collect::<Result<Vec<f64>>>()?
                .iter()
                .filter(|v| v.abs() > 1e-6)
                .count();
            assert!(nonzero <= 2);
        }
        Ok(())
    }
}
