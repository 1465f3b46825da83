use crate::{
    BoundOverrides, CategoricalGroup, DiscreteInput, Error, Relaxation, Result, Warning,
    relaxation::equal_count_split,
    utils::{cartesian_product, grouped_multisets, n_multisets},
};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Continuous design of all free experiments, one row per experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxedSolution {
    /// Design points in the column order of [RelaxedProblem::columns].
    pub points: DMatrix<f64>,
    /// Objective value, smaller is better.
    pub value: f64,
}

/// Continuous design problem over a relaxed domain which can be solved under per experiment
/// bound overrides.
pub trait RelaxedProblem: Sync {
    /// Columns of the design points.
    fn columns(&self) -> &[String];
    /// Number of free experiments.
    fn n_experiments(&self) -> usize;
    /// Solves the continuous problem with `overrides[i]` applied to experiment `i`. Infeasible
    /// overrides are reported as [Error::InfeasibleRegion].
    fn solve(&self, overrides: &[BoundOverrides], seed: u64) -> Result<RelaxedSolution>;
    /// Objective value of given design points.
    fn evaluate(&self, points: &DMatrix<f64>) -> Result<f64>;
}

/// Per experiment decision of the combinatorial search.
#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// Exactly one member, or none if allowed, of the group is one.
    Categorical(CategoricalGroup),
    /// The relaxed continuous input takes one of the discrete values.
    Discrete(DiscreteInput),
}

impl Choice {
    /// All choices of a relaxation, groups first.
    pub fn from_relaxation(relaxation: &Relaxation) -> Vec<Choice> {
        relaxation
            .groups()
            .iter()
            .cloned()
            .map(Choice::Categorical)
            .chain(relaxation.discretes().iter().cloned().map(Choice::Discrete))
            .collect()
    }

    /// Number of distinct outcomes.
    pub fn n_options(&self) -> usize {
        match self {
            Choice::Categorical(g) => g.members().len() + usize::from(g.none_also_valid()),
            Choice::Discrete(d) => d.values().len(),
        }
    }

    /// Overrides realizing outcome `k`, for groups `k == members.len()` selects none.
    pub fn option(&self, k: usize) -> BoundOverrides {
        match self {
            Choice::Categorical(g) => select_member(g, k),
            Choice::Discrete(d) => BoundOverrides::new().fix(d.key(), d.values()[k]),
        }
    }
}

fn select_member(group: &CategoricalGroup, k: usize) -> BoundOverrides {
    let mut overrides = BoundOverrides::new();
    for (j, m) in group.members().iter().enumerate() {
        let v = if j == k { 1. } else { 0. };
        overrides.insert(m, v, v);
    }
    overrides
}

/// Outcome of a combinatorial search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Best integral design.
    pub solution: RelaxedSolution,
    /// Number of solved continuous problems.
    pub evaluated: usize,
    /// Budget warnings.
    pub warnings: Vec<Warning>,
}

/// Configuration of [exhaustive_search].
#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustiveOptions {
    max_combinations: usize,
}

impl Default for ExhaustiveOptions {
    fn default() -> Self {
        Self {
            max_combinations: 1000,
        }
    }
}

impl ExhaustiveOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximal number of evaluated assignments.
    pub fn with_max_combinations(mut self, max_combinations: usize) -> Self {
        self.max_combinations = max_combinations;
        self
    }

    /// Maximal number of evaluated assignments.
    pub fn max_combinations(&self) -> usize {
        self.max_combinations
    }
}

/// Outcomes of all choices of a single experiment, last choice varying fastest.
pub fn row_options(choices: &[Choice]) -> Vec<BoundOverrides> {
    let sizes: Vec<usize> = choices.iter().map(|c| c.n_options()).collect();
    cartesian_product(&sizes)
        .into_iter()
        .map(|pick| {
            pick.iter()
                .zip(choices)
                .fold(BoundOverrides::new(), |acc, (k, c)| acc.merge(&c.option(*k)))
        })
        .collect()
}

/// Experiments with equal base overrides, in order of their first experiment.
pub fn exchangeable_rows(base: &[BoundOverrides], n_experiments: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<(BoundOverrides, Vec<usize>)> = vec![];
    for i in 0..n_experiments {
        let row = base_row(base, i);
        match groups.iter_mut().find(|(o, _)| *o == row) {
            Some((_, rows)) => rows.push(i),
            None => groups.push((row, vec![i])),
        }
    }
    groups.into_iter().map(|(_, rows)| rows).collect()
}

/// Number of assignments visited by [exhaustive_search].
pub fn n_assignments(choices: &[Choice], base: &[BoundOverrides], n_experiments: usize) -> usize {
    let n_options = choices
        .iter()
        .fold(1_usize, |acc, c| acc.saturating_mul(c.n_options()));
    exchangeable_rows(base, n_experiments)
        .iter()
        .fold(1_usize, |acc, rows| {
            acc.saturating_mul(n_multisets(n_options, rows.len()))
        })
}

/// Solves the continuous problem for every assignment of row outcomes and returns the best.
///
/// Experiments sharing the same base overrides are exchangeable, so within each group of
/// [exchangeable_rows] assignments are multisets of the outcomes of [row_options], combined
/// over the groups by a cartesian product. Assignments are solved in parallel and compared in
/// generation order, the first of equally good designs wins. Infeasible assignments are
/// skipped. If there are more assignments than allowed, the first `max_combinations` are
/// evaluated.
pub fn exhaustive_search<P: RelaxedProblem>(
    problem: &P,
    choices: &[Choice],
    base: &[BoundOverrides],
    options: &ExhaustiveOptions,
    seed: u64,
) -> Result<SearchResult> {
    let outcomes = row_options(choices);
    let n = problem.n_experiments();
    let total = n_assignments(choices, base, n);
    let groups = exchangeable_rows(base, n);
    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    let assignments: Vec<Vec<usize>> = grouped_multisets(outcomes.len(), &sizes)
        .take(options.max_combinations)
        .map(|picks| {
            let mut assignment = vec![0; n];
            for (rows, pick) in groups.iter().zip(picks) {
                for (i, o) in rows.iter().zip(pick) {
                    assignment[*i] = o;
                }
            }
            assignment
        })
        .collect();
    info!(
        n_outcomes = outcomes.len(),
        n_groups = groups.len(),
        n_assignments = total,
        evaluated = assignments.len(),
        "exhaustive search"
    );
    let solutions: Vec<Result<RelaxedSolution>> = assignments
        .par_iter()
        .enumerate()
        .map(|(k, assignment)| {
            let overrides: Vec<BoundOverrides> = assignment
                .iter()
                .enumerate()
                .map(|(i, o)| base_row(base, i).merge(&outcomes[*o]))
                .collect();
            problem.solve(&overrides, seed.wrapping_add(k as u64))
        })
        .collect();

    let evaluated = solutions.len();
    let mut best: Option<RelaxedSolution> = None;
    for solution in solutions {
        match solution {
            Ok(s) => {
                if best.as_ref().is_none_or(|b| s.value < b.value) {
                    best = Some(s);
                }
            }
            Err(Error::InfeasibleRegion { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    let mut warnings = vec![];
    if evaluated < total {
        warnings.push(Warning::BudgetExhausted { evaluated }.emit());
    }
    match best {
        Some(solution) => Ok(SearchResult {
            solution,
            evaluated,
            warnings,
        }),
        None if evaluated < total => Err(Error::BudgetExhausted { evaluated }),
        None => Err(Error::InfeasibleRegion {
            reason: "no assignment of the categorical and discrete inputs is feasible"
                .to_string(),
        }),
    }
}

fn base_row(base: &[BoundOverrides], i: usize) -> BoundOverrides {
    base.get(i).cloned().unwrap_or_default()
}

/// Configuration of [branch_and_bound].
#[derive(Debug, Clone, PartialEq)]
pub struct BranchAndBoundOptions {
    max_nodes: usize,
    time_budget: Option<Duration>,
    integrality_tolerance: f64,
}

impl Default for BranchAndBoundOptions {
    fn default() -> Self {
        Self {
            max_nodes: 500,
            time_budget: None,
            integrality_tolerance: 1e-4,
        }
    }
}

impl BranchAndBoundOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximal number of solved nodes.
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Wall clock budget of the search.
    pub fn with_time_budget(mut self, time_budget: Duration) -> Self {
        self.time_budget = Some(time_budget);
        self
    }

    /// Distance to the next integral value below which a relaxed value counts as integral.
    pub fn with_integrality_tolerance(mut self, integrality_tolerance: f64) -> Self {
        self.integrality_tolerance = integrality_tolerance;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Relaxed,
    Member(usize),
    Interval(f64, f64),
}

type Node = Vec<Vec<Assignment>>;

struct Search<'a, P: RelaxedProblem> {
    problem: &'a P,
    choices: &'a [Choice],
    base: &'a [BoundOverrides],
    columns: Vec<Vec<usize>>,
    tol: f64,
}

impl<P: RelaxedProblem> Search<'_, P> {
    fn overrides(&self, node: &Node) -> Vec<BoundOverrides> {
        node.iter()
            .enumerate()
            .map(|(i, row)| {
                let mut o = base_row(self.base, i);
                for (a, c) in row.iter().zip(self.choices) {
                    match (a, c) {
                        (Assignment::Member(k), Choice::Categorical(g)) => {
                            o = o.merge(&select_member(g, *k))
                        }
                        (Assignment::Interval(lo, hi), Choice::Discrete(d)) => {
                            o.insert(d.key(), *lo, *hi)
                        }
                        _ => {}
                    }
                }
                o
            })
            .collect()
    }

    fn value(&self, points: &DMatrix<f64>, row: usize, choice: usize, k: usize) -> f64 {
        points[(row, self.columns[choice][k])]
    }

    // score in [0, 0.5] of the least integral value of a choice
    fn fractionality(&self, node: &Node, points: &DMatrix<f64>, row: usize, c: usize) -> f64 {
        match (&node[row][c], &self.choices[c]) {
            (Assignment::Relaxed, Choice::Categorical(g)) => (0..g.members().len())
                .map(|k| {
                    let v = self.value(points, row, c, k);
                    v.min(1. - v).max(0.)
                })
                .fold(0., f64::max),
            (Assignment::Interval(lo, hi), Choice::Discrete(d)) if hi > lo => {
                let v = self.value(points, row, c, 0);
                let values = d.values_within(*lo, *hi);
                let nearest = values
                    .iter()
                    .map(|x| (x - v).abs())
                    .fold(f64::INFINITY, f64::min);
                (nearest / (hi - lo)).min(0.5)
            }
            _ => 0.,
        }
    }

    fn most_fractional(&self, node: &Node, points: &DMatrix<f64>) -> Option<(usize, usize)> {
        let mut best = None;
        let mut score = self.tol;
        for row in 0..node.len() {
            for c in 0..self.choices.len() {
                let s = self.fractionality(node, points, row, c);
                if s > score {
                    score = s;
                    best = Some((row, c));
                }
            }
        }
        best
    }

    // children ordered by preference of the relaxed solution
    fn branch(&self, node: &Node, points: &DMatrix<f64>, row: usize, c: usize) -> Vec<Node> {
        let child = |a: Assignment| {
            let mut n = node.clone();
            n[row][c] = a;
            n
        };
        match (&node[row][c], &self.choices[c]) {
            (Assignment::Relaxed, Choice::Categorical(g)) => {
                let mut scored: Vec<(usize, f64)> = (0..g.members().len())
                    .map(|k| (k, self.value(points, row, c, k)))
                    .collect();
                if g.none_also_valid() {
                    let sum: f64 = scored.iter().map(|(_, v)| v).sum();
                    scored.push((g.members().len(), 1. - sum));
                }
                scored.sort_by(|a, b| b.1.total_cmp(&a.1));
                scored
                    .into_iter()
                    .map(|(k, _)| child(Assignment::Member(k)))
                    .collect()
            }
            (Assignment::Interval(lo, hi), Choice::Discrete(d)) => {
                let Some((a, b)) = equal_count_split(d, *lo, *hi) else {
                    return vec![];
                };
                let lower = child(Assignment::Interval(*lo, a));
                let upper = child(Assignment::Interval(b, *hi));
                match self.value(points, row, c, 0) <= a {
                    true => vec![lower, upper],
                    false => vec![upper, lower],
                }
            }
            _ => vec![],
        }
    }

    // rounds the integral relaxed values to exact ones
    fn snap(&self, node: &Node, points: &DMatrix<f64>) -> DMatrix<f64> {
        let mut snapped = points.clone();
        for (row, assignments) in node.iter().enumerate() {
            for (c, (a, choice)) in assignments.iter().zip(self.choices).enumerate() {
                match (a, choice) {
                    (Assignment::Relaxed, Choice::Categorical(g)) => {
                        let values: Vec<f64> = (0..g.members().len())
                            .map(|k| self.value(points, row, c, k))
                            .collect();
                        let best = (0..values.len())
                            .max_by(|a, b| values[*a].total_cmp(&values[*b]))
                            .filter(|k| !g.none_also_valid() || values[*k] >= 0.5);
                        for k in 0..values.len() {
                            snapped[(row, self.columns[c][k])] = (Some(k) == best) as u8 as f64;
                        }
                    }
                    (_, Choice::Discrete(d)) => {
                        let j = self.columns[c][0];
                        snapped[(row, j)] = d.nearest(points[(row, j)]);
                    }
                    _ => {}
                }
            }
        }
        snapped
    }
}

/// Depth first branch and bound over the categorical groups and discrete inputs of every
/// experiment.
///
/// Each node solves the continuous relaxation with the assignments of the node applied. Nodes
/// not better than the incumbent are pruned, otherwise the search branches on the least
/// integral value: one child per group member ordered by relaxed value, or two children
/// splitting the remaining discrete values in halves. A node with an integral relaxed solution
/// yields a candidate design. When the node or time budget is exhausted, the incumbent is
/// returned with a [Warning::BudgetExhausted].
pub fn branch_and_bound<P: RelaxedProblem>(
    problem: &P,
    choices: &[Choice],
    base: &[BoundOverrides],
    options: &BranchAndBoundOptions,
    seed: u64,
) -> Result<SearchResult> {
    let columns = choices
        .iter()
        .map(|c| {
            let keys: Vec<&str> = match c {
                Choice::Categorical(g) => g.members().iter().map(|m| m.as_str()).collect(),
                Choice::Discrete(d) => vec![d.key()],
            };
            keys.iter()
                .map(|k| {
                    problem
                        .columns()
                        .iter()
                        .position(|col| col == k)
                        .ok_or_else(|| Error::UnknownKey {
                            key: k.to_string(),
                            context: "relaxed problem columns".to_string(),
                        })
                })
                .collect::<Result<Vec<usize>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let search = Search {
        problem,
        choices,
        base,
        columns,
        tol: options.integrality_tolerance,
    };
    let root: Vec<Assignment> = choices
        .iter()
        .map(|c| match c {
            Choice::Categorical(_) => Assignment::Relaxed,
            Choice::Discrete(d) => Assignment::Interval(d.lower(), d.upper()),
        })
        .collect();

    let start = Instant::now();
    let mut stack: Vec<Node> = vec![vec![root; problem.n_experiments()]];
    let mut incumbent: Option<RelaxedSolution> = None;
    let mut evaluated = 0;
    let mut exhausted = false;
    while let Some(node) = stack.pop() {
        let out_of_time = options.time_budget.is_some_and(|b| start.elapsed() > b);
        if evaluated >= options.max_nodes || out_of_time {
            exhausted = true;
            break;
        }
        let seed = seed.wrapping_add(evaluated as u64);
        evaluated += 1;
        let relaxed = match problem.solve(&search.overrides(&node), seed) {
            Ok(s) => s,
            Err(Error::InfeasibleRegion { reason }) => {
                trace!(reason, "infeasible node");
                continue;
            }
            Err(e) => return Err(e),
        };
        if incumbent.as_ref().is_some_and(|b| relaxed.value >= b.value) {
            trace!(value = relaxed.value, "pruned node");
            continue;
        }
        match search.most_fractional(&node, &relaxed.points) {
            Some((row, c)) => {
                let children = search.branch(&node, &relaxed.points, row, c);
                stack.extend(children.into_iter().rev());
            }
            None => {
                let points = search.snap(&node, &relaxed.points);
                let value = problem.evaluate(&points)?;
                if incumbent.as_ref().is_none_or(|b| value < b.value) {
                    debug!(value, evaluated, "new incumbent");
                    incumbent = Some(RelaxedSolution { points, value });
                }
            }
        }
    }
    info!(evaluated, exhausted, "branch and bound finished");

    let mut warnings = vec![];
    match incumbent {
        Some(solution) => {
            if exhausted {
                warnings.push(Warning::BudgetExhausted { evaluated }.emit());
            }
            Ok(SearchResult {
                solution,
                evaluated,
                warnings,
            })
        }
        None if exhausted => Err(Error::BudgetExhausted { evaluated }),
        None => Err(Error::InfeasibleRegion {
            reason: "no integral design found".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // one group {a, b} per experiment, experiment i prefers a = target[i]
    struct Toy {
        columns: Vec<String>,
        target: Vec<f64>,
        relaxed: Vec<f64>,
    }

    impl Toy {
        fn new(target: Vec<f64>, relaxed: Vec<f64>) -> Self {
            Self {
                columns: vec!["a".into(), "b".into()],
                target,
                relaxed,
            }
        }
    }

    impl RelaxedProblem for Toy {
        fn columns(&self) -> &[String] {
            &self.columns
        }

        fn n_experiments(&self) -> usize {
            self.target.len()
        }

        fn solve(&self, overrides: &[BoundOverrides], _seed: u64) -> Result<RelaxedSolution> {
            let mut points = DMatrix::zeros(self.n_experiments(), 2);
            for (i, o) in overrides.iter().enumerate() {
                let a = match o.get("a") {
                    Some((lo, _)) => lo,
                    None => self.relaxed[i],
                };
                points[(i, 0)] = a;
                points[(i, 1)] = 1. - a;
            }
            let value = self.evaluate(&points)?;
            Ok(RelaxedSolution { points, value })
        }

        fn evaluate(&self, points: &DMatrix<f64>) -> Result<f64> {
            Ok((0..self.n_experiments())
                .map(|i| (points[(i, 0)] - self.target[i]).powi(2))
                .sum())
        }
    }

    fn group() -> Vec<Choice> {
        vec![Choice::Categorical(CategoricalGroup::new(vec![
            "a".into(),
            "b".into(),
        ]))]
    }

    #[test]
    fn options_of_choices() -> Result<()> {
        let choices = vec![
            Choice::Categorical(
                CategoricalGroup::new(vec!["a".into(), "b".into()]).with_none_also_valid(true),
            ),
            Choice::Discrete(DiscreteInput::new("d", vec![1., 2.])?),
        ];
        let options = row_options(&choices);
        assert_eq!(options.len(), 6);
        assert_eq!(options[0], BoundOverrides::new().fix("a", 1.).fix("b", 0.).fix("d", 1.));
        assert_eq!(options[5], BoundOverrides::new().fix("a", 0.).fix("b", 0.).fix("d", 2.));
        assert_eq!(n_assignments(&choices, &[], 2), 21);
        let base = [BoundOverrides::new().fix("x", 0.), BoundOverrides::new().fix("x", 1.)];
        assert_eq!(n_assignments(&choices, &base, 2), 36);
        Ok(())
    }

    #[test]
    fn exhaustive_finds_best_assignment() -> Result<()> {
        let toy = Toy::new(vec![1., 0.], vec![0.6, 0.3]);
        let result = exhaustive_search(&toy, &group(), &[], &ExhaustiveOptions::new(), 0)?;
        assert_eq!(result.evaluated, 3);
        assert_eq!(result.solution.value, 0.);
        assert_eq!(result.solution.points[(0, 0)], 1.);
        assert_eq!(result.solution.points[(1, 1)], 1.);
        assert!(result.warnings.is_empty());

        let limited = ExhaustiveOptions::new().with_max_combinations(1);
        let result = exhaustive_search(&toy, &group(), &[], &limited, 0)?;
        assert_eq!(result.solution.value, 1.);
        assert_eq!(result.warnings, vec![Warning::BudgetExhausted { evaluated: 1 }]);
        Ok(())
    }

    #[test]
    fn exhaustive_orders_rows_with_distinct_overrides() -> Result<()> {
        // rows are told apart by an unrelated override, so [b, a] differs from [a, b]
        let toy = Toy::new(vec![0., 1., 1.], vec![0.3, 0.6, 0.6]);
        let base = [
            BoundOverrides::new().fix("row", 0.),
            BoundOverrides::new().fix("row", 1.),
            BoundOverrides::new().fix("row", 1.),
        ];
        assert_eq!(exchangeable_rows(&base, 3), vec![vec![0], vec![1, 2]]);
        assert_eq!(n_assignments(&group(), &base, 3), 6);
        let exhaustive = exhaustive_search(&toy, &group(), &base, &ExhaustiveOptions::new(), 0)?;
        let bab = branch_and_bound(&toy, &group(), &base, &BranchAndBoundOptions::new(), 0)?;
        assert_eq!(exhaustive.evaluated, 6);
        assert_eq!(exhaustive.solution.value, 0.);
        assert_eq!(exhaustive.solution.points[(0, 1)], 1.);
        assert!(exhaustive.solution.value <= bab.solution.value);
        Ok(())
    }

    #[test]
    fn branch_and_bound_matches_exhaustive() -> Result<()> {
        let toy = Toy::new(vec![1., 0., 1.], vec![0.6, 0.3, 0.8]);
        let exhaustive = exhaustive_search(&toy, &group(), &[], &ExhaustiveOptions::new(), 0)?;
        let bab = branch_and_bound(&toy, &group(), &[], &BranchAndBoundOptions::new(), 0)?;
        assert_eq!(bab.solution.value, 0.);
        assert!(bab.solution.value <= exhaustive.solution.value);
        for i in 0..3 {
            let a = bab.solution.points[(i, 0)];
            assert!(a == 0. || a == 1.);
            assert_eq!(a + bab.solution.points[(i, 1)], 1.);
        }
        assert!(bab.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn branch_and_bound_budget() -> Result<()> {
        let toy = Toy::new(vec![1., 0., 1.], vec![0.6, 0.3, 0.8]);
        let options = BranchAndBoundOptions::new().with_max_nodes(1);
        assert!(matches!(
            branch_and_bound(&toy, &group(), &[], &options, 0),
            Err(Error::BudgetExhausted { evaluated: 1 })
        ));
        // the first dive reaches an integral design after one branching per experiment
        let options = BranchAndBoundOptions::new().with_max_nodes(4);
        let result = branch_and_bound(&toy, &group(), &[], &options, 0)?;
        assert_eq!(result.solution.value, 0.);
        Ok(())
    }

    #[test]
    fn branch_on_discrete_values() -> Result<()> {
        struct Line {
            columns: Vec<String>,
        }
        impl RelaxedProblem for Line {
            fn columns(&self) -> &[String] {
                &self.columns
            }
            fn n_experiments(&self) -> usize {
                1
            }
            fn solve(&self, overrides: &[BoundOverrides], _: u64) -> Result<RelaxedSolution> {
                // unconstrained optimum at 2.6
                let (lo, hi) = overrides[0].get("d").unwrap_or((1., 4.));
                let points = DMatrix::from_element(1, 1, 2.6_f64.clamp(lo, hi));
                let value = self.evaluate(&points)?;
                Ok(RelaxedSolution { points, value })
            }
            fn evaluate(&self, points: &DMatrix<f64>) -> Result<f64> {
                Ok((points[(0, 0)] - 2.6).powi(2))
            }
        }
        let line = Line {
            columns: vec!["d".into()],
        };
        let choices = vec![Choice::Discrete(DiscreteInput::new("d", vec![1., 2., 3., 4.])?)];
        let result = branch_and_bound(&line, &choices, &[], &BranchAndBoundOptions::new(), 0)?;
        assert_eq!(result.solution.points[(0, 0)], 3.);
        Ok(())
    }
}
