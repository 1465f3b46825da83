use crate::{
    CategoricalInput, Column, Constraint, ContinuousInput, Error, Input, NChooseKConstraint,
    Output, Result, Table,
    utils::{cartesian_product, combinations},
};
use std::collections::BTreeMap;

/// Keyed `(lower, upper)` replacements of input bounds.
///
/// Used instead of cloning a [Domain] whenever inputs have to be fixed or narrowed, e.g. to pin
/// unused features of an NChooseK combination to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundOverrides {
    bounds: BTreeMap<String, (f64, f64)>,
}

impl BoundOverrides {
    /// Creates an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the overrides with replaced bounds of `key`.
    pub fn with(mut self, key: &str, lower: f64, upper: f64) -> Self {
        self.insert(key, lower, upper);
        self
    }

    /// Returns the overrides with `key` fixed to `value`.
    pub fn fix(self, key: &str, value: f64) -> Self {
        self.with(key, value, value)
    }

    /// Replaces the bounds of `key`.
    pub fn insert(&mut self, key: &str, lower: f64, upper: f64) {
        self.bounds.insert(key.to_string(), (lower, upper));
    }

    /// Overridden bounds of `key`.
    pub fn get(&self, key: &str) -> Option<(f64, f64)> {
        self.bounds.get(key).copied()
    }

    /// Union of both overrides, entries of `other` win.
    pub fn merge(&self, other: &BoundOverrides) -> Self {
        let mut bounds = self.bounds.clone();
        bounds.extend(other.bounds.iter().map(|(k, v)| (k.clone(), *v)));
        Self { bounds }
    }

    /// True if nothing is overridden.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Iterates over keys and bounds in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, (f64, f64))> {
        self.bounds.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Set of mutually exclusive relaxed binary inputs standing in for one categorical choice.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalGroup {
    members: Vec<String>,
    none_also_valid: bool,
}

impl CategoricalGroup {
    /// Creates a group, exactly one member has to be one per experiment.
    pub fn new(members: Vec<String>) -> Self {
        Self {
            members,
            none_also_valid: false,
        }
    }

    /// Returns the group allowing all members to be zero.
    pub fn with_none_also_valid(mut self, none_also_valid: bool) -> Self {
        self.none_also_valid = none_also_valid;
        self
    }

    /// Binary member keys.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Whether all members being zero is valid.
    pub fn none_also_valid(&self) -> bool {
        self.none_also_valid
    }
}

/// Inputs, outputs and constraints of an experimental design problem.
///
/// ```
/// use cdesign::{Constraint, ContinuousInput, Domain, Output};
///
/// let domain = Domain::new(
///     vec![
///         ContinuousInput::new("x1", 0., 1.).unwrap().into(),
///         ContinuousInput::new("x2", 0., 1.).unwrap().into(),
///     ],
///     vec![Output::new("y")],
///     vec![Constraint::linear_inequality(&["x1", "x2"], vec![1., 1.], 1.).unwrap()],
/// )
/// .unwrap();
/// assert_eq!(domain.design_columns(), vec!["x1", "x2"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    constraints: Vec<Constraint>,
    categorical_groups: Vec<CategoricalGroup>,
}

impl Domain {
    /// Creates and validates a domain. Keys must be unique among inputs and outputs and every
    /// constraint may only reference numeric inputs of the domain.
    pub fn new(
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        constraints: Vec<Constraint>,
    ) -> Result<Self> {
        let domain = Self {
            inputs,
            outputs,
            constraints,
            categorical_groups: vec![],
        };
        domain.validate()?;
        Ok(domain)
    }

    /// Returns the domain with categorical groups over its continuous inputs.
    pub fn with_categorical_groups(mut self, groups: Vec<CategoricalGroup>) -> Result<Self> {
        for g in &groups {
            if g.members.is_empty() {
                return Err(Error::EmptyValues {
                    context: "categorical group".to_string(),
                });
            }
            for m in &g.members {
                match self.input(m)? {
                    Input::Continuous(_) => {}
                    other => {
                        return Err(Error::UnsupportedInput {
                            key: m.clone(),
                            kind: other.kind(),
                            context: "categorical groups",
                        });
                    }
                }
            }
        }
        self.categorical_groups = groups;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let keys = self
            .inputs
            .iter()
            .map(|i| i.key())
            .chain(self.outputs.iter().map(|o| o.key()))
            .collect::<Vec<_>>();
        for (i, k) in keys.iter().enumerate() {
            if keys[..i].contains(k) {
                return Err(Error::DuplicateKey {
                    key: k.to_string(),
                    context: "domain features",
                });
            }
        }
        for c in &self.constraints {
            for f in c.features() {
                let input = self.input(f).map_err(|_| Error::UnknownKey {
                    key: f.clone(),
                    context: format!("{} constraint", c.kind()),
                })?;
                if !input.is_numeric() {
                    return Err(Error::UnsupportedInput {
                        key: f.clone(),
                        kind: input.kind(),
                        context: "constraints",
                    });
                }
            }
            if let Constraint::NChooseK(n) = c {
                if n.min_count() > n.max_count() || n.max_count() > n.features().len() {
                    return Err(Error::InvalidCount {
                        context: "NChooseK constraint".to_string(),
                        min: n.min_count(),
                        max: n.max_count(),
                        available: n.features().len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// All inputs in definition order.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// All outputs in definition order.
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// All constraints in definition order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Categorical groups of relaxed binaries.
    pub fn categorical_groups(&self) -> &[CategoricalGroup] {
        &self.categorical_groups
    }

    /// Input by key.
    pub fn input(&self, key: &str) -> Result<&Input> {
        self.inputs
            .iter()
            .find(|i| i.key() == key)
            .ok_or_else(|| Error::UnknownKey {
                key: key.to_string(),
                context: "domain inputs".to_string(),
            })
    }

    /// Position of an input.
    pub fn input_index(&self, key: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.key() == key)
    }

    /// Continuous inputs in definition order.
    pub fn continuous_inputs(&self) -> impl Iterator<Item = &ContinuousInput> {
        self.inputs.iter().filter_map(|i| match i {
            Input::Continuous(c) => Some(c),
            _ => None,
        })
    }

    /// Inputs which are neither continuous nor discrete.
    pub fn categorical_inputs(&self) -> impl Iterator<Item = &CategoricalInput> {
        self.inputs.iter().filter_map(|i| i.as_categorical())
    }

    /// True if any input is discrete or categorical.
    pub fn has_non_continuous_inputs(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| !matches!(i, Input::Continuous(_)))
    }

    /// Continuous inputs partitioned into `(fixed, free)`.
    pub fn fixed_free_partition(&self) -> (Vec<&ContinuousInput>, Vec<&ContinuousInput>) {
        self.continuous_inputs().partition(|c| c.is_fixed())
    }

    /// NChooseK constraints in definition order.
    pub fn nchoosek_constraints(&self) -> impl Iterator<Item = &NChooseKConstraint> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::NChooseK(n) => Some(n),
            _ => None,
        })
    }

    /// Returns a domain without NChooseK constraints, leaving `self` untouched.
    pub fn without_nchoosek(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            constraints: self
                .constraints
                .iter()
                .filter(|c| !matches!(c, Constraint::NChooseK(_)))
                .cloned()
                .collect(),
            categorical_groups: self.categorical_groups.clone(),
        }
    }

    /// Returns a domain without nonlinear constraints.
    pub fn without_nonlinear(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            constraints: self
                .constraints
                .iter()
                .filter(|c| {
                    !matches!(
                        c,
                        Constraint::NonlinearEquality(_) | Constraint::NonlinearInequality(_)
                    )
                })
                .cloned()
                .collect(),
            categorical_groups: self.categorical_groups.clone(),
        }
    }

    /// Columns of numeric design matrices: continuous and discrete inputs contribute their key,
    /// categorical inputs one column per allowed category.
    pub fn design_columns(&self) -> Vec<String> {
        self.inputs
            .iter()
            .flat_map(|i| match i.as_categorical() {
                Some(c) => c
                    .allowed_categories()
                    .into_iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
                None => vec![i.key().to_string()],
            })
            .collect()
    }

    /// Bounds of a numeric input after applying `overrides`. Fails if the input is unknown,
    /// categorical or the resulting bounds are empty.
    pub fn effective_bounds(&self, key: &str, overrides: &BoundOverrides) -> Result<(f64, f64)> {
        let input = self.input(key)?;
        let bounds = input.bounds().ok_or_else(|| Error::UnsupportedInput {
            key: key.to_string(),
            kind: input.kind(),
            context: "bounds",
        })?;
        let (lower, upper) = overrides.get(key).unwrap_or(bounds);
        if lower > upper {
            return Err(Error::InfeasibleRegion {
                reason: format!("bounds of `{key}` are empty: [{lower}, {upper}]"),
            });
        }
        Ok((lower, upper))
    }

    /// Combinations of used and unused features that respect all NChooseK constraints jointly.
    ///
    /// Used sets are built per constraint for every count in `min_count..=max_count` (plus the
    /// empty set if none is valid), combined across constraints, de-duplicated and filtered
    /// against all constraints. Unused sets are the complements within the sorted union of all
    /// constrained features.
    pub fn nchoosek_combinations(&self) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
        let constraints: Vec<&NChooseKConstraint> = self.nchoosek_constraints().collect();
        if constraints.is_empty() {
            return (vec![vec![]], vec![vec![]]);
        }
        let per_constraint: Vec<Vec<Vec<&String>>> = constraints
            .iter()
            .map(|c| {
                let mut used = vec![];
                for n in c.min_count()..=c.max_count() {
                    for comb in combinations(c.features().len(), n) {
                        used.push(comb.iter().map(|i| &c.features()[*i]).collect());
                    }
                }
                if c.none_also_valid() && c.min_count() > 0 {
                    used.push(vec![]);
                }
                used
            })
            .collect();

        let sizes: Vec<usize> = per_constraint.iter().map(|u| u.len()).collect();
        let mut used_all: Vec<Vec<String>> = vec![];
        for choice in cartesian_product(&sizes) {
            let mut used: Vec<String> = choice
                .iter()
                .enumerate()
                .flat_map(|(c, i)| per_constraint[c][*i].iter().map(|s| s.to_string()))
                .collect();
            used.sort();
            used.dedup();
            if used_all.contains(&used) {
                continue;
            }
            let fulfilled = constraints.iter().all(|c| {
                let count = used.iter().filter(|f| c.features().contains(f)).count();
                (count >= c.min_count() && count <= c.max_count())
                    || (count == 0 && c.none_also_valid())
            });
            if fulfilled {
                used_all.push(used);
            }
        }

        let mut constrained: Vec<String> = constraints
            .iter()
            .flat_map(|c| c.features().iter().cloned())
            .collect();
        constrained.sort();
        constrained.dedup();
        let unused = used_all
            .iter()
            .map(|used| {
                constrained
                    .iter()
                    .filter(|f| !used.contains(f))
                    .cloned()
                    .collect()
            })
            .collect();
        (used_all, unused)
    }

    /// Cartesian product of the allowed categories of all categorical inputs as
    /// `(input key, category)` pairs, last input varying fastest.
    pub fn categorical_combinations(&self) -> Vec<Vec<(String, String)>> {
        let inputs: Vec<&CategoricalInput> = self.categorical_inputs().collect();
        let allowed: Vec<Vec<&str>> = inputs.iter().map(|c| c.allowed_categories()).collect();
        let sizes: Vec<usize> = allowed.iter().map(|a| a.len()).collect();
        cartesian_product(&sizes)
            .into_iter()
            .map(|choice| {
                choice
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (inputs[i].key().to_string(), allowed[i][*c].to_string()))
                    .collect()
            })
            .collect()
    }

    /// Checks every input column of `table` against the contract of its input.
    pub fn validate_candidates(&self, table: &Table) -> Result<()> {
        for input in &self.inputs {
            match input {
                Input::Continuous(c) => c.validate(table.numeric(c.key())?)?,
                Input::Discrete(d) => d.validate(table.numeric(d.key())?)?,
                Input::Categorical(c) => c.validate(table.categorical(c.key())?)?,
                Input::CategoricalDescriptor(c) => c
                    .categorical()
                    .validate(table.categorical(c.categorical().key())?)?,
            }
        }
        Ok(())
    }

    /// Per row, whether all constraints are fulfilled within `tol`. Interpoint equalities are
    /// checked over the whole table and mark every row of a violated batch.
    pub fn constraints_fulfilled(&self, table: &Table, tol: f64) -> Result<Vec<bool>> {
        let mut fulfilled = vec![true; table.nrows()];
        for c in &self.constraints {
            let columns = c
                .features()
                .iter()
                .map(|f| table.numeric(f))
                .collect::<Result<Vec<_>>>()?;
            match c {
                Constraint::InterpointEquality(ip) => {
                    for batch in ip.batches(table.nrows()) {
                        let first = columns[0][batch[0]];
                        if batch.iter().any(|r| (columns[0][*r] - first).abs() > tol) {
                            batch.iter().for_each(|r| fulfilled[*r] = false);
                        }
                    }
                }
                _ => {
                    for (r, ok) in fulfilled.iter_mut().enumerate() {
                        let x: Vec<f64> = columns.iter().map(|col| col[r]).collect();
                        *ok &= c.is_fulfilled(&x, tol);
                    }
                }
            }
        }
        Ok(fulfilled)
    }

    /// Numeric table of the domain inputs from a matrix in design column order.
    pub fn table_from_design(&self, design: &nalgebra::DMatrix<f64>) -> Result<Table> {
        Table::from_matrix(&self.design_columns(), design)
    }

    /// Returns the domain with `inputs` replaced, constraints and groups are revalidated.
    pub(crate) fn with_inputs(&self, inputs: Vec<Input>) -> Result<Self> {
        let domain = Self {
            inputs,
            outputs: self.outputs.clone(),
            constraints: self.constraints.clone(),
            categorical_groups: vec![],
        };
        domain.validate()?;
        domain.with_categorical_groups(self.categorical_groups.clone())
    }

    /// Returns the domain with additional constraints and groups.
    pub(crate) fn extended(
        &self,
        inputs: Vec<Input>,
        constraints: Vec<Constraint>,
        groups: Vec<CategoricalGroup>,
    ) -> Result<Self> {
        let mut all_constraints = self.constraints.clone();
        all_constraints.extend(constraints);
        let mut all_groups = self.categorical_groups.clone();
        all_groups.extend(groups);
        Domain::new(inputs, self.outputs.clone(), all_constraints)?
            .with_categorical_groups(all_groups)
    }
}

/// Fills a categorical column with a label per row.
pub(crate) fn label_column(labels: Vec<String>) -> Column {
    Column::Categorical(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiscreteInput, Output};

    fn continuous(keys: &[&str]) -> Vec<Input> {
        keys.iter()
            .map(|k| ContinuousInput::new(*k, 0., 1.).unwrap().into())
            .collect()
    }

    #[test]
    fn validation() -> Result<()> {
        let err = Domain::new(
            continuous(&["x1", "x2"]),
            vec![],
            vec![Constraint::linear_equality(&["x1", "x3"], vec![1., 1.], 1.)?],
        );
        assert_eq!(
            err,
            Err(Error::UnknownKey {
                key: "x3".to_string(),
                context: "linear equality constraint".to_string()
            })
        );
        let err = Domain::new(continuous(&["x1", "x1"]), vec![], vec![]);
        assert!(matches!(err, Err(Error::DuplicateKey { .. })));
        let err = Domain::new(continuous(&["x1"]), vec![Output::new("x1")], vec![]);
        assert!(matches!(err, Err(Error::DuplicateKey { .. })));
        let mut inputs = continuous(&["x1"]);
        inputs.push(CategoricalInput::new("c", vec!["a".into(), "b".into()])?.into());
        let err = Domain::new(
            inputs,
            vec![],
            vec![Constraint::linear_equality(&["x1", "c"], vec![1., 1.], 1.)?],
        );
        assert!(matches!(err, Err(Error::UnsupportedInput { .. })));
        Ok(())
    }

    #[test]
    fn lookup_and_partition() -> Result<()> {
        let mut inputs = continuous(&["x1", "x2"]);
        inputs.push(ContinuousInput::new("x3", 0.3, 0.3)?.into());
        inputs.push(DiscreteInput::new("d", vec![1., 2.])?.into());
        inputs.push(
            CategoricalInput::new("c", vec!["a".into(), "b".into(), "c".into()])?
                .with_allowed(vec![true, false, true])?
                .into(),
        );
        let domain = Domain::new(inputs, vec![Output::new("y")], vec![])?;
        assert_eq!(domain.input("d")?.kind(), "discrete");
        assert!(domain.input("nope").is_err());
        let (fixed, free) = domain.fixed_free_partition();
        assert_eq!(fixed.len(), 1);
        assert_eq!(free.len(), 2);
        assert_eq!(
            domain.design_columns(),
            vec!["x1", "x2", "x3", "d", "a", "c"]
        );
        let o = BoundOverrides::new().fix("x1", 0.);
        assert_eq!(domain.effective_bounds("x1", &o)?, (0., 0.));
        assert_eq!(domain.effective_bounds("x2", &o)?, (0., 1.));
        assert_eq!(domain.effective_bounds("d", &o)?, (1., 2.));
        let o = BoundOverrides::new().with("x1", 1., 0.);
        assert!(matches!(
            domain.effective_bounds("x1", &o),
            Err(Error::InfeasibleRegion { .. })
        ));
        assert!(domain.effective_bounds("c", &o).is_err());
        Ok(())
    }

    #[test]
    fn overrides_merge() {
        let a = BoundOverrides::new().fix("x", 0.).with("y", 0., 1.);
        let b = BoundOverrides::new().fix("x", 1.);
        let m = a.merge(&b);
        assert_eq!(m.get("x"), Some((1., 1.)));
        assert_eq!(m.get("y"), Some((0., 1.)));
        assert_eq!(a.get("x"), Some((0., 0.)));
        assert!(BoundOverrides::new().is_empty());
    }

    #[test]
    fn nchoosek_combinations() -> Result<()> {
        let domain = Domain::new(
            continuous(&["x1", "x2", "x3", "x4"]),
            vec![],
            vec![Constraint::nchoosek(&["x1", "x2", "x3"], 0, 2, true)?],
        )?;
        let (used, unused) = domain.nchoosek_combinations();
        assert_eq!(used.len(), 7);
        assert_eq!(used[0], Vec::<String>::new());
        assert_eq!(unused[0], vec!["x1", "x2", "x3"]);
        assert_eq!(used[6], vec!["x2", "x3"]);
        assert_eq!(unused[6], vec!["x1"]);

        let domain = Domain::new(
            continuous(&["x1", "x2", "x3", "x4"]),
            vec![],
            vec![
                Constraint::nchoosek(&["x1", "x2"], 1, 1, false)?,
                Constraint::nchoosek(&["x3", "x4"], 1, 1, false)?,
            ],
        )?;
        let (used, unused) = domain.nchoosek_combinations();
        assert_eq!(
            used,
            vec![
                vec!["x1", "x3"],
                vec!["x1", "x4"],
                vec!["x2", "x3"],
                vec!["x2", "x4"]
            ]
        );
        assert_eq!(unused[0], vec!["x2", "x4"]);
        Ok(())
    }

    #[test]
    fn categorical_combinations() -> Result<()> {
        let inputs: Vec<Input> = vec![
            CategoricalInput::new("c1", vec!["a".into(), "b".into()])?.into(),
            CategoricalInput::new("c2", vec!["x".into(), "y".into(), "z".into()])?
                .with_allowed(vec![true, false, true])?
                .into(),
        ];
        let domain = Domain::new(inputs, vec![], vec![])?;
        let combos = domain.categorical_combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!(
            combos[1],
            vec![
                ("c1".to_string(), "a".to_string()),
                ("c2".to_string(), "z".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn candidates() -> Result<()> {
        let mut inputs = continuous(&["x1", "x2"]);
        inputs.push(CategoricalInput::new("c", vec!["a".into(), "b".into()])?.into());
        let domain = Domain::new(
            inputs,
            vec![],
            vec![Constraint::linear_inequality(&["x1", "x2"], vec![1., 1.], 1.)?],
        )?;
        let mut table = Table::from_rows(&["x1", "x2"], &[vec![0.2, 0.3], vec![0.9, 0.9]])?;
        table.push("c", label_column(vec!["a".into(), "b".into()]))?;
        domain.validate_candidates(&table)?;
        assert_eq!(domain.constraints_fulfilled(&table, 1e-6)?, vec![true, false]);
        let bad = Table::from_rows(&["x1", "x2"], &[vec![1.2, 0.3]])?;
        assert!(domain.validate_candidates(&bad).is_err());
        Ok(())
    }
}
