use crate::{
    CategoricalGroup, CategoricalInput, Column, Constraint, ContinuousInput, DiscreteInput,
    Domain, Error, Input, LinearConstraint, Result, Table,
    domain::label_column,
    utils::combinations,
};

/// Record of [relax_domain], maps designs of the relaxed domain back to the original inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Relaxation {
    inputs: Vec<Input>,
    groups: Vec<CategoricalGroup>,
    discretes: Vec<DiscreteInput>,
}

impl Relaxation {
    /// Groups of relaxed binaries, one per categorical input followed by the declared groups.
    pub fn groups(&self) -> &[CategoricalGroup] {
        &self.groups
    }

    /// Discrete inputs relaxed to continuous ones.
    pub fn discretes(&self) -> &[DiscreteInput] {
        &self.discretes
    }

    /// True if the relaxed domain has nothing to resolve combinatorially.
    pub fn is_trivial(&self) -> bool {
        self.groups.is_empty() && self.discretes.is_empty()
    }

    /// Maps a numeric table of the relaxed domain onto the original inputs. Every categorical
    /// input takes the label of its largest binary, discrete inputs the nearest allowed value.
    pub fn decode(&self, relaxed: &Table) -> Result<Table> {
        let mut table = Table::new(relaxed.nrows());
        for input in &self.inputs {
            let column = match input {
                Input::Continuous(c) => Column::Numeric(relaxed.numeric(c.key())?.to_vec()),
                Input::Discrete(d) => Column::Numeric(
                    relaxed
                        .numeric(d.key())?
                        .iter()
                        .map(|v| d.nearest(*v))
                        .collect(),
                ),
                Input::Categorical(_) | Input::CategoricalDescriptor(_) => {
                    let Some(c) = input.as_categorical() else {
                        continue;
                    };
                    let labels = c.allowed_categories();
                    let binaries = labels
                        .iter()
                        .map(|l| relaxed.numeric(l))
                        .collect::<Result<Vec<_>>>()?;
                    label_column(
                        (0..relaxed.nrows())
                            .map(|r| {
                                let best = (0..labels.len())
                                    .max_by(|a, b| binaries[*a][r].total_cmp(&binaries[*b][r]))
                                    .unwrap_or_default();
                                labels[best].to_string()
                            })
                            .collect(),
                    )
                }
            };
            table.push(input.key(), column)?;
        }
        Ok(table)
    }

    /// Maps a table of the original inputs onto the relaxed columns, categorical labels
    /// become one-hot binaries.
    pub fn encode(&self, table: &Table) -> Result<Table> {
        let mut relaxed = Table::new(table.nrows());
        for input in &self.inputs {
            match input.as_categorical() {
                Some(c) => {
                    let labels = table.categorical(c.key())?;
                    c.validate(labels)?;
                    for category in c.allowed_categories() {
                        let binary = labels
                            .iter()
                            .map(|l| if l == category { 1. } else { 0. })
                            .collect();
                        relaxed.push(category, Column::Numeric(binary))?;
                    }
                }
                None => {
                    let values = table.numeric(input.key())?.to_vec();
                    relaxed.push(input.key(), Column::Numeric(values))?;
                }
            }
        }
        Ok(relaxed)
    }
}

/// Relaxes all non continuous inputs, see [relax_domain_with].
pub fn relax_domain(domain: &Domain) -> Result<(Domain, Relaxation)> {
    relax_domain_with(domain, vec![])
}

/// Relaxes categorical inputs into binaries in `[0, 1]`, one per allowed category and named by
/// the category, tied together by a mixture constraint summing to one. Discrete inputs become
/// continuous inputs over their value range. Declared categorical groups get their mixture
/// constraint, `<= 1` if none of the members has to be selected.
///
/// `constraints` are added to the relaxed domain and may reference the binaries.
pub fn relax_domain_with(
    domain: &Domain,
    constraints: Vec<Constraint>,
) -> Result<(Domain, Relaxation)> {
    let mut inputs: Vec<Input> = vec![];
    let mut mixtures: Vec<Constraint> = vec![];
    let mut groups = vec![];
    let mut discretes = vec![];
    for input in domain.inputs() {
        match input {
            Input::Continuous(c) => inputs.push(c.clone().into()),
            Input::Discrete(d) => {
                inputs.push(ContinuousInput::new(d.key(), d.lower(), d.upper())?.into());
                discretes.push(d.clone());
            }
            Input::Categorical(_) | Input::CategoricalDescriptor(_) => {
                let Some(c) = input.as_categorical() else {
                    continue;
                };
                let labels = c.allowed_categories();
                let lower = if labels.len() == 1 { 1. } else { 0. };
                for l in &labels {
                    inputs.push(ContinuousInput::new(*l, lower, 1.)?.into());
                }
                mixtures.push(Constraint::linear_equality(
                    &labels,
                    vec![1.; labels.len()],
                    1.,
                )?);
                groups.push(CategoricalGroup::new(
                    labels.iter().map(|l| l.to_string()).collect(),
                ));
            }
        }
    }
    for g in domain.categorical_groups() {
        let mixture =
            LinearConstraint::new(g.members().to_vec(), vec![1.; g.members().len()], 1.)?;
        mixtures.push(match g.none_also_valid() {
            true => Constraint::LinearInequality(mixture),
            false => Constraint::LinearEquality(mixture),
        });
    }
    mixtures.extend(constraints);
    let relaxed = domain.extended(inputs, mixtures, groups)?;
    let relaxation = Relaxation {
        inputs: domain.inputs().to_vec(),
        groups: relaxed.categorical_groups().to_vec(),
        discretes,
    };
    Ok((relaxed, relaxation))
}

/// Splits `[lower, upper]` into halves of equal length.
pub fn equal_range_split(lower: f64, upper: f64) -> (f64, f64) {
    let x = lower + (upper - lower) / 2.;
    (x, x)
}

/// Splits the values of `input` within `[lower, upper]` into two halves with the same number
/// of values. Returns the largest value of the lower and the smallest value of the upper half.
pub fn equal_count_split(input: &DiscreteInput, lower: f64, upper: f64) -> Option<(f64, f64)> {
    let values = input.values_within(lower, upper);
    let size = values.len();
    match size {
        0 => None,
        1 => Some((values[0], values[0])),
        _ if size % 2 == 0 => Some((values[size / 2 - 1], values[size / 2])),
        _ => Some((values[size / 2], values[size / 2 + 1])),
    }
}

/// Categorical "pick k out of n" input with quantities, see [nchoosek_group_with_quantity].
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityGroup {
    /// Categorical input over all admissible selections.
    pub input: CategoricalInput,
    /// One quantity per key.
    pub quantities: Vec<ContinuousInput>,
    /// Total quantity and the constraints linking quantities to the relaxed selection binaries.
    /// They reference relaxed binaries and belong to [relax_domain_with].
    pub constraints: Vec<Constraint>,
}

/// Builds a categorical input selecting between `pick_at_least` and `pick_at_most` of `keys`.
///
/// Categories are named `{group}_{key1}_{key2}..` per selection, plus `{group}_pick_none` if
/// `pick_at_least == 0`. Every key gets a quantity input `{group}_{key}_quantity` in
/// `[0, upper]`, which has to lie within `quantity_if_picked` when the key is part of the
/// selected category and vanish otherwise. The sum of all quantities is bounded by, or equal
/// to, `quantity_limit`.
///
/// Only selections of `max(1, pick_at_least)` up to `pick_at_most` keys become categories, a
/// single key included. Every key is linked to all selections containing it, whatever their
/// size, so each quantity gets two linking inequalities.
pub fn nchoosek_group_with_quantity(
    group: &str,
    keys: &[&str],
    pick_at_least: usize,
    pick_at_most: usize,
    quantity_limit: f64,
    quantity_if_picked: &[(f64, f64)],
    quantity_is_equality: bool,
) -> Result<QuantityGroup> {
    if keys.len() != quantity_if_picked.len() {
        return Err(Error::LengthMismatch {
            list1: "keys",
            list2: "quantities",
            len1: keys.len(),
            len2: quantity_if_picked.len(),
        });
    }
    if pick_at_least > pick_at_most || pick_at_most > keys.len() {
        return Err(Error::InvalidCount {
            context: format!("group `{group}`"),
            min: pick_at_least,
            max: pick_at_most,
            available: keys.len(),
        });
    }
    for k in keys {
        for token in ["pick_none", "_"] {
            if k.contains(token) {
                return Err(Error::ReservedToken {
                    key: k.to_string(),
                    token,
                });
            }
        }
    }
    for (k, (lower, upper)) in keys.iter().zip(quantity_if_picked) {
        if *lower <= 0. || lower > upper {
            return Err(Error::InvalidBounds {
                key: k.to_string(),
                lower: *lower,
                upper: *upper,
            });
        }
    }

    let selections: Vec<Vec<usize>> = (pick_at_least.max(1)..=pick_at_most)
        .flat_map(|size| combinations(keys.len(), size))
        .collect();
    let name = |s: &[usize]| {
        std::iter::once(group)
            .chain(s.iter().map(|i| keys[*i]))
            .collect::<Vec<_>>()
            .join("_")
    };
    let mut categories: Vec<String> = selections.iter().map(|s| name(s)).collect();
    if pick_at_least == 0 {
        categories.push(format!("{group}_pick_none"));
    }
    let input = CategoricalInput::new(group, categories)?;

    let quantity_key = |k: &str| format!("{group}_{k}_quantity");
    let quantities = keys
        .iter()
        .zip(quantity_if_picked)
        .map(|(k, (_, upper))| ContinuousInput::new(quantity_key(k), 0., *upper))
        .collect::<Result<Vec<_>>>()?;

    let mut constraints = vec![];
    let total = LinearConstraint::new(
        quantities.iter().map(|q| q.key().to_string()).collect(),
        vec![1.; quantities.len()],
        quantity_limit,
    )?;
    constraints.push(match quantity_is_equality {
        true => Constraint::LinearEquality(total),
        false => Constraint::LinearInequality(total),
    });
    for (i, (k, (lower, upper))) in keys.iter().zip(quantity_if_picked).enumerate() {
        let picked: Vec<String> = selections
            .iter()
            .filter(|s| s.contains(&i))
            .map(|s| name(s))
            .collect();
        let features: Vec<String> = std::iter::once(quantity_key(k))
            .chain(picked.iter().cloned())
            .collect();
        // quantity >= lower if picked
        let mut coefficients = vec![-1.];
        coefficients.extend(vec![*lower; picked.len()]);
        constraints.push(Constraint::LinearInequality(LinearConstraint::new(
            features.clone(),
            coefficients,
            0.,
        )?));
        // quantity <= upper if picked, zero otherwise
        let mut coefficients = vec![1.];
        coefficients.extend(vec![-*upper; picked.len()]);
        constraints.push(Constraint::LinearInequality(LinearConstraint::new(
            features,
            coefficients,
            0.,
        )?));
    }
    Ok(QuantityGroup {
        input,
        quantities,
        constraints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_domain() -> Result<Domain> {
        Domain::new(
            vec![
                ContinuousInput::new("x1", 0., 1.)?.into(),
                DiscreteInput::new("d", vec![0.5, 1., 2.])?.into(),
                CategoricalInput::new("c", vec!["a".into(), "b".into(), "e".into()])?
                    .with_allowed(vec![true, true, false])?
                    .into(),
            ],
            vec![],
            vec![],
        )
    }

    #[test]
    fn relax_categorical_and_discrete() -> Result<()> {
        let domain = mixed_domain()?;
        let (relaxed, relaxation) = relax_domain(&domain)?;
        assert_eq!(relaxed.design_columns(), vec!["x1", "d", "a", "b"]);
        assert_eq!(relaxed.constraints().len(), 1);
        assert!(!relaxed.has_non_continuous_inputs());
        assert_eq!(relaxed.effective_bounds("d", &Default::default())?, (0.5, 2.));
        assert_eq!(relaxation.groups(), &[CategoricalGroup::new(vec![
            "a".into(),
            "b".into()
        ])]);
        assert_eq!(relaxation.discretes().len(), 1);
        assert!(!relaxation.is_trivial());

        let design = Table::from_rows(&["x1", "d", "a", "b"], &[
            vec![0.3, 0.9, 0.2, 0.8],
            vec![0.7, 1.6, 1., 0.],
        ])?;
        let decoded = relaxation.decode(&design)?;
        assert_eq!(decoded.numeric("d")?, &[1., 2.]);
        assert_eq!(decoded.categorical("c")?, &["b", "a"]);
        domain.validate_candidates(&decoded)?;
        let encoded = relaxation.encode(&decoded)?;
        assert_eq!(encoded.numeric("a")?, &[0., 1.]);
        assert_eq!(encoded.numeric("b")?, &[1., 0.]);
        assert_eq!(encoded.keys(), relaxed.design_columns().as_slice());
        Ok(())
    }

    #[test]
    fn relax_declared_groups() -> Result<()> {
        let domain = Domain::new(
            vec![
                ContinuousInput::new("a", 0., 1.)?.into(),
                ContinuousInput::new("b", 0., 1.)?.into(),
            ],
            vec![],
            vec![],
        )?
        .with_categorical_groups(vec![
            CategoricalGroup::new(vec!["a".into(), "b".into()]).with_none_also_valid(true),
        ])?;
        let (relaxed, relaxation) = relax_domain(&domain)?;
        assert!(matches!(
            relaxed.constraints()[0],
            Constraint::LinearInequality(_)
        ));
        assert_eq!(relaxation.groups().len(), 1);
        assert!(relaxation.discretes().is_empty());
        Ok(())
    }

    #[test]
    fn splits() -> Result<()> {
        assert_eq!(equal_range_split(1., 3.), (2., 2.));
        let d = DiscreteInput::new("d", vec![1., 2., 3., 4., 5.])?;
        assert_eq!(equal_count_split(&d, 1., 4.), Some((2., 3.)));
        assert_eq!(equal_count_split(&d, 1., 5.), Some((3., 4.)));
        assert_eq!(equal_count_split(&d, 2., 2.), Some((2., 2.)));
        assert_eq!(equal_count_split(&d, 5.5, 6.), None);
        Ok(())
    }

    #[test]
    fn quantity_group() -> Result<()> {
        let group = nchoosek_group_with_quantity(
            "g",
            &["a", "b", "c"],
            0,
            2,
            1.,
            &[(0.1, 0.5), (0.2, 0.6), (0.1, 1.)],
            true,
        )?;
        assert_eq!(group.input.categories(), &[
            "g_a", "g_b", "g_c", "g_a_b", "g_a_c", "g_b_c", "g_pick_none"
        ]);
        assert_eq!(group.quantities[1].key(), "g_b_quantity");
        assert_eq!(group.quantities[1].bounds(), (0., 0.6));
        assert_eq!(group.constraints.len(), 7);
        assert!(matches!(group.constraints[0], Constraint::LinearEquality(_)));
        assert_eq!(group.constraints[1].features(), &[
            "g_a_quantity",
            "g_a",
            "g_a_b",
            "g_a_c"
        ]);
        // picking a alone with quantity 0.3 fulfills both links of a
        assert!(group.constraints[1].is_fulfilled(&[0.3, 1., 0., 0.], 1e-9));
        assert!(group.constraints[2].is_fulfilled(&[0.3, 1., 0., 0.], 1e-9));
        assert!(!group.constraints[2].is_fulfilled(&[0.3, 0., 0., 0.], 1e-9));

        // the relaxed domain accepts the links
        let mut inputs: Vec<Input> = vec![group.input.clone().into()];
        inputs.extend(group.quantities.iter().cloned().map(Input::from));
        let domain = Domain::new(inputs, vec![], vec![])?;
        let (relaxed, _) = relax_domain_with(&domain, group.constraints.clone())?;
        assert_eq!(relaxed.constraints().len(), 8);
        Ok(())
    }

    #[test]
    fn quantity_group_selection_sizes() -> Result<()> {
        let q = [(0.1, 0.5); 3];
        let group = nchoosek_group_with_quantity("g", &["a", "b", "c"], 2, 3, 1., &q, false)?;
        assert_eq!(group.input.categories(), &["g_a_b", "g_a_c", "g_b_c", "g_a_b_c"]);
        // total plus lower and upper link per key
        assert_eq!(group.constraints.len(), 7);
        assert!(matches!(group.constraints[0], Constraint::LinearInequality(_)));
        assert_eq!(group.constraints[5].features(), &[
            "g_c_quantity",
            "g_a_c",
            "g_b_c",
            "g_a_b_c"
        ]);

        // a lone key is a selection of its own and is linked as well
        let group = nchoosek_group_with_quantity("g", &["a", "b"], 1, 1, 1., &q[..2], false)?;
        assert_eq!(group.input.categories(), &["g_a", "g_b"]);
        assert_eq!(group.constraints[1].features(), &["g_a_quantity", "g_a"]);
        assert!(!group.constraints[1].is_fulfilled(&[0., 1.], 1e-9));
        assert!(group.constraints[2].is_fulfilled(&[0., 0.], 1e-9));
        Ok(())
    }

    #[test]
    fn quantity_group_errors() {
        let q = [(0.1, 0.5), (0.1, 0.5)];
        assert!(matches!(
            nchoosek_group_with_quantity("g", &["a", "b"], 2, 1, 1., &q, false),
            Err(Error::InvalidCount { .. })
        ));
        assert!(matches!(
            nchoosek_group_with_quantity("g", &["a", "b"], 0, 3, 1., &q, false),
            Err(Error::InvalidCount { .. })
        ));
        assert!(matches!(
            nchoosek_group_with_quantity("g", &["a_1", "b"], 0, 1, 1., &q, false),
            Err(Error::ReservedToken { token: "_", .. })
        ));
        assert!(matches!(
            nchoosek_group_with_quantity("g", &["pick_none", "b"], 0, 1, 1., &q, false),
            Err(Error::ReservedToken {
                token: "pick_none",
                ..
            })
        ));
        let q0 = [(0., 0.5), (0.1, 0.5)];
        assert!(matches!(
            nchoosek_group_with_quantity("g", &["a", "b"], 0, 1, 1., &q0, false),
            Err(Error::InvalidBounds { .. })
        ));
        assert!(matches!(
            nchoosek_group_with_quantity("g", &["a"], 0, 1, 1., &q, false),
            Err(Error::LengthMismatch { .. })
        ));
    }
}
