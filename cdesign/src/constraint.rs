use crate::{Error, Expression, Result};

fn check_features(features: &[String], context: &str) -> Result<()> {
    if features.is_empty() {
        return Err(Error::EmptyValues {
            context: context.to_string(),
        });
    }
    for (i, f) in features.iter().enumerate() {
        if features[..i].contains(f) {
            return Err(Error::DuplicateKey {
                key: f.clone(),
                context: "constraint features",
            });
        }
    }
    Ok(())
}

#[cfg_attr(doc, katexit::katexit)]
/// Linear constraint $\sum_i c_i x_i \circ b$ where $\circ$ is $=$ or $\le$ depending on the
/// [Constraint] variant wrapping it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    features: Vec<String>,
    coefficients: Vec<f64>,
    rhs: f64,
}

impl LinearConstraint {
    /// Creates the constraint, `coefficients[i]` belongs to `features[i]`.
    pub fn new(features: Vec<String>, coefficients: Vec<f64>, rhs: f64) -> Result<Self> {
        check_features(&features, "linear constraint")?;
        if features.len() != coefficients.len() {
            return Err(Error::LengthMismatch {
                list1: "features",
                list2: "coefficients",
                len1: features.len(),
                len2: coefficients.len(),
            });
        }
        Ok(Self {
            features,
            coefficients,
            rhs,
        })
    }

    /// Constrained features.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Coefficients in feature order.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Right hand side.
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Coefficients and right hand side divided by the euclidean norm of the coefficients.
    pub fn normalized(&self) -> (Vec<f64>, f64) {
        let norm = self.coefficients.iter().map(|c| c * c).sum::<f64>().sqrt();
        match norm > 0. {
            true => (
                self.coefficients.iter().map(|c| c / norm).collect(),
                self.rhs / norm,
            ),
            false => (self.coefficients.clone(), self.rhs),
        }
    }

    /// Returns `c^T x - rhs`, where `x` holds the feature values in feature order.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.coefficients
            .iter()
            .zip(x)
            .map(|(c, v)| c * v)
            .sum::<f64>()
            - self.rhs
    }
}

/// Nonlinear constraint given by an algebraic expression over its features.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearConstraint {
    expression: Expression,
    features: Vec<String>,
    jacobian: Option<Vec<Expression>>,
}

impl NonlinearConstraint {
    /// Parses `expression`, all identifiers have to be listed in `features`.
    pub fn new(expression: &str, features: Vec<String>) -> Result<Self> {
        check_features(&features, "nonlinear constraint")?;
        let expression = Expression::parse(expression, &features)?;
        Ok(Self {
            expression,
            features,
            jacobian: None,
        })
    }

    /// Returns the constraint using the given partial derivatives, one per feature, instead of
    /// automatic differentiation.
    pub fn with_jacobian(mut self, jacobian: Vec<&str>) -> Result<Self> {
        if jacobian.len() != self.features.len() {
            return Err(Error::LengthMismatch {
                list1: "features",
                list2: "jacobian expressions",
                len1: self.features.len(),
                len2: jacobian.len(),
            });
        }
        self.jacobian = Some(
            jacobian
                .into_iter()
                .map(|j| Expression::parse(j, &self.features))
                .collect::<Result<_>>()?,
        );
        Ok(self)
    }

    /// Constrained features.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Constraint expression.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Value of the expression, `x` in feature order.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.expression.value(x)
    }

    /// Partial derivatives with respect to the features.
    pub fn jacobian(&self, x: &[f64]) -> Vec<f64> {
        match &self.jacobian {
            Some(j) => j.iter().map(|e| e.value(x)).collect(),
            None => self.expression.value_grad(x).1,
        }
    }
}

/// Restricts how many of the features may be non-zero within a single experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct NChooseKConstraint {
    features: Vec<String>,
    min_count: usize,
    max_count: usize,
    none_also_valid: bool,
}

impl NChooseKConstraint {
    /// Creates the constraint. Requires `min_count <= max_count <= features.len()`.
    pub fn new(
        features: Vec<String>,
        min_count: usize,
        max_count: usize,
        none_also_valid: bool,
    ) -> Result<Self> {
        check_features(&features, "NChooseK constraint")?;
        if min_count > max_count || max_count > features.len() {
            return Err(Error::InvalidCount {
                context: "NChooseK constraint".to_string(),
                min: min_count,
                max: max_count,
                available: features.len(),
            });
        }
        Ok(Self {
            features,
            min_count,
            max_count,
            none_also_valid,
        })
    }

    /// Constrained features.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Minimal number of non-zero features.
    pub fn min_count(&self) -> usize {
        self.min_count
    }

    /// Maximal number of non-zero features.
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Whether all features being zero is valid as well.
    pub fn none_also_valid(&self) -> bool {
        self.none_also_valid
    }

    /// Number of features which have to vanish.
    pub fn n_inactive(&self) -> usize {
        self.features.len() - self.max_count
    }

    fn smallest(&self, x: &[f64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|a, b| x[*a].abs().total_cmp(&x[*b].abs()));
        order.truncate(self.n_inactive());
        order
    }

    /// Sum of the `features.len() - max_count` smallest absolute values, zero when fulfilled.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.smallest(x).iter().map(|i| x[*i].abs()).sum()
    }

    /// Signs of the features entering [NChooseKConstraint::evaluate], zero otherwise.
    pub fn jacobian(&self, x: &[f64]) -> Vec<f64> {
        let mut jac = vec![0.; x.len()];
        for i in self.smallest(x) {
            jac[i] = match x[i] {
                v if v > 0. => 1.,
                v if v < 0. => -1.,
                _ => 0.,
            };
        }
        jac
    }

    /// Checks the count of entries with magnitude above `tol`.
    pub fn is_fulfilled(&self, x: &[f64], tol: f64) -> bool {
        let count = x.iter().filter(|v| v.abs() > tol).count();
        (count >= self.min_count && count <= self.max_count) || (count == 0 && self.none_also_valid)
    }
}

/// A feature has to take the same value within consecutive batches of `multiplicity`
/// experiments, or within the whole design if no multiplicity is set.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpointEqualityConstraint {
    features: Vec<String>,
    multiplicity: Option<usize>,
}

impl InterpointEqualityConstraint {
    /// Creates the constraint, a multiplicity of zero is rejected.
    pub fn new(feature: impl Into<String>, multiplicity: Option<usize>) -> Result<Self> {
        let feature = feature.into();
        if multiplicity == Some(0) {
            return Err(Error::InvalidCount {
                context: format!("interpoint equality of `{feature}`"),
                min: 1,
                max: 0,
                available: 0,
            });
        }
        Ok(Self {
            features: vec![feature],
            multiplicity,
        })
    }

    /// Constrained feature.
    pub fn feature(&self) -> &str {
        &self.features[0]
    }

    /// Batch size.
    pub fn multiplicity(&self) -> Option<usize> {
        self.multiplicity
    }

    /// Batches of row indices which have to share the feature value.
    pub fn batches(&self, n_experiments: usize) -> Vec<Vec<usize>> {
        let m = self.multiplicity.unwrap_or(n_experiments).max(1);
        (0..n_experiments)
            .collect::<Vec<_>>()
            .chunks(m)
            .map(|c| c.to_vec())
            .collect()
    }

    /// Checks the column of feature values of a whole design.
    pub fn is_fulfilled(&self, column: &[f64], tol: f64) -> bool {
        self.batches(column.len())
            .iter()
            .all(|b| b.iter().all(|i| (column[*i] - column[b[0]]).abs() <= tol))
    }
}

/// Closed set of supported constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `c^T x = b`
    LinearEquality(LinearConstraint),
    /// `c^T x <= b`
    LinearInequality(LinearConstraint),
    /// `f(x) = 0`
    NonlinearEquality(NonlinearConstraint),
    /// `f(x) <= 0`
    NonlinearInequality(NonlinearConstraint),
    /// At most/least k out of n features are non-zero.
    NChooseK(NChooseKConstraint),
    /// A feature is shared across experiments.
    InterpointEquality(InterpointEqualityConstraint),
}

impl Constraint {
    /// Shortcut for a [Constraint::LinearEquality].
    pub fn linear_equality(features: &[&str], coefficients: Vec<f64>, rhs: f64) -> Result<Self> {
        let features = features.iter().map(|f| f.to_string()).collect();
        Ok(Constraint::LinearEquality(LinearConstraint::new(
            features,
            coefficients,
            rhs,
        )?))
    }

    /// Shortcut for a [Constraint::LinearInequality].
    pub fn linear_inequality(
        features: &[&str],
        coefficients: Vec<f64>,
        rhs: f64,
    ) -> Result<Self> {
        let features = features.iter().map(|f| f.to_string()).collect();
        Ok(Constraint::LinearInequality(LinearConstraint::new(
            features,
            coefficients,
            rhs,
        )?))
    }

    /// Shortcut for a [Constraint::NChooseK].
    pub fn nchoosek(
        features: &[&str],
        min_count: usize,
        max_count: usize,
        none_also_valid: bool,
    ) -> Result<Self> {
        let features = features.iter().map(|f| f.to_string()).collect();
        Ok(Constraint::NChooseK(NChooseKConstraint::new(
            features,
            min_count,
            max_count,
            none_also_valid,
        )?))
    }

    /// Features referenced by the constraint.
    pub fn features(&self) -> &[String] {
        match self {
            Constraint::LinearEquality(c) | Constraint::LinearInequality(c) => c.features(),
            Constraint::NonlinearEquality(c) | Constraint::NonlinearInequality(c) => c.features(),
            Constraint::NChooseK(c) => c.features(),
            Constraint::InterpointEquality(c) => &c.features,
        }
    }

    /// Name of the constraint kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Constraint::LinearEquality(_) => "linear equality",
            Constraint::LinearInequality(_) => "linear inequality",
            Constraint::NonlinearEquality(_) => "nonlinear equality",
            Constraint::NonlinearInequality(_) => "nonlinear inequality",
            Constraint::NChooseK(_) => "NChooseK",
            Constraint::InterpointEquality(_) => "interpoint equality",
        }
    }

    /// Residual for equalities and violation value for inequalities of a single experiment,
    /// `x` in feature order. Interpoint constraints couple experiments and evaluate to zero.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match self {
            Constraint::LinearEquality(c) | Constraint::LinearInequality(c) => c.evaluate(x),
            Constraint::NonlinearEquality(c) | Constraint::NonlinearInequality(c) => c.evaluate(x),
            Constraint::NChooseK(c) => c.evaluate(x),
            Constraint::InterpointEquality(_) => 0.,
        }
    }

    /// Whether a single experiment fulfills the constraint within `tol`.
    pub fn is_fulfilled(&self, x: &[f64], tol: f64) -> bool {
        match self {
            Constraint::LinearEquality(_) | Constraint::NonlinearEquality(_) => {
                self.evaluate(x).abs() <= tol
            }
            Constraint::LinearInequality(_) | Constraint::NonlinearInequality(_) => {
                self.evaluate(x) <= tol
            }
            Constraint::NChooseK(c) => c.is_fulfilled(x, tol),
            Constraint::InterpointEquality(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(k: &[&str]) -> Vec<String> {
        k.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn linear_constraint() -> Result<()> {
        let c = Constraint::linear_equality(&["x1", "x2"], vec![3., 4.], 10.)?;
        assert_eq!(c.evaluate(&[2., 1.]), 0.);
        assert!(c.is_fulfilled(&[2., 1. + 1e-9], 1e-6));
        let Constraint::LinearEquality(lin) = &c else {
            unreachable!()
        };
        assert_eq!(lin.normalized(), (vec![0.6, 0.8], 2.));
        assert_eq!(
            Constraint::linear_inequality(&["x1"], vec![1., 2.], 0.),
            Err(Error::LengthMismatch {
                list1: "features",
                list2: "coefficients",
                len1: 1,
                len2: 2
            })
        );
        let ineq = Constraint::linear_inequality(&["x1", "x2"], vec![1., 1.], 1.)?;
        assert!(ineq.is_fulfilled(&[0.2, 0.3], 0.));
        assert!(!ineq.is_fulfilled(&[0.8, 0.3], 1e-6));
        Ok(())
    }

    #[test]
    fn nonlinear_constraint() -> Result<()> {
        let c = NonlinearConstraint::new("x1**2 + x2**2 - 1", keys(&["x1", "x2"]))?;
        assert_eq!(c.evaluate(&[1., 0.]), 0.);
        assert_eq!(c.jacobian(&[1., 2.]), vec![2., 4.]);
        let c = c.with_jacobian(vec!["2*x1", "2*x2 + 1"])?;
        assert_eq!(c.jacobian(&[1., 2.]), vec![2., 5.]);
        assert!(
            NonlinearConstraint::new("x1 * x3", keys(&["x1", "x2"])).is_err()
        );
        Ok(())
    }

    #[test]
    fn nchoosek_counts() -> Result<()> {
        assert_eq!(
            NChooseKConstraint::new(keys(&["a", "b"]), 2, 1, false),
            Err(Error::InvalidCount {
                context: "NChooseK constraint".to_string(),
                min: 2,
                max: 1,
                available: 2
            })
        );
        assert!(NChooseKConstraint::new(keys(&["a", "b"]), 0, 3, false).is_err());
        let c = NChooseKConstraint::new(keys(&["a", "b", "c"]), 1, 2, true)?;
        assert!(c.is_fulfilled(&[0., 0., 0.], 1e-9));
        assert!(c.is_fulfilled(&[0., 0.4, 0.3], 1e-9));
        assert!(!c.is_fulfilled(&[0.1, 0.4, 0.3], 1e-9));
        assert_eq!(c.evaluate(&[0.1, -0.4, 0.3]), 0.1);
        assert_eq!(c.jacobian(&[0.1, -0.4, 0.3]), vec![1., 0., 0.]);
        assert_eq!(c.jacobian(&[0.5, -0.05, 0.3]), vec![0., -1., 0.]);
        Ok(())
    }

    #[test]
    fn interpoint_batches() -> Result<()> {
        let c = InterpointEqualityConstraint::new("x", Some(2))?;
        assert_eq!(c.batches(5), vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert!(c.is_fulfilled(&[1., 1., 2., 2., 3.], 1e-9));
        assert!(!c.is_fulfilled(&[1., 1.5, 2., 2., 3.], 1e-9));
        let c = InterpointEqualityConstraint::new("x", None)?;
        assert_eq!(c.batches(3), vec![vec![0, 1, 2]]);
        assert!(InterpointEqualityConstraint::new("x", Some(0)).is_err());
        Ok(())
    }
}
