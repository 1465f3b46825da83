use crate::{Error, Result};
use rand::Rng;

/// Noise tolerated when validating continuous values against their bounds.
pub const BOUND_TOLERANCE: f64 = 1e-7;

/// Continuous input with inclusive lower and upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousInput {
    key: String,
    lower: f64,
    upper: f64,
}

impl ContinuousInput {
    /// Creates a continuous input. Fails if `lower > upper`.
    pub fn new(key: impl Into<String>, lower: f64, upper: f64) -> Result<Self> {
        let key = key.into();
        if lower > upper || lower.is_nan() || upper.is_nan() {
            return Err(Error::InvalidBounds { key, lower, upper });
        }
        Ok(Self { key, lower, upper })
    }

    /// Key of the input.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lower bound.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper bound.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Bounds as `(lower, upper)`.
    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    /// An input is fixed when its bounds collapse to a single point.
    pub fn is_fixed(&self) -> bool {
        self.lower == self.upper
    }

    /// Returns the fixed value if the input is fixed.
    pub fn fixed_value(&self) -> Option<f64> {
        self.is_fixed().then_some(self.lower)
    }

    /// Returns a new input with replaced bounds, the original is left untouched.
    pub fn with_bounds(&self, lower: f64, upper: f64) -> Result<Self> {
        Self::new(self.key.clone(), lower, upper)
    }

    /// Draws `n` uniform samples within the bounds.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n)
            .map(|_| match self.is_fixed() {
                true => self.lower,
                false => self.lower + (self.upper - self.lower) * rng.random::<f64>(),
            })
            .collect()
    }

    /// Checks that all values are within the bounds up to [BOUND_TOLERANCE].
    pub fn validate(&self, values: &[f64]) -> Result<()> {
        let (lower, upper) = (self.lower - BOUND_TOLERANCE, self.upper + BOUND_TOLERANCE);
        let outside = |v: &&f64| !v.is_finite() || **v < lower || **v > upper;
        match values.iter().find(outside) {
            Some(v) => Err(Error::InvalidCandidate {
                key: self.key.clone(),
                reason: format!("{v} is outside [{}, {}]", self.lower, self.upper),
            }),
            None => Ok(()),
        }
    }
}

/// Input restricted to a finite ordered set of numeric values.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteInput {
    key: String,
    values: Vec<f64>,
}

impl DiscreteInput {
    /// Creates a discrete input, values are sorted ascending. Empty or duplicated values are
    /// rejected.
    pub fn new(key: impl Into<String>, mut values: Vec<f64>) -> Result<Self> {
        let key = key.into();
        if values.is_empty() {
            return Err(Error::EmptyValues {
                context: format!("discrete input `{key}`"),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidCandidate {
                key,
                reason: "discrete values must be finite".to_string(),
            });
        }
        values.sort_by(f64::total_cmp);
        if let Some(w) = values.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::DuplicateKey {
                key: w[0].to_string(),
                context: "discrete values",
            });
        }
        Ok(Self { key, values })
    }

    /// Key of the input.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sorted values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Smallest value.
    pub fn lower(&self) -> f64 {
        self.values[0]
    }

    /// Largest value.
    pub fn upper(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// A discrete input with a single value is fixed.
    pub fn is_fixed(&self) -> bool {
        self.values.len() == 1
    }

    /// Values within the inclusive interval `[lower, upper]`.
    pub fn values_within(&self, lower: f64, upper: f64) -> Vec<f64> {
        self.values
            .iter()
            .copied()
            .filter(|v| *v >= lower && *v <= upper)
            .collect()
    }

    /// Returns the allowed value closest to `x`.
    pub fn nearest(&self, x: f64) -> f64 {
        self.values
            .iter()
            .copied()
            .min_by(|a, b| (a - x).abs().total_cmp(&(b - x).abs()))
            .unwrap_or(x)
    }

    /// Draws `n` values uniformly from the value set.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        (0..n)
            .map(|_| self.values[rng.random_range(0..self.values.len())])
            .collect()
    }

    /// Checks membership of all values.
    pub fn validate(&self, values: &[f64]) -> Result<()> {
        match values.iter().find(|v| !self.values.contains(v)) {
            Some(v) => Err(Error::InvalidCandidate {
                key: self.key.clone(),
                reason: format!("{v} is not an allowed value"),
            }),
            None => Ok(()),
        }
    }
}

/// Input choosing one label out of a finite set of categories.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalInput {
    key: String,
    categories: Vec<String>,
    allowed: Vec<bool>,
}

impl CategoricalInput {
    /// Creates a categorical input with all categories allowed.
    pub fn new(key: impl Into<String>, categories: Vec<String>) -> Result<Self> {
        let key = key.into();
        if categories.is_empty() {
            return Err(Error::EmptyValues {
                context: format!("categorical input `{key}`"),
            });
        }
        for (i, c) in categories.iter().enumerate() {
            if categories[..i].contains(c) {
                return Err(Error::DuplicateKey {
                    key: c.clone(),
                    context: "categories",
                });
            }
        }
        let allowed = vec![true; categories.len()];
        Ok(Self {
            key,
            categories,
            allowed,
        })
    }

    /// Returns a new input with the given allowed flags.
    pub fn with_allowed(&self, allowed: Vec<bool>) -> Result<Self> {
        if allowed.len() != self.categories.len() {
            return Err(Error::LengthMismatch {
                list1: "categories",
                list2: "allowed",
                len1: self.categories.len(),
                len2: allowed.len(),
            });
        }
        if !allowed.contains(&true) {
            return Err(Error::NoAllowedCategory {
                key: self.key.clone(),
            });
        }
        Ok(Self {
            key: self.key.clone(),
            categories: self.categories.clone(),
            allowed,
        })
    }

    /// Key of the input.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// All categories in definition order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Allowed flag per category.
    pub fn allowed(&self) -> &[bool] {
        &self.allowed
    }

    /// Categories which are allowed.
    pub fn allowed_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .zip(&self.allowed)
            .filter(|(_, a)| **a)
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// Fixed when exactly one category is allowed.
    pub fn is_fixed(&self) -> bool {
        self.allowed.iter().filter(|a| **a).count() == 1
    }

    /// Draws `n` labels uniformly from the allowed categories.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<String> {
        let allowed = self.allowed_categories();
        (0..n)
            .map(|_| allowed[rng.random_range(0..allowed.len())].to_string())
            .collect()
    }

    /// Checks that every label is an allowed category.
    pub fn validate(&self, labels: &[String]) -> Result<()> {
        let allowed = self.allowed_categories();
        match labels.iter().find(|l| !allowed.contains(&l.as_str())) {
            Some(l) => Err(Error::InvalidCandidate {
                key: self.key.clone(),
                reason: format!("`{l}` is not an allowed category"),
            }),
            None => Ok(()),
        }
    }
}

/// Categorical input carrying a numeric descriptor vector per category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalDescriptorInput {
    categorical: CategoricalInput,
    descriptors: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CategoricalDescriptorInput {
    /// Creates the input, `values[i]` describes `categories[i]`.
    pub fn new(
        key: impl Into<String>,
        categories: Vec<String>,
        descriptors: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let categorical = CategoricalInput::new(key, categories)?;
        if values.len() != categorical.categories.len() {
            return Err(Error::LengthMismatch {
                list1: "categories",
                list2: "descriptor values",
                len1: categorical.categories.len(),
                len2: values.len(),
            });
        }
        if let Some(v) = values.iter().find(|v| v.len() != descriptors.len()) {
            return Err(Error::LengthMismatch {
                list1: "descriptors",
                list2: "descriptor values",
                len1: descriptors.len(),
                len2: v.len(),
            });
        }
        Ok(Self {
            categorical,
            descriptors,
            values,
        })
    }

    /// Returns a new input with the given allowed flags.
    pub fn with_allowed(&self, allowed: Vec<bool>) -> Result<Self> {
        Ok(Self {
            categorical: self.categorical.with_allowed(allowed)?,
            descriptors: self.descriptors.clone(),
            values: self.values.clone(),
        })
    }

    /// Underlying categorical input.
    pub fn categorical(&self) -> &CategoricalInput {
        &self.categorical
    }

    /// Descriptor names.
    pub fn descriptors(&self) -> &[String] {
        &self.descriptors
    }

    /// Descriptor vector of a category.
    pub fn descriptor_values(&self, category: &str) -> Option<&[f64]> {
        self.categorical
            .categories
            .iter()
            .position(|c| c == category)
            .map(|i| self.values[i].as_slice())
    }
}

/// Controllable variable of a domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Continuous variable.
    Continuous(ContinuousInput),
    /// Discrete variable.
    Discrete(DiscreteInput),
    /// Categorical variable.
    Categorical(CategoricalInput),
    /// Categorical variable with descriptors.
    CategoricalDescriptor(CategoricalDescriptorInput),
}

impl Input {
    /// Key of the input.
    pub fn key(&self) -> &str {
        match self {
            Input::Continuous(i) => i.key(),
            Input::Discrete(i) => i.key(),
            Input::Categorical(i) => i.key(),
            Input::CategoricalDescriptor(i) => i.categorical.key(),
        }
    }

    /// Name of the input kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Input::Continuous(_) => "continuous",
            Input::Discrete(_) => "discrete",
            Input::Categorical(_) => "categorical",
            Input::CategoricalDescriptor(_) => "categorical descriptor",
        }
    }

    /// Categorical view for both categorical kinds.
    pub fn as_categorical(&self) -> Option<&CategoricalInput> {
        match self {
            Input::Categorical(c) => Some(c),
            Input::CategoricalDescriptor(c) => Some(&c.categorical),
            _ => None,
        }
    }

    /// True for continuous and discrete inputs.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Input::Continuous(_) | Input::Discrete(_))
    }

    /// Bounds of numeric inputs.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Input::Continuous(c) => Some(c.bounds()),
            Input::Discrete(d) => Some((d.lower(), d.upper())),
            _ => None,
        }
    }
}

impl From<ContinuousInput> for Input {
    fn from(value: ContinuousInput) -> Self {
        Input::Continuous(value)
    }
}

impl From<DiscreteInput> for Input {
    fn from(value: DiscreteInput) -> Self {
        Input::Discrete(value)
    }
}

impl From<CategoricalInput> for Input {
    fn from(value: CategoricalInput) -> Self {
        Input::Categorical(value)
    }
}

impl From<CategoricalDescriptorInput> for Input {
    fn from(value: CategoricalDescriptorInput) -> Self {
        Input::CategoricalDescriptor(value)
    }
}

/// Direction of an output objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveDirection {
    /// Smaller is better.
    Minimize,
    /// Larger is better.
    Maximize,
}

/// Measured quantity of an experiment. Not optimized by the design engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    key: String,
    objective: Option<ObjectiveDirection>,
}

impl Output {
    /// Creates an output without objective.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            objective: None,
        }
    }

    /// Returns the output with an objective direction.
    pub fn with_objective(mut self, objective: ObjectiveDirection) -> Self {
        self.objective = Some(objective);
        self
    }

    /// Key of the output.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Optional objective direction.
    pub fn objective(&self) -> Option<ObjectiveDirection> {
        self.objective
    }
}
