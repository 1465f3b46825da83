/// Main error type
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// A key is referenced which is not part of the domain.
    #[error("unknown key `{key}` referenced by {context}")]
    UnknownKey {
        /// Referenced key.
        key: String,
        /// Where the key was referenced.
        context: String,
    },
    /// Two features or categories share the same key.
    #[error("key `{key}` is used more than once in {context}")]
    DuplicateKey {
        /// Duplicated key.
        key: String,
        /// Collection containing the duplicate.
        context: &'static str,
    },
    /// Two lists which have to be of equal length are not.
    #[error("{list1} has length {len1} but {list2} has length {len2}")]
    LengthMismatch {
        /// Name of list 1.
        list1: &'static str,
        /// Name of list 2.
        list2: &'static str,
        /// Length of list 1.
        len1: usize,
        /// Length of list 2.
        len2: usize,
    },
    /// A count does not respect `0 <= min <= max <= available`.
    #[error("invalid counts for {context}: min {min}, max {max}, available {available}")]
    InvalidCount {
        /// Object carrying the counts.
        context: String,
        /// Minimal count.
        min: usize,
        /// Maximal count.
        max: usize,
        /// Number of available elements.
        available: usize,
    },
    /// Lower bound is greater than the upper bound.
    #[error("bounds of `{key}` are invalid: lower {lower} > upper {upper}")]
    InvalidBounds {
        /// Feature key.
        key: String,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
    /// Categorical input without any allowed category.
    #[error("no category of `{key}` is allowed")]
    NoAllowedCategory {
        /// Feature key.
        key: String,
    },
    /// A list which requires at least one element is empty.
    #[error("{context} requires at least one element")]
    EmptyValues {
        /// Object requiring elements.
        context: String,
    },
    /// A reserved token is part of a key.
    #[error("`{token}` is reserved and must not appear in key `{key}`")]
    ReservedToken {
        /// Offending key.
        key: String,
        /// Reserved token.
        token: &'static str,
    },
    /// A feature kind is not supported in the given context.
    #[error("feature `{key}` of kind {kind} is not supported by {context}")]
    UnsupportedInput {
        /// Feature key.
        key: String,
        /// Feature kind.
        kind: &'static str,
        /// Operation which rejected the feature.
        context: &'static str,
    },
    /// An algebraic expression could not be parsed.
    #[error("cannot parse `{expression}` at position {position}: {message}")]
    ExpressionParse {
        /// Full expression.
        expression: String,
        /// Byte offset of the failure.
        position: usize,
        /// Reason.
        message: String,
    },
    /// A model specification is neither a keyword nor a valid formula.
    #[error("unrecognized model formula `{spec}`: {reason}")]
    UnrecognizedFormula {
        /// Given model specification.
        spec: String,
        /// Reason.
        reason: String,
    },
    /// The requested transformation is not available.
    #[error("no implementation for {what}")]
    NotImplemented {
        /// Description of the unsupported request.
        what: String,
    },
    /// Two given tensors do not have the same shape.
    #[error(
        "mat {mat1} with shape {shape1:?} and {mat2} with {shape2:?} have different len on dim {dim1} and {dim2}"
    )]
    ShapeMismatch {
        /// Name of matrix 1.
        mat1: &'static str,
        /// Name of matrix 2.
        mat2: &'static str,
        /// Affected shape of dimension on matrix 1.
        dim1: usize,
        /// Affected shape of dimension on matrix 2.
        dim2: usize,
        /// Shape of matrix 1.
        shape1: (usize, usize),
        /// Shape of matrix 2.
        shape2: (usize, usize),
    },
    /// NChooseK constraints can not be expressed through variable bounds.
    #[error("NChooseK constraints cannot be formulated as bounds: {reason}")]
    NChooseKNotAsBounds {
        /// Violated precondition.
        reason: String,
    },
    /// The feasible region is empty.
    #[error("infeasible region: {reason}")]
    InfeasibleRegion {
        /// Reason.
        reason: String,
    },
    /// The combinatorial search budget is exhausted without any feasible design.
    #[error("search budget exhausted after {evaluated} evaluations without a feasible design")]
    BudgetExhausted {
        /// Number of evaluated relaxations or combinations.
        evaluated: usize,
    },
    /// A candidate value violates the contract of its feature or a constraint.
    #[error("candidate column `{key}` is invalid: {reason}")]
    InvalidCandidate {
        /// Column key.
        key: String,
        /// Reason.
        reason: String,
    },
}

/// Main result type
pub type Result<T> = std::result::Result<T, Error>;

/// Non fatal issues which are reported while computing designs or samples.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// The information matrix is close to singular.
    NumericalDegeneracy {
        /// Number of eigenvalues with magnitude below delta.
        n_small_eigenvalues: usize,
        /// Cutoff used.
        delta: f64,
    },
    /// The design contains identical rows.
    DuplicateRows {
        /// Number of duplicated rows.
        count: usize,
    },
    /// All continuous inputs are fixed, nothing is sampled.
    DegenerateSample,
    /// Generated samples are not pairwise distinct.
    SamplesNotUnique {
        /// Number of distinct rows.
        unique: usize,
        /// Number of requested rows.
        requested: usize,
    },
    /// A combinatorial search stopped early and returned its best design.
    BudgetExhausted {
        /// Number of evaluated relaxations or combinations.
        evaluated: usize,
    },
}

impl Warning {
    /// Emits the warning through `tracing` and returns it.
    pub(crate) fn emit(self) -> Self {
        match &self {
            Warning::NumericalDegeneracy {
                n_small_eigenvalues,
                delta,
            } => tracing::warn!(
                n_small_eigenvalues,
                delta,
                "information matrix is close to singular"
            ),
            Warning::DuplicateRows { count } => {
                tracing::warn!(count, "design contains duplicated rows")
            }
            Warning::DegenerateSample => {
                tracing::warn!("nothing to sample, all continuous inputs are fixed")
            }
            Warning::SamplesNotUnique { unique, requested } => {
                tracing::warn!(unique, requested, "generated samples are not unique")
            }
            Warning::BudgetExhausted { evaluated } => tracing::warn!(
                evaluated,
                "search budget exhausted, returning best design found so far"
            ),
        }
        self
    }
}
