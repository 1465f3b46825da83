#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../../README.md")]
mod branch_and_bound;
mod constraint;
mod domain;
mod error;
mod expression;
mod feature;
mod formula;
mod interior_point_method;
mod linear_model;
mod optimal_design;
mod optimality;
mod polytope;
mod relaxation;
mod table;
mod transform;
mod utils;

pub use branch_and_bound::{
    BranchAndBoundOptions, Choice, ExhaustiveOptions, RelaxedProblem, RelaxedSolution,
    SearchResult, branch_and_bound, exchangeable_rows, exhaustive_search, n_assignments,
    row_options,
};
pub use constraint::{
    Constraint, InterpointEqualityConstraint, LinearConstraint, NChooseKConstraint,
    NonlinearConstraint,
};
pub use domain::{BoundOverrides, CategoricalGroup, Domain};
pub use error::{Error, Result, Warning};
pub use expression::Expression;
pub use feature::{
    CategoricalDescriptorInput, CategoricalInput, ContinuousInput, DiscreteInput, Input,
    ObjectiveDirection, Output,
};
pub use formula::{Formula, ModelTerm, build_formula};
pub use interior_point_method::{
    LinearEqualityConstraint, LinearInequalityConstraint, NLPBound, NLPConstraintFunction,
    NLPFunctionTarget, NLPSolver, NLPSolverConstraints, NLPSolverOptions,
    NonlinearConstraintFunction,
};
pub use linear_model::LinearModel;
pub use optimal_design::{Design, DesignOptions, OptimalDesign, SearchStrategy, optimal_design};
pub use optimality::{
    AOptimality, Criterion, DOptimality, DesignObjective, GOptimality, Metrics, Optimality,
    ZERO_EIGVAL_EPS, count_small_eigvals, metrics, n_zero_eigvals,
};
pub use polytope::{PolytopeSampler, SamplerOptions, SamplerState, sample_polytope};
pub use relaxation::{
    QuantityGroup, Relaxation, equal_count_split, equal_range_split, nchoosek_group_with_quantity,
    relax_domain, relax_domain_with,
};
pub use table::{Column, Table};
pub use transform::{
    LinearConstraintMatrix, NonlinearConstraintBlock, NonlinearKind, NumericConstraints,
    check_nchoosek_constraints_as_bounds, nchoosek_constraints_as_bounds, tighten_bounds,
    transform_constraints,
};
pub use utils::{cartesian_product, combinations, grouped_multisets, multisets, n_multisets};
