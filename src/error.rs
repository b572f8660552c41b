//! # Errors
//!
//! Typed failure kinds shared by the estimation, lowering, solver and
//! simulation layers. Every fallible operation returns one of these; a
//! failed solve never degrades into a default weight vector.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum PortfolioError {
  /// Too few complete return periods remain after cleaning.
  #[error("insufficient data: {available} usable periods, {required} required")]
  InsufficientData { required: usize, available: usize },

  /// No weight vector satisfies every constraint.
  #[error("infeasible constraints: {0}")]
  InfeasibleConstraints(String),

  /// Covariance matrix is not positive definite on the feasible subspace.
  #[error("covariance matrix is not positive definite on the feasible subspace")]
  IllConditionedCovariance,

  /// Iteration budget exhausted before the KKT conditions were met.
  #[error("solver did not converge within {max_iterations} iterations")]
  SolverDidNotConverge { max_iterations: usize },

  /// Objective has no finite optimum over the supplied constraints.
  #[error("objective is unbounded over the supplied constraints")]
  Unbounded,

  /// Malformed caller data (shape mismatch, duplicate asset ids, ...).
  #[error("invalid input: {field}: {reason}")]
  InvalidInput { field: String, reason: String },
}

impl PortfolioError {
  pub(crate) fn invalid<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
    Self::InvalidInput {
      field: field.into(),
      reason: reason.into(),
    }
  }
}
