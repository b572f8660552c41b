//! # Maximum-Expected-Return Solver
//!
//! $$
//! \max_{\mathbf{w}} \mu^\top \mathbf{w}
//! \quad \text{s.t.} \quad \mathbf{1}^\top\mathbf{w} = 1,\; l \le \mathbf{w} \le u
//! $$
//!
//! Bounded-variable simplex pivoting specialized to the lowered system.
//! The objective is linear over a bounded polytope, so an optimum sits at a
//! vertex; pivots raise the non-saturated variable with the best reduced
//! cost until the budget row is satisfied.

use ndarray::Array1;
use ndarray_stats::QuantileExt;
use tracing::debug;

use crate::error::PortfolioError;
use crate::solver::activity;
use crate::solver::ConvergenceStatus;
use crate::solver::OptimizationResult;
use crate::solver::SolverOptions;
use crate::spec::LinearSystem;

const BUDGET_TOL: f64 = 1e-12;

/// Maximize `mu' w` over the lowered system.
///
/// Ties between equally attractive vertices resolve to the lowest asset
/// index, so repeated runs on identical input return the identical vertex.
pub fn maximize_expected_return(
  mu: &Array1<f64>,
  system: &LinearSystem,
  options: &SolverOptions,
) -> Result<OptimizationResult, PortfolioError> {
  let n = system.n_assets();
  debug_assert_eq!(
    system.a_ineq.nrows(),
    0,
    "closed constraint kinds lower to an equality row and bounds only"
  );
  if mu.len() != n {
    return Err(PortfolioError::invalid(
      "mean",
      format!("{} entries for {n} assets", mu.len()),
    ));
  }

  if !system.has_full_investment() {
    return separable_optimum(mu, system);
  }

  if n == 1 {
    // The budget row pins the single weight; bounds were prechecked at
    // lowering time.
    let weights = Array1::from_vec(vec![1.0]);
    let objective_value = mu[0];
    return Ok(OptimizationResult {
      objective_value,
      diagnostics: activity(&weights, system, 0, None),
      weights,
      status: ConvergenceStatus::ShortCircuit,
    });
  }

  // The polytope is bounded only if every asset carries finite bounds;
  // upstream always supplies a box, but the solver must not assume it.
  if system.lower.iter().any(|v| !v.is_finite()) || system.upper.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::Unbounded);
  }

  let mut w = system.lower.clone();
  let mut remaining = 1.0 - w.sum();
  if remaining < -BUDGET_TOL {
    return Err(PortfolioError::InfeasibleConstraints(
      "lower bounds already exceed the full-investment budget".into(),
    ));
  }

  let mut scores = mu.clone();
  let mut iterations = 0usize;
  let budget = options.iteration_budget(n);

  while remaining > BUDGET_TOL {
    if iterations >= budget {
      return Err(PortfolioError::SolverDidNotConverge {
        max_iterations: budget,
      });
    }
    iterations += 1;

    let entering = scores
      .argmax()
      .map_err(|_| PortfolioError::invalid("mean", "empty or unordered entries"))?;
    if scores[entering] == f64::NEG_INFINITY {
      // Every variable is saturated yet budget remains; the lowering
      // prechecks make this unreachable, keep it as a hard failure.
      return Err(PortfolioError::InfeasibleConstraints(
        "all upper bounds saturated below the full-investment budget".into(),
      ));
    }

    let take = (system.upper[entering] - w[entering]).min(remaining);
    w[entering] += take;
    remaining -= take;
    scores[entering] = f64::NEG_INFINITY;
    debug!(entering, take, remaining, "raised entering variable");
  }

  let objective_value = mu.dot(&w);
  Ok(OptimizationResult {
    objective_value,
    diagnostics: activity(&w, system, iterations, None),
    weights: w,
    status: ConvergenceStatus::Optimal,
  })
}

/// Without the budget row the problem separates per asset: each weight
/// runs to whichever bound its mean rewards, and a missing bound in a
/// rewarded direction is an unbounded objective.
fn separable_optimum(
  mu: &Array1<f64>,
  system: &LinearSystem,
) -> Result<OptimizationResult, PortfolioError> {
  let n = system.n_assets();
  let mut w = Array1::zeros(n);

  for i in 0..n {
    w[i] = if mu[i] > 0.0 {
      if !system.upper[i].is_finite() {
        return Err(PortfolioError::Unbounded);
      }
      system.upper[i]
    } else if mu[i] < 0.0 {
      if !system.lower[i].is_finite() {
        return Err(PortfolioError::Unbounded);
      }
      system.lower[i]
    } else {
      0.0f64.clamp(system.lower[i], system.upper[i])
    };
  }

  let objective_value = mu.dot(&w);
  Ok(OptimizationResult {
    objective_value,
    diagnostics: activity(&w, system, 0, None),
    weights: w,
    status: ConvergenceStatus::ShortCircuit,
  })
}
