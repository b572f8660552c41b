//! # Solvers
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}\in\mathcal{F}} \mathbf{w}^\top \Sigma \mathbf{w}
//! \qquad\text{or}\qquad
//! \mathbf{w}^\* = \arg\max_{\mathbf{w}\in\mathcal{F}} \mu^\top \mathbf{w}
//! $$
//!
//! Objective dispatch, solver configuration and result containers.

pub mod lp;
pub mod qp;

use ndarray::Array1;
use rayon::prelude::*;

use crate::error::PortfolioError;
use crate::estimator::ReturnEstimate;
use crate::spec::LinearSystem;
use crate::spec::Objective;
use crate::spec::PortfolioSpec;

pub use lp::maximize_expected_return;
pub use qp::minimize_variance;

/// Termination state reported by a successful solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceStatus {
  /// KKT conditions satisfied within tolerance.
  Optimal,
  /// Problem shape admitted a closed-form answer without iterating.
  ShortCircuit,
}

/// Runtime knobs shared by both solvers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolverOptions {
  /// Hard cap on working-set iterations; `None` derives `50 + 10 n`.
  pub max_iterations: Option<usize>,
  /// Opt-in ridge regularization, applied once as `Σ + eps I` when the
  /// Cholesky factorization detects a non-positive pivot. Off by default;
  /// the applied epsilon is echoed in [`SolverDiagnostics::ridge`].
  pub ridge: Option<f64>,
}

impl SolverOptions {
  pub(crate) fn iteration_budget(&self, n: usize) -> usize {
    self.max_iterations.unwrap_or(50 + 10 * n)
  }
}

/// Iteration count and constraint activity at the solution.
#[derive(Clone, Debug, Default)]
pub struct SolverDiagnostics {
  /// Working-set or pivot iterations consumed.
  pub iterations: usize,
  /// Ridge epsilon actually applied, if regularization fired.
  pub ridge: Option<f64>,
  /// Assets pinned at their lower bound at the solution.
  pub active_lower: Vec<usize>,
  /// Assets pinned at their upper bound at the solution.
  pub active_upper: Vec<usize>,
  /// Whether the full-investment equality row is part of the system.
  pub equality_active: bool,
}

/// Outcome of one solver invocation. Created once, never mutated.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Optimal weights, indices aligned to the asset universe.
  pub weights: Array1<f64>,
  /// Achieved objective value (`w' Σ w` or `mu' w`).
  pub objective_value: f64,
  /// Termination state.
  pub status: ConvergenceStatus,
  /// Per-solve diagnostics.
  pub diagnostics: SolverDiagnostics,
}

pub(crate) fn activity(
  weights: &Array1<f64>,
  system: &LinearSystem,
  iterations: usize,
  ridge: Option<f64>,
) -> SolverDiagnostics {
  let mut active_lower = Vec::new();
  let mut active_upper = Vec::new();
  for i in 0..weights.len() {
    if system.lower[i].is_finite() && (weights[i] - system.lower[i]).abs() <= 1e-9 {
      active_lower.push(i);
    } else if system.upper[i].is_finite() && (weights[i] - system.upper[i]).abs() <= 1e-9 {
      active_upper.push(i);
    }
  }

  SolverDiagnostics {
    iterations,
    ridge,
    active_lower,
    active_upper,
    equality_active: system.has_full_investment(),
  }
}

/// Solve a spec against estimated moments, dispatching on its objective.
///
/// The constraint list is lowered first, so provable infeasibility is
/// reported before any solver iteration runs.
pub fn solve(
  spec: &PortfolioSpec,
  estimate: &ReturnEstimate,
  options: &SolverOptions,
) -> Result<OptimizationResult, PortfolioError> {
  let n = spec.universe().len();
  if estimate.mean.len() != n {
    return Err(PortfolioError::invalid(
      "estimate",
      format!("mean has {} entries for {} assets", estimate.mean.len(), n),
    ));
  }
  if estimate.covariance.dim() != (n, n) {
    return Err(PortfolioError::invalid(
      "estimate",
      format!(
        "covariance is {:?} for {} assets",
        estimate.covariance.dim(),
        n
      ),
    ));
  }

  let system = spec.lower()?;
  match spec.objective() {
    Objective::MinimizeVariance => qp::minimize_variance(&estimate.covariance, &system, options),
    Objective::MaximizeExpectedReturn => {
      lp::maximize_expected_return(&estimate.mean, &system, options)
    }
  }
}

/// Solve many independent specs in parallel against shared moments.
///
/// Each solve borrows the shared inputs read-only and owns its result, so
/// the sweep is embarrassingly parallel.
pub fn solve_batch(
  specs: &[PortfolioSpec],
  estimate: &ReturnEstimate,
  options: &SolverOptions,
) -> Vec<Result<OptimizationResult, PortfolioError>> {
  specs
    .par_iter()
    .map(|spec| solve(spec, estimate, options))
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use ndarray::array;

  use super::*;
  use crate::estimator::ReturnMatrix;
  use crate::spec::AssetUniverse;
  use crate::spec::Bounds;
  use crate::spec::Constraint;

  fn estimate() -> ReturnEstimate {
    let periods: Vec<NaiveDate> = (1..=4)
      .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
      .collect();
    ReturnEstimate {
      returns: ReturnMatrix {
        periods,
        returns: array![
          [0.01, -0.01],
          [-0.02, 0.02],
          [0.015, 0.005],
          [0.0, -0.005],
        ],
      },
      mean: array![0.05, 0.08],
      covariance: array![[0.04, 0.0], [0.0, 0.09]],
    }
  }

  fn spec(objective: Objective) -> PortfolioSpec {
    PortfolioSpec::new(AssetUniverse::new(vec!["AAA", "BBB"]).unwrap())
      .with_constraint(Constraint::FullInvestment)
      .unwrap()
      .with_constraint(Constraint::Box {
        lower: Bounds::Uniform(0.0),
        upper: Bounds::Uniform(1.0),
      })
      .unwrap()
      .with_objective(objective)
  }

  #[test]
  fn dispatch_follows_objective() {
    let est = estimate();
    let options = SolverOptions::default();

    let qp = solve(&spec(Objective::MinimizeVariance), &est, &options).unwrap();
    // Minimum variance tilts toward the lower-variance asset.
    assert!(qp.weights[0] > qp.weights[1]);

    let lp = solve(&spec(Objective::MaximizeExpectedReturn), &est, &options).unwrap();
    // Maximum return goes all-in on the higher mean.
    assert!((lp.weights[1] - 1.0).abs() < 1e-9);
  }

  #[test]
  fn shape_mismatch_is_invalid_input() {
    let mut est = estimate();
    est.mean = array![0.05, 0.08, 0.02];
    let err = solve(&spec(Objective::MinimizeVariance), &est, &SolverOptions::default());
    assert!(matches!(err, Err(PortfolioError::InvalidInput { .. })));
  }

  #[test]
  fn full_pipeline_runs_end_to_end() {
    use crate::estimator::estimate_returns;
    use crate::estimator::PriceSeries;
    use crate::estimator::ResampleCadence;
    use crate::rebalance::simulate;
    use crate::rebalance::Compounding;
    use crate::rebalance::RebalanceCadence;
    use crate::rebalance::RebalancingPolicy;
    use crate::summary::summarize;

    let dates: Vec<NaiveDate> = (1..=8)
      .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
      .collect();
    let prices = array![
      [100.0, 50.0],
      [102.0, 49.5],
      [101.0, 50.5],
      [104.0, 50.0],
      [103.0, 51.0],
      [106.0, 50.5],
      [105.0, 51.5],
      [108.0, 51.0],
    ];
    let series = PriceSeries::new(dates, prices).unwrap();

    let est = estimate_returns(&series, ResampleCadence::AsIs).unwrap();
    let result = solve(&spec(Objective::MinimizeVariance), &est, &SolverOptions::default())
      .unwrap();
    let total: f64 = result.weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-8);

    let policy = RebalancingPolicy::new(RebalanceCadence::EveryPeriod, Compounding::Geometric);
    let realized = simulate(&result.weights, &est.returns, &policy).unwrap();
    assert_eq!(realized.len(), est.returns.n_periods());

    let stats = summarize(&realized, 252.0, 0.0);
    assert!(stats.volatility > 0.0);
    assert!(stats.mean.is_finite());
  }

  #[test]
  fn batch_reports_per_spec_results() {
    let est = estimate();
    let feasible = spec(Objective::MinimizeVariance);
    let infeasible = PortfolioSpec::new(AssetUniverse::new(vec!["AAA", "BBB"]).unwrap())
      .with_constraint(Constraint::FullInvestment)
      .unwrap()
      .with_constraint(Constraint::Box {
        lower: Bounds::Uniform(0.6),
        upper: Bounds::Uniform(0.7),
      })
      .unwrap();

    let results = solve_batch(&[feasible, infeasible], &est, &SolverOptions::default());
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(
      results[1],
      Err(PortfolioError::InfeasibleConstraints(_))
    ));
  }
}
