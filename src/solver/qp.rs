//! # Minimum-Variance Solver
//!
//! $$
//! \min_{\mathbf{w}} \mathbf{w}^\top \Sigma \mathbf{w}
//! \quad \text{s.t.} \quad A_{eq}\mathbf{w} = b_{eq},\; l \le \mathbf{w} \le u
//! $$
//!
//! Primal active-set method for the convex quadratic program. Each
//! working-set change refactorizes the reduced Hessian by Cholesky; a
//! non-positive pivot surfaces as `IllConditionedCovariance` unless the
//! caller opted into ridge regularization.

use nalgebra::Cholesky;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::Dyn;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use crate::error::PortfolioError;
use crate::solver::activity;
use crate::solver::ConvergenceStatus;
use crate::solver::OptimizationResult;
use crate::solver::SolverOptions;
use crate::spec::LinearSystem;

const STEP_TOL: f64 = 1e-12;
const MULT_TOL: f64 = 1e-9;
const SEED_TOL: f64 = 1e-9;
const BOUND_TOL: f64 = 1e-10;
const PIVOT_RTOL: f64 = 1e-7;

/// Cholesky with an explicit pivot gate.
///
/// Rounding can leave a semi-definite matrix with a tiny positive pivot
/// instead of a zero one, so a pivot below `PIVOT_RTOL` times the largest
/// pivot is treated as non-positive.
fn checked_cholesky(h: DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
  let dim = h.nrows();
  let chol = Cholesky::new(h)?;
  let l = chol.l_dirty();
  let mut min_pivot = f64::INFINITY;
  let mut max_pivot = 0.0f64;
  for i in 0..dim {
    min_pivot = min_pivot.min(l[(i, i)]);
    max_pivot = max_pivot.max(l[(i, i)]);
  }
  if min_pivot <= PIVOT_RTOL * max_pivot {
    return None;
  }
  Some(chol)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BoundSide {
  Lower,
  Upper,
}

/// Minimize `w' Σ w` over the lowered system.
///
/// `Σ` must be symmetric positive semi-definite; positive definiteness on
/// the feasible subspace is verified constructively through the Cholesky
/// factorization of the reduced Hessian.
pub fn minimize_variance(
  covariance: &Array2<f64>,
  system: &LinearSystem,
  options: &SolverOptions,
) -> Result<OptimizationResult, PortfolioError> {
  let n = system.n_assets();
  debug_assert_eq!(
    system.a_ineq.nrows(),
    0,
    "closed constraint kinds lower to an equality row and bounds only"
  );
  if covariance.dim() != (n, n) {
    return Err(PortfolioError::invalid(
      "covariance",
      format!("{:?} matrix for {n} assets", covariance.dim()),
    ));
  }

  if n == 1 {
    // The full-investment equality pins the single weight at one; without
    // it the unconstrained minimizer clamps zero into the bounds.
    let w0 = if system.has_full_investment() {
      1.0
    } else {
      0.0f64.clamp(system.lower[0], system.upper[0])
    };
    let weights = Array1::from_vec(vec![w0]);
    let objective_value = w0 * covariance[[0, 0]] * w0;
    return Ok(OptimizationResult {
      objective_value,
      diagnostics: activity(&weights, system, 0, None),
      weights,
      status: ConvergenceStatus::ShortCircuit,
    });
  }

  match active_set(covariance, system, options, None) {
    Err(PortfolioError::IllConditionedCovariance) if options.ridge.is_some() => {
      let eps = options.ridge.unwrap_or_default();
      let mut ridged = covariance.clone();
      for i in 0..n {
        ridged[[i, i]] += eps;
      }
      debug!(eps, "covariance not positive definite, applying opt-in ridge");
      active_set(&ridged, system, options, Some(eps))
    }
    result => result,
  }
}

fn active_set(
  sigma: &Array2<f64>,
  system: &LinearSystem,
  options: &SolverOptions,
  ridge: Option<f64>,
) -> Result<OptimizationResult, PortfolioError> {
  let n = system.n_assets();
  let budget = options.iteration_budget(n);

  // Positive-definiteness gate on the full Hessian: a non-positive pivot
  // here is the deterministic ill-conditioning signal, independent of which
  // working sets the iteration happens to visit.
  let full = DMatrix::from_fn(n, n, |r, c| 2.0 * sigma[[r, c]]);
  if checked_cholesky(full).is_none() {
    return Err(PortfolioError::IllConditionedCovariance);
  }

  let mut w = initial_point(system)?;
  let mut side: Vec<Option<BoundSide>> = (0..n)
    .map(|i| {
      if system.lower[i].is_finite() && (w[i] - system.lower[i]).abs() <= BOUND_TOL {
        Some(BoundSide::Lower)
      } else if system.upper[i].is_finite() && (w[i] - system.upper[i]).abs() <= BOUND_TOL {
        Some(BoundSide::Upper)
      } else {
        None
      }
    })
    .collect();

  let mut iterations = 0usize;
  let mut converged = false;

  while iterations < budget {
    iterations += 1;
    let free: Vec<usize> = (0..n).filter(|&i| side[i].is_none()).collect();

    if free.is_empty() {
      match vertex_multipliers(sigma, system, &w, &side) {
        None => {
          converged = true;
          break;
        }
        Some(release) => {
          debug!(iteration = iterations, asset = release, "releasing bound at vertex");
          side[release] = None;
          continue;
        }
      }
    }

    let eqp = solve_eqp(sigma, system, &w, &side, &free)?;

    // Longest feasible step toward the subproblem optimum.
    let mut alpha = 1.0f64;
    let mut blocking: Option<(usize, BoundSide)> = None;
    for (k, &i) in free.iter().enumerate() {
      let d = eqp.x[k] - w[i];
      if d > STEP_TOL && system.upper[i].is_finite() {
        let ratio = (system.upper[i] - w[i]) / d;
        if ratio < alpha {
          alpha = ratio;
          blocking = Some((i, BoundSide::Upper));
        }
      } else if d < -STEP_TOL && system.lower[i].is_finite() {
        let ratio = (system.lower[i] - w[i]) / d;
        if ratio < alpha {
          alpha = ratio;
          blocking = Some((i, BoundSide::Lower));
        }
      }
    }
    let alpha = alpha.max(0.0);

    for (k, &i) in free.iter().enumerate() {
      w[i] += alpha * (eqp.x[k] - w[i]);
    }

    if let Some((b, s)) = blocking {
      w[b] = match s {
        BoundSide::Lower => system.lower[b],
        BoundSide::Upper => system.upper[b],
      };
      side[b] = Some(s);
      debug!(iteration = iterations, asset = b, alpha, "bound became active");
      continue;
    }

    // Full step taken: w solves the equality-constrained subproblem.
    match bound_multipliers(sigma, system, &w, &side, eqp.lambda.as_ref()) {
      None => {
        converged = true;
        break;
      }
      Some(release) => {
        debug!(
          iteration = iterations,
          asset = release,
          "dropping constraint with negative multiplier"
        );
        side[release] = None;
      }
    }
  }

  if !converged {
    return Err(PortfolioError::SolverDidNotConverge {
      max_iterations: budget,
    });
  }

  let objective_value = w.dot(&sigma.dot(&w));
  Ok(OptimizationResult {
    objective_value,
    diagnostics: activity(&w, system, iterations, ridge),
    weights: w,
    status: ConvergenceStatus::Optimal,
  })
}

/// Deterministic feasible starting point: fill upward from the lower
/// bounds in asset order until the full-investment budget is met.
fn initial_point(system: &LinearSystem) -> Result<Array1<f64>, PortfolioError> {
  let n = system.n_assets();

  if !system.has_full_investment() {
    let w = (0..n)
      .map(|i| 0.0f64.clamp(system.lower[i], system.upper[i]))
      .collect();
    return Ok(Array1::from_vec(w));
  }

  let mut w: Vec<f64> = (0..n)
    .map(|i| if system.lower[i].is_finite() { system.lower[i] } else { 0.0 })
    .collect();
  let mut deficit = 1.0 - w.iter().sum::<f64>();

  if deficit > 0.0 {
    for i in 0..n {
      if deficit <= SEED_TOL {
        break;
      }
      let take = (system.upper[i] - w[i]).min(deficit);
      if take > 0.0 {
        w[i] += take;
        deficit -= take;
      }
    }
  } else {
    for i in 0..n {
      if deficit >= -SEED_TOL {
        break;
      }
      let take = (w[i] - system.lower[i]).min(-deficit);
      if take > 0.0 {
        w[i] -= take;
        deficit += take;
      }
    }
  }

  if deficit.abs() > SEED_TOL {
    return Err(PortfolioError::InfeasibleConstraints(
      "no feasible starting point for the bound system".into(),
    ));
  }

  Ok(Array1::from_vec(w))
}

struct EqpSolution {
  /// Subproblem optimum over the free variables, free-index order.
  x: Vec<f64>,
  /// Equality multipliers, when the equality block is present.
  lambda: Option<DVector<f64>>,
}

/// Solve the equality-constrained subproblem with the active variables
/// pinned at their bounds, via Cholesky of the reduced Hessian.
fn solve_eqp(
  sigma: &Array2<f64>,
  system: &LinearSystem,
  w: &Array1<f64>,
  side: &[Option<BoundSide>],
  free: &[usize],
) -> Result<EqpSolution, PortfolioError> {
  let n = system.n_assets();
  let nf = free.len();
  let m = system.a_eq.nrows();

  let h = DMatrix::from_fn(nf, nf, |r, c| 2.0 * sigma[[free[r], free[c]]]);
  let chol = checked_cholesky(h).ok_or(PortfolioError::IllConditionedCovariance)?;

  let c = DVector::from_fn(nf, |r, _| {
    let i = free[r];
    let mut acc = 0.0;
    for j in 0..n {
      if side[j].is_some() {
        acc += 2.0 * sigma[[i, j]] * w[j];
      }
    }
    acc
  });

  if m == 0 {
    let x = -chol.solve(&c);
    return Ok(EqpSolution {
      x: x.iter().copied().collect(),
      lambda: None,
    });
  }

  let a_f = DMatrix::from_fn(m, nf, |r, k| system.a_eq[[r, free[k]]]);
  let residual = DVector::from_fn(m, |r, _| {
    let mut acc = system.b_eq[r];
    for j in 0..n {
      if side[j].is_some() {
        acc -= system.a_eq[[r, j]] * w[j];
      }
    }
    acc
  });

  let hinv_at = chol.solve(&a_f.transpose());
  let hinv_c = chol.solve(&c);
  let schur = &a_f * &hinv_at;
  let rhs = residual + &a_f * &hinv_c;
  let lambda = schur
    .lu()
    .solve(&rhs)
    .ok_or(PortfolioError::IllConditionedCovariance)?;
  let x = &hinv_at * &lambda - &hinv_c;

  Ok(EqpSolution {
    x: x.iter().copied().collect(),
    lambda: Some(lambda),
  })
}

fn is_pinned(system: &LinearSystem, i: usize) -> bool {
  system.lower[i] == system.upper[i]
}

fn equality_term(system: &LinearSystem, lambda: Option<&DVector<f64>>, i: usize) -> f64 {
  match lambda {
    Some(l) => (0..system.a_eq.nrows())
      .map(|r| l[r] * system.a_eq[[r, i]])
      .sum(),
    None => 0.0,
  }
}

/// KKT check at an equality-constrained optimum: return the active bound
/// with the most negative multiplier (ties to the lowest asset index), or
/// `None` when all multipliers are non-negative.
fn bound_multipliers(
  sigma: &Array2<f64>,
  system: &LinearSystem,
  w: &Array1<f64>,
  side: &[Option<BoundSide>],
  lambda: Option<&DVector<f64>>,
) -> Option<usize> {
  let gradient = 2.0 * sigma.dot(w);
  let mut worst: Option<(usize, f64)> = None;

  for (i, s) in side.iter().enumerate() {
    let Some(s) = s else { continue };
    if is_pinned(system, i) {
      continue;
    }
    let a = equality_term(system, lambda, i);
    let multiplier = match s {
      BoundSide::Lower => gradient[i] - a,
      BoundSide::Upper => a - gradient[i],
    };
    if multiplier < -MULT_TOL && worst.map(|(_, m)| multiplier < m).unwrap_or(true) {
      worst = Some((i, multiplier));
    }
  }

  worst.map(|(i, _)| i)
}

/// KKT check at a vertex (no free variables): the equality multiplier is
/// chosen from the gradient spread of the active bounds.
fn vertex_multipliers(
  sigma: &Array2<f64>,
  system: &LinearSystem,
  w: &Array1<f64>,
  side: &[Option<BoundSide>],
) -> Option<usize> {
  if !system.has_full_investment() {
    return bound_multipliers(sigma, system, w, side, None);
  }

  let gradient = 2.0 * sigma.dot(w);
  let mut min_lower: Option<(usize, f64)> = None;
  let mut max_upper: Option<(usize, f64)> = None;

  for (i, s) in side.iter().enumerate() {
    let Some(s) = s else { continue };
    if is_pinned(system, i) {
      continue;
    }
    match s {
      BoundSide::Lower => {
        if min_lower.map(|(_, g)| gradient[i] < g).unwrap_or(true) {
          min_lower = Some((i, gradient[i]));
        }
      }
      BoundSide::Upper => {
        if max_upper.map(|(_, g)| gradient[i] > g).unwrap_or(true) {
          max_upper = Some((i, gradient[i]));
        }
      }
    }
  }

  match (min_lower, max_upper) {
    // A one-sided vertex always admits a feasible equality multiplier.
    (None, _) | (_, None) => None,
    (Some((li, lg)), Some((ui, ug))) => {
      if ug <= lg + MULT_TOL {
        None
      } else {
        Some(li.min(ui))
      }
    }
  }
}
