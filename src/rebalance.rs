//! # Rebalancing Engine
//!
//! $$
//! w_{i,t+1} = \frac{w_{i,t}\,(1 + r_{i,t})}{\sum_j w_{j,t}\,(1 + r_{j,t})}
//! $$
//!
//! Turns target weights and a return matrix into a realized portfolio
//! return series under a periodic reset policy.

use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use ndarray::Array1;

use crate::error::PortfolioError;
use crate::estimator::ReturnMatrix;

/// Periods after which weights reset to target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebalanceCadence {
  /// Reset after every period.
  EveryPeriod,
  /// Reset after every `n`-th period (periods `n-1`, `2n-1`, ...).
  EveryN(usize),
  /// Reset after the listed period indices.
  AtPeriods(Vec<usize>),
  /// Never reset; pure buy-and-hold drift after period 0.
  Never,
}

impl RebalanceCadence {
  fn is_boundary(&self, t: usize) -> bool {
    match self {
      Self::EveryPeriod => true,
      Self::EveryN(n) => *n > 0 && (t + 1) % n == 0,
      Self::AtPeriods(periods) => periods.contains(&t),
      Self::Never => false,
    }
  }
}

/// How the summarizer chains period returns. The per-period engine loop
/// never branches on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compounding {
  /// Simple summation of period returns.
  Arithmetic,
  /// Multiplicative chaining of period growth factors.
  Geometric,
}

/// Reset cadence plus the compounding convention used downstream.
#[derive(Clone, Debug, ImplNew)]
pub struct RebalancingPolicy {
  pub cadence: RebalanceCadence,
  pub compounding: Compounding,
}

/// One realized portfolio return for one period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodReturn {
  pub period: NaiveDate,
  pub value: f64,
}

/// Realized portfolio returns, one entry per period of the input matrix.
#[derive(Clone, Debug, Default)]
pub struct PortfolioReturnSeries {
  pub entries: Vec<PeriodReturn>,
}

impl PortfolioReturnSeries {
  /// Number of periods.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether the series is empty.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Realized returns without their period labels.
  pub fn values(&self) -> Vec<f64> {
    self.entries.iter().map(|e| e.value).collect()
  }
}

/// Simulate target weights over a return matrix under a rebalancing
/// policy.
///
/// Weights start at target; each period realizes the dot product of the
/// current (possibly drifted) weights with that period's asset returns.
/// At a cadence boundary the weights reset to target for the next period,
/// otherwise every asset drifts with its own realized return.
pub fn simulate(
  weights: &Array1<f64>,
  returns: &ReturnMatrix,
  policy: &RebalancingPolicy,
) -> Result<PortfolioReturnSeries, PortfolioError> {
  let n = returns.n_assets();
  if weights.len() != n {
    return Err(PortfolioError::invalid(
      "weights",
      format!("{} weights for {n} assets", weights.len()),
    ));
  }

  let mut current = weights.clone();
  let mut entries = Vec::with_capacity(returns.n_periods());

  for t in 0..returns.n_periods() {
    let row = returns.returns.row(t);
    let realized = current.dot(&row);
    entries.push(PeriodReturn {
      period: returns.periods[t],
      value: realized,
    });

    if policy.cadence.is_boundary(t) {
      current = weights.clone();
    } else {
      let growth: f64 = current
        .iter()
        .zip(row.iter())
        .map(|(w, r)| w * (1.0 + r))
        .sum();
      if growth.abs() < 1e-12 {
        return Err(PortfolioError::invalid(
          "returns",
          format!("portfolio value annihilated at period {t}"),
        ));
      }
      for i in 0..n {
        current[i] = current[i] * (1.0 + row[i]) / growth;
      }
    }
  }

  Ok(PortfolioReturnSeries { entries })
}
