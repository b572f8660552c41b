//! # Performance Summary
//!
//! $$
//! \mathrm{Sharpe} = \frac{\bar r - r_f}{\hat\sigma_r}\,\sqrt{P}
//! $$
//!
//! Scalar risk/return statistics derived from realized return series.
//! Pure functions; no state.

use crate::estimator::ReturnMatrix;
use crate::rebalance::Compounding;
use crate::rebalance::PortfolioReturnSeries;

/// Scalar statistics for one return series.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceSummary {
  /// Arithmetic mean period return.
  pub mean: f64,
  /// Sample standard deviation of period returns.
  pub volatility: f64,
  /// Annualized Sharpe ratio.
  pub sharpe: f64,
}

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

fn sample_variance(xs: &[f64], mean: f64) -> f64 {
  if xs.len() < 2 {
    return 0.0;
  }

  let mut acc = 0.0;
  for &x in xs {
    let d = x - mean;
    acc += d * d;
  }
  acc / (xs.len() - 1) as f64
}

fn summarize_values(values: &[f64], periods_per_year: f64, risk_free_rate: f64) -> PerformanceSummary {
  let mean = sample_mean(values);
  let volatility = sample_variance(values, mean).sqrt();
  let sharpe = if volatility > 1e-15 {
    (mean - risk_free_rate) / volatility * periods_per_year.sqrt()
  } else {
    0.0
  };

  PerformanceSummary {
    mean,
    volatility,
    sharpe,
  }
}

/// Summarize a realized portfolio return series.
///
/// `risk_free_rate` is a per-period rate; the Sharpe ratio is annualized
/// with `sqrt(periods_per_year)`.
pub fn summarize(
  series: &PortfolioReturnSeries,
  periods_per_year: f64,
  risk_free_rate: f64,
) -> PerformanceSummary {
  summarize_values(&series.values(), periods_per_year, risk_free_rate)
}

/// Per-asset summaries, one per return-matrix column in universe order.
pub fn summarize_assets(
  returns: &ReturnMatrix,
  periods_per_year: f64,
  risk_free_rate: f64,
) -> Vec<PerformanceSummary> {
  (0..returns.n_assets())
    .map(|j| {
      let column: Vec<f64> = returns.returns.column(j).iter().copied().collect();
      summarize_values(&column, periods_per_year, risk_free_rate)
    })
    .collect()
}

/// Chain a series into one cumulative return under a compounding mode.
pub fn cumulative_return(series: &PortfolioReturnSeries, compounding: Compounding) -> f64 {
  match compounding {
    Compounding::Arithmetic => series.entries.iter().map(|e| e.value).sum(),
    Compounding::Geometric => {
      series
        .entries
        .iter()
        .fold(1.0, |acc, e| acc * (1.0 + e.value))
        - 1.0
    }
  }
}

/// Maximum relative drawdown of the geometric equity curve.
pub fn max_drawdown(series: &PortfolioReturnSeries) -> f64 {
  let mut equity = 1.0;
  let mut high_water = 1.0f64;
  let mut max_dd = 0.0f64;

  for entry in &series.entries {
    equity *= 1.0 + entry.value;
    if equity > high_water {
      high_water = equity;
    } else if high_water > 0.0 {
      max_dd = max_dd.max((high_water - equity) / high_water);
    }
  }

  max_dd.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;

  use super::*;
  use crate::rebalance::PeriodReturn;

  fn series(values: &[f64]) -> PortfolioReturnSeries {
    let entries = values
      .iter()
      .enumerate()
      .map(|(i, &value)| PeriodReturn {
        period: NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap(),
        value,
      })
      .collect();
    PortfolioReturnSeries { entries }
  }

  #[test]
  fn sharpe_matches_hand_computation() {
    let s = series(&[0.01, 0.03, -0.01, 0.05]);
    let summary = summarize(&s, 12.0, 0.001);

    let mean = 0.02;
    let var = ((0.01f64 - mean).powi(2)
      + (0.03 - mean).powi(2)
      + (-0.01 - mean).powi(2)
      + (0.05 - mean).powi(2))
      / 3.0;
    let vol = var.sqrt();

    assert_abs_diff_eq!(summary.mean, mean, epsilon = 1e-12);
    assert_abs_diff_eq!(summary.volatility, vol, epsilon = 1e-12);
    assert_abs_diff_eq!(
      summary.sharpe,
      (mean - 0.001) / vol * 12.0f64.sqrt(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn zero_volatility_yields_zero_sharpe() {
    let s = series(&[0.01, 0.01, 0.01]);
    let summary = summarize(&s, 252.0, 0.0);
    assert_eq!(summary.sharpe, 0.0);
    assert_eq!(summary.volatility, 0.0);
  }

  #[test]
  fn cumulative_return_modes_differ() {
    let s = series(&[0.1, -0.05]);
    assert_abs_diff_eq!(
      cumulative_return(&s, Compounding::Arithmetic),
      0.05,
      epsilon = 1e-12
    );
    assert_abs_diff_eq!(
      cumulative_return(&s, Compounding::Geometric),
      1.1 * 0.95 - 1.0,
      epsilon = 1e-12
    );
  }

  #[test]
  fn drawdown_tracks_high_water_mark() {
    // Equity: 1.1, 0.99, 1.089; trough 0.99 against peak 1.1.
    let s = series(&[0.1, -0.1, 0.1]);
    assert_abs_diff_eq!(max_drawdown(&s), 0.1, epsilon = 1e-12);

    let monotone = series(&[0.02, 0.02, 0.02]);
    assert_eq!(max_drawdown(&monotone), 0.0);
  }

  #[test]
  fn per_asset_summaries_follow_columns() {
    use ndarray::array;

    let matrix = ReturnMatrix {
      periods: (1..=3)
        .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
        .collect(),
      returns: array![[0.01, 0.05], [0.01, -0.03], [0.01, 0.04]],
    };

    let summaries = summarize_assets(&matrix, 12.0, 0.0);
    assert_eq!(summaries.len(), 2);
    assert_abs_diff_eq!(summaries[0].mean, 0.01, epsilon = 1e-12);
    assert_eq!(summaries[0].volatility, 0.0);
    assert_abs_diff_eq!(summaries[1].mean, 0.02, epsilon = 1e-12);
    assert!(summaries[1].volatility > 0.0);
  }
}
