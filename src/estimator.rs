//! # Return Estimation
//!
//! $$
//! r_t = \frac{p_t}{p_{t-1}} - 1
//! $$
//!
//! Price resampling, simple-return construction and sample moment estimation.

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;

use crate::error::PortfolioError;

/// Resampling cadence applied to raw prices before returns are built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleCadence {
  /// Keep every raw observation.
  AsIs,
  /// Keep the last observation per ISO week.
  Weekly,
  /// Keep the last observation per calendar month.
  Monthly,
}

/// Chronologically ordered raw prices, one column per asset.
///
/// A `NaN` entry marks a missing observation for that asset on that date.
#[derive(Clone, Debug)]
pub struct PriceSeries {
  pub dates: Vec<NaiveDate>,
  pub prices: Array2<f64>,
}

impl PriceSeries {
  /// Build a price series, validating that dates and rows line up.
  pub fn new(dates: Vec<NaiveDate>, prices: Array2<f64>) -> Result<Self, PortfolioError> {
    if dates.len() != prices.nrows() {
      return Err(PortfolioError::invalid(
        "prices",
        format!("{} rows but {} dates", prices.nrows(), dates.len()),
      ));
    }
    Ok(Self { dates, prices })
  }

  /// Number of raw observations.
  pub fn len(&self) -> usize {
    self.dates.len()
  }

  /// Whether the series holds no observations.
  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }
}

/// Periodic simple returns with period labels, columns in universe order.
///
/// No `NaN` survives past the estimator boundary; rows containing any
/// missing value are dropped before this type is handed downstream.
#[derive(Clone, Debug)]
pub struct ReturnMatrix {
  pub periods: Vec<NaiveDate>,
  pub returns: Array2<f64>,
}

impl ReturnMatrix {
  /// Number of return periods.
  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  /// Number of assets.
  pub fn n_assets(&self) -> usize {
    self.returns.ncols()
  }
}

/// A return matrix together with its sample moments.
#[derive(Clone, Debug)]
pub struct ReturnEstimate {
  pub returns: ReturnMatrix,
  /// Column means of the return matrix.
  pub mean: Array1<f64>,
  /// Sample covariance matrix, `N - 1` denominator.
  pub covariance: Array2<f64>,
}

fn bucket_key(date: NaiveDate, cadence: ResampleCadence) -> (i32, u32) {
  match cadence {
    ResampleCadence::AsIs => (0, 0),
    ResampleCadence::Weekly => {
      let week = date.iso_week();
      (week.year(), week.week())
    }
    ResampleCadence::Monthly => (date.year(), date.month()),
  }
}

/// Keep the last observation per cadence bucket, per asset.
///
/// A `NaN` price is not an observation: the last non-missing price in the
/// bucket wins, and the bucket stays `NaN` only if the whole bucket is
/// missing for that asset.
fn resample(prices: &PriceSeries, cadence: ResampleCadence) -> (Vec<NaiveDate>, Array2<f64>) {
  if cadence == ResampleCadence::AsIs {
    return (prices.dates.clone(), prices.prices.clone());
  }

  let n = prices.prices.ncols();
  let mut dates: Vec<NaiveDate> = Vec::new();
  let mut rows: Vec<Vec<f64>> = Vec::new();

  for (t, &date) in prices.dates.iter().enumerate() {
    let key = bucket_key(date, cadence);
    let new_bucket = dates
      .last()
      .map(|&d| bucket_key(d, cadence) != key)
      .unwrap_or(true);

    if new_bucket {
      dates.push(date);
      rows.push(vec![f64::NAN; n]);
    } else {
      *dates.last_mut().unwrap() = date;
    }

    let row = rows.last_mut().unwrap();
    for j in 0..n {
      let p = prices.prices[[t, j]];
      if p.is_finite() {
        row[j] = p;
      }
    }
  }

  let t = dates.len();
  let mut out = Array2::from_elem((t, n), f64::NAN);
  for (i, row) in rows.iter().enumerate() {
    for j in 0..n {
      out[[i, j]] = row[j];
    }
  }

  (dates, out)
}

fn sample_covariance(returns: &Array2<f64>, mean: &Array1<f64>) -> Array2<f64> {
  let (t, n) = returns.dim();
  let mut cov = Array2::zeros((n, n));

  for i in 0..n {
    for j in i..n {
      let mut acc = 0.0;
      for k in 0..t {
        acc += (returns[[k, i]] - mean[i]) * (returns[[k, j]] - mean[j]);
      }
      let c = acc / (t - 1) as f64;
      cov[[i, j]] = c;
      cov[[j, i]] = c;
    }
  }

  cov
}

/// Estimate periodic returns and their sample moments from raw prices.
///
/// Prices are resampled to the cadence (last observation per bucket),
/// converted to simple period-over-period returns, and cleaned with a
/// complete-case policy: any row still containing a missing value is
/// dropped, not imputed. Simple returns are used throughout because they
/// aggregate linearly across the portfolio cross-section.
pub fn estimate_returns(
  prices: &PriceSeries,
  cadence: ResampleCadence,
) -> Result<ReturnEstimate, PortfolioError> {
  let n = prices.prices.ncols();
  if n == 0 {
    return Err(PortfolioError::invalid("prices", "no asset columns"));
  }

  let (dates, resampled) = resample(prices, cadence);
  let t = resampled.nrows();

  let mut periods: Vec<NaiveDate> = Vec::new();
  let mut kept: Vec<Vec<f64>> = Vec::new();
  let mut dropped = 0usize;

  for k in 1..t {
    let mut row = vec![0.0; n];
    let mut complete = true;
    for j in 0..n {
      let prev = resampled[[k - 1, j]];
      let curr = resampled[[k, j]];
      if prev.is_finite() && curr.is_finite() && prev > 0.0 {
        row[j] = curr / prev - 1.0;
      } else {
        complete = false;
        break;
      }
    }

    if complete {
      periods.push(dates[k]);
      kept.push(row);
    } else {
      dropped += 1;
    }
  }

  if dropped > 0 {
    debug!(dropped, "dropped incomplete return periods");
  }

  let available = kept.len();
  let required = n + 1;
  if available < required {
    return Err(PortfolioError::InsufficientData {
      required,
      available,
    });
  }

  let mut returns = Array2::zeros((available, n));
  for (i, row) in kept.iter().enumerate() {
    for j in 0..n {
      returns[[i, j]] = row[j];
    }
  }

  let mean = returns
    .mean_axis(Axis(0))
    .expect("return matrix has at least one row");
  let covariance = sample_covariance(&returns, &mean);

  Ok(ReturnEstimate {
    returns: ReturnMatrix { periods, returns },
    mean,
    covariance,
  })
}
