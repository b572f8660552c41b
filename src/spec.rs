//! # Portfolio Specification
//!
//! $$
//! \sum_i w_i = 1, \qquad l_i \le w_i \le u_i
//! $$
//!
//! Asset universe, constraint and objective data, plus lowering of the
//! abstract constraint list into the canonical linear system the solvers
//! consume.

use std::collections::HashSet;

use ndarray::Array1;
use ndarray::Array2;

use crate::error::PortfolioError;

const FEAS_TOL: f64 = 1e-12;

/// Ordered set of unique asset identifiers.
///
/// Order is significant: it fixes the index mapping used by every vector
/// and matrix in the crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetUniverse {
  ids: Vec<String>,
}

impl AssetUniverse {
  /// Validate and build a universe from ordered identifiers.
  pub fn new<S: Into<String>>(ids: Vec<S>) -> Result<Self, PortfolioError> {
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    if ids.len() < 2 {
      return Err(PortfolioError::invalid(
        "universe",
        "at least two assets required",
      ));
    }

    let mut seen = HashSet::new();
    for id in &ids {
      if !seen.insert(id.as_str()) {
        return Err(PortfolioError::invalid(
          "universe",
          format!("duplicate asset id '{id}'"),
        ));
      }
    }

    Ok(Self { ids })
  }

  /// Number of assets.
  pub fn len(&self) -> usize {
    self.ids.len()
  }

  /// Whether the universe is empty (never true for a validated universe).
  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  /// Asset identifiers in index order.
  pub fn ids(&self) -> &[String] {
    &self.ids
  }

  /// Index of an asset id, if present.
  pub fn index_of(&self, id: &str) -> Option<usize> {
    self.ids.iter().position(|x| x == id)
  }
}

/// Bound specification for a box constraint.
#[derive(Clone, Debug, PartialEq)]
pub enum Bounds {
  /// Same bound for every asset.
  Uniform(f64),
  /// One bound per asset, in universe order.
  PerAsset(Vec<f64>),
}

impl Bounds {
  fn resolve(&self, n: usize) -> Result<Vec<f64>, PortfolioError> {
    match self {
      Bounds::Uniform(v) => Ok(vec![*v; n]),
      Bounds::PerAsset(vs) => {
        if vs.len() != n {
          return Err(PortfolioError::invalid(
            "bounds",
            format!("{} entries for {} assets", vs.len(), n),
          ));
        }
        Ok(vs.clone())
      }
    }
  }
}

/// Linear constraint over portfolio weights. Pure data; owns no solver
/// state.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
  /// Weights sum to one.
  FullInvestment,
  /// Per-asset lower/upper weight bounds.
  Box { lower: Bounds, upper: Bounds },
}

/// Optimization objective. Exactly one per spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Objective {
  /// Minimize `w' Σ w`.
  MinimizeVariance,
  /// Maximize `mu' w`.
  MaximizeExpectedReturn,
}

/// Canonical lowered constraint form: equality block, inequality block and
/// per-asset bounds.
///
/// The two closed constraint kinds only ever populate the equality row and
/// the bound vectors; the inequality block is carried for canonical
/// completeness and stays empty.
#[derive(Clone, Debug)]
pub struct LinearSystem {
  pub a_eq: Array2<f64>,
  pub b_eq: Array1<f64>,
  pub a_ineq: Array2<f64>,
  pub b_ineq: Array1<f64>,
  pub lower: Array1<f64>,
  pub upper: Array1<f64>,
}

impl LinearSystem {
  /// Number of assets the system is expressed over.
  pub fn n_assets(&self) -> usize {
    self.lower.len()
  }

  /// Whether the full-investment equality row is present.
  pub fn has_full_investment(&self) -> bool {
    self.a_eq.nrows() > 0
  }
}

/// Lower an ordered constraint list into a [`LinearSystem`].
///
/// Repeated box constraints intersect: the tightest bound per asset wins.
/// Infeasibility that is provable from the bounds alone is rejected here,
/// before any solver runs.
pub fn lower_constraints(
  constraints: &[Constraint],
  n: usize,
) -> Result<LinearSystem, PortfolioError> {
  let mut lower = vec![f64::NEG_INFINITY; n];
  let mut upper = vec![f64::INFINITY; n];
  let mut full_investment = false;

  for constraint in constraints {
    match constraint {
      Constraint::FullInvestment => full_investment = true,
      Constraint::Box { lower: lo, upper: up } => {
        let lo = lo.resolve(n)?;
        let up = up.resolve(n)?;
        for i in 0..n {
          lower[i] = lower[i].max(lo[i]);
          upper[i] = upper[i].min(up[i]);
        }
      }
    }
  }

  for i in 0..n {
    if lower[i] > upper[i] {
      return Err(PortfolioError::InfeasibleConstraints(format!(
        "asset {i}: lower bound {} exceeds upper bound {}",
        lower[i], upper[i]
      )));
    }
  }

  if full_investment {
    let sum_lower: f64 = lower.iter().sum();
    if sum_lower > 1.0 + FEAS_TOL {
      return Err(PortfolioError::InfeasibleConstraints(format!(
        "lower bounds sum to {sum_lower}, full investment is unreachable"
      )));
    }
    let sum_upper: f64 = upper.iter().sum();
    if sum_upper < 1.0 - FEAS_TOL {
      return Err(PortfolioError::InfeasibleConstraints(format!(
        "upper bounds sum to {sum_upper}, full investment is unreachable"
      )));
    }
  }

  let (a_eq, b_eq) = if full_investment {
    (Array2::ones((1, n)), Array1::ones(1))
  } else {
    (Array2::zeros((0, n)), Array1::zeros(0))
  };

  Ok(LinearSystem {
    a_eq,
    b_eq,
    a_ineq: Array2::zeros((0, n)),
    b_ineq: Array1::zeros(0),
    lower: Array1::from_vec(lower),
    upper: Array1::from_vec(upper),
  })
}

/// Immutable description of one optimization problem.
///
/// Built incrementally through the consuming builder calls; once handed to
/// a solver it is only ever borrowed.
#[derive(Clone, Debug)]
pub struct PortfolioSpec {
  universe: AssetUniverse,
  constraints: Vec<Constraint>,
  objective: Objective,
}

impl PortfolioSpec {
  /// Start a spec over a universe, defaulting to minimum variance.
  pub fn new(universe: AssetUniverse) -> Self {
    Self {
      universe,
      constraints: Vec::new(),
      objective: Objective::MinimizeVariance,
    }
  }

  /// Append a constraint.
  ///
  /// Shape errors and a box whose own lower bound exceeds its upper bound
  /// are rejected immediately; cross-constraint infeasibility is detected
  /// at lowering time.
  pub fn with_constraint(mut self, constraint: Constraint) -> Result<Self, PortfolioError> {
    if let Constraint::Box { lower, upper } = &constraint {
      let n = self.universe.len();
      let lo = lower.resolve(n)?;
      let up = upper.resolve(n)?;
      for i in 0..n {
        if lo[i] > up[i] {
          return Err(PortfolioError::InfeasibleConstraints(format!(
            "asset {i}: lower bound {} exceeds upper bound {}",
            lo[i], up[i]
          )));
        }
      }
    }
    self.constraints.push(constraint);
    Ok(self)
  }

  /// Replace the objective.
  pub fn with_objective(mut self, objective: Objective) -> Self {
    self.objective = objective;
    self
  }

  /// Borrow the universe.
  pub fn universe(&self) -> &AssetUniverse {
    &self.universe
  }

  /// Constraints in insertion order.
  pub fn constraints(&self) -> &[Constraint] {
    &self.constraints
  }

  /// The configured objective.
  pub fn objective(&self) -> Objective {
    self.objective
  }

  /// Lower the constraint list into the canonical solver form.
  pub fn lower(&self) -> Result<LinearSystem, PortfolioError> {
    lower_constraints(&self.constraints, self.universe.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn universe(n: usize) -> AssetUniverse {
    AssetUniverse::new((0..n).map(|i| format!("A{i}")).collect()).unwrap()
  }

  #[test]
  fn universe_rejects_duplicates_and_singletons() {
    assert!(matches!(
      AssetUniverse::new(vec!["SPY", "SPY"]).unwrap_err(),
      PortfolioError::InvalidInput { .. }
    ));
    assert!(AssetUniverse::new(vec!["SPY"]).is_err());
    assert_eq!(universe(3).index_of("A1"), Some(1));
  }

  #[test]
  fn full_investment_lowers_to_ones_row() {
    let system = lower_constraints(&[Constraint::FullInvestment], 3).unwrap();
    assert!(system.has_full_investment());
    assert_eq!(system.a_eq.dim(), (1, 3));
    assert!(system.a_eq.iter().all(|&v| v == 1.0));
    assert_eq!(system.b_eq[0], 1.0);
    assert_eq!(system.a_ineq.nrows(), 0);
  }

  #[test]
  fn repeated_boxes_intersect_to_tightest_bounds() {
    let constraints = vec![
      Constraint::Box {
        lower: Bounds::Uniform(0.0),
        upper: Bounds::Uniform(1.0),
      },
      Constraint::Box {
        lower: Bounds::PerAsset(vec![0.1, 0.0]),
        upper: Bounds::PerAsset(vec![1.0, 0.4]),
      },
    ];
    let system = lower_constraints(&constraints, 2).unwrap();
    assert_eq!(system.lower.to_vec(), vec![0.1, 0.0]);
    assert_eq!(system.upper.to_vec(), vec![1.0, 0.4]);
  }

  #[test]
  fn crossing_bounds_are_infeasible() {
    let constraints = vec![
      Constraint::Box {
        lower: Bounds::Uniform(0.5),
        upper: Bounds::Uniform(1.0),
      },
      Constraint::Box {
        lower: Bounds::Uniform(0.0),
        upper: Bounds::Uniform(0.4),
      },
    ];
    assert!(matches!(
      lower_constraints(&constraints, 2).unwrap_err(),
      PortfolioError::InfeasibleConstraints(_)
    ));
  }

  #[test]
  fn lower_bounds_summing_past_one_are_infeasible() {
    // Three assets, each forced into [0.5, 0.6]: minimum investment is 1.5.
    let constraints = vec![
      Constraint::FullInvestment,
      Constraint::Box {
        lower: Bounds::Uniform(0.5),
        upper: Bounds::Uniform(0.6),
      },
    ];
    assert!(matches!(
      lower_constraints(&constraints, 3).unwrap_err(),
      PortfolioError::InfeasibleConstraints(_)
    ));
  }

  #[test]
  fn upper_bounds_summing_below_one_are_infeasible() {
    let constraints = vec![
      Constraint::FullInvestment,
      Constraint::Box {
        lower: Bounds::Uniform(0.0),
        upper: Bounds::Uniform(0.3),
      },
    ];
    assert!(matches!(
      lower_constraints(&constraints, 3).unwrap_err(),
      PortfolioError::InfeasibleConstraints(_)
    ));
  }

  #[test]
  fn builder_rejects_malformed_box_eagerly() {
    let spec = PortfolioSpec::new(universe(2));
    let err = spec
      .with_constraint(Constraint::Box {
        lower: Bounds::Uniform(0.8),
        upper: Bounds::Uniform(0.2),
      })
      .unwrap_err();
    assert!(matches!(err, PortfolioError::InfeasibleConstraints(_)));

    let err = PortfolioSpec::new(universe(2))
      .with_constraint(Constraint::Box {
        lower: Bounds::PerAsset(vec![0.0; 3]),
        upper: Bounds::Uniform(1.0),
      })
      .unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput { .. }));
  }

  #[test]
  fn spec_builder_accumulates_in_order() {
    let spec = PortfolioSpec::new(universe(2))
      .with_constraint(Constraint::FullInvestment)
      .unwrap()
      .with_constraint(Constraint::Box {
        lower: Bounds::Uniform(0.0),
        upper: Bounds::Uniform(1.0),
      })
      .unwrap()
      .with_objective(Objective::MaximizeExpectedReturn);

    assert_eq!(spec.constraints().len(), 2);
    assert_eq!(spec.objective(), Objective::MaximizeExpectedReturn);
    assert!(spec.lower().unwrap().has_full_investment());
  }
}
