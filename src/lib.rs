//! # Frontier
//!
//! `frontier-rs` computes asset-allocation weights over a fixed universe
//! that satisfy linear constraints while optimizing a risk or return
//! objective, then evaluates the realized performance of that allocation
//! under a periodic-rebalancing policy.
//!
//! ## Modules
//!
//! | Module        | Description                                                              |
//! |---------------|--------------------------------------------------------------------------|
//! | [`estimator`] | Price resampling, simple-return construction and sample moments.         |
//! | [`spec`]      | Asset universe, constraint/objective data and constraint lowering.       |
//! | [`solver`]    | Active-set minimum-variance QP and bounded-variable maximum-return LP.   |
//! | [`rebalance`] | Drift/reset simulation of target weights over a return matrix.           |
//! | [`summary`]   | Mean, volatility, annualized Sharpe, cumulative return and drawdown.     |
//! | [`error`]     | Typed failure kinds shared by every layer.                               |
//!
//! ## Workflow
//!
//! Prices flow through [`estimate_returns`] into a [`ReturnEstimate`]; a
//! [`PortfolioSpec`] carries constraints and an objective into [`solve`];
//! the optimal weights feed [`simulate`] under a [`RebalancingPolicy`]; the
//! realized series ends in [`summarize`].
//!
//! ## Example
//!
//! ```rust
//! use frontier_rs::{AssetUniverse, Bounds, Constraint, Objective, PortfolioSpec};
//!
//! let universe = AssetUniverse::new(vec!["SPY", "TLT", "GLD"])?;
//! let spec = PortfolioSpec::new(universe)
//!   .with_constraint(Constraint::FullInvestment)?
//!   .with_constraint(Constraint::Box {
//!     lower: Bounds::Uniform(0.0),
//!     upper: Bounds::Uniform(0.6),
//!   })?
//!   .with_objective(Objective::MinimizeVariance);
//! # Ok::<(), frontier_rs::PortfolioError>(())
//! ```

pub mod error;
pub mod estimator;
pub mod rebalance;
pub mod solver;
pub mod spec;
pub mod summary;

pub use error::PortfolioError;
pub use estimator::estimate_returns;
pub use estimator::PriceSeries;
pub use estimator::ResampleCadence;
pub use estimator::ReturnEstimate;
pub use estimator::ReturnMatrix;
pub use rebalance::simulate;
pub use rebalance::Compounding;
pub use rebalance::PeriodReturn;
pub use rebalance::PortfolioReturnSeries;
pub use rebalance::RebalanceCadence;
pub use rebalance::RebalancingPolicy;
pub use solver::solve;
pub use solver::solve_batch;
pub use solver::ConvergenceStatus;
pub use solver::OptimizationResult;
pub use solver::SolverDiagnostics;
pub use solver::SolverOptions;
pub use spec::AssetUniverse;
pub use spec::Bounds;
pub use spec::Constraint;
pub use spec::LinearSystem;
pub use spec::Objective;
pub use spec::PortfolioSpec;
pub use summary::cumulative_return;
pub use summary::max_drawdown;
pub use summary::summarize;
pub use summary::summarize_assets;
pub use summary::PerformanceSummary;
