//! # graphopt
//!
//! Nonlinear least squares over factor graphs.
//!
//! A [`FactorGraph`] holds named variables living on manifolds (`Rⁿ`, SO(2),
//! SE(2), SO(3), SE(3)) and named factors relating them through a
//! measurement, an error covariance and a residual model. The [`Optimizer`]
//! minimizes `½ Σ rᵢᵀ Σᵢ⁻¹ rᵢ` with Gauss-Newton or Levenberg-Marquardt,
//! solving each linearized system with sparse QR or sparse Cholesky.
//!
//! ```no_run
//! use graphopt::{
//!     BetweenFactor, FactorGraph, FactorNode, ManifoldType, Optimizer, OptimizerConfig,
//!     VariableNode,
//! };
//! use nalgebra::dvector;
//!
//! # fn main() -> Result<(), graphopt::GraphOptError> {
//! let mut graph = FactorGraph::new();
//! graph.add_variable(
//!     VariableNode::new("a", ManifoldType::Rn(2), dvector![0.0, 0.0])?.with_fixed(true),
//! )?;
//! graph.add_variable(VariableNode::new("b", ManifoldType::Rn(2), dvector![2.0, 2.0])?)?;
//! graph.add_factor(FactorNode::with_unit_covariance(
//!     "ab",
//!     &["a", "b"],
//!     dvector![1.0, 1.0],
//!     Box::new(BetweenFactor::new(2)),
//! )?)?;
//!
//! let summary = Optimizer::new(&mut graph, OptimizerConfig::default())?.optimize()?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
pub mod logger;
pub mod manifold;
pub mod optimizer;

pub use core::{
    FactorGraph, FactorGraphStatistics, FactorNode, Linearizer, ReadinessReport, VariableNode,
    VariableOrdering, check_ready,
};
pub use error::{GraphOptError, GraphOptResult};
pub use factors::{BetweenFactor, BetweenFactorSE2, Factor, PriorFactor, RangeFactor};
pub use linalg::LinearSolverType;
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{LieGroup, Manifold, ManifoldType};
pub use optimizer::{
    CancellationToken, ConvergenceReason, OptimizationScheme, OptimizationStatus,
    OptimizationSummary, Optimizer, OptimizerConfig,
};
