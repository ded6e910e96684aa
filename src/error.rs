//! Error types for the graphopt library
//!
//! Each module defines its own `thiserror` enum (`CoreError`, `ManifoldError`,
//! `LinAlgError`, `OptimizerError`). They all convert into [`GraphOptError`],
//! which is what the public entry points return.

use crate::core::CoreError;
use crate::core::readiness::ReadinessReport;
use crate::linalg::LinAlgError;
use crate::manifold::ManifoldError;
use crate::optimizer::OptimizerError;
use thiserror::Error;

/// Main result type used throughout the graphopt library
pub type GraphOptResult<T> = Result<T, GraphOptError>;

/// Main error type for the graphopt library
#[derive(Debug, Clone, Error)]
pub enum GraphOptError {
    /// Graph construction and lookup errors
    #[error("Graph error: {0}")]
    Core(#[from] CoreError),

    /// Manifold operations errors (invalid values or increments)
    #[error("Manifold error: {0}")]
    Manifold(#[from] ManifoldError),

    /// Linear algebra related errors (covariance weighting, factorization)
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(#[from] LinAlgError),

    /// Configuration and iteration errors
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// The graph failed the readiness check
    #[error("Graph is not ready for optimization: {0}")]
    NotReady(ReadinessReport),
}

impl GraphOptError {
    /// Numerical failures end a run but may be recoverable with more damping.
    pub fn is_numerical(&self) -> bool {
        matches!(self, GraphOptError::LinearAlgebra(_))
    }
}
