//! Core factor graph components
//!
//! This module contains the data model the optimizer works on:
//! - Variable nodes (named values living on a manifold)
//! - Factor nodes (measurement, covariance and a residual model)
//! - The factor graph container
//! - The readiness check run before optimization
//! - The linearizer assembling weighted residuals and Jacobians

pub mod factor_node;
pub mod graph;
pub mod linearizer;
pub mod readiness;
pub mod variable;

pub use factor_node::FactorNode;
pub use graph::{FactorGraph, FactorGraphStatistics};
pub use linearizer::{Linearizer, VariableOrdering};
pub use readiness::{ReadinessReport, check_ready};
pub use variable::VariableNode;

use thiserror::Error;
use tracing::error;

/// Core module error types for graph construction and lookup
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A variable with the same name already exists
    #[error("Duplicate variable name: {0}")]
    DuplicateVariable(String),

    /// A factor with the same name already exists
    #[error("Duplicate factor name: {0}")]
    DuplicateFactor(String),

    /// A factor references a variable that is not in the graph
    #[error("Factor '{factor}' references unknown variable '{variable}'")]
    DanglingReference { factor: String, variable: String },

    /// Lookup of a variable by name failed
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Lookup of a factor by name failed
    #[error("Unknown factor: {0}")]
    UnknownFactor(String),

    /// Dimension mismatch between values, measurements, residuals or Jacobians
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid factor specification (empty or repeated connections)
    #[error("Invalid factor: {0}")]
    InvalidFactor(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// graph.variable(name)
    ///     .ok_or_else(|| CoreError::UnknownVariable(name.to_string()).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
