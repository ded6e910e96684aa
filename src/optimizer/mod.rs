//! Iterative minimization of a factor graph's weighted squared error.
//!
//! This module provides:
//! - Gauss-Newton and Levenberg-Marquardt step control
//! - The graph updater applying increments through each variable's manifold
//! - The descent driver and the top-level optimize loop
//! - Per-iteration statistics, observers and the final summary

pub mod config;
pub mod descent;
pub mod gauss_newton;
pub mod levenberg_marquardt;
pub mod observer;
pub mod step_length;
pub mod updater;

pub use config::OptimizerConfig;
pub use descent::{DescentStep, Optimizer};
pub use gauss_newton::GaussNewtonStep;
pub use levenberg_marquardt::{DampingState, LevenbergMarquardtStep};
pub use observer::{OptObserver, OptObserverVec};
pub use step_length::{StepContext, StepDecision, StepLengthController};
pub use updater::GraphUpdater;

use crate::linalg::LinearSolverType;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Optimizer specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// A configuration value is out of range or a name is unknown
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The optimizer was used outside its state machine
    #[error("Invalid optimizer state: {0}")]
    InvalidState(String),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Type of optimization scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptimizationScheme {
    #[default]
    GaussNewton,
    LevenbergMarquardt,
}

impl fmt::Display for OptimizationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationScheme::GaussNewton => write!(f, "Gauss-Newton"),
            OptimizationScheme::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
        }
    }
}

impl FromStr for OptimizationScheme {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gn" | "gaussnewton" | "gauss-newton" | "gauss_newton" => {
                Ok(OptimizationScheme::GaussNewton)
            }
            "lm" | "levenbergmarquardt" | "levenberg-marquardt" | "levenberg_marquardt" => {
                Ok(OptimizationScheme::LevenbergMarquardt)
            }
            _ => Err(OptimizerError::InvalidConfiguration(format!(
                "unknown optimization scheme '{s}'"
            ))),
        }
    }
}

/// Parse a linear solver name, reporting unknown names as configuration errors.
pub fn parse_linear_solver(name: &str) -> OptimizerResult<LinearSolverType> {
    name.parse::<LinearSolverType>()
        .map_err(OptimizerError::InvalidConfiguration)
}

/// Why a run stopped with [`OptimizationStatus::Converged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceReason {
    /// Relative cost decrease of an accepted step below `cost_tolerance`
    CostTolerance,
    /// `‖Jᵀr‖∞` below `gradient_tolerance`
    GradientTolerance,
    /// Step norm below `parameter_tolerance` relative to the values
    ParameterTolerance,
    /// Line search could not find a decreasing step
    NoDecreasingStep,
    /// Nothing to optimize (no free variables)
    NoFreeVariables,
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceReason::CostTolerance => write!(f, "cost tolerance reached"),
            ConvergenceReason::GradientTolerance => write!(f, "gradient tolerance reached"),
            ConvergenceReason::ParameterTolerance => write!(f, "parameter tolerance reached"),
            ConvergenceReason::NoDecreasingStep => write!(f, "no decreasing step found"),
            ConvergenceReason::NoFreeVariables => write!(f, "no free variables"),
        }
    }
}

/// Terminal status of an optimization run
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationStatus {
    Converged,
    MaxIterationsReached,
    /// Fatal numerical or manifold error
    Failed(String),
    /// Cancellation requested through a [`CancellationToken`]
    Cancelled,
    Timeout,
}

impl OptimizationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OptimizationStatus::Converged)
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::Failed(msg) => write!(f, "Failed: {msg}"),
            OptimizationStatus::Cancelled => write!(f, "Cancelled"),
            OptimizationStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

/// Lifecycle of an [`Optimizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerState {
    Ready,
    Iterating,
    Terminated(OptimizationStatus),
}

/// Shared flag to stop a running optimization at the next iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Statistics of a single descent iteration
#[derive(Debug, Clone, PartialEq)]
pub struct IterationStats {
    /// 1-based iteration number
    pub iteration: usize,
    /// Cost before the step
    pub cost: f64,
    /// Cost after the step (equal to `cost` when rejected)
    pub new_cost: f64,
    /// `‖Jᵀr‖∞` at the linearization point
    pub gradient_norm: f64,
    /// `‖step_length · Δ‖₂`
    pub step_norm: f64,
    pub step_length: f64,
    /// Damping used for the step (Levenberg-Marquardt only)
    pub damping: Option<f64>,
    /// `rᵀ J Δ`
    pub directional_derivative: f64,
    pub accepted: bool,
    pub elapsed: Duration,
}

impl IterationStats {
    pub fn cost_change(&self) -> f64 {
        self.cost - self.new_cost
    }

    /// Log the column header of the iteration table.
    pub fn print_header() {
        debug!(
            "{:>5} {:>14} {:>12} {:>12} {:>12} {:>9} {:>10} {:>6} {:>10}",
            "iter", "cost", "cost_change", "|gradient|", "|step|", "alpha", "damping", "acc", "time_ms"
        );
    }

    /// Log this iteration as one table row.
    pub fn print_line(&self) {
        let damping = self
            .damping
            .map(|d| format!("{d:>10.2e}"))
            .unwrap_or_else(|| format!("{:>10}", "-"));
        debug!(
            "{:>5} {:>14.6e} {:>12.4e} {:>12.4e} {:>12.4e} {:>9.3e} {} {:>6} {:>10.2}",
            self.iteration,
            self.new_cost,
            self.cost_change(),
            self.gradient_norm,
            self.step_norm,
            self.step_length,
            damping,
            if self.accepted { "yes" } else { "no" },
            self.elapsed.as_secs_f64() * 1000.0
        );
    }
}

/// Result of [`Optimizer::optimize`].
#[derive(Debug, Clone)]
pub struct OptimizationSummary {
    pub scheme: OptimizationScheme,
    pub linear_solver: LinearSolverType,
    pub status: OptimizationStatus,
    pub convergence_reason: Option<ConvergenceReason>,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: usize,
    pub successful_steps: usize,
    pub unsuccessful_steps: usize,
    /// Directions with non-negative directional derivative
    pub non_descent_directions: usize,
    pub final_gradient_norm: f64,
    pub final_step_norm: f64,
    pub final_damping: Option<f64>,
    /// Cost after each iteration, starting with the initial cost
    pub cost_history: Vec<f64>,
    pub total_time: Duration,
}

impl OptimizationSummary {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Display for OptimizationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} Optimization Summary ===", self.scheme)?;
        writeln!(f, "Linear solver:             {}", self.linear_solver)?;
        match self.convergence_reason {
            Some(reason) => writeln!(f, "Status:                    {} ({reason})", self.status)?,
            None => writeln!(f, "Status:                    {}", self.status)?,
        }
        writeln!(f, "Initial cost:              {:.6e}", self.initial_cost)?;
        writeln!(f, "Final cost:                {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "Cost reduction:            {:.6e} ({:.2}%)",
            self.initial_cost - self.final_cost,
            100.0 * (self.initial_cost - self.final_cost) / self.initial_cost.max(1e-12)
        )?;
        writeln!(f, "Total iterations:          {}", self.iterations)?;
        writeln!(
            f,
            "Successful steps:          {} ({:.1}%)",
            self.successful_steps,
            100.0 * self.successful_steps as f64 / self.iterations.max(1) as f64
        )?;
        writeln!(f, "Unsuccessful steps:        {}", self.unsuccessful_steps)?;
        writeln!(f, "Non-descent directions:    {}", self.non_descent_directions)?;
        if let Some(damping) = self.final_damping {
            writeln!(f, "Final damping parameter:   {damping:.6e}")?;
        }
        writeln!(f, "Final gradient norm:       {:.6e}", self.final_gradient_norm)?;
        writeln!(f, "Final step norm:           {:.6e}", self.final_step_norm)?;
        writeln!(f, "Total time:                {:?}", self.total_time)?;
        Ok(())
    }
}
