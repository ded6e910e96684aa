//! Optimizer configuration.

use super::{OptimizationScheme, OptimizerError, OptimizerResult, parse_linear_solver};
use crate::linalg::LinearSolverType;
use std::fmt;
use std::time::Duration;

/// Immutable settings of an optimization run.
///
/// Built with the `with_*` methods and checked by [`OptimizerConfig::validate`]
/// when the optimizer is created.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub optimization_scheme: OptimizationScheme,
    pub linear_solver_type: LinearSolverType,
    /// Apply the minimum-degree column ordering before factorization
    pub use_reordering: bool,
    pub max_iterations: usize,
    /// Relative cost decrease below which an accepted step counts as converged
    pub cost_tolerance: f64,
    /// `‖Jᵀr‖∞` threshold
    pub gradient_tolerance: f64,
    /// Step norm threshold relative to the norm of the values
    pub parameter_tolerance: f64,
    pub timeout: Option<Duration>,

    /// Backtracking line search for Gauss-Newton
    pub line_search: bool,
    pub line_search_shrink: f64,
    pub min_step_length: f64,

    /// Initial Levenberg-Marquardt damping `λ`
    pub damping: f64,
    pub damping_min: f64,
    pub damping_max: f64,
    /// Gain ratio above which a damped step is accepted
    pub min_relative_decrease: f64,
    /// Clamp range of the scaling diagonal `D = diag(JᵀJ)`
    pub min_diagonal: f64,
    pub max_diagonal: f64,
    /// Solve attempts with increased damping after a linear algebra failure
    pub max_damping_retries: usize,

    pub verbose: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            optimization_scheme: OptimizationScheme::GaussNewton,
            linear_solver_type: LinearSolverType::SparseQR,
            use_reordering: true,
            max_iterations: 50,
            cost_tolerance: 1e-6,
            gradient_tolerance: 1e-10,
            parameter_tolerance: 1e-8,
            timeout: None,
            line_search: false,
            line_search_shrink: 0.5,
            min_step_length: 1e-8,
            damping: 1e-4,
            damping_min: 1e-12,
            damping_max: 1e12,
            min_relative_decrease: 1e-3,
            min_diagonal: 1e-6,
            max_diagonal: 1e32,
            max_damping_retries: 10,
            verbose: false,
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with the scheme and linear solver chosen by name,
    /// e.g. `("lm", "cholesky")`.
    pub fn from_names(scheme: &str, linear_solver: &str) -> OptimizerResult<Self> {
        Ok(Self::default()
            .with_optimization_scheme(scheme.parse::<OptimizationScheme>()?)
            .with_linear_solver_type(parse_linear_solver(linear_solver)?))
    }

    pub fn with_optimization_scheme(mut self, scheme: OptimizationScheme) -> Self {
        self.optimization_scheme = scheme;
        self
    }

    pub fn with_linear_solver_type(mut self, linear_solver_type: LinearSolverType) -> Self {
        self.linear_solver_type = linear_solver_type;
        self
    }

    pub fn with_reordering(mut self, use_reordering: bool) -> Self {
        self.use_reordering = use_reordering;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    pub fn with_gradient_tolerance(mut self, gradient_tolerance: f64) -> Self {
        self.gradient_tolerance = gradient_tolerance;
        self
    }

    pub fn with_parameter_tolerance(mut self, parameter_tolerance: f64) -> Self {
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable backtracking with the given shrink factor and minimum step length.
    pub fn with_line_search(mut self, shrink: f64, min_step_length: f64) -> Self {
        self.line_search = true;
        self.line_search_shrink = shrink;
        self.min_step_length = min_step_length;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_damping_bounds(mut self, min: f64, max: f64) -> Self {
        self.damping_min = min;
        self.damping_max = max;
        self
    }

    pub fn with_min_relative_decrease(mut self, min_relative_decrease: f64) -> Self {
        self.min_relative_decrease = min_relative_decrease;
        self
    }

    pub fn with_diagonal_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_diagonal = min;
        self.max_diagonal = max;
        self
    }

    pub fn with_max_damping_retries(mut self, retries: usize) -> Self {
        self.max_damping_retries = retries;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reject out-of-range values before any iteration runs.
    pub fn validate(&self) -> OptimizerResult<()> {
        let invalid = |msg: String| Err(OptimizerError::InvalidConfiguration(msg).log());

        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".into());
        }
        for (name, value) in [
            ("cost_tolerance", self.cost_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
            ("parameter_tolerance", self.parameter_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("{name} must be finite and non-negative, got {value}"));
            }
        }
        if !(self.line_search_shrink > 0.0 && self.line_search_shrink < 1.0) {
            return invalid(format!(
                "line_search_shrink must lie in (0, 1), got {}",
                self.line_search_shrink
            ));
        }
        if !(self.min_step_length > 0.0 && self.min_step_length <= 1.0) {
            return invalid(format!(
                "min_step_length must lie in (0, 1], got {}",
                self.min_step_length
            ));
        }
        if !(self.damping_min > 0.0 && self.damping_min <= self.damping_max) {
            return invalid(format!(
                "damping bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.damping_min, self.damping_max
            ));
        }
        if !(self.damping >= self.damping_min && self.damping <= self.damping_max) {
            return invalid(format!(
                "damping {} outside [{}, {}]",
                self.damping, self.damping_min, self.damping_max
            ));
        }
        if !(self.min_diagonal > 0.0 && self.min_diagonal <= self.max_diagonal) {
            return invalid(format!(
                "diagonal bounds must satisfy 0 < min <= max, got [{}, {}]",
                self.min_diagonal, self.max_diagonal
            ));
        }
        if !(0.0..1.0).contains(&self.min_relative_decrease) {
            return invalid(format!(
                "min_relative_decrease must lie in [0, 1), got {}",
                self.min_relative_decrease
            ));
        }
        Ok(())
    }
}

impl fmt::Display for OptimizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimizer Configuration:")?;
        writeln!(f, "  Scheme:              {}", self.optimization_scheme)?;
        writeln!(f, "  Linear solver:       {}", self.linear_solver_type)?;
        writeln!(f, "  Reordering:          {}", self.use_reordering)?;
        writeln!(f, "  Max iterations:      {}", self.max_iterations)?;
        writeln!(f, "  Cost tolerance:      {:.2e}", self.cost_tolerance)?;
        writeln!(f, "  Gradient tolerance:  {:.2e}", self.gradient_tolerance)?;
        writeln!(f, "  Parameter tolerance: {:.2e}", self.parameter_tolerance)?;
        if let Some(timeout) = self.timeout {
            writeln!(f, "  Timeout:             {timeout:?}")?;
        }
        match self.optimization_scheme {
            OptimizationScheme::GaussNewton => write!(
                f,
                "  Line search:         {} (shrink {}, min step {:.1e})",
                self.line_search, self.line_search_shrink, self.min_step_length
            ),
            OptimizationScheme::LevenbergMarquardt => write!(
                f,
                "  Damping:             {:.1e} in [{:.1e}, {:.1e}]",
                self.damping, self.damping_min, self.damping_max
            ),
        }
    }
}
