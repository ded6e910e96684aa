//! Linear algebra for the descent iterations.
//!
//! This module provides:
//! - Covariance whitening (`err_cov⁻¹ᐟ²` via Cholesky) for residual weighting
//! - The assembled weighted system (faer sparse Jacobian + dense residual)
//! - Sparse Cholesky and QR solvers for the Gauss-Newton and damped systems
//! - Block minimum-degree column reordering
//! - The direction solver tying the above together

pub mod cholesky;
pub mod direction;
pub mod ordering;
pub mod qr;
pub mod system;
pub mod weighting;

pub use cholesky::SparseCholeskySolver;
pub use direction::DirectionSolver;
pub use ordering::ColumnPermutation;
pub use qr::SparseQRSolver;
pub use system::{ColumnBlock, LinearSystem, LinearSystemBuilder};
pub use weighting::SquareRootInformation;

use faer::Mat;
use faer::sparse::SparseColMat;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::error;

/// Type alias for sparse matrices using faer
pub type SparseMatrix = SparseColMat<usize, f64>;

/// Linear algebra errors
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Covariance has non-finite entries, wrong shape or is not symmetric
    #[error("Invalid covariance: {0}")]
    InvalidCovariance(String),

    /// Covariance is not positive definite
    #[error("Covariance is not positive definite: {0}")]
    NonPositiveDefiniteCovariance(String),

    /// Sparse factorization failed (symbolic or numeric)
    #[error("Factorization failed: {0}")]
    FactorizationFailed(String),

    /// The system has no unique solution or produced non-finite values
    #[error("Singular linear system: {0}")]
    SingularSystem(String),

    /// Building a sparse matrix failed
    #[error("Sparse matrix creation failed: {0}")]
    SparseMatrixCreation(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the source error of a third-party library
    #[must_use]
    pub fn log_with_source<E: fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Factorization used to compute the search direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinearSolverType {
    /// Sparse QR on the (possibly augmented) Jacobian
    #[default]
    SparseQR,
    /// Sparse Cholesky on the normal equations
    SparseCholesky,
}

impl fmt::Display for LinearSolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::SparseQR => write!(f, "SparseQR"),
            LinearSolverType::SparseCholesky => write!(f, "SparseCholesky"),
        }
    }
}

impl FromStr for LinearSolverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qr" | "sparseqr" | "sparse_qr" => Ok(LinearSolverType::SparseQR),
            "cholesky" | "sparsecholesky" | "sparse_cholesky" => {
                Ok(LinearSolverType::SparseCholesky)
            }
            _ => Err(format!("unknown linear solver '{s}'")),
        }
    }
}

/// Sparse solver for the Gauss-Newton and Levenberg-Marquardt systems.
///
/// Both methods return the step `Δ`, already negated, i.e. the solution of
/// `(JᵀJ + D) Δ = −Jᵀr`.
pub trait SparseLinearSolver {
    /// Solve `JᵀJ Δ = −Jᵀr`.
    fn solve_normal_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
    ) -> LinAlgResult<Mat<f64>>;

    /// Solve `(JᵀJ + diag(damping)) Δ = −Jᵀr`; `damping` is an `n × 1` column
    /// of non-negative diagonal entries.
    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
        damping: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>>;
}

/// Create the linear solver for a solver type.
pub fn create_linear_solver(solver_type: LinearSolverType) -> Box<dyn SparseLinearSolver> {
    match solver_type {
        LinearSolverType::SparseCholesky => Box::new(SparseCholeskySolver::new()),
        LinearSolverType::SparseQR => Box::new(SparseQRSolver::new()),
    }
}

/// Check a column vector (solution or gradient) for NaN or infinite entries.
pub(crate) fn ensure_finite(solution: Mat<f64>, context: &str) -> LinAlgResult<Mat<f64>> {
    let finite = (0..solution.nrows()).all(|i| solution[(i, 0)].is_finite());
    if finite {
        Ok(solution)
    } else {
        Err(LinAlgError::SingularSystem(format!("{context} produced non-finite values")).log())
    }
}
