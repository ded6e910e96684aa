//! Residual weighting by the inverse square root of the error covariance.
//!
//! With the Cholesky factorization `Σ = L Lᵀ`, the weight `W = L⁻¹` satisfies
//! `WᵀW = Σ⁻¹`, so `½‖W r‖² = ½ rᵀ Σ⁻¹ r`. Residuals and Jacobians are
//! whitened by forward substitution rather than forming `W` explicitly.

use super::{LinAlgError, LinAlgResult};
use nalgebra::{Cholesky, DMatrix, DVector};

/// Relative tolerance on `|Σ − Σᵀ|`.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Lower Cholesky factor of an error covariance.
#[derive(Debug, Clone)]
pub struct SquareRootInformation {
    lower: DMatrix<f64>,
}

impl SquareRootInformation {
    /// Factor a covariance. Fails on non-finite, non-square, asymmetric or
    /// non-positive-definite input.
    pub fn from_covariance(covariance: &DMatrix<f64>) -> LinAlgResult<Self> {
        if !covariance.is_square() {
            return Err(LinAlgError::InvalidCovariance(format!(
                "covariance must be square, got {:?}",
                covariance.shape()
            ))
            .log());
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(
                LinAlgError::InvalidCovariance("covariance has non-finite entries".into()).log(),
            );
        }
        let asymmetry = (covariance - covariance.transpose()).amax();
        if asymmetry > SYMMETRY_TOLERANCE * covariance.amax().max(1.0) {
            return Err(LinAlgError::InvalidCovariance(format!(
                "covariance is not symmetric (max deviation {asymmetry:.3e})"
            ))
            .log());
        }

        let cholesky = Cholesky::new(covariance.clone()).ok_or_else(|| {
            LinAlgError::NonPositiveDefiniteCovariance(format!(
                "Cholesky factorization of {}x{} covariance failed",
                covariance.nrows(),
                covariance.ncols()
            ))
            .log()
        })?;

        Ok(Self {
            lower: cholesky.l(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.lower.nrows()
    }

    /// `W r = L⁻¹ r`.
    pub fn whiten_vector(&self, residual: &DVector<f64>) -> LinAlgResult<DVector<f64>> {
        self.lower.solve_lower_triangular(residual).ok_or_else(|| {
            LinAlgError::NonPositiveDefiniteCovariance("zero pivot while whitening".into()).log()
        })
    }

    /// `W J = L⁻¹ J`.
    pub fn whiten_matrix(&self, jacobian: &DMatrix<f64>) -> LinAlgResult<DMatrix<f64>> {
        self.lower.solve_lower_triangular(jacobian).ok_or_else(|| {
            LinAlgError::NonPositiveDefiniteCovariance("zero pivot while whitening".into()).log()
        })
    }
}
