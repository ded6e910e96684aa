//! Residual models attached to factor nodes.
//!
//! A [`Factor`] maps a measurement and the current values of its connected
//! variables to a raw residual `r = measurement ⊖ predicted` and, on demand,
//! the Jacobian `∂r/∂δ` with respect to right perturbations of each variable.
//! The Jacobian is returned stacked horizontally: one column block of width
//! `dof` per connected variable, in connection order.
//!
//! Covariance weighting is not the factor's concern; the linearizer applies
//! the factor node's `err_cov` on top of what the model returns.
//!
//! Shipped models:
//! - [`PriorFactor`]: Euclidean prior, `r = z − x`
//! - [`BetweenFactor`]: Euclidean difference, `r = z − (xⱼ − xᵢ)`
//! - [`RangeFactor`]: Euclidean distance, `r = z − ‖xⱼ − xᵢ‖`
//! - [`BetweenFactorSE2`]: relative planar pose, `r = Log((Tᵢ⁻¹Tⱼ)⁻¹ Z)`

use crate::manifold::{ManifoldResult, ManifoldType};
use nalgebra::{DMatrix, DVector};
use std::fmt;

pub mod between_factor;
pub mod prior_factor;
pub mod range_factor;
pub mod se2_factor;

pub use between_factor::BetweenFactor;
pub use prior_factor::PriorFactor;
pub use range_factor::RangeFactor;
pub use se2_factor::BetweenFactorSE2;

/// Raw residual and optional stacked Jacobian.
pub type Linearization = (DVector<f64>, Option<DMatrix<f64>>);

/// Residual model of a factor node.
pub trait Factor: fmt::Debug + Send + Sync {
    /// Short identifier used in logs and statistics.
    fn factor_type(&self) -> &'static str;

    /// Error dimension: length of the residual and of the measurement.
    fn dimension(&self) -> usize;

    /// Manifold each connected variable must live on, in connection order.
    fn variable_manifolds(&self) -> Vec<ManifoldType>;

    /// Evaluate the residual, and the Jacobian when `compute_jacobian` is set.
    ///
    /// `values` holds one value per connected variable, in connection order.
    fn linearize(
        &self,
        measurement: &DVector<f64>,
        values: &[&DVector<f64>],
        compute_jacobian: bool,
    ) -> ManifoldResult<Linearization>;
}
