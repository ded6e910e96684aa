//! Relative pose factor between two SE(2) variables.

use super::{Factor, Linearization};
use crate::manifold::{LieGroup, ManifoldResult, ManifoldType, SE2};
use nalgebra::{DMatrix, DVector, dvector};

/// Relative planar pose measurement between two SE(2) poses.
///
/// Connected as `[Tᵢ, Tⱼ]` with the measurement `[dx, dy, dθ]` describing the
/// expected `Z = Tᵢ⁻¹ ∘ Tⱼ`. With the prediction `P = Tᵢ⁻¹ ∘ Tⱼ` and the error
/// pose `E = P⁻¹ ∘ Z`:
///
/// ```text
/// r      = Log(E) = Z ⊖ P
/// ∂r/∂Tᵢ =  Jr⁻¹(r) · Ad(Z⁻¹)
/// ∂r/∂Tⱼ = −Jr⁻¹(r) · Ad(E⁻¹)
/// ```
///
/// Both Jacobians are taken with respect to right perturbations, matching
/// [`SE2`]'s `oplus`.
#[derive(Debug, Clone, Default)]
pub struct BetweenFactorSE2;

impl BetweenFactorSE2 {
    pub fn new() -> Self {
        Self
    }

    /// Measurement vector `[dx, dy, dθ]` for a relative pose.
    pub fn measurement(dx: f64, dy: f64, dtheta: f64) -> DVector<f64> {
        dvector![dx, dy, dtheta]
    }
}

impl Factor for BetweenFactorSE2 {
    fn factor_type(&self) -> &'static str {
        "BetweenFactorSE2"
    }

    fn dimension(&self) -> usize {
        3
    }

    fn variable_manifolds(&self) -> Vec<ManifoldType> {
        vec![ManifoldType::SE2; 2]
    }

    fn linearize(
        &self,
        measurement: &DVector<f64>,
        values: &[&DVector<f64>],
        compute_jacobian: bool,
    ) -> ManifoldResult<Linearization> {
        let pose_i = SE2::from_vector(values[0])?;
        let pose_j = SE2::from_vector(values[1])?;
        let relative = SE2::from_xy_angle(measurement[0], measurement[1], measurement[2]);

        let predicted = pose_i.inverse().compose(&pose_j);
        let error_pose = predicted.inverse().compose(&relative);
        let tangent = error_pose.log();
        let residual = dvector![tangent.x, tangent.y, tangent.z];

        let jacobian = compute_jacobian.then(|| {
            let jr_inv = SE2::right_jacobian_inv(&tangent);
            let jacobian_i = jr_inv * relative.inverse().adjoint();
            let jacobian_j = -(jr_inv * error_pose.inverse().adjoint());

            let mut jacobian = DMatrix::zeros(3, 6);
            jacobian.view_mut((0, 0), (3, 3)).copy_from(&jacobian_i);
            jacobian.view_mut((0, 3), (3, 3)).copy_from(&jacobian_j);
            jacobian
        });

        Ok((residual, jacobian))
    }
}
