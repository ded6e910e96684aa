//! SE(3) - rigid body transformations in 3D space.
//!
//! Elements combine an [`SO3`] rotation with a 3D translation. The flat
//! representation is `[x, y, z, qx, qy, qz, qw]`; tangents are `[ρ, θ]` with
//! the translational part first.

use super::{LieGroup, ManifoldResult, SMALL_ANGLE, SO3, check_shape, check_unit};
use nalgebra::{DVector, Matrix3, Vector3, dvector};
use std::fmt;

/// SE(3) group element representing rigid body transformations in 3D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SE3 {
    translation: Vector3<f64>,
    rotation: SO3,
}

impl fmt::Display for SE3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        write!(
            f,
            "SE3(translation: [{:.4}, {:.4}, {:.4}], rotation: {})",
            t.x, t.y, t.z, self.rotation
        )
    }
}

/// `V(θ)`, mapping the translational tangent to the translation of `Exp`.
fn left_jacobian_so3(theta: &Vector3<f64>) -> Matrix3<f64> {
    let angle = theta.norm();
    let k = theta.cross_matrix();
    let k2 = k * k;
    if angle > SMALL_ANGLE {
        let angle_sq = angle * angle;
        Matrix3::identity()
            + k * ((1.0 - angle.cos()) / angle_sq)
            + k2 * ((angle - angle.sin()) / (angle_sq * angle))
    } else {
        Matrix3::identity() + k * 0.5 + k2 / 6.0
    }
}

/// `V(θ)⁻¹`.
fn left_jacobian_so3_inv(theta: &Vector3<f64>) -> Matrix3<f64> {
    let angle = theta.norm();
    let k = theta.cross_matrix();
    let k2 = k * k;
    if angle > SMALL_ANGLE {
        let coefficient =
            (1.0 - angle * angle.sin() / (2.0 * (1.0 - angle.cos()))) / (angle * angle);
        Matrix3::identity() - k * 0.5 + k2 * coefficient
    } else {
        Matrix3::identity() - k * 0.5 + k2 / 12.0
    }
}

impl SE3 {
    pub fn new(translation: Vector3<f64>, rotation: SO3) -> Self {
        SE3 {
            translation,
            rotation,
        }
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn rotation(&self) -> SO3 {
        self.rotation
    }

    pub fn compose(&self, other: &SE3) -> SE3 {
        SE3::new(
            self.translation + self.rotation.act(&other.translation),
            self.rotation.compose(&other.rotation),
        )
    }

    pub fn inverse(&self) -> SE3 {
        let rotation = self.rotation.inverse();
        SE3::new(-rotation.act(&self.translation), rotation)
    }

    /// Exponential map of `[ρ, θ]`.
    pub fn exp(rho: &Vector3<f64>, theta: &Vector3<f64>) -> SE3 {
        SE3::new(left_jacobian_so3(theta) * rho, SO3::exp(theta))
    }

    /// Logarithmic map, returning `(ρ, θ)`.
    pub fn log(&self) -> (Vector3<f64>, Vector3<f64>) {
        let theta = self.rotation.log();
        (left_jacobian_so3_inv(&theta) * self.translation, theta)
    }
}

impl LieGroup for SE3 {
    const NAME: &'static str = "SE3";
    const REP_SIZE: usize = 7;
    const DOF: usize = 6;

    fn identity() -> Self {
        SE3::new(Vector3::zeros(), SO3::identity())
    }

    fn from_vector(value: &DVector<f64>) -> ManifoldResult<Self> {
        check_shape(Self::NAME, value, Self::REP_SIZE)?;
        check_unit(Self::NAME, Self::rotation_norm(value))?;
        Ok(SE3::new(
            Vector3::new(value[0], value[1], value[2]),
            SO3::from_quaternion_coeffs(value[3], value[4], value[5], value[6]),
        ))
    }

    fn to_vector(&self) -> DVector<f64> {
        let t = self.translation;
        let q = self.rotation.to_vector();
        dvector![t.x, t.y, t.z, q[0], q[1], q[2], q[3]]
    }

    fn plus(&self, tangent: &DVector<f64>) -> Self {
        let rho = Vector3::new(tangent[0], tangent[1], tangent[2]);
        let theta = Vector3::new(tangent[3], tangent[4], tangent[5]);
        self.compose(&SE3::exp(&rho, &theta))
    }

    fn minus(&self, other: &Self) -> DVector<f64> {
        let (rho, theta) = other.inverse().compose(self).log();
        dvector![rho.x, rho.y, rho.z, theta.x, theta.y, theta.z]
    }

    fn rotation_norm(value: &DVector<f64>) -> f64 {
        value.rows(3, 4).norm()
    }
}
