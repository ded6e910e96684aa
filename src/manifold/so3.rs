//! SO(3) - rotations in 3D space.
//!
//! Elements are stored as nalgebra's `UnitQuaternion`. The flat representation
//! is `[qx, qy, qz, qw]`; tangents are axis-angle vectors `[θx, θy, θz]`.

use super::{LieGroup, ManifoldResult, check_shape, check_unit};
use nalgebra::{DVector, Matrix3, Quaternion, UnitQuaternion, Vector3, dvector};
use std::fmt;

/// SO(3) group element representing rotations in 3D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SO3 {
    quaternion: UnitQuaternion<f64>,
}

impl fmt::Display for SO3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl SO3 {
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Create SO(3) from quaternion coefficients, normalizing them.
    pub fn from_quaternion_coeffs(x: f64, y: f64, z: f64, w: f64) -> Self {
        SO3::new(UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)))
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    pub fn compose(&self, other: &SO3) -> SO3 {
        SO3::new(self.quaternion * other.quaternion)
    }

    pub fn inverse(&self) -> SO3 {
        SO3::new(self.quaternion.inverse())
    }

    /// Exponential map of an axis-angle vector.
    pub fn exp(tangent: &Vector3<f64>) -> SO3 {
        SO3::new(UnitQuaternion::from_scaled_axis(*tangent))
    }

    /// Logarithmic map to an axis-angle vector with angle in `[0, π]`.
    pub fn log(&self) -> Vector3<f64> {
        self.quaternion.scaled_axis()
    }

    pub fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion.transform_vector(point)
    }
}

impl LieGroup for SO3 {
    const NAME: &'static str = "SO3";
    const REP_SIZE: usize = 4;
    const DOF: usize = 3;

    fn identity() -> Self {
        SO3::new(UnitQuaternion::identity())
    }

    fn from_vector(value: &DVector<f64>) -> ManifoldResult<Self> {
        check_shape(Self::NAME, value, Self::REP_SIZE)?;
        check_unit(Self::NAME, Self::rotation_norm(value))?;
        Ok(SO3::from_quaternion_coeffs(
            value[0], value[1], value[2], value[3],
        ))
    }

    fn to_vector(&self) -> DVector<f64> {
        let q = self.quaternion.quaternion();
        dvector![q.i, q.j, q.k, q.w]
    }

    fn plus(&self, tangent: &DVector<f64>) -> Self {
        self.compose(&SO3::exp(&Vector3::new(tangent[0], tangent[1], tangent[2])))
    }

    fn minus(&self, other: &Self) -> DVector<f64> {
        let tangent = other.inverse().compose(self).log();
        dvector![tangent.x, tangent.y, tangent.z]
    }

    fn rotation_norm(value: &DVector<f64>) -> f64 {
        value.rows(0, 4).norm()
    }
}
