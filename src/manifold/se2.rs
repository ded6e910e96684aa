//! SE(2) - rigid body transformations in the plane.
//!
//! Elements combine an [`SO2`] rotation with a 2D translation. The flat
//! representation is `[x, y, cos θ, sin θ]`; tangents are `[ρx, ρy, θ]`.

use super::{LieGroup, ManifoldResult, SMALL_ANGLE, SO2, check_shape, check_unit};
use nalgebra::{DVector, Matrix3, UnitComplex, Vector2, Vector3, dvector};
use std::fmt;

/// SE(2) group element representing rigid body transformations in 2D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SE2 {
    translation: Vector2<f64>,
    rotation: SO2,
}

impl fmt::Display for SE2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SE2(translation: [{:.4}, {:.4}], rotation: {:.4})",
            self.x(),
            self.y(),
            self.angle()
        )
    }
}

/// Coefficients `(sin θ / θ, (1 − cos θ) / θ)` of the SE(2) `V` matrix.
fn v_coefficients(theta: f64) -> (f64, f64) {
    if theta.abs() > SMALL_ANGLE {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta)
    } else {
        (1.0 - theta * theta / 6.0, theta / 2.0)
    }
}

impl SE2 {
    pub fn new(translation: Vector2<f64>, rotation: SO2) -> Self {
        SE2 {
            translation,
            rotation,
        }
    }

    pub fn from_xy_angle(x: f64, y: f64, theta: f64) -> Self {
        SE2::new(Vector2::new(x, y), SO2::from_angle(theta))
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.translation
    }

    pub fn rotation(&self) -> SO2 {
        self.rotation
    }

    pub fn compose(&self, other: &SE2) -> SE2 {
        SE2::new(
            self.translation + self.rotation.complex() * other.translation,
            self.rotation.compose(&other.rotation),
        )
    }

    pub fn inverse(&self) -> SE2 {
        let rotation = self.rotation.inverse();
        SE2::new(-(rotation.complex() * self.translation), rotation)
    }

    /// Exponential map of a tangent `[ρx, ρy, θ]`.
    pub fn exp(tangent: &Vector3<f64>) -> SE2 {
        let theta = tangent.z;
        let (a, b) = v_coefficients(theta);
        let translation = Vector2::new(
            a * tangent.x - b * tangent.y,
            b * tangent.x + a * tangent.y,
        );
        SE2::new(translation, SO2::exp(theta))
    }

    /// Logarithmic map to a tangent `[ρx, ρy, θ]`.
    pub fn log(&self) -> Vector3<f64> {
        let theta = self.angle();
        let (a, b) = v_coefficients(theta);
        let denom = a * a + b * b;
        let (x, y) = (self.x(), self.y());
        Vector3::new((a * x + b * y) / denom, (-b * x + a * y) / denom, theta)
    }

    /// Adjoint matrix `[[R, [y, −x]ᵀ], [0, 1]]`.
    pub fn adjoint(&self) -> Matrix3<f64> {
        let c = self.rotation.complex().cos_angle();
        let s = self.rotation.complex().sin_angle();
        Matrix3::new(c, -s, self.y(), s, c, -self.x(), 0.0, 0.0, 1.0)
    }

    /// Right Jacobian of the exponential map at `tangent`.
    pub fn right_jacobian(tangent: &Vector3<f64>) -> Matrix3<f64> {
        let (x, y, theta) = (tangent.x, tangent.y, tangent.z);
        if theta.abs() > SMALL_ANGLE {
            let (s, c) = theta.sin_cos();
            let theta_sq = theta * theta;
            Matrix3::new(
                s / theta,
                (1.0 - c) / theta,
                (theta * x - y + y * c - x * s) / theta_sq,
                (c - 1.0) / theta,
                s / theta,
                (x + theta * y - x * c - y * s) / theta_sq,
                0.0,
                0.0,
                1.0,
            )
        } else {
            Matrix3::new(
                1.0,
                theta / 2.0,
                -y / 2.0,
                -theta / 2.0,
                1.0,
                x / 2.0,
                0.0,
                0.0,
                1.0,
            )
        }
    }

    /// Inverse of [`SE2::right_jacobian`]; invertible for `|θ| < 2π`.
    pub fn right_jacobian_inv(tangent: &Vector3<f64>) -> Matrix3<f64> {
        SE2::right_jacobian(tangent)
            .try_inverse()
            .unwrap_or_else(Matrix3::identity)
    }
}

impl LieGroup for SE2 {
    const NAME: &'static str = "SE2";
    const REP_SIZE: usize = 4;
    const DOF: usize = 3;

    fn identity() -> Self {
        SE2::new(Vector2::zeros(), SO2::identity())
    }

    fn from_vector(value: &DVector<f64>) -> ManifoldResult<Self> {
        check_shape(Self::NAME, value, Self::REP_SIZE)?;
        let norm = Self::rotation_norm(value);
        check_unit(Self::NAME, norm)?;
        let rotation = UnitComplex::from_cos_sin_unchecked(value[2] / norm, value[3] / norm);
        Ok(SE2::new(
            Vector2::new(value[0], value[1]),
            SO2::new(rotation),
        ))
    }

    fn to_vector(&self) -> DVector<f64> {
        let complex = self.rotation.complex();
        dvector![
            self.x(),
            self.y(),
            complex.cos_angle(),
            complex.sin_angle()
        ]
    }

    fn plus(&self, tangent: &DVector<f64>) -> Self {
        self.compose(&SE2::exp(&Vector3::new(tangent[0], tangent[1], tangent[2])))
    }

    fn minus(&self, other: &Self) -> DVector<f64> {
        let tangent = other.inverse().compose(self).log();
        dvector![tangent.x, tangent.y, tangent.z]
    }

    fn rotation_norm(value: &DVector<f64>) -> f64 {
        value[2].hypot(value[3])
    }
}
