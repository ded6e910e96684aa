//! SO(2) - rotations in the plane.
//!
//! Elements are stored as nalgebra's `UnitComplex`; the flat representation is
//! `[cos θ, sin θ]` and the tangent is the single angle `θ`.

use super::{LieGroup, ManifoldResult, check_shape, check_unit};
use nalgebra::{DVector, Matrix2, UnitComplex, dvector};
use std::fmt;

/// SO(2) group element representing rotations in 2D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SO2 {
    complex: UnitComplex<f64>,
}

impl fmt::Display for SO2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SO2(angle: {:.4})", self.angle())
    }
}

impl SO2 {
    pub fn new(complex: UnitComplex<f64>) -> Self {
        SO2 { complex }
    }

    /// Create SO(2) from an angle in radians.
    pub fn from_angle(angle: f64) -> Self {
        SO2::new(UnitComplex::new(angle))
    }

    pub fn complex(&self) -> UnitComplex<f64> {
        self.complex
    }

    /// Rotation angle in `(-π, π]`.
    pub fn angle(&self) -> f64 {
        self.complex.angle()
    }

    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.complex.to_rotation_matrix().into_inner()
    }

    pub fn compose(&self, other: &SO2) -> SO2 {
        SO2::new(self.complex * other.complex)
    }

    pub fn inverse(&self) -> SO2 {
        SO2::new(self.complex.inverse())
    }

    /// Exponential map `R(θ) = exp([θ]ₓ)`.
    pub fn exp(theta: f64) -> SO2 {
        SO2::from_angle(theta)
    }

    /// Logarithmic map, the angle in `(-π, π]`.
    pub fn log(&self) -> f64 {
        self.angle()
    }
}

impl LieGroup for SO2 {
    const NAME: &'static str = "SO2";
    const REP_SIZE: usize = 2;
    const DOF: usize = 1;

    fn identity() -> Self {
        SO2::new(UnitComplex::identity())
    }

    fn from_vector(value: &DVector<f64>) -> ManifoldResult<Self> {
        check_shape(Self::NAME, value, Self::REP_SIZE)?;
        let norm = Self::rotation_norm(value);
        check_unit(Self::NAME, norm)?;
        Ok(SO2::new(UnitComplex::from_cos_sin_unchecked(
            value[0] / norm,
            value[1] / norm,
        )))
    }

    fn to_vector(&self) -> DVector<f64> {
        dvector![self.complex.cos_angle(), self.complex.sin_angle()]
    }

    fn plus(&self, tangent: &DVector<f64>) -> Self {
        self.compose(&SO2::exp(tangent[0]))
    }

    fn minus(&self, other: &Self) -> DVector<f64> {
        dvector![other.inverse().compose(self).log()]
    }

    fn rotation_norm(value: &DVector<f64>) -> f64 {
        value[0].hypot(value[1])
    }
}
