//! Manifold node capability and the manifold types shipped with the crate.
//!
//! Every variable in a factor graph lives on a manifold. The optimizer only
//! ever talks to a variable through the [`Manifold`] capability: it asks for
//! the representation size (`dim`), the tangent size (`dof`), applies
//! increments with `oplus`, and validates values and increments.
//!
//! Manifold | dim | dof | value layout                 | tangent layout
//! -------- | --- | --- | ---------------------------- | ------------------------
//! Rⁿ       | n   | n   | `[x₀ … xₙ₋₁]`                | `[δ₀ … δₙ₋₁]`
//! SO(2)    | 2   | 1   | `[cos θ, sin θ]`             | `[θ]`
//! SE(2)    | 4   | 3   | `[x, y, cos θ, sin θ]`       | `[ρx, ρy, θ]`
//! SO(3)    | 4   | 3   | `[qx, qy, qz, qw]`           | `[θx, θy, θz]`
//! SE(3)    | 7   | 6   | `[x, y, z, qx, qy, qz, qw]`  | `[ρx, ρy, ρz, θx, θy, θz]`
//!
//! Increments use the right perturbation model `x ⊕ δ = x ∘ Exp(δ)` and
//! `a ⊖ b = Log(b⁻¹ ∘ a)`, following the [manif](https://github.com/artivis/manif)
//! conventions.
//!
//! Dispatch over the closed set of manifold kinds goes through the
//! [`ManifoldType`] enum; the Lie groups implement [`LieGroup`] so the
//! enum can share one generic code path for all of them.

use nalgebra::DVector;
use std::fmt;
use thiserror::Error;
use tracing::error;

pub mod rn;
pub mod se2;
pub mod se3;
pub mod so2;
pub mod so3;

pub use se2::SE2;
pub use se3::SE3;
pub use so2::SO2;
pub use so3::SO3;

/// Tolerance on the norm of rotation parts (unit complex / unit quaternion).
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Small-angle threshold below which closed forms switch to Taylor expansions.
pub(crate) const SMALL_ANGLE: f64 = 1e-8;

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Value has the wrong length, non-finite entries or a non-unit rotation
    #[error("Invalid {manifold} value: {reason}")]
    InvalidValue { manifold: String, reason: String },

    /// Increment has the wrong length or non-finite entries
    #[error("Invalid {manifold} increment: {reason}")]
    InvalidIncrement { manifold: String, reason: String },

    /// Applying an increment produced an invalid value
    #[error("Update of variable '{variable}' failed: {reason}")]
    InvalidUpdate { variable: String, reason: String },
}

impl ManifoldError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Capability every variable node type provides to the optimizer.
pub trait Manifold {
    /// Human readable type identifier.
    fn type_name(&self) -> String;

    /// Length of the ambient value representation.
    fn dim(&self) -> usize;

    /// Number of local degrees of freedom (tangent size), never above `dim`.
    fn dof(&self) -> usize;

    /// Identity / origin value of the manifold.
    fn identity(&self) -> DVector<f64>;

    /// Local retraction `value ⊕ increment`.
    fn oplus(&self, value: &DVector<f64>, increment: &DVector<f64>)
    -> ManifoldResult<DVector<f64>>;

    /// Inverse retraction `a ⊖ b`, so that `ominus(oplus(x, δ), x) = δ`.
    fn ominus(&self, a: &DVector<f64>, b: &DVector<f64>) -> ManifoldResult<DVector<f64>>;

    /// Shape, finiteness and (for rotations) normalization check.
    fn is_valid_value(&self, value: &DVector<f64>) -> bool;

    /// Shape and finiteness check of a tangent increment.
    fn is_valid_increment(&self, increment: &DVector<f64>) -> bool {
        increment.len() == self.dof() && increment.iter().all(|v| v.is_finite())
    }
}

/// Lie group element with a flat vector representation.
///
/// Implemented by [`SO2`], [`SE2`], [`SO3`] and [`SE3`].
pub trait LieGroup: Clone + fmt::Debug + Sized {
    /// Type identifier used in messages.
    const NAME: &'static str;
    /// Length of the flat representation.
    const REP_SIZE: usize;
    /// Tangent space dimension.
    const DOF: usize;

    fn identity() -> Self;

    /// Parse the flat representation, rejecting non-unit rotations.
    fn from_vector(value: &DVector<f64>) -> ManifoldResult<Self>;

    fn to_vector(&self) -> DVector<f64>;

    /// Right plus `self ∘ Exp(tangent)`; `tangent` has length `DOF`.
    fn plus(&self, tangent: &DVector<f64>) -> Self;

    /// Right minus `Log(other⁻¹ ∘ self)`.
    fn minus(&self, other: &Self) -> DVector<f64>;

    /// Norm of the rotation part of a flat representation.
    fn rotation_norm(value: &DVector<f64>) -> f64;
}

fn invalid_value(manifold: &str, reason: impl Into<String>) -> ManifoldError {
    ManifoldError::InvalidValue {
        manifold: manifold.to_string(),
        reason: reason.into(),
    }
}

/// Shape and finiteness check shared by every manifold.
pub(crate) fn check_shape(manifold: &str, value: &DVector<f64>, len: usize) -> ManifoldResult<()> {
    if value.len() != len {
        return Err(invalid_value(
            manifold,
            format!("expected {len} entries, got {}", value.len()),
        ));
    }
    if value.iter().any(|v| !v.is_finite()) {
        return Err(invalid_value(manifold, "contains non-finite entries"));
    }
    Ok(())
}

/// Unit-norm check of a rotation part.
pub(crate) fn check_unit(manifold: &str, norm: f64) -> ManifoldResult<()> {
    if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
        return Err(invalid_value(
            manifold,
            format!("rotation part has norm {norm:.9}, expected 1"),
        ));
    }
    Ok(())
}

fn check_increment(manifold: &str, increment: &DVector<f64>, dof: usize) -> ManifoldResult<()> {
    if increment.len() != dof {
        return Err(ManifoldError::InvalidIncrement {
            manifold: manifold.to_string(),
            reason: format!("expected {dof} entries, got {}", increment.len()),
        });
    }
    if increment.iter().any(|v| !v.is_finite()) {
        return Err(ManifoldError::InvalidIncrement {
            manifold: manifold.to_string(),
            reason: "contains non-finite entries".to_string(),
        });
    }
    Ok(())
}

fn group_oplus<G: LieGroup>(
    value: &DVector<f64>,
    increment: &DVector<f64>,
) -> ManifoldResult<DVector<f64>> {
    check_increment(G::NAME, increment, G::DOF)?;
    let element = G::from_vector(value)?;
    Ok(element.plus(increment).to_vector())
}

fn group_ominus<G: LieGroup>(a: &DVector<f64>, b: &DVector<f64>) -> ManifoldResult<DVector<f64>> {
    let a = G::from_vector(a)?;
    let b = G::from_vector(b)?;
    Ok(a.minus(&b))
}

fn group_is_valid<G: LieGroup>(value: &DVector<f64>) -> bool {
    check_shape(G::NAME, value, G::REP_SIZE).is_ok()
        && (G::rotation_norm(value) - 1.0).abs() <= UNIT_NORM_TOLERANCE
}

/// Closed set of manifold kinds a variable can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifoldType {
    /// Euclidean space of the given dimension
    Rn(usize),
    SO2,
    SE2,
    SO3,
    SE3,
}

impl fmt::Display for ManifoldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldType::Rn(n) => write!(f, "R{n}"),
            ManifoldType::SO2 => write!(f, "{}", SO2::NAME),
            ManifoldType::SE2 => write!(f, "{}", SE2::NAME),
            ManifoldType::SO3 => write!(f, "{}", SO3::NAME),
            ManifoldType::SE3 => write!(f, "{}", SE3::NAME),
        }
    }
}

impl Manifold for ManifoldType {
    fn type_name(&self) -> String {
        self.to_string()
    }

    fn dim(&self) -> usize {
        match self {
            ManifoldType::Rn(n) => *n,
            ManifoldType::SO2 => SO2::REP_SIZE,
            ManifoldType::SE2 => SE2::REP_SIZE,
            ManifoldType::SO3 => SO3::REP_SIZE,
            ManifoldType::SE3 => SE3::REP_SIZE,
        }
    }

    fn dof(&self) -> usize {
        match self {
            ManifoldType::Rn(n) => *n,
            ManifoldType::SO2 => SO2::DOF,
            ManifoldType::SE2 => SE2::DOF,
            ManifoldType::SO3 => SO3::DOF,
            ManifoldType::SE3 => SE3::DOF,
        }
    }

    fn identity(&self) -> DVector<f64> {
        match self {
            ManifoldType::Rn(n) => DVector::zeros(*n),
            ManifoldType::SO2 => SO2::identity().to_vector(),
            ManifoldType::SE2 => SE2::identity().to_vector(),
            ManifoldType::SO3 => SO3::identity().to_vector(),
            ManifoldType::SE3 => SE3::identity().to_vector(),
        }
    }

    fn oplus(
        &self,
        value: &DVector<f64>,
        increment: &DVector<f64>,
    ) -> ManifoldResult<DVector<f64>> {
        match self {
            ManifoldType::Rn(n) => {
                check_increment(&self.type_name(), increment, *n)?;
                rn::oplus(*n, value, increment)
            }
            ManifoldType::SO2 => group_oplus::<SO2>(value, increment),
            ManifoldType::SE2 => group_oplus::<SE2>(value, increment),
            ManifoldType::SO3 => group_oplus::<SO3>(value, increment),
            ManifoldType::SE3 => group_oplus::<SE3>(value, increment),
        }
    }

    fn ominus(&self, a: &DVector<f64>, b: &DVector<f64>) -> ManifoldResult<DVector<f64>> {
        match self {
            ManifoldType::Rn(n) => rn::ominus(*n, a, b),
            ManifoldType::SO2 => group_ominus::<SO2>(a, b),
            ManifoldType::SE2 => group_ominus::<SE2>(a, b),
            ManifoldType::SO3 => group_ominus::<SO3>(a, b),
            ManifoldType::SE3 => group_ominus::<SE3>(a, b),
        }
    }

    fn is_valid_value(&self, value: &DVector<f64>) -> bool {
        match self {
            ManifoldType::Rn(n) => check_shape(&self.type_name(), value, *n).is_ok(),
            ManifoldType::SO2 => group_is_valid::<SO2>(value),
            ManifoldType::SE2 => group_is_valid::<SE2>(value),
            ManifoldType::SO3 => group_is_valid::<SO3>(value),
            ManifoldType::SE3 => group_is_valid::<SE3>(value),
        }
    }
}
