//! Variable nodes of the factor graph.

use super::{CoreError, CoreResult};
use crate::manifold::{Manifold, ManifoldType};
use nalgebra::DVector;
use std::fmt;

/// A named value living on a manifold.
///
/// A variable is *uninitialized* while its value holds NaN entries; the
/// readiness check refuses to optimize such a graph. Fixed variables keep
/// their value and take no part in the search direction.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    name: String,
    manifold: ManifoldType,
    value: DVector<f64>,
    fixed: bool,
}

impl VariableNode {
    /// Create a variable with an initial value of length `manifold.dim()`.
    pub fn new(
        name: impl Into<String>,
        manifold: ManifoldType,
        value: DVector<f64>,
    ) -> CoreResult<Self> {
        let name = name.into();
        if value.len() != manifold.dim() {
            return Err(CoreError::DimensionMismatch(format!(
                "variable '{name}' on {manifold} expects {} values, got {}",
                manifold.dim(),
                value.len()
            ))
            .log());
        }
        Ok(Self {
            name,
            manifold,
            value,
            fixed: false,
        })
    }

    /// Create a variable whose value is not yet known.
    pub fn uninitialized(name: impl Into<String>, manifold: ManifoldType) -> Self {
        Self {
            name: name.into(),
            manifold,
            value: DVector::from_element(manifold.dim(), f64::NAN),
            fixed: false,
        }
    }

    /// Create a variable at the manifold identity.
    pub fn at_identity(name: impl Into<String>, manifold: ManifoldType) -> Self {
        Self {
            name: name.into(),
            manifold,
            value: manifold.identity(),
            fixed: false,
        }
    }

    /// Builder-style variant of [`VariableNode::set_fixed`].
    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifold(&self) -> ManifoldType {
        self.manifold
    }

    pub fn value(&self) -> &DVector<f64> {
        &self.value
    }

    pub fn dim(&self) -> usize {
        self.manifold.dim()
    }

    pub fn dof(&self) -> usize {
        self.manifold.dof()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// False while any entry of the value is NaN.
    pub fn is_initialized(&self) -> bool {
        !self.value.iter().any(|v| v.is_nan())
    }

    /// Replace the value. The new value must match `dim`.
    pub fn set_value(&mut self, value: DVector<f64>) -> CoreResult<()> {
        if value.len() != self.dim() {
            return Err(CoreError::DimensionMismatch(format!(
                "variable '{}' expects {} values, got {}",
                self.name,
                self.dim(),
                value.len()
            ))
            .log());
        }
        self.value = value;
        Ok(())
    }
}

impl fmt::Display for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.manifold)?;
        if self.fixed {
            write!(f, ", fixed")?;
        }
        write!(f, "): {:?}", self.value.as_slice())
    }
}
