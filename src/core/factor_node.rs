//! Factor nodes of the factor graph.

use super::{CoreError, CoreResult};
use crate::factors::{Factor, Linearization};
use crate::manifold::ManifoldResult;
use nalgebra::{DMatrix, DVector};
use std::collections::HashSet;
use std::fmt;

/// A named measurement constraint over an ordered list of variables.
///
/// Holds the measurement, its error covariance and the residual model. A
/// measurement or covariance containing NaN counts as missing; such a factor
/// is accepted into the graph but fails the readiness check.
pub struct FactorNode {
    name: String,
    variables: Vec<String>,
    measurement: DVector<f64>,
    err_cov: DMatrix<f64>,
    model: Box<dyn Factor>,
}

impl FactorNode {
    /// Create a factor node, checking shapes against the model's error dimension.
    pub fn new(
        name: impl Into<String>,
        variables: &[&str],
        measurement: DVector<f64>,
        err_cov: DMatrix<f64>,
        model: Box<dyn Factor>,
    ) -> CoreResult<Self> {
        let name = name.into();
        let dimension = model.dimension();

        if variables.is_empty() {
            return Err(
                CoreError::InvalidFactor(format!("factor '{name}' has no variables")).log(),
            );
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = variables.iter().find(|v| !seen.insert(**v)) {
            return Err(CoreError::InvalidFactor(format!(
                "factor '{name}' lists variable '{repeated}' more than once"
            ))
            .log());
        }
        let expected = model.variable_manifolds().len();
        if variables.len() != expected {
            return Err(CoreError::InvalidFactor(format!(
                "factor '{name}' ({}) connects {expected} variables, got {}",
                model.factor_type(),
                variables.len()
            ))
            .log());
        }
        if measurement.len() != dimension {
            return Err(CoreError::DimensionMismatch(format!(
                "factor '{name}' measurement has {} entries, error dimension is {dimension}",
                measurement.len()
            ))
            .log());
        }
        if err_cov.shape() != (dimension, dimension) {
            return Err(CoreError::DimensionMismatch(format!(
                "factor '{name}' covariance is {:?}, expected {dimension}x{dimension}",
                err_cov.shape()
            ))
            .log());
        }

        Ok(Self {
            name,
            variables: variables.iter().map(|v| v.to_string()).collect(),
            measurement,
            err_cov,
            model,
        })
    }

    /// Create a factor node with identity covariance.
    pub fn with_unit_covariance(
        name: impl Into<String>,
        variables: &[&str],
        measurement: DVector<f64>,
        model: Box<dyn Factor>,
    ) -> CoreResult<Self> {
        let dimension = model.dimension();
        Self::new(
            name,
            variables,
            measurement,
            DMatrix::identity(dimension, dimension),
            model,
        )
    }

    /// Create a factor node whose measurement and covariance are still missing.
    pub fn without_measurement(
        name: impl Into<String>,
        variables: &[&str],
        model: Box<dyn Factor>,
    ) -> CoreResult<Self> {
        let dimension = model.dimension();
        Self::new(
            name,
            variables,
            DVector::from_element(dimension, f64::NAN),
            DMatrix::from_element(dimension, dimension, f64::NAN),
            model,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connected variable names in connection order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn measurement(&self) -> &DVector<f64> {
        &self.measurement
    }

    pub fn err_cov(&self) -> &DMatrix<f64> {
        &self.err_cov
    }

    pub fn model(&self) -> &dyn Factor {
        self.model.as_ref()
    }

    /// Error dimension of the factor.
    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn has_measurement(&self) -> bool {
        !self.measurement.iter().any(|v| v.is_nan())
    }

    pub fn has_covariance(&self) -> bool {
        !self.err_cov.iter().any(|v| v.is_nan())
    }

    /// Replace the measurement; the length must match the error dimension.
    pub fn set_measurement(&mut self, measurement: DVector<f64>) -> CoreResult<()> {
        if measurement.len() != self.dimension() {
            return Err(CoreError::DimensionMismatch(format!(
                "factor '{}' measurement has {} entries, error dimension is {}",
                self.name,
                measurement.len(),
                self.dimension()
            ))
            .log());
        }
        self.measurement = measurement;
        Ok(())
    }

    /// Replace the error covariance; it must be square of the error dimension.
    pub fn set_err_cov(&mut self, err_cov: DMatrix<f64>) -> CoreResult<()> {
        let dimension = self.dimension();
        if err_cov.shape() != (dimension, dimension) {
            return Err(CoreError::DimensionMismatch(format!(
                "factor '{}' covariance is {:?}, expected {dimension}x{dimension}",
                self.name,
                err_cov.shape()
            ))
            .log());
        }
        self.err_cov = err_cov;
        Ok(())
    }

    /// Evaluate the residual model at the given connected values.
    pub fn linearize(
        &self,
        values: &[&DVector<f64>],
        compute_jacobian: bool,
    ) -> ManifoldResult<Linearization> {
        self.model
            .linearize(&self.measurement, values, compute_jacobian)
    }
}

impl fmt::Debug for FactorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorNode")
            .field("name", &self.name)
            .field("type", &self.model.factor_type())
            .field("variables", &self.variables)
            .field("measurement", &self.measurement.as_slice())
            .finish()
    }
}
