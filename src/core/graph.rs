//! Factor graph container.

use super::{CoreError, CoreResult, FactorNode, VariableNode};
use crate::manifold::Manifold;
use nalgebra::DVector;
use std::collections::HashMap;
use std::fmt;

/// Statistics about a factor graph
#[derive(Debug, Clone, PartialEq)]
pub struct FactorGraphStatistics {
    pub num_variables: usize,
    pub num_factors: usize,
    pub num_free_variables: usize,
    pub num_fixed_variables: usize,
    /// Sum of `dim` over all variables
    pub total_value_dimension: usize,
    /// Sum of `dof` over free variables (columns of the Jacobian)
    pub total_free_dof: usize,
    /// Sum of error dimensions over all factors (rows of the Jacobian)
    pub total_residual_dimension: usize,
}

impl fmt::Display for FactorGraphStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FactorGraph Statistics:\n\
             Variables: {} (free: {}, fixed: {})\n\
             Factors: {}\n\
             Value dimension: {} (free dof: {})\n\
             Residual dimension: {}",
            self.num_variables,
            self.num_free_variables,
            self.num_fixed_variables,
            self.num_factors,
            self.total_value_dimension,
            self.total_free_dof,
            self.total_residual_dimension
        )
    }
}

/// Nonlinear least squares problem expressed as variables and factors.
///
/// Names are unique across each node kind. Variables and factors enumerate in
/// declaration order, which stays stable for the lifetime of the graph; the
/// optimizer derives its column and row layouts from that order.
#[derive(Debug, Default)]
pub struct FactorGraph {
    variables: Vec<VariableNode>,
    variable_index: HashMap<String, usize>,
    factors: Vec<FactorNode>,
    factor_index: HashMap<String, usize>,
}

impl FactorGraph {
    /// Creates a new, empty factor graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable. Fails if the name is already taken.
    pub fn add_variable(&mut self, variable: VariableNode) -> CoreResult<()> {
        if self.variable_index.contains_key(variable.name()) {
            return Err(CoreError::DuplicateVariable(variable.name().to_string()).log());
        }
        self.variable_index
            .insert(variable.name().to_string(), self.variables.len());
        self.variables.push(variable);
        Ok(())
    }

    /// Add a factor.
    ///
    /// Fails on a duplicate name, on a reference to a variable that is not in
    /// the graph, or when a connected variable lives on a different manifold
    /// than the factor model expects.
    pub fn add_factor(&mut self, factor: FactorNode) -> CoreResult<()> {
        if self.factor_index.contains_key(factor.name()) {
            return Err(CoreError::DuplicateFactor(factor.name().to_string()).log());
        }

        let expected = factor.model().variable_manifolds();
        for (variable_name, manifold) in factor.variables().iter().zip(expected) {
            let variable = self.variable(variable_name).ok_or_else(|| {
                CoreError::DanglingReference {
                    factor: factor.name().to_string(),
                    variable: variable_name.clone(),
                }
                .log()
            })?;
            if variable.manifold() != manifold {
                return Err(CoreError::InvalidFactor(format!(
                    "factor '{}' expects '{}' on {}, found {}",
                    factor.name(),
                    variable_name,
                    manifold,
                    variable.manifold()
                ))
                .log());
            }
        }

        self.factor_index
            .insert(factor.name().to_string(), self.factors.len());
        self.factors.push(factor);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&VariableNode> {
        self.variable_index.get(name).map(|&i| &self.variables[i])
    }

    pub fn factor(&self, name: &str) -> Option<&FactorNode> {
        self.factor_index.get(name).map(|&i| &self.factors[i])
    }

    pub fn factor_mut(&mut self, name: &str) -> Option<&mut FactorNode> {
        self.factor_index
            .get(name)
            .copied()
            .map(move |i| &mut self.factors[i])
    }

    /// Position of a variable in declaration order.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variable_index.get(name).copied()
    }

    /// Variables in declaration order.
    pub fn variables(&self) -> &[VariableNode] {
        &self.variables
    }

    /// Factors in declaration order.
    pub fn factors(&self) -> &[FactorNode] {
        &self.factors
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name())
    }

    pub fn factor_names(&self) -> impl Iterator<Item = &str> {
        self.factors.iter().map(|f| f.name())
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Current value of a variable.
    pub fn value(&self, name: &str) -> Option<&DVector<f64>> {
        self.variable(name).map(|v| v.value())
    }

    /// Set the value of a variable.
    ///
    /// The value must be a valid point of the variable's manifold.
    pub fn set_value(&mut self, name: &str, value: DVector<f64>) -> CoreResult<()> {
        let index = self
            .variable_index(name)
            .ok_or_else(|| CoreError::UnknownVariable(name.to_string()).log())?;
        let variable = &mut self.variables[index];
        if !variable.manifold().is_valid_value(&value) {
            return Err(CoreError::DimensionMismatch(format!(
                "value {:?} is not a valid {} point for '{name}'",
                value.as_slice(),
                variable.manifold()
            ))
            .log());
        }
        variable.set_value(value)
    }

    /// Mark a variable fixed (excluded from optimization) or free.
    pub fn set_fixed(&mut self, name: &str, fixed: bool) -> CoreResult<()> {
        let index = self
            .variable_index(name)
            .ok_or_else(|| CoreError::UnknownVariable(name.to_string()).log())?;
        self.variables[index].set_fixed(fixed);
        Ok(())
    }

    /// Overwrite variable values by declaration index. Only the graph updater
    /// writes through here, after validating every value.
    pub(crate) fn commit_values(&mut self, values: Vec<(usize, DVector<f64>)>) -> CoreResult<()> {
        for (index, value) in values {
            self.variables[index].set_value(value)?;
        }
        Ok(())
    }

    /// Snapshot of all variable values in declaration order.
    pub fn values(&self) -> Vec<DVector<f64>> {
        self.variables.iter().map(|v| v.value().clone()).collect()
    }

    pub fn statistics(&self) -> FactorGraphStatistics {
        let num_fixed_variables = self.variables.iter().filter(|v| v.is_fixed()).count();
        FactorGraphStatistics {
            num_variables: self.variables.len(),
            num_factors: self.factors.len(),
            num_free_variables: self.variables.len() - num_fixed_variables,
            num_fixed_variables,
            total_value_dimension: self.variables.iter().map(|v| v.dim()).sum(),
            total_free_dof: self
                .variables
                .iter()
                .filter(|v| !v.is_fixed())
                .map(|v| v.dof())
                .sum(),
            total_residual_dimension: self.factors.iter().map(|f| f.dimension()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, BetweenFactorSE2, PriorFactor};
    use crate::manifold::ManifoldType;
    use nalgebra::dvector;

    fn two_point_graph() -> FactorGraph {
        let mut graph = FactorGraph::new();
        graph
            .add_variable(VariableNode::new("a", ManifoldType::Rn(2), dvector![0.0, 0.0]).unwrap())
            .unwrap();
        graph
            .add_variable(VariableNode::new("b", ManifoldType::Rn(2), dvector![1.0, 1.0]).unwrap())
            .unwrap();
        graph
            .add_factor(
                FactorNode::with_unit_covariance(
                    "ab",
                    &["a", "b"],
                    dvector![1.0, 1.0],
                    Box::new(BetweenFactor::new(2)),
                )
                .unwrap(),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_declaration_order() {
        let mut graph = two_point_graph();
        graph
            .add_variable(VariableNode::at_identity("c", ManifoldType::Rn(2)))
            .unwrap();
        let names: Vec<&str> = graph.variable_names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(graph.variable_index("c"), Some(2));
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let mut graph = two_point_graph();
        let result = graph.add_variable(VariableNode::at_identity("a", ManifoldType::Rn(2)));
        assert!(matches!(result, Err(CoreError::DuplicateVariable(_))));
    }

    #[test]
    fn test_duplicate_factor_rejected() {
        let mut graph = two_point_graph();
        let factor = FactorNode::with_unit_covariance(
            "ab",
            &["a"],
            dvector![0.0, 0.0],
            Box::new(PriorFactor::new(2)),
        )
        .unwrap();
        assert!(matches!(
            graph.add_factor(factor),
            Err(CoreError::DuplicateFactor(_))
        ));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut graph = two_point_graph();
        let factor = FactorNode::with_unit_covariance(
            "prior_z",
            &["z"],
            dvector![0.0, 0.0],
            Box::new(PriorFactor::new(2)),
        )
        .unwrap();
        assert!(matches!(
            graph.add_factor(factor),
            Err(CoreError::DanglingReference { .. })
        ));
        assert_eq!(graph.num_factors(), 1);
    }

    #[test]
    fn test_manifold_mismatch_rejected() {
        let mut graph = two_point_graph();
        let factor = FactorNode::with_unit_covariance(
            "se2",
            &["a", "b"],
            BetweenFactorSE2::measurement(0.0, 0.0, 0.0),
            Box::new(BetweenFactorSE2::new()),
        )
        .unwrap();
        assert!(matches!(
            graph.add_factor(factor),
            Err(CoreError::InvalidFactor(_))
        ));
    }

    #[test]
    fn test_set_value_validates() {
        let mut graph = two_point_graph();
        assert!(graph.set_value("a", dvector![3.0, 4.0]).is_ok());
        assert_eq!(graph.value("a"), Some(&dvector![3.0, 4.0]));
        assert!(graph.set_value("a", dvector![3.0]).is_err());
        assert!(matches!(
            graph.set_value("nope", dvector![0.0, 0.0]),
            Err(CoreError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_statistics() {
        let mut graph = two_point_graph();
        graph.set_fixed("a", true).unwrap();
        let stats = graph.statistics();
        assert_eq!(stats.num_variables, 2);
        assert_eq!(stats.num_fixed_variables, 1);
        assert_eq!(stats.total_free_dof, 2);
        assert_eq!(stats.total_residual_dimension, 2);
        assert!(stats.to_string().contains("Factors: 1"));
    }
}
