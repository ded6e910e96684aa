//! Readiness check run before optimization.
//!
//! A graph is ready when every variable has a value and every factor has a
//! measurement and a covariance. Missing data is encoded as NaN entries.

use super::FactorGraph;
use std::fmt;
use tracing::warn;

/// Offending node names grouped by problem category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessReport {
    pub uninitialized_variables: Vec<String>,
    pub missing_measurements: Vec<String>,
    pub missing_covariances: Vec<String>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.uninitialized_variables.is_empty()
            && self.missing_measurements.is_empty()
            && self.missing_covariances.is_empty()
    }

    /// Total number of offending entries across all categories.
    pub fn num_problems(&self) -> usize {
        self.uninitialized_variables.len()
            + self.missing_measurements.len()
            + self.missing_covariances.len()
    }
}

impl fmt::Display for ReadinessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ready() {
            return write!(f, "ready");
        }
        let categories = [
            ("uninitialized variables", &self.uninitialized_variables),
            ("factors missing measurements", &self.missing_measurements),
            ("factors missing covariances", &self.missing_covariances),
        ];
        let mut first = true;
        for (label, names) in categories {
            if names.is_empty() {
                continue;
            }
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{label}: [{}]", names.join(", "))?;
            first = false;
        }
        Ok(())
    }
}

/// Inspect the graph and report every node that blocks optimization.
///
/// Never mutates the graph and never fails; calling it twice on an
/// unchanged graph yields the same report. With `verbose`, each non-empty
/// category is logged as a warning.
pub fn check_ready(graph: &FactorGraph, verbose: bool) -> ReadinessReport {
    let uninitialized_variables = graph
        .variables()
        .iter()
        .filter(|v| !v.is_initialized())
        .map(|v| v.name().to_string())
        .collect();
    let missing_measurements = graph
        .factors()
        .iter()
        .filter(|f| !f.has_measurement())
        .map(|f| f.name().to_string())
        .collect();
    let missing_covariances = graph
        .factors()
        .iter()
        .filter(|f| !f.has_covariance())
        .map(|f| f.name().to_string())
        .collect();

    let report = ReadinessReport {
        uninitialized_variables,
        missing_measurements,
        missing_covariances,
    };

    if verbose {
        if !report.uninitialized_variables.is_empty() {
            warn!(
                "Uninitialized variables: {}",
                report.uninitialized_variables.join(", ")
            );
        }
        if !report.missing_measurements.is_empty() {
            warn!(
                "Factors missing measurements: {}",
                report.missing_measurements.join(", ")
            );
        }
        if !report.missing_covariances.is_empty() {
            warn!(
                "Factors missing covariances: {}",
                report.missing_covariances.join(", ")
            );
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FactorNode, VariableNode};
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::ManifoldType;
    use nalgebra::{DMatrix, dvector};

    #[test]
    fn test_ready_graph() {
        let mut graph = FactorGraph::new();
        graph
            .add_variable(VariableNode::at_identity("x", ManifoldType::Rn(1)))
            .unwrap();
        graph
            .add_factor(
                FactorNode::with_unit_covariance(
                    "p",
                    &["x"],
                    dvector![1.0],
                    Box::new(PriorFactor::new(1)),
                )
                .unwrap(),
            )
            .unwrap();

        let report = check_ready(&graph, true);
        assert!(report.is_ready());
        assert_eq!(report.to_string(), "ready");
    }

    #[test]
    fn test_reports_every_category() {
        let mut graph = FactorGraph::new();
        graph
            .add_variable(VariableNode::uninitialized("a", ManifoldType::Rn(2)))
            .unwrap();
        graph
            .add_variable(VariableNode::at_identity("b", ManifoldType::Rn(2)))
            .unwrap();
        graph
            .add_factor(
                FactorNode::without_measurement("ab", &["a", "b"], Box::new(BetweenFactor::new(2)))
                    .unwrap(),
            )
            .unwrap();
        graph
            .add_factor(
                FactorNode::new(
                    "prior_b",
                    &["b"],
                    dvector![0.0, 0.0],
                    DMatrix::from_element(2, 2, f64::NAN),
                    Box::new(PriorFactor::new(2)),
                )
                .unwrap(),
            )
            .unwrap();

        let report = check_ready(&graph, false);
        assert!(!report.is_ready());
        assert_eq!(report.uninitialized_variables, vec!["a"]);
        assert_eq!(report.missing_measurements, vec!["ab"]);
        assert_eq!(report.missing_covariances, vec!["ab", "prior_b"]);
        assert_eq!(report.num_problems(), 4);
        assert!(report.to_string().contains("uninitialized variables: [a]"));
    }

    #[test]
    fn test_partial_nan_counts_as_missing() {
        let mut graph = FactorGraph::new();
        graph
            .add_variable(VariableNode::new("x", ManifoldType::Rn(2), dvector![1.0, f64::NAN]).unwrap())
            .unwrap();
        let report = check_ready(&graph, false);
        assert_eq!(report.uninitialized_variables, vec!["x"]);
    }

    #[test]
    fn test_check_is_idempotent() {
        let mut graph = FactorGraph::new();
        graph
            .add_variable(VariableNode::uninitialized("x", ManifoldType::SE2))
            .unwrap();
        let values_before = graph.values();
        let first = check_ready(&graph, true);
        let second = check_ready(&graph, true);
        assert_eq!(first, second);
        assert_eq!(values_before.len(), graph.values().len());
        assert!(graph.values()[0].iter().all(|v| v.is_nan()));
    }
}
