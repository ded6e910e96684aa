//! Applies search directions to the variables of a factor graph.

use crate::core::{FactorGraph, VariableOrdering};
use crate::error::GraphOptResult;
use crate::manifold::{Manifold, ManifoldError};
use faer::Mat;
use nalgebra::DVector;

/// New values keyed by graph declaration index.
pub type Proposal = Vec<(usize, DVector<f64>)>;

/// The only writer of variable values during optimization.
///
/// Updates are two-phase: [`GraphUpdater::propose`] computes every new value
/// and validates it, [`GraphUpdater::commit`] writes them. If any variable
/// fails validation nothing is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphUpdater;

impl GraphUpdater {
    /// `x_v ⊕ (step_length · Δ_v)` for every free variable `v`.
    pub fn propose(
        graph: &FactorGraph,
        ordering: &VariableOrdering,
        direction: &Mat<f64>,
        step_length: f64,
    ) -> GraphOptResult<Proposal> {
        let mut proposal = Vec::with_capacity(ordering.len());
        for entry in ordering.entries() {
            let variable = &graph.variables()[entry.graph_index];
            let manifold = variable.manifold();
            let increment =
                DVector::from_fn(entry.dof, |i, _| step_length * direction[(entry.offset + i, 0)]);

            if !manifold.is_valid_increment(&increment) {
                return Err(ManifoldError::InvalidIncrement {
                    manifold: manifold.type_name(),
                    reason: format!(
                        "increment {:?} for '{}' is not finite",
                        increment.as_slice(),
                        variable.name()
                    ),
                }
                .log()
                .into());
            }

            let value = manifold.oplus(variable.value(), &increment)?;
            if !manifold.is_valid_value(&value) {
                return Err(ManifoldError::InvalidUpdate {
                    variable: variable.name().to_string(),
                    reason: format!("{:?} is not a valid {manifold} value", value.as_slice()),
                }
                .log()
                .into());
            }
            proposal.push((entry.graph_index, value));
        }
        Ok(proposal)
    }

    /// All graph values with the proposed ones substituted, in declaration order.
    pub fn trial_values(graph: &FactorGraph, proposal: &Proposal) -> Vec<DVector<f64>> {
        let mut values = graph.values();
        for (index, value) in proposal {
            values[*index] = value.clone();
        }
        values
    }

    pub fn commit(graph: &mut FactorGraph, proposal: Proposal) -> GraphOptResult<()> {
        graph.commit_values(proposal)?;
        Ok(())
    }

    /// Propose and commit in one go.
    pub fn apply(
        graph: &mut FactorGraph,
        ordering: &VariableOrdering,
        direction: &Mat<f64>,
        step_length: f64,
    ) -> GraphOptResult<()> {
        let proposal = Self::propose(graph, ordering, direction, step_length)?;
        Self::commit(graph, proposal)
    }
}
