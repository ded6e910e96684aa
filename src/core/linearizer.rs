//! Assembly of the weighted residual and Jacobian of a factor graph.

use super::{CoreError, FactorGraph, FactorNode};
use crate::error::{GraphOptError, GraphOptResult};
use crate::linalg::{ColumnBlock, LinearSystem, LinearSystemBuilder, SquareRootInformation};
use nalgebra::DVector;
use std::collections::HashMap;

/// Column layout of one free variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedVariable {
    /// Position in the graph's declaration order
    pub graph_index: usize,
    /// First Jacobian column of the variable
    pub offset: usize,
    pub dof: usize,
}

/// Column layout of the free variables, in declaration order.
///
/// Fixed variables get no columns. The ordering is derived from the graph
/// and stays valid as long as no variable is added or (un)fixed.
#[derive(Debug, Clone, Default)]
pub struct VariableOrdering {
    entries: Vec<OrderedVariable>,
    positions: HashMap<String, usize>,
    block_of: Vec<Option<usize>>,
    total_dof: usize,
}

impl VariableOrdering {
    pub fn from_graph(graph: &FactorGraph) -> Self {
        let mut ordering = Self {
            block_of: vec![None; graph.num_variables()],
            ..Self::default()
        };
        for (graph_index, variable) in graph.variables().iter().enumerate() {
            if variable.is_fixed() {
                continue;
            }
            let block = ordering.entries.len();
            ordering.entries.push(OrderedVariable {
                graph_index,
                offset: ordering.total_dof,
                dof: variable.dof(),
            });
            ordering.positions.insert(variable.name().to_string(), block);
            ordering.block_of[graph_index] = Some(block);
            ordering.total_dof += variable.dof();
        }
        ordering
    }

    pub fn entries(&self) -> &[OrderedVariable] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of Jacobian columns.
    pub fn total_dof(&self) -> usize {
        self.total_dof
    }

    /// Column layout of a free variable by name.
    pub fn position(&self, name: &str) -> Option<&OrderedVariable> {
        self.positions.get(name).map(|&b| &self.entries[b])
    }

    /// Block index of a variable given its graph index; `None` when fixed.
    pub fn block_of(&self, graph_index: usize) -> Option<usize> {
        self.block_of.get(graph_index).copied().flatten()
    }

    pub fn blocks(&self) -> Vec<ColumnBlock> {
        self.entries
            .iter()
            .map(|e| ColumnBlock {
                offset: e.offset,
                dof: e.dof,
            })
            .collect()
    }
}

/// Evaluates factors and assembles the whitened least squares system.
///
/// Only reads the graph. Trial costs for proposed values are computed from
/// a caller-provided value set so step control never writes the graph.
#[derive(Debug, Clone, Copy)]
pub struct Linearizer<'g> {
    graph: &'g FactorGraph,
}

impl<'g> Linearizer<'g> {
    pub fn new(graph: &'g FactorGraph) -> Self {
        Self { graph }
    }

    /// Weighted residual and Jacobian at the current values.
    pub fn build(&self, ordering: &VariableOrdering) -> GraphOptResult<LinearSystem> {
        let mut builder = LinearSystemBuilder::new(ordering.blocks());

        for factor in self.graph.factors() {
            let indices = self.connected_indices(factor)?;
            let values: Vec<&DVector<f64>> = indices
                .iter()
                .map(|&i| self.graph.variables()[i].value())
                .collect();

            let (residual, jacobian) = factor.linearize(&values, true)?;
            let jacobian = jacobian.ok_or_else(|| {
                CoreError::DimensionMismatch(format!(
                    "factor '{}' returned no Jacobian",
                    factor.name()
                ))
                .log()
            })?;

            let total_dof: usize = indices
                .iter()
                .map(|&i| self.graph.variables()[i].dof())
                .sum();
            check_residual(factor, &residual)?;
            if jacobian.shape() != (factor.dimension(), total_dof) {
                return Err(CoreError::DimensionMismatch(format!(
                    "factor '{}' Jacobian is {:?}, expected {}x{total_dof}",
                    factor.name(),
                    jacobian.shape(),
                    factor.dimension()
                ))
                .log()
                .into());
            }

            let weight = SquareRootInformation::from_covariance(factor.err_cov())?;
            let weighted_residual = weight.whiten_vector(&residual)?;
            let weighted_jacobian = weight.whiten_matrix(&jacobian)?;

            let mut columns = Vec::with_capacity(indices.len());
            let mut local_offset = 0;
            for &graph_index in &indices {
                let dof = self.graph.variables()[graph_index].dof();
                if let Some(block) = ordering.block_of(graph_index) {
                    columns.push((
                        block,
                        weighted_jacobian
                            .columns(local_offset, dof)
                            .into_owned(),
                    ));
                }
                local_offset += dof;
            }
            builder.add_rows(&weighted_residual, &columns)?;
        }

        Ok(builder.build()?)
    }

    /// `½ Σ ‖W r‖²` at the current values, or at `trial_values` (indexed by
    /// graph declaration order) when given.
    pub fn cost(&self, trial_values: Option<&[DVector<f64>]>) -> GraphOptResult<f64> {
        let expected = self.graph.num_variables();
        if let Some(trial) = trial_values.filter(|trial| trial.len() != expected) {
            return Err(CoreError::DimensionMismatch(format!(
                "trial values hold {} variables, graph has {}",
                trial.len(),
                expected
            ))
            .log()
            .into());
        }
        let mut total = 0.0;
        for factor in self.graph.factors() {
            let indices = self.connected_indices(factor)?;
            let values: Vec<&DVector<f64>> = indices
                .iter()
                .map(|&i| match trial_values {
                    Some(trial) => &trial[i],
                    None => self.graph.variables()[i].value(),
                })
                .collect();

            let (residual, _) = factor.linearize(&values, false)?;
            check_residual(factor, &residual)?;
            let weight = SquareRootInformation::from_covariance(factor.err_cov())?;
            total += 0.5 * weight.whiten_vector(&residual)?.norm_squared();
        }
        Ok(total)
    }

    fn connected_indices(&self, factor: &FactorNode) -> GraphOptResult<Vec<usize>> {
        factor
            .variables()
            .iter()
            .map(|name| {
                self.graph.variable_index(name).ok_or_else(|| {
                    GraphOptError::from(
                        CoreError::DanglingReference {
                            factor: factor.name().to_string(),
                            variable: name.clone(),
                        }
                        .log(),
                    )
                })
            })
            .collect()
    }
}

fn check_residual(factor: &FactorNode, residual: &DVector<f64>) -> GraphOptResult<()> {
    if residual.len() != factor.dimension() {
        return Err(CoreError::DimensionMismatch(format!(
            "factor '{}' residual has {} entries, expected {}",
            factor.name(),
            residual.len(),
            factor.dimension()
        ))
        .log()
        .into());
    }
    Ok(())
}
