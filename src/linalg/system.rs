//! Assembled weighted linear system `J Δ ≈ −r`.

use super::{ColumnPermutation, LinAlgError, LinAlgResult, SparseMatrix};
use faer::Mat;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeSet;

/// Contiguous column range owned by one free variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBlock {
    pub offset: usize,
    pub dof: usize,
}

/// Whitened residual and sparse Jacobian of the whole graph at one point.
///
/// Columns are grouped in [`ColumnBlock`]s, one per free variable. The
/// adjacency records which blocks share a factor, which is the sparsity
/// pattern of `JᵀJ` at block granularity.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    residual: Mat<f64>,
    jacobian: SparseMatrix,
    triplets: Vec<Triplet<usize, usize, f64>>,
    blocks: Vec<ColumnBlock>,
    adjacency: Vec<BTreeSet<usize>>,
}

impl LinearSystem {
    pub fn nrows(&self) -> usize {
        self.residual.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.jacobian.ncols()
    }

    pub fn residual(&self) -> &Mat<f64> {
        &self.residual
    }

    pub fn jacobian(&self) -> &SparseMatrix {
        &self.jacobian
    }

    pub fn blocks(&self) -> &[ColumnBlock] {
        &self.blocks
    }

    pub fn adjacency(&self) -> &[BTreeSet<usize>] {
        &self.adjacency
    }

    /// Number of stored Jacobian entries, explicit zeros included.
    pub fn nnz(&self) -> usize {
        self.triplets.len()
    }

    /// `F = ½‖r‖²`
    pub fn cost(&self) -> f64 {
        let norm = self.residual.norm_l2();
        0.5 * norm * norm
    }

    /// `g = Jᵀ r`
    pub fn gradient(&self) -> Mat<f64> {
        let mut gradient = Mat::<f64>::zeros(self.ncols(), 1);
        for t in &self.triplets {
            gradient[(t.col, 0)] += t.val * self.residual[(t.row, 0)];
        }
        gradient
    }

    /// Diagonal of `JᵀJ`, i.e. squared column norms of the Jacobian.
    pub fn hessian_diagonal(&self) -> Mat<f64> {
        let mut diagonal = Mat::<f64>::zeros(self.ncols(), 1);
        for t in &self.triplets {
            diagonal[(t.col, 0)] += t.val * t.val;
        }
        diagonal
    }

    /// Jacobian with columns moved to their permuted positions.
    pub fn permuted_jacobian(&self, permutation: &ColumnPermutation) -> LinAlgResult<SparseMatrix> {
        let triplets: Vec<_> = self
            .triplets
            .iter()
            .map(|t| Triplet::new(t.row, permutation.new_index(t.col), t.val))
            .collect();
        SparseColMat::try_new_from_triplets(self.nrows(), self.ncols(), &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("failed to permute Jacobian".into())
                .log_with_source(e)
        })
    }
}

/// Accumulates factor rows into a [`LinearSystem`].
#[derive(Debug)]
pub struct LinearSystemBuilder {
    blocks: Vec<ColumnBlock>,
    residual: Vec<f64>,
    triplets: Vec<Triplet<usize, usize, f64>>,
    adjacency: Vec<BTreeSet<usize>>,
}

impl LinearSystemBuilder {
    pub fn new(blocks: Vec<ColumnBlock>) -> Self {
        let adjacency = vec![BTreeSet::new(); blocks.len()];
        Self {
            blocks,
            residual: Vec::new(),
            triplets: Vec::new(),
            adjacency,
        }
    }

    /// Append the rows of one factor.
    ///
    /// `columns` pairs each free connected variable's block index with its
    /// `rows × dof` Jacobian slice. Zero entries are stored so the sparsity
    /// pattern does not depend on the linearization point.
    pub fn add_rows(
        &mut self,
        residual: &DVector<f64>,
        columns: &[(usize, DMatrix<f64>)],
    ) -> LinAlgResult<()> {
        let row_offset = self.residual.len();
        let rows = residual.len();

        for (block_index, jacobian) in columns {
            let block = self.blocks.get(*block_index).copied().ok_or_else(|| {
                LinAlgError::SparseMatrixCreation(format!("unknown column block {block_index}"))
                    .log()
            })?;
            if jacobian.shape() != (rows, block.dof) {
                return Err(LinAlgError::SparseMatrixCreation(format!(
                    "Jacobian block is {:?}, expected {rows}x{}",
                    jacobian.shape(),
                    block.dof
                ))
                .log());
            }
            for c in 0..block.dof {
                for r in 0..rows {
                    self.triplets.push(Triplet::new(
                        row_offset + r,
                        block.offset + c,
                        jacobian[(r, c)],
                    ));
                }
            }
        }

        for (i, (a, _)) in columns.iter().enumerate() {
            for (b, _) in &columns[i + 1..] {
                self.adjacency[*a].insert(*b);
                self.adjacency[*b].insert(*a);
            }
        }

        self.residual.extend(residual.iter());
        Ok(())
    }

    pub fn build(self) -> LinAlgResult<LinearSystem> {
        let nrows = self.residual.len();
        let ncols = self
            .blocks
            .last()
            .map(|b| b.offset + b.dof)
            .unwrap_or_default();
        let jacobian = SparseColMat::try_new_from_triplets(nrows, ncols, &self.triplets)
            .map_err(|e| {
                LinAlgError::SparseMatrixCreation(format!(
                    "failed to build {nrows}x{ncols} Jacobian"
                ))
                .log_with_source(e)
            })?;
        let residual = Mat::from_fn(nrows, 1, |i, _| self.residual[i]);

        Ok(LinearSystem {
            residual,
            jacobian,
            triplets: self.triplets,
            blocks: self.blocks,
            adjacency: self.adjacency,
        })
    }
}
