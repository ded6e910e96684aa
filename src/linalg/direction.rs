//! Search direction from an assembled [`LinearSystem`].

use super::ordering::{fill_in, minimum_degree};
use super::{
    ColumnPermutation, LinAlgResult, LinearSolverType, LinearSystem, SparseLinearSolver,
    create_linear_solver,
};
use faer::Mat;
use tracing::debug;

/// Solves for the increment `Δ` of the free variables.
///
/// With reordering enabled the Jacobian columns are permuted by a block
/// minimum-degree order before factorization and the solution is mapped back.
/// The permutation depends only on the sparsity pattern, so it is computed
/// once and reused while the system shape stays the same.
pub struct DirectionSolver {
    solver_type: LinearSolverType,
    solver: Box<dyn SparseLinearSolver>,
    use_reordering: bool,
    cached_permutation: Option<((usize, usize, usize), ColumnPermutation)>,
}

impl DirectionSolver {
    pub fn new(solver_type: LinearSolverType, use_reordering: bool) -> Self {
        Self {
            solver_type,
            solver: create_linear_solver(solver_type),
            use_reordering,
            cached_permutation: None,
        }
    }

    pub fn solver_type(&self) -> LinearSolverType {
        self.solver_type
    }

    pub fn uses_reordering(&self) -> bool {
        self.use_reordering
    }

    /// Solve `(JᵀJ + diag(damping)) Δ = −Jᵀr`, or the undamped system when
    /// `damping` is `None`. A system without columns yields an empty step.
    pub fn solve(
        &mut self,
        system: &LinearSystem,
        damping: Option<&Mat<f64>>,
    ) -> LinAlgResult<Mat<f64>> {
        if system.ncols() == 0 {
            return Ok(Mat::zeros(0, 1));
        }

        let permutation = if self.use_reordering {
            Some(self.permutation(system))
        } else {
            None
        };

        match permutation {
            Some(permutation) if !permutation.is_identity() => {
                let jacobian = system.permuted_jacobian(&permutation)?;
                let step = match damping {
                    Some(d) => self.solver.solve_augmented_equation(
                        system.residual(),
                        &jacobian,
                        &permutation.permute(d),
                    )?,
                    None => self
                        .solver
                        .solve_normal_equation(system.residual(), &jacobian)?,
                };
                Ok(permutation.unpermute(&step))
            }
            _ => match damping {
                Some(d) => {
                    self.solver
                        .solve_augmented_equation(system.residual(), system.jacobian(), d)
                }
                None => self
                    .solver
                    .solve_normal_equation(system.residual(), system.jacobian()),
            },
        }
    }

    fn permutation(&mut self, system: &LinearSystem) -> ColumnPermutation {
        let key = (system.nrows(), system.ncols(), system.nnz());
        if let Some((cached_key, permutation)) = &self.cached_permutation {
            if *cached_key == key {
                return permutation.clone();
            }
        }

        let adjacency = system.adjacency();
        let order = minimum_degree(adjacency);
        let natural: Vec<usize> = (0..adjacency.len()).collect();
        debug!(
            "Column ordering: fill-in {} (natural) -> {} (minimum degree) over {} blocks",
            fill_in(adjacency, &natural),
            fill_in(adjacency, &order),
            adjacency.len()
        );

        let permutation = ColumnPermutation::from_block_order(system.blocks(), &order);
        self.cached_permutation = Some((key, permutation.clone()));
        permutation
    }
}

impl std::fmt::Debug for DirectionSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionSolver")
            .field("solver_type", &self.solver_type)
            .field("use_reordering", &self.use_reordering)
            .finish()
    }
}
