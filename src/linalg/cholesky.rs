use std::ops::Mul;

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers;
use faer::sparse::{SparseColMat, Triplet};
use faer::{Mat, Side};

use super::{LinAlgError, LinAlgResult, SparseLinearSolver, ensure_finite};

/// Sparse Cholesky on the normal equations `JᵀJ Δ = −Jᵀr`.
///
/// The symbolic factorization is cached per sparsity pattern, keyed on the
/// Hessian size and number of stored entries. The undamped and damped
/// Hessians get separate caches since the damped one always carries a full
/// diagonal.
#[derive(Debug, Clone, Default)]
pub struct SparseCholeskySolver {
    normal_pattern: Option<CachedSymbolic>,
    damped_pattern: Option<CachedSymbolic>,
}

#[derive(Debug, Clone)]
struct CachedSymbolic {
    key: (usize, usize),
    symbolic: solvers::SymbolicLlt<usize>,
}

impl SparseCholeskySolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn factor_and_solve(
        cache: &mut Option<CachedSymbolic>,
        hessian: &SparseColMat<usize, f64>,
        rhs: Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let key = (hessian.ncols(), hessian.symbolic().compute_nnz());
        let reuse = cache.as_ref().is_some_and(|c| c.key == key);
        if !reuse {
            let symbolic = solvers::SymbolicLlt::try_new(hessian.symbolic(), Side::Lower)
                .map_err(|e| {
                    LinAlgError::FactorizationFailed("symbolic Cholesky failed".into())
                        .log_with_source(e)
                })?;
            *cache = Some(CachedSymbolic { key, symbolic });
        }
        let symbolic = cache
            .as_ref()
            .map(|c| c.symbolic.clone())
            .ok_or_else(|| LinAlgError::FactorizationFailed("missing symbolic pattern".into()))?;

        let llt = solvers::Llt::try_new_with_symbolic(symbolic, hessian.as_ref(), Side::Lower)
            .map_err(|e| {
                LinAlgError::SingularSystem("normal equations are not positive definite".into())
                    .log_with_source(e)
            })?;
        ensure_finite(llt.solve(rhs), "sparse Cholesky")
    }
}

fn normal_matrix(jacobian: &SparseColMat<usize, f64>) -> LinAlgResult<SparseColMat<usize, f64>> {
    Ok(jacobian
        .as_ref()
        .transpose()
        .to_col_major()
        .map_err(|e| {
            LinAlgError::SparseMatrixCreation("failed to transpose Jacobian".into())
                .log_with_source(e)
        })?
        .mul(jacobian.as_ref()))
}

impl SparseLinearSolver for SparseCholeskySolver {
    fn solve_normal_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let hessian = normal_matrix(jacobian)?;
        let rhs = jacobian.as_ref().transpose().mul(-residuals);
        Self::factor_and_solve(&mut self.normal_pattern, &hessian, rhs)
    }

    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
        damping: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let hessian = normal_matrix(jacobian)?;
        let n = hessian.ncols();

        // H + diag(damping); duplicate diagonal triplets are summed
        let symbolic = hessian.symbolic();
        let mut triplets = Vec::with_capacity(hessian.symbolic().compute_nnz() + n);
        for col in 0..n {
            let rows = symbolic.row_idx_of_col_raw(col);
            let values = hessian.val_of_col(col);
            for (&row, &value) in rows.iter().zip(values) {
                triplets.push(Triplet::new(row, col, value));
            }
            triplets.push(Triplet::new(col, col, damping[(col, 0)]));
        }
        let damped = SparseColMat::try_new_from_triplets(n, n, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("failed to build damped Hessian".into())
                .log_with_source(e)
        })?;

        let rhs = jacobian.as_ref().transpose().mul(-residuals);
        Self::factor_and_solve(&mut self.damped_pattern, &damped, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jacobian(
        nrows: usize,
        ncols: usize,
        entries: &[(usize, usize, f64)],
    ) -> SparseColMat<usize, f64> {
        let triplets: Vec<_> = entries
            .iter()
            .map(|&(r, c, v)| Triplet::new(r, c, v))
            .collect();
        SparseColMat::try_new_from_triplets(nrows, ncols, &triplets).unwrap()
    }

    fn column(values: &[f64]) -> Mat<f64> {
        Mat::from_fn(values.len(), 1, |i, _| values[i])
    }

    #[test]
    fn test_solves_normal_equation() {
        // J = [[2, 0], [0, 1], [1, 1]], r = [2, -1, 0]
        let j = jacobian(3, 2, &[(0, 0, 2.0), (1, 1, 1.0), (2, 0, 1.0), (2, 1, 1.0)]);
        let r = column(&[2.0, -1.0, 0.0]);
        let mut solver = SparseCholeskySolver::new();
        let dx = solver.solve_normal_equation(&r, &j).unwrap();

        // JᵀJ = [[5, 1], [1, 2]], −Jᵀr = [−4, 1] ⇒ Δ = [−1, 1]
        assert!((dx[(0, 0)] + 1.0).abs() < 1e-12);
        assert!((dx[(1, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_symbolic_cache_reused() {
        let j = jacobian(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let mut solver = SparseCholeskySolver::new();
        let first = solver.solve_normal_equation(&column(&[1.0, 2.0]), &j).unwrap();
        let second = solver.solve_normal_equation(&column(&[3.0, 4.0]), &j).unwrap();
        assert!((first[(1, 0)] + 2.0).abs() < 1e-12);
        assert!((second[(0, 0)] + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_damped_equation() {
        let j = jacobian(1, 1, &[(0, 0, 1.0)]);
        let mut solver = SparseCholeskySolver::new();
        let dx = solver
            .solve_augmented_equation(&column(&[2.0]), &j, &column(&[1.0]))
            .unwrap();
        // (1 + 1) Δ = −2
        assert!((dx[(0, 0)] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_system_fails() {
        // J = [1, −1] has a rank-deficient normal matrix
        let j = jacobian(1, 2, &[(0, 0, 1.0), (0, 1, -1.0)]);
        let mut solver = SparseCholeskySolver::new();
        let result = solver.solve_normal_equation(&column(&[1.0]), &j);
        assert!(result.is_err());
    }

    #[test]
    fn test_damping_regularizes_singular_system() {
        let j = jacobian(1, 2, &[(0, 0, 1.0), (0, 1, -1.0)]);
        let mut solver = SparseCholeskySolver::new();
        let dx = solver
            .solve_augmented_equation(&column(&[1.0]), &j, &column(&[1.0, 1.0]))
            .unwrap();
        assert!((dx[(0, 0)] + dx[(1, 0)]).abs() < 1e-12);
    }
}
