use faer::{
    Conj, Mat,
    linalg::solvers::SolveLstsqCore,
    sparse::{SparseColMat, Triplet, linalg::solvers},
};

use super::{LinAlgError, LinAlgResult, SparseLinearSolver, ensure_finite};

/// Sparse QR least squares on the Jacobian itself.
///
/// The Gauss-Newton step is the least squares solution of `J Δ = −r`. The
/// damped step solves the stacked problem
///
/// ```text
/// [ J        ]       [ −r ]
/// [ √diag(d) ] Δ  ≈  [  0 ]
/// ```
///
/// whose normal equations are `(JᵀJ + diag(d)) Δ = −Jᵀr`.
#[derive(Debug, Clone, Default)]
pub struct SparseQRSolver {
    plain_pattern: Option<CachedSymbolic>,
    stacked_pattern: Option<CachedSymbolic>,
}

#[derive(Debug, Clone)]
struct CachedSymbolic {
    key: (usize, usize, usize),
    symbolic: solvers::SymbolicQr<usize>,
}

impl SparseQRSolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn least_squares(
        cache: &mut Option<CachedSymbolic>,
        matrix: &SparseColMat<usize, f64>,
        mut rhs: Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let n = matrix.ncols();
        let key = (matrix.nrows(), n, matrix.symbolic().compute_nnz());
        if !cache.as_ref().is_some_and(|c| c.key == key) {
            let symbolic = solvers::SymbolicQr::try_new(matrix.symbolic()).map_err(|e| {
                LinAlgError::FactorizationFailed("symbolic QR failed".into()).log_with_source(e)
            })?;
            *cache = Some(CachedSymbolic { key, symbolic });
        }
        let symbolic = cache
            .as_ref()
            .map(|c| c.symbolic.clone())
            .ok_or_else(|| LinAlgError::FactorizationFailed("missing symbolic pattern".into()))?;

        let qr = solvers::Qr::try_new_with_symbolic(symbolic, matrix.as_ref()).map_err(|e| {
            LinAlgError::FactorizationFailed("numeric QR failed".into()).log_with_source(e)
        })?;
        qr.solve_lstsq_in_place_with_conj(Conj::No, rhs.as_mut());
        // The solution is in the top n rows
        ensure_finite(rhs.submatrix(0, 0, n, 1).to_owned(), "sparse QR")
    }
}

impl SparseLinearSolver for SparseQRSolver {
    fn solve_normal_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let (m, n) = (jacobian.nrows(), jacobian.ncols());
        if m < n {
            return Err(LinAlgError::SingularSystem(format!(
                "underdetermined system: {m} residuals for {n} unknowns"
            ))
            .log());
        }
        Self::least_squares(&mut self.plain_pattern, jacobian, -residuals)
    }

    fn solve_augmented_equation(
        &mut self,
        residuals: &Mat<f64>,
        jacobian: &SparseColMat<usize, f64>,
        damping: &Mat<f64>,
    ) -> LinAlgResult<Mat<f64>> {
        let (m, n) = (jacobian.nrows(), jacobian.ncols());

        let symbolic = jacobian.symbolic();
        let mut triplets = Vec::with_capacity(symbolic.compute_nnz() + n);
        for col in 0..n {
            let rows = symbolic.row_idx_of_col_raw(col);
            let values = jacobian.val_of_col(col);
            for (&row, &value) in rows.iter().zip(values) {
                triplets.push(Triplet::new(row, col, value));
            }
            triplets.push(Triplet::new(m + col, col, damping[(col, 0)].max(0.0).sqrt()));
        }
        let stacked = SparseColMat::try_new_from_triplets(m + n, n, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("failed to build augmented Jacobian".into())
                .log_with_source(e)
        })?;

        let rhs = Mat::from_fn(m + n, 1, |i, _| if i < m { -residuals[(i, 0)] } else { 0.0 });
        Self::least_squares(&mut self.stacked_pattern, &stacked, rhs)
    }
}
