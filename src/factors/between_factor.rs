use super::{Factor, Linearization};
use crate::manifold::{ManifoldResult, ManifoldType};
use nalgebra::{DMatrix, DVector};

/// Relative measurement between two Euclidean variables.
///
/// Connected as `[xᵢ, xⱼ]`, the measurement is the expected difference
/// `xⱼ − xᵢ`:
///
/// ```text
/// r = z − (xⱼ − xᵢ)
/// ∂r/∂xᵢ =  I
/// ∂r/∂xⱼ = −I
/// ```
#[derive(Debug, Clone)]
pub struct BetweenFactor {
    dimension: usize,
}

impl BetweenFactor {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Factor for BetweenFactor {
    fn factor_type(&self) -> &'static str {
        "BetweenFactor"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn variable_manifolds(&self) -> Vec<ManifoldType> {
        vec![ManifoldType::Rn(self.dimension); 2]
    }

    fn linearize(
        &self,
        measurement: &DVector<f64>,
        values: &[&DVector<f64>],
        compute_jacobian: bool,
    ) -> ManifoldResult<Linearization> {
        let predicted = values[1] - values[0];
        let residual = measurement - predicted;

        let jacobian = compute_jacobian.then(|| {
            let n = self.dimension;
            let mut jacobian = DMatrix::zeros(n, 2 * n);
            jacobian
                .view_mut((0, 0), (n, n))
                .fill_with_identity();
            jacobian
                .view_mut((0, n), (n, n))
                .copy_from(&-DMatrix::<f64>::identity(n, n));
            jacobian
        });

        Ok((residual, jacobian))
    }
}
