use super::{Factor, Linearization};
use crate::manifold::{ManifoldResult, ManifoldType};
use nalgebra::{DMatrix, DVector};

/// Prior on a Euclidean variable.
///
/// ```text
/// r = z − x,   ∂r/∂x = −I
/// ```
#[derive(Debug, Clone)]
pub struct PriorFactor {
    dimension: usize,
}

impl PriorFactor {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Factor for PriorFactor {
    fn factor_type(&self) -> &'static str {
        "PriorFactor"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn variable_manifolds(&self) -> Vec<ManifoldType> {
        vec![ManifoldType::Rn(self.dimension)]
    }

    fn linearize(
        &self,
        measurement: &DVector<f64>,
        values: &[&DVector<f64>],
        compute_jacobian: bool,
    ) -> ManifoldResult<Linearization> {
        let residual = measurement - values[0];
        let jacobian = compute_jacobian
            .then(|| -DMatrix::<f64>::identity(self.dimension, self.dimension));
        Ok((residual, jacobian))
    }
}
