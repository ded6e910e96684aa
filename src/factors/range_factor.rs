use super::{Factor, Linearization};
use crate::manifold::{ManifoldResult, ManifoldType};
use nalgebra::{DMatrix, DVector, dvector};

/// Distance measurement between two Euclidean points.
///
/// Connected as `[xᵢ, xⱼ]` with `d = xⱼ − xᵢ` and `u = d / ‖d‖`:
///
/// ```text
/// r = z − ‖d‖
/// ∂r/∂xᵢ =  uᵀ
/// ∂r/∂xⱼ = −uᵀ
/// ```
///
/// The gradient is undefined for coincident points; the Jacobian is zero there.
#[derive(Debug, Clone)]
pub struct RangeFactor {
    point_dimension: usize,
}

impl RangeFactor {
    /// `point_dimension` is the dimension of the connected points (2 or 3 typically).
    pub fn new(point_dimension: usize) -> Self {
        Self { point_dimension }
    }
}

impl Factor for RangeFactor {
    fn factor_type(&self) -> &'static str {
        "RangeFactor"
    }

    fn dimension(&self) -> usize {
        1
    }

    fn variable_manifolds(&self) -> Vec<ManifoldType> {
        vec![ManifoldType::Rn(self.point_dimension); 2]
    }

    fn linearize(
        &self,
        measurement: &DVector<f64>,
        values: &[&DVector<f64>],
        compute_jacobian: bool,
    ) -> ManifoldResult<Linearization> {
        let difference = values[1] - values[0];
        let distance = difference.norm();
        let residual = dvector![measurement[0] - distance];

        let jacobian = compute_jacobian.then(|| {
            let n = self.point_dimension;
            let mut jacobian = DMatrix::zeros(1, 2 * n);
            if distance > f64::EPSILON {
                let direction = difference / distance;
                for k in 0..n {
                    jacobian[(0, k)] = direction[k];
                    jacobian[(0, n + k)] = -direction[k];
                }
            }
            jacobian
        });

        Ok((residual, jacobian))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_residual() {
        let factor = RangeFactor::new(2);
        let a = dvector![0.0, 0.0];
        let b = dvector![3.0, 4.0];
        let (residual, _) = factor.linearize(&dvector![4.0], &[&a, &b], false).unwrap();
        assert!((residual[0] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_range_jacobian_matches_finite_difference() {
        let factor = RangeFactor::new(2);
        let z = dvector![2.0];
        let a = dvector![0.2, -0.1];
        let b = dvector![1.5, 0.7];
        let (r0, jacobian) = factor.linearize(&z, &[&a, &b], true).unwrap();
        let jacobian = jacobian.unwrap();

        let h = 1e-7;
        for k in 0..2 {
            let mut b_perturbed = b.clone();
            b_perturbed[k] += h;
            let (r1, _) = factor.linearize(&z, &[&a, &b_perturbed], false).unwrap();
            let numeric = (r1[0] - r0[0]) / h;
            assert!((numeric - jacobian[(0, 2 + k)]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_range_coincident_points_zero_jacobian() {
        let factor = RangeFactor::new(3);
        let a = dvector![1.0, 1.0, 1.0];
        let (_, jacobian) = factor.linearize(&dvector![1.0], &[&a, &a], true).unwrap();
        assert!(jacobian.unwrap().iter().all(|v| *v == 0.0));
    }
}
