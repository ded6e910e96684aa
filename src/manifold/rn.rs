//! Euclidean space Rⁿ, where `⊕` and `⊖` are plain vector addition and subtraction.

use super::{ManifoldResult, check_shape};
use nalgebra::DVector;

fn name(n: usize) -> String {
    format!("R{n}")
}

pub fn oplus(n: usize, value: &DVector<f64>, increment: &DVector<f64>) -> ManifoldResult<DVector<f64>> {
    check_shape(&name(n), value, n)?;
    Ok(value + increment)
}

pub fn ominus(n: usize, a: &DVector<f64>, b: &DVector<f64>) -> ManifoldResult<DVector<f64>> {
    check_shape(&name(n), a, n)?;
    check_shape(&name(n), b, n)?;
    Ok(a - b)
}
