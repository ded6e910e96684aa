//! Shared utilities for optimizer integration tests
//!
//! Builders for small factor graphs with known optima. All perturbations are
//! deterministic so every run sees the same initial values.

#![allow(dead_code)]

use graphopt::manifold::SE2;
use graphopt::{
    BetweenFactor, BetweenFactorSE2, FactorGraph, FactorNode, LieGroup, ManifoldType,
    RangeFactor, VariableNode,
};
use nalgebra::{DVector, dvector};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Deterministic pseudo-noise in `[-amplitude, amplitude]`
///
/// # Arguments
/// * `index` - Sample index; the same index always yields the same value
/// * `amplitude` - Half-width of the range
pub fn perturbation(index: usize, amplitude: f64) -> f64 {
    let phase = (index as f64 * 0.618_033_988_75).fract();
    amplitude * (2.0 * phase - 1.0)
}

/// `a` fixed at the origin, `b` free at `b_init`, one between factor `ab`
/// measuring `b − a = (1, 1)`.
///
/// The optimum is `b = (1, 1)` with zero cost.
pub fn anchored_pair(b_init: DVector<f64>) -> Result<FactorGraph, Box<dyn std::error::Error>> {
    let mut graph = FactorGraph::new();
    graph.add_variable(
        VariableNode::new("a", ManifoldType::Rn(2), dvector![0.0, 0.0])?.with_fixed(true),
    )?;
    graph.add_variable(VariableNode::new("b", ManifoldType::Rn(2), b_init)?)?;
    graph.add_factor(FactorNode::with_unit_covariance(
        "ab",
        &["a", "b"],
        dvector![1.0, 1.0],
        Box::new(BetweenFactor::new(2)),
    )?)?;
    Ok(graph)
}

/// Ground-truth pose `i` of the SE(2) chain: a gentle left-turning arc.
pub fn chain_pose(i: usize) -> SE2 {
    let t = i as f64;
    SE2::from_xy_angle(t, 0.1 * t * t, 0.2 * t)
}

pub fn pose_name(i: usize) -> String {
    format!("x{i}")
}

/// SE(2) pose chain of `n` poses with exact odometry between neighbours.
///
/// `x0` is fixed at its true value; all other poses start perturbed by up to
/// `amplitude` in translation and `amplitude / 2` in heading.
pub fn se2_chain(n: usize, amplitude: f64) -> Result<FactorGraph, Box<dyn std::error::Error>> {
    let mut graph = FactorGraph::new();
    for i in 0..n {
        let truth = chain_pose(i);
        let initial = if i == 0 {
            truth.clone()
        } else {
            SE2::from_xy_angle(
                truth.x() + perturbation(3 * i, amplitude),
                truth.y() + perturbation(3 * i + 1, amplitude),
                truth.angle() + perturbation(3 * i + 2, amplitude / 2.0),
            )
        };
        graph.add_variable(
            VariableNode::new(pose_name(i), ManifoldType::SE2, initial.to_vector())?
                .with_fixed(i == 0),
        )?;
    }

    for i in 1..n {
        let relative = chain_pose(i - 1).inverse().compose(&chain_pose(i));
        let from = pose_name(i - 1);
        let to = pose_name(i);
        graph.add_factor(FactorNode::with_unit_covariance(
            format!("odom{i}"),
            &[from.as_str(), to.as_str()],
            BetweenFactorSE2::measurement(relative.x(), relative.y(), relative.angle()),
            Box::new(BetweenFactorSE2::new()),
        )?)?;
    }
    Ok(graph)
}

/// Fixed anchors surrounding the true target position `(3, 4)`.
pub const RANGE_ANCHORS: [(f64, f64); 4] = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];

/// One free 2D point `target` observed by range factors from fixed anchors.
///
/// The target starts at `initial`; the measurements are the exact distances
/// to `(3, 4)`.
pub fn range_network(initial: DVector<f64>) -> Result<FactorGraph, Box<dyn std::error::Error>> {
    let truth = dvector![3.0, 4.0];
    let mut graph = FactorGraph::new();
    graph.add_variable(VariableNode::new("target", ManifoldType::Rn(2), initial)?)?;

    for (k, (x, y)) in RANGE_ANCHORS.iter().enumerate() {
        let anchor = dvector![*x, *y];
        let distance = (&truth - &anchor).norm();
        let name = format!("anchor{k}");
        graph.add_variable(
            VariableNode::new(name.as_str(), ManifoldType::Rn(2), anchor)?.with_fixed(true),
        )?;
        graph.add_factor(FactorNode::with_unit_covariance(
            format!("range{k}"),
            &[name.as_str(), "target"],
            dvector![distance],
            Box::new(RangeFactor::new(2)),
        )?)?;
    }
    Ok(graph)
}

/// Largest absolute translation and heading errors of the chain against ground truth.
pub fn chain_error(
    graph: &FactorGraph,
    n: usize,
) -> Result<(f64, f64), Box<dyn std::error::Error>> {
    let mut translation: f64 = 0.0;
    let mut heading: f64 = 0.0;
    for i in 0..n {
        let value = graph
            .value(&pose_name(i))
            .ok_or_else(|| format!("missing pose {i}"))?;
        let estimate = SE2::from_vector(value)?;
        let truth = chain_pose(i);
        translation = translation
            .max((estimate.x() - truth.x()).abs())
            .max((estimate.y() - truth.y()).abs());
        let delta = estimate.inverse().compose(&truth).angle();
        heading = heading.max(delta.abs());
    }
    Ok((translation, heading))
}
