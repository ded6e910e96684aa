//! Properties that must hold across optimizer configurations
//!
//! These tests compare runs against each other rather than against ground
//! truth: column reordering and the choice of linear solver must not change the
//! answer, damped steps never raise the cost, and the readiness check is a pure
//! function of the graph.

use graphopt::linalg::LinearSolverType;
use graphopt::optimizer::{
    IterationStats, OptObserver, OptimizerError, OptimizerState, parse_linear_solver,
};
use graphopt::{
    FactorGraph, GraphOptError, ManifoldType, OptimizationScheme, OptimizationStatus,
    OptimizationSummary, Optimizer, OptimizerConfig, VariableNode, check_ready,
};
use nalgebra::{DVector, dvector};
use std::sync::{Arc, Mutex};

mod graph_test_utils;
use graph_test_utils::*;

fn max_difference(a: &[DVector<f64>], b: &[DVector<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).amax())
        .fold(0.0, f64::max)
}

fn solve_chain(config: OptimizerConfig) -> Result<Vec<DVector<f64>>, Box<dyn std::error::Error>> {
    let mut graph = se2_chain(8, 0.3)?;
    let summary = Optimizer::new(&mut graph, config)?.optimize()?;
    assert!(summary.is_success(), "{summary}");
    Ok(graph.values())
}

// ============================================================================
// Solver independence
// ============================================================================

#[test]
fn test_reordering_does_not_change_solution() -> TestResult {
    for solver in [LinearSolverType::SparseQR, LinearSolverType::SparseCholesky] {
        let base = OptimizerConfig::default().with_linear_solver_type(solver);
        let natural = solve_chain(base.clone().with_reordering(false))?;
        let reordered = solve_chain(base.with_reordering(true))?;
        let difference = max_difference(&natural, &reordered);
        assert!(difference < 1e-9, "{solver}: difference {difference}");
    }
    Ok(())
}

#[test]
fn test_qr_and_cholesky_agree() -> TestResult {
    for scheme in [
        OptimizationScheme::GaussNewton,
        OptimizationScheme::LevenbergMarquardt,
    ] {
        let base = OptimizerConfig::default().with_optimization_scheme(scheme);
        let qr = solve_chain(base.clone().with_linear_solver_type(LinearSolverType::SparseQR))?;
        let cholesky =
            solve_chain(base.with_linear_solver_type(LinearSolverType::SparseCholesky))?;
        let difference = max_difference(&qr, &cholesky);
        assert!(difference < 1e-9, "{scheme}: difference {difference}");
    }
    Ok(())
}

// ============================================================================
// Step control
// ============================================================================

#[test]
fn test_levenberg_marquardt_cost_never_increases() -> TestResult {
    for initial in [dvector![9.0, -3.0], dvector![-5.0, 12.0], dvector![5.0, 5.0]] {
        let mut graph = range_network(initial)?;
        let config = OptimizerConfig::default()
            .with_optimization_scheme(OptimizationScheme::LevenbergMarquardt)
            .with_damping(1.0);
        let summary = Optimizer::new(&mut graph, config)?.optimize()?;

        assert_eq!(summary.cost_history.len(), summary.iterations + 1);
        for pair in summary.cost_history.windows(2) {
            assert!(pair[1] <= pair[0], "cost went up: {:?}", summary.cost_history);
        }
        assert_eq!(summary.non_descent_directions, 0);
        assert_eq!(
            summary.successful_steps + summary.unsuccessful_steps,
            summary.iterations
        );
    }
    Ok(())
}

#[test]
fn test_gauss_newton_directions_descend() -> TestResult {
    let mut graph = se2_chain(8, 0.3)?;
    let summary = Optimizer::new(&mut graph, OptimizerConfig::default())?.optimize()?;
    assert_eq!(summary.non_descent_directions, 0);
    assert_eq!(summary.final_damping, None);
    Ok(())
}

// ============================================================================
// Readiness and configuration
// ============================================================================

#[test]
fn test_readiness_check_is_idempotent() -> TestResult {
    let mut graph = anchored_pair(dvector![2.0, 2.0])?;
    graph.add_variable(VariableNode::uninitialized("c", ManifoldType::Rn(2)))?;
    let before = graph.values();

    let first = check_ready(&graph, false);
    let second = check_ready(&graph, true);
    assert_eq!(first, second);
    assert!(!first.is_ready());
    assert_eq!(first.num_problems(), 1);
    assert_eq!(max_difference(&graph.values()[..2], &before[..2]), 0.0);

    let ready = anchored_pair(dvector![2.0, 2.0])?;
    assert!(check_ready(&ready, false).is_ready());
    assert_eq!(check_ready(&ready, false).to_string(), "ready");
    Ok(())
}

#[test]
fn test_name_parsing() -> TestResult {
    assert_eq!(
        "LM".parse::<OptimizationScheme>()?,
        OptimizationScheme::LevenbergMarquardt
    );
    assert_eq!(
        "gauss-newton".parse::<OptimizationScheme>()?,
        OptimizationScheme::GaussNewton
    );
    assert!(matches!(
        "newton".parse::<OptimizationScheme>(),
        Err(OptimizerError::InvalidConfiguration(_))
    ));

    assert_eq!(
        parse_linear_solver("Cholesky")?,
        LinearSolverType::SparseCholesky
    );
    assert_eq!(parse_linear_solver("qr")?, LinearSolverType::SparseQR);
    assert!(matches!(
        parse_linear_solver("lu"),
        Err(OptimizerError::InvalidConfiguration(_))
    ));

    let config = OptimizerConfig::from_names("LM", "qr")?;
    assert_eq!(
        config.optimization_scheme,
        OptimizationScheme::LevenbergMarquardt
    );
    assert_eq!(config.linear_solver_type, LinearSolverType::SparseQR);
    let mut graph = se2_chain(4, 0.2)?;
    let summary = Optimizer::new(&mut graph, config)?.optimize()?;
    assert!(summary.is_success(), "{summary}");
    Ok(())
}

#[test]
fn test_statistics_match_optimizer_layout() -> TestResult {
    let mut graph = se2_chain(5, 0.2)?;
    let stats = graph.statistics();
    assert_eq!(stats.num_variables, 5);
    assert_eq!(stats.num_fixed_variables, 1);
    assert_eq!(stats.num_factors, 4);

    let config = OptimizerConfig::default().with_verbose(true);
    let mut optimizer = Optimizer::new(&mut graph, config)?;
    assert_eq!(stats.num_free_variables, optimizer.ordering().len());
    assert_eq!(stats.total_free_dof, optimizer.ordering().total_dof());
    assert_eq!(stats.total_free_dof, 12);
    assert_eq!(stats.total_residual_dimension, 12);

    assert!(optimizer.optimize()?.is_success());
    assert_eq!(graph.statistics(), stats);
    Ok(())
}

#[test]
fn test_invalid_configuration_rejected_at_construction() -> TestResult {
    let invalid = [
        OptimizerConfig::default().with_max_iterations(0),
        OptimizerConfig::default().with_damping_bounds(1.0, 0.1),
        OptimizerConfig::default().with_line_search(1.5, 1e-8),
        OptimizerConfig::default().with_cost_tolerance(f64::NAN),
        OptimizerConfig::default().with_min_relative_decrease(1.0),
    ];
    for config in invalid {
        let mut graph = anchored_pair(dvector![2.0, 2.0])?;
        let result = Optimizer::new(&mut graph, config);
        assert!(matches!(
            result,
            Err(GraphOptError::Optimizer(
                OptimizerError::InvalidConfiguration(_)
            ))
        ));
    }
    Ok(())
}

// ============================================================================
// Observers and cancellation
// ============================================================================

#[derive(Default)]
struct Log {
    iterations: Vec<usize>,
    accepted: Vec<bool>,
    finished: Option<usize>,
}

struct Recorder(Arc<Mutex<Log>>);

impl OptObserver for Recorder {
    fn on_iteration(&mut self, _graph: &FactorGraph, stats: &IterationStats) {
        if let Ok(mut log) = self.0.lock() {
            log.iterations.push(stats.iteration);
            log.accepted.push(stats.accepted);
        }
    }

    fn on_finish(&mut self, _graph: &FactorGraph, summary: &OptimizationSummary) {
        if let Ok(mut log) = self.0.lock() {
            log.finished = Some(summary.iterations);
        }
    }
}

#[test]
fn test_observer_sees_every_iteration() -> TestResult {
    let log = Arc::new(Mutex::new(Log::default()));
    let mut graph = se2_chain(6, 0.3)?;
    let mut optimizer = Optimizer::new(&mut graph, OptimizerConfig::default())?;
    optimizer.add_observer(Box::new(Recorder(log.clone())));
    let summary = optimizer.optimize()?;

    let log = log.lock().map_err(|e| e.to_string())?;
    let expected: Vec<usize> = (1..=summary.iterations).collect();
    assert_eq!(log.iterations, expected);
    assert_eq!(
        log.accepted.iter().filter(|a| **a).count(),
        summary.successful_steps
    );
    assert_eq!(log.finished, Some(summary.iterations));
    Ok(())
}

struct CancelAfter {
    iteration: usize,
    token: graphopt::CancellationToken,
}

impl OptObserver for CancelAfter {
    fn on_iteration(&mut self, _graph: &FactorGraph, stats: &IterationStats) {
        if stats.iteration >= self.iteration {
            self.token.cancel();
        }
    }
}

#[test]
fn test_cancellation_from_observer() -> TestResult {
    let mut graph = se2_chain(8, 0.3)?;
    let mut optimizer = Optimizer::new(&mut graph, OptimizerConfig::default())?;
    let token = optimizer.cancellation_token();
    optimizer.add_observer(Box::new(CancelAfter {
        iteration: 1,
        token,
    }));

    let summary = optimizer.optimize()?;
    assert_eq!(summary.status, OptimizationStatus::Cancelled);
    assert_eq!(summary.iterations, 1);
    assert!(matches!(
        optimizer.state(),
        OptimizerState::Terminated(OptimizationStatus::Cancelled)
    ));

    let again = optimizer.optimize();
    assert!(matches!(
        again,
        Err(GraphOptError::Optimizer(OptimizerError::InvalidState(_)))
    ));
    Ok(())
}
