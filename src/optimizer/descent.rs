//! Descent driver and the top-level optimize loop.

use super::step_length::dot;
use super::{
    CancellationToken, ConvergenceReason, GaussNewtonStep, GraphUpdater, IterationStats,
    LevenbergMarquardtStep, OptObserver, OptObserverVec, OptimizationScheme, OptimizationStatus,
    OptimizationSummary, OptimizerConfig, OptimizerError, OptimizerState, StepContext,
    StepDecision, StepLengthController,
};
use crate::core::{FactorGraph, Linearizer, VariableOrdering, check_ready};
use crate::error::{GraphOptError, GraphOptResult};
use crate::linalg::{DirectionSolver, LinAlgError, ensure_finite};
use faer::Mat;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Floor of the previous cost in the relative cost-change test.
const COST_FLOOR: f64 = 1e-10;

/// Outcome of one [`Optimizer::descend`] call.
#[derive(Debug, Clone)]
pub struct DescentStep {
    /// Search direction over the free variables, in ordering layout
    pub direction: Mat<f64>,
    /// Scale applied to `direction`; `0` when the step was rejected
    pub step_length: f64,
    pub cost_before: f64,
    /// Cost after the update, equal to `cost_before` when rejected
    pub cost_after: f64,
    pub accepted: bool,
    /// The step controller found no acceptable step along this direction
    pub exhausted: bool,
    pub stats: IterationStats,
}

/// Minimizes the weighted squared error of a borrowed factor graph.
///
/// The optimizer keeps the mutable borrow for its lifetime, so the graph
/// topology cannot change underneath it. Variable values are written only
/// through [`GraphUpdater`].
pub struct Optimizer<'g> {
    graph: &'g mut FactorGraph,
    config: OptimizerConfig,
    ordering: VariableOrdering,
    direction_solver: DirectionSolver,
    step_control: Box<dyn StepLengthController>,
    observers: OptObserverVec,
    cancellation: CancellationToken,
    state: OptimizerState,
    iteration: usize,
    non_descent_directions: usize,
    start: Option<Instant>,
}

impl<'g> Optimizer<'g> {
    /// Validate the configuration and derive the column layout of the graph.
    pub fn new(graph: &'g mut FactorGraph, config: OptimizerConfig) -> GraphOptResult<Self> {
        config.validate()?;
        let ordering = VariableOrdering::from_graph(&*graph);
        let step_control: Box<dyn StepLengthController> = match config.optimization_scheme {
            OptimizationScheme::GaussNewton => Box::new(GaussNewtonStep::from_config(&config)),
            OptimizationScheme::LevenbergMarquardt => {
                Box::new(LevenbergMarquardtStep::from_config(&config))
            }
        };
        let direction_solver =
            DirectionSolver::new(config.linear_solver_type, config.use_reordering);

        Ok(Self {
            graph,
            config,
            ordering,
            direction_solver,
            step_control,
            observers: OptObserverVec::new(),
            cancellation: CancellationToken::new(),
            state: OptimizerState::Ready,
            iteration: 0,
            non_descent_directions: 0,
            start: None,
        })
    }

    pub fn graph(&self) -> &FactorGraph {
        &*self.graph
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn ordering(&self) -> &VariableOrdering {
        &self.ordering
    }

    pub fn state(&self) -> &OptimizerState {
        &self.state
    }

    /// Number of descent iterations run so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn add_observer(&mut self, observer: Box<dyn OptObserver>) {
        self.observers.add(observer);
    }

    /// Token that stops [`Optimizer::optimize`] at the next iteration boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run one descent iteration: linearize, solve for the direction, choose
    /// the step length and apply the update if the step is accepted.
    pub fn descend(&mut self) -> GraphOptResult<DescentStep> {
        let clock = self.start.unwrap_or_else(Instant::now);
        self.iteration += 1;

        let system = Linearizer::new(&*self.graph).build(&self.ordering)?;
        let cost_before = system.cost();
        let gradient = ensure_finite(system.gradient(), "gradient")?;
        let gradient_norm = (0..gradient.nrows())
            .map(|i| gradient[(i, 0)].abs())
            .fold(0.0, f64::max);

        // Stationary point: the system may be rank deficient (gauge freedom),
        // so no solve is attempted.
        if gradient_norm < self.config.gradient_tolerance {
            debug!(
                "Iteration {}: gradient norm {gradient_norm:.3e} below tolerance, zero step",
                self.iteration
            );
            let stats = IterationStats {
                iteration: self.iteration,
                cost: cost_before,
                new_cost: cost_before,
                gradient_norm,
                step_norm: 0.0,
                step_length: 1.0,
                damping: self.step_control.current_damping(),
                directional_derivative: 0.0,
                accepted: true,
                elapsed: clock.elapsed(),
            };
            return Ok(DescentStep {
                direction: Mat::zeros(self.ordering.total_dof(), 1),
                step_length: 1.0,
                cost_before,
                cost_after: cost_before,
                accepted: true,
                exhausted: false,
                stats,
            });
        }

        let mut retries = 0;
        let (direction, damping) = loop {
            let damping = self.step_control.damping(&system);
            match self.direction_solver.solve(&system, damping.as_ref()) {
                Ok(direction) => break (direction, damping),
                Err(e) => {
                    if retries < self.config.max_damping_retries
                        && self.step_control.increase_damping()
                    {
                        retries += 1;
                        warn!("Linear solve failed ({e}), retry {retries} with more damping");
                        continue;
                    }
                    return Err(e.into());
                }
            }
        };

        let directional_derivative = self.check_descent(&gradient, &direction);

        let context = StepContext {
            current_cost: cost_before,
            direction: &direction,
            gradient: &gradient,
            damping: damping.as_ref(),
        };
        let decision = {
            let graph: &FactorGraph = &*self.graph;
            let ordering = &self.ordering;
            let mut trial_cost = |step_length: f64| -> GraphOptResult<f64> {
                let proposal = GraphUpdater::propose(graph, ordering, &direction, step_length)?;
                let values = GraphUpdater::trial_values(graph, &proposal);
                Linearizer::new(graph).cost(Some(&values))
            };
            self.step_control.compute(&context, &mut trial_cost)?
        };

        let (step_length, cost_after, exhausted) = match decision {
            StepDecision::Accept {
                step_length,
                new_cost,
            } => {
                if !new_cost.is_finite() {
                    return Err(LinAlgError::SingularSystem(format!(
                        "step of length {step_length} produced a non-finite cost"
                    ))
                    .log()
                    .into());
                }
                GraphUpdater::apply(&mut *self.graph, &self.ordering, &direction, step_length)?;
                (step_length, new_cost, false)
            }
            StepDecision::Reject { exhausted } => (0.0, cost_before, exhausted),
        };

        let stats = IterationStats {
            iteration: self.iteration,
            cost: cost_before,
            new_cost: cost_after,
            gradient_norm,
            step_norm: step_length * direction.norm_l2(),
            step_length,
            damping: self.step_control.current_damping(),
            directional_derivative,
            accepted: decision.is_accepted(),
            elapsed: clock.elapsed(),
        };

        Ok(DescentStep {
            direction,
            step_length,
            cost_before,
            cost_after,
            accepted: decision.is_accepted(),
            exhausted,
            stats,
        })
    }

    /// `gᵀΔ` for the search direction. A non-zero direction with `gᵀΔ ≥ 0` is
    /// logged and counted but does not stop the run.
    fn check_descent(&mut self, gradient: &Mat<f64>, direction: &Mat<f64>) -> f64 {
        let directional_derivative = dot(gradient, direction);
        let nonzero = (0..direction.nrows()).any(|i| direction[(i, 0)] != 0.0);
        if nonzero && directional_derivative >= 0.0 {
            self.non_descent_directions += 1;
            warn!(
                "Iteration {}: direction is not a descent direction (g = {:.3e})",
                self.iteration, directional_derivative
            );
        }
        directional_derivative
    }

    /// Run descent iterations until a terminal state.
    ///
    /// Refuses to start unless the graph passes the readiness check. Numerical
    /// and manifold failures end the run with [`OptimizationStatus::Failed`];
    /// graph structure errors are returned as errors.
    pub fn optimize(&mut self) -> GraphOptResult<OptimizationSummary> {
        if self.state != OptimizerState::Ready {
            return Err(OptimizerError::InvalidState(format!(
                "optimize called in state {:?}",
                self.state
            ))
            .log()
            .into());
        }

        let report = check_ready(&*self.graph, self.config.verbose);
        if !report.is_ready() {
            warn!("Refusing to optimize: {report}");
            return Err(GraphOptError::NotReady(report));
        }

        let start = Instant::now();
        self.start = Some(start);
        self.state = OptimizerState::Iterating;
        if self.config.verbose {
            info!(
                "Starting {} with {} on {} free variables ({} dof)",
                self.config.optimization_scheme,
                self.config.linear_solver_type,
                self.ordering.len(),
                self.ordering.total_dof()
            );
            info!("{}", self.graph.statistics());
        }

        let mut tracker = RunTracker::default();
        let status = match Linearizer::new(&*self.graph).cost(None) {
            Ok(initial_cost) => {
                tracker.initial_cost = initial_cost;
                tracker.cost = initial_cost;
                tracker.history.push(initial_cost);
                self.iterate(&mut tracker, start)?
            }
            Err(e) if ends_run(&e) => {
                tracker.initial_cost = f64::NAN;
                tracker.cost = f64::NAN;
                OptimizationStatus::Failed(e.to_string())
            }
            Err(e) => {
                self.state = OptimizerState::Terminated(OptimizationStatus::Failed(e.to_string()));
                return Err(e);
            }
        };

        self.state = OptimizerState::Terminated(status.clone());
        let summary = OptimizationSummary {
            scheme: self.config.optimization_scheme,
            linear_solver: self.config.linear_solver_type,
            status,
            convergence_reason: tracker.reason,
            initial_cost: tracker.initial_cost,
            final_cost: tracker.cost,
            iterations: self.iteration,
            successful_steps: tracker.successful_steps,
            unsuccessful_steps: tracker.unsuccessful_steps,
            non_descent_directions: self.non_descent_directions,
            final_gradient_norm: tracker.gradient_norm,
            final_step_norm: tracker.step_norm,
            final_damping: self.step_control.current_damping(),
            cost_history: tracker.history,
            total_time: start.elapsed(),
        };

        if self.config.verbose {
            info!("{summary}");
        }
        self.observers.notify_finish(&*self.graph, &summary);
        Ok(summary)
    }

    fn iterate(
        &mut self,
        tracker: &mut RunTracker,
        start: Instant,
    ) -> GraphOptResult<OptimizationStatus> {
        if self.ordering.is_empty() {
            tracker.reason = Some(ConvergenceReason::NoFreeVariables);
            return Ok(OptimizationStatus::Converged);
        }

        IterationStats::print_header();
        loop {
            if self.cancellation.is_cancelled() {
                info!("Optimization cancelled after {} iterations", self.iteration);
                return Ok(OptimizationStatus::Cancelled);
            }
            if let Some(timeout) = self.config.timeout
                && start.elapsed() >= timeout
            {
                return Ok(OptimizationStatus::Timeout);
            }
            if self.iteration >= self.config.max_iterations {
                return Ok(OptimizationStatus::MaxIterationsReached);
            }

            let step = match self.descend() {
                Ok(step) => step,
                Err(e) if ends_run(&e) => {
                    debug!("Iteration {} failed: {e}", self.iteration);
                    return Ok(OptimizationStatus::Failed(e.to_string()));
                }
                Err(e) => return Err(e),
            };

            step.stats.print_line();
            self.observers.notify(&*self.graph, &step.stats);
            tracker.history.push(step.cost_after);
            tracker.gradient_norm = step.stats.gradient_norm;
            tracker.step_norm = step.stats.step_norm;

            if step.stats.gradient_norm < self.config.gradient_tolerance {
                tracker.cost = step.cost_after;
                tracker.successful_steps += usize::from(step.accepted);
                tracker.unsuccessful_steps += usize::from(!step.accepted);
                tracker.reason = Some(ConvergenceReason::GradientTolerance);
                return Ok(OptimizationStatus::Converged);
            }

            if !step.accepted {
                tracker.unsuccessful_steps += 1;
                if step.exhausted {
                    tracker.reason = Some(ConvergenceReason::NoDecreasingStep);
                    return Ok(OptimizationStatus::Converged);
                }
                continue;
            }

            tracker.successful_steps += 1;
            let previous_cost = tracker.cost;
            tracker.cost = step.cost_after;

            let value_norm = self.free_value_norm();
            let tolerance = self.config.parameter_tolerance;
            if step.stats.step_norm <= tolerance * (value_norm + tolerance) {
                tracker.reason = Some(ConvergenceReason::ParameterTolerance);
                return Ok(OptimizationStatus::Converged);
            }

            let relative_change =
                (previous_cost - step.cost_after).abs() / previous_cost.max(COST_FLOOR);
            if relative_change < self.config.cost_tolerance {
                tracker.reason = Some(ConvergenceReason::CostTolerance);
                return Ok(OptimizationStatus::Converged);
            }
        }
    }

    /// Euclidean norm of all free variable values stacked.
    fn free_value_norm(&self) -> f64 {
        self.ordering
            .entries()
            .iter()
            .map(|e| self.graph.variables()[e.graph_index].value().norm_squared())
            .sum::<f64>()
            .sqrt()
    }
}

/// Running totals of one optimize call.
#[derive(Debug, Default)]
struct RunTracker {
    initial_cost: f64,
    cost: f64,
    history: Vec<f64>,
    successful_steps: usize,
    unsuccessful_steps: usize,
    gradient_norm: f64,
    step_norm: f64,
    reason: Option<ConvergenceReason>,
}

/// Errors that end a run with `Failed` instead of being returned.
fn ends_run(error: &GraphOptError) -> bool {
    error.is_numerical() || matches!(error, GraphOptError::Manifold(_))
}
