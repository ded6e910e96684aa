//! Gauss-Newton step control.
//!
//! The Gauss-Newton direction solves the undamped system `JᵀJ Δ = −Jᵀr`.
//! By default the full step is taken. With line search enabled the step is
//! halved (by `shrink`) until the cost strictly decreases; if the step
//! length drops below `min_step_length` the direction is abandoned.

use super::OptimizerConfig;
use super::step_length::{StepContext, StepDecision, StepLengthController};
use crate::error::GraphOptResult;
use crate::linalg::LinearSystem;
use faer::Mat;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct GaussNewtonStep {
    line_search: bool,
    shrink: f64,
    min_step_length: f64,
}

impl GaussNewtonStep {
    pub fn new(line_search: bool, shrink: f64, min_step_length: f64) -> Self {
        Self {
            line_search,
            shrink,
            min_step_length,
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(
            config.line_search,
            config.line_search_shrink,
            config.min_step_length,
        )
    }
}

impl Default for GaussNewtonStep {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

impl StepLengthController for GaussNewtonStep {
    fn damping(&self, _system: &LinearSystem) -> Option<Mat<f64>> {
        None
    }

    fn increase_damping(&mut self) -> bool {
        false
    }

    fn compute(
        &mut self,
        context: &StepContext<'_>,
        trial_cost: &mut dyn FnMut(f64) -> GraphOptResult<f64>,
    ) -> GraphOptResult<StepDecision> {
        if !self.line_search {
            let new_cost = trial_cost(1.0)?;
            return Ok(StepDecision::Accept {
                step_length: 1.0,
                new_cost,
            });
        }

        let mut step_length = 1.0;
        while step_length >= self.min_step_length {
            let new_cost = trial_cost(step_length)?;
            if new_cost < context.current_cost {
                return Ok(StepDecision::Accept {
                    step_length,
                    new_cost,
                });
            }
            debug!(
                "Line search: alpha {:.3e} gives cost {:.6e} >= {:.6e}",
                step_length, new_cost, context.current_cost
            );
            step_length *= self.shrink;
        }
        Ok(StepDecision::Reject { exhausted: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(direction: &'a Mat<f64>, gradient: &'a Mat<f64>) -> StepContext<'a> {
        StepContext {
            current_cost: 1.0,
            direction,
            gradient,
            damping: None,
        }
    }

    #[test]
    fn test_full_step_without_line_search() {
        let d = Mat::<f64>::zeros(1, 1);
        let g = Mat::<f64>::zeros(1, 1);
        let mut controller = GaussNewtonStep::new(false, 0.5, 1e-8);
        let decision = controller
            .compute(&context(&d, &g), &mut |_| Ok(5.0))
            .unwrap();
        assert_eq!(
            decision,
            StepDecision::Accept {
                step_length: 1.0,
                new_cost: 5.0
            }
        );
    }

    #[test]
    fn test_backtracking_halves_until_decrease() {
        let d = Mat::<f64>::zeros(1, 1);
        let g = Mat::<f64>::zeros(1, 1);
        let mut controller = GaussNewtonStep::new(true, 0.5, 1e-8);
        // Cost decreases only for α ≤ 0.25
        let decision = controller
            .compute(&context(&d, &g), &mut |alpha| {
                Ok(if alpha <= 0.25 { 0.5 } else { 2.0 })
            })
            .unwrap();
        assert_eq!(decision.step_length(), 0.25);
    }

    #[test]
    fn test_backtracking_gives_up() {
        let d = Mat::<f64>::zeros(1, 1);
        let g = Mat::<f64>::zeros(1, 1);
        let mut controller = GaussNewtonStep::new(true, 0.5, 1e-3);
        let mut calls = 0;
        let decision = controller
            .compute(&context(&d, &g), &mut |_| {
                calls += 1;
                Ok(1.0)
            })
            .unwrap();
        assert_eq!(decision, StepDecision::Reject { exhausted: true });
        // 1, 1/2, …, 1/512 ≥ 1e-3
        assert_eq!(calls, 10);
    }

    #[test]
    fn test_never_damped() {
        let mut controller = GaussNewtonStep::default();
        assert!(!controller.increase_damping());
        assert_eq!(controller.current_damping(), None);
    }
}
