//! Levenberg-Marquardt step control.
//!
//! The damped direction solves `(JᵀJ + λD) Δ = −Jᵀr` with the scaling
//! `D = diag(JᵀJ)` clamped to `[min_diagonal, max_diagonal]`. Each step is
//! judged by the gain ratio
//!
//! ```text
//! ρ = (F(x) − F(x ⊕ Δ)) / L,    L = ½ Δᵀ(λDΔ − g)
//! ```
//!
//! where `L` is the decrease predicted by the linear model. Damping follows
//! the update of Madsen, Nielsen and Tingleff (2004):
//! - accept (`ρ > min_relative_decrease`): `λ ← λ·max(1/3, 1 − (2ρ − 1)³)`, `ν ← 2`
//! - reject: `λ ← λ·ν`, `ν ← 2ν`

use super::OptimizerConfig;
use super::step_length::{StepContext, StepDecision, StepLengthController, dot};
use crate::error::GraphOptResult;
use crate::linalg::LinearSystem;
use faer::Mat;
use tracing::debug;

/// Predicted reductions below this are treated as zero.
const PREDICTED_REDUCTION_EPSILON: f64 = 1e-15;

/// Damping parameter `λ` and its growth factor `ν`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingState {
    pub lambda: f64,
    pub nu: f64,
    pub min: f64,
    pub max: f64,
}

impl DampingState {
    pub fn new(lambda: f64, min: f64, max: f64) -> Self {
        Self {
            lambda: lambda.clamp(min, max),
            nu: 2.0,
            min,
            max,
        }
    }

    fn on_accept(&mut self, rho: f64) {
        let factor = (1.0 - (2.0 * rho - 1.0).powi(3)).max(1.0 / 3.0);
        self.lambda = (self.lambda * factor).clamp(self.min, self.max);
        self.nu = 2.0;
    }

    fn on_reject(&mut self) {
        self.lambda = (self.lambda * self.nu).clamp(self.min, self.max);
        self.nu *= 2.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardtStep {
    state: DampingState,
    min_relative_decrease: f64,
    min_diagonal: f64,
    max_diagonal: f64,
}

impl LevenbergMarquardtStep {
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self {
            state: DampingState::new(config.damping, config.damping_min, config.damping_max),
            min_relative_decrease: config.min_relative_decrease,
            min_diagonal: config.min_diagonal,
            max_diagonal: config.max_diagonal,
        }
    }

    pub fn state(&self) -> &DampingState {
        &self.state
    }

    /// `L = ½ Δᵀ(λDΔ − g)`
    pub fn predicted_reduction(context: &StepContext<'_>) -> f64 {
        let damped = context.damping.map_or(0.0, |d| {
            (0..d.nrows())
                .map(|i| d[(i, 0)] * context.direction[(i, 0)].powi(2))
                .sum()
        });
        0.5 * (damped - dot(context.gradient, context.direction))
    }

    /// Actual over predicted reduction.
    pub fn gain_ratio(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        let actual_reduction = current_cost - new_cost;
        if predicted_reduction.abs() < PREDICTED_REDUCTION_EPSILON {
            if actual_reduction > 0.0 { 1.0 } else { 0.0 }
        } else {
            actual_reduction / predicted_reduction
        }
    }
}

impl Default for LevenbergMarquardtStep {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

impl StepLengthController for LevenbergMarquardtStep {
    fn damping(&self, system: &LinearSystem) -> Option<Mat<f64>> {
        let diagonal = system.hessian_diagonal();
        Some(Mat::from_fn(diagonal.nrows(), 1, |i, _| {
            self.state.lambda * diagonal[(i, 0)].clamp(self.min_diagonal, self.max_diagonal)
        }))
    }

    fn increase_damping(&mut self) -> bool {
        if self.state.lambda >= self.state.max {
            return false;
        }
        self.state.on_reject();
        debug!("Damping increased to {:.3e}", self.state.lambda);
        true
    }

    fn compute(
        &mut self,
        context: &StepContext<'_>,
        trial_cost: &mut dyn FnMut(f64) -> GraphOptResult<f64>,
    ) -> GraphOptResult<StepDecision> {
        let new_cost = trial_cost(1.0)?;
        let predicted = Self::predicted_reduction(context);
        let rho = Self::gain_ratio(context.current_cost, new_cost, predicted);

        if new_cost.is_finite() && rho > self.min_relative_decrease {
            self.state.on_accept(rho);
            Ok(StepDecision::Accept {
                step_length: 1.0,
                new_cost,
            })
        } else {
            debug!(
                "Rejected damped step: rho {:.3e}, cost {:.6e} -> {:.6e}",
                rho, context.current_cost, new_cost
            );
            self.state.on_reject();
            Ok(StepDecision::Reject { exhausted: false })
        }
    }

    fn current_damping(&self) -> Option<f64> {
        Some(self.state.lambda)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> Mat<f64> {
        Mat::from_fn(values.len(), 1, |i, _| values[i])
    }

    #[test]
    fn test_predicted_reduction() {
        // λD = 1, Δ = −1, g = 2: L = ½(1 + 2)
        let direction = column(&[-1.0]);
        let gradient = column(&[2.0]);
        let damping = column(&[1.0]);
        let context = StepContext {
            current_cost: 2.0,
            direction: &direction,
            gradient: &gradient,
            damping: Some(&damping),
        };
        assert!((LevenbergMarquardtStep::predicted_reduction(&context) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_gain_ratio_zero_prediction() {
        assert_eq!(LevenbergMarquardtStep::gain_ratio(1.0, 0.5, 0.0), 1.0);
        assert_eq!(LevenbergMarquardtStep::gain_ratio(1.0, 1.5, 0.0), 0.0);
        assert!((LevenbergMarquardtStep::gain_ratio(1.0, 0.5, 1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_accept_decreases_damping() {
        let mut controller = LevenbergMarquardtStep::default();
        let lambda = controller.state().lambda;
        let direction = column(&[-1.0]);
        let gradient = column(&[2.0]);
        let damping = column(&[0.0]);
        let context = StepContext {
            current_cost: 2.0,
            direction: &direction,
            gradient: &gradient,
            damping: Some(&damping),
        };
        // Predicted reduction 1, actual 1: ρ = 1
        let decision = controller.compute(&context, &mut |_| Ok(1.0)).unwrap();
        assert!(decision.is_accepted());
        assert!((controller.state().lambda - lambda / 3.0).abs() < 1e-18);
        assert_eq!(controller.state().nu, 2.0);
    }

    #[test]
    fn test_reject_increases_damping() {
        let mut controller = LevenbergMarquardtStep::default();
        let lambda = controller.state().lambda;
        let direction = column(&[-1.0]);
        let gradient = column(&[2.0]);
        let context = StepContext {
            current_cost: 2.0,
            direction: &direction,
            gradient: &gradient,
            damping: None,
        };
        let decision = controller.compute(&context, &mut |_| Ok(3.0)).unwrap();
        assert_eq!(decision, StepDecision::Reject { exhausted: false });
        assert!((controller.state().lambda - 2.0 * lambda).abs() < 1e-18);
        assert_eq!(controller.state().nu, 4.0);

        controller.compute(&context, &mut |_| Ok(3.0)).unwrap();
        assert!((controller.state().lambda - 8.0 * lambda).abs() < 1e-18);
    }

    #[test]
    fn test_damping_clamped() {
        let mut state = DampingState::new(1e11, 1e-12, 1e12);
        for _ in 0..5 {
            state.on_reject();
        }
        assert_eq!(state.lambda, 1e12);
        let mut state = DampingState::new(1e-12, 1e-12, 1e12);
        state.on_accept(1.0);
        assert_eq!(state.lambda, 1e-12);
    }

    #[test]
    fn test_increase_damping_stops_at_max() {
        let mut config = OptimizerConfig::default();
        config.damping = config.damping_max;
        let mut controller = LevenbergMarquardtStep::from_config(&config);
        assert!(!controller.increase_damping());
    }
}
