//! Step-length control shared by the optimization schemes.

use crate::error::GraphOptResult;
use crate::linalg::LinearSystem;
use faer::Mat;

/// Quantities at the current linearization point needed to judge a step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// `F = ½‖r‖²` at the current values
    pub current_cost: f64,
    /// Search direction `Δ`
    pub direction: &'a Mat<f64>,
    /// `g = Jᵀ r`
    pub gradient: &'a Mat<f64>,
    /// `λD` used to compute `Δ`, when damped
    pub damping: Option<&'a Mat<f64>>,
}

impl StepContext<'_> {
    /// `gᵀΔ = rᵀ J Δ`, negative for a descent direction.
    pub fn directional_derivative(&self) -> f64 {
        dot(self.gradient, self.direction)
    }
}

/// Outcome of step-length control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepDecision {
    /// Apply `step_length · Δ`; `new_cost` is the cost at the proposed values
    Accept { step_length: f64, new_cost: f64 },
    /// Apply nothing. `exhausted` means no further progress is possible
    /// along this direction.
    Reject { exhausted: bool },
}

impl StepDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StepDecision::Accept { .. })
    }

    pub fn step_length(&self) -> f64 {
        match self {
            StepDecision::Accept { step_length, .. } => *step_length,
            StepDecision::Reject { .. } => 0.0,
        }
    }
}

/// Decides how far to move along a search direction.
///
/// `trial_cost(α)` evaluates the cost at `x ⊕ αΔ` without modifying the
/// graph; controllers may call it any number of times.
pub trait StepLengthController {
    /// Damping diagonal for the linear solve, `None` for an undamped system.
    fn damping(&self, system: &LinearSystem) -> Option<Mat<f64>>;

    /// Increase damping after a failed solve. Returns `false` when the
    /// controller cannot regularize further.
    fn increase_damping(&mut self) -> bool;

    fn compute(
        &mut self,
        context: &StepContext<'_>,
        trial_cost: &mut dyn FnMut(f64) -> GraphOptResult<f64>,
    ) -> GraphOptResult<StepDecision>;

    /// Current damping parameter, if the scheme has one.
    fn current_damping(&self) -> Option<f64> {
        None
    }
}

pub(crate) fn dot(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    (0..a.nrows()).map(|i| a[(i, 0)] * b[(i, 0)]).sum()
}
