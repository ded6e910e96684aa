//! Hooks for watching an optimization run.

use super::{IterationStats, OptimizationSummary};
use crate::core::FactorGraph;

/// Called by the optimizer after every iteration.
///
/// Observers see the graph after the iteration's update was committed.
pub trait OptObserver {
    fn on_iteration(&mut self, graph: &FactorGraph, stats: &IterationStats);

    /// Called once when the run terminates.
    fn on_finish(&mut self, _graph: &FactorGraph, _summary: &OptimizationSummary) {}
}

/// Collection of observers notified in registration order.
#[derive(Default)]
pub struct OptObserverVec {
    observers: Vec<Box<dyn OptObserver>>,
}

impl OptObserverVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Box<dyn OptObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&mut self, graph: &FactorGraph, stats: &IterationStats) {
        for observer in &mut self.observers {
            observer.on_iteration(graph, stats);
        }
    }

    pub fn notify_finish(&mut self, graph: &FactorGraph, summary: &OptimizationSummary) {
        for observer in &mut self.observers {
            observer.on_finish(graph, summary);
        }
    }
}

impl std::fmt::Debug for OptObserverVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptObserverVec")
            .field("len", &self.observers.len())
            .finish()
    }
}
