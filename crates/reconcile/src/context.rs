//! Execution context: progress reporting and cancellation
//!
//! These let the engine run without depending on any terminal UI.

use crate::plan::{Plan, Step};
use crate::types::{PlanResult, StepRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use xekit::ArgumentVector;

/// Progress callback for plan execution
///
/// Implement this trait to receive progress updates while a plan runs.
pub trait ProgressCallback: Send {
    /// Called once before the first step, with the index execution starts at
    fn on_plan_start(&mut self, plan: &Plan, first_step: usize);

    /// Called when a step's command has been built and is about to run
    fn on_step_start(&mut self, index: usize, step: &Step, args: &ArgumentVector);

    /// Called when a step finishes, successfully or not
    fn on_step_complete(&mut self, record: &StepRecord);

    /// Called once when the plan stops
    fn on_plan_complete(&mut self, result: &PlanResult);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&mut self, _plan: &Plan, _first_step: usize) {}
    fn on_step_start(&mut self, _index: usize, _step: &Step, _args: &ArgumentVector) {}
    fn on_step_complete(&mut self, _record: &StepRecord) {}
    fn on_plan_complete(&mut self, _result: &PlanResult) {}
}

/// Shared cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The running step is allowed to finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
