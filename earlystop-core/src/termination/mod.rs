//! Termination conditions: the pluggable policies that end a run.
//!
//! Two granularities exist. Iteration-level conditions are polled after
//! every training step; epoch-level conditions after every full pass over
//! the training data. Each kind is stored as an ordered sequence and the
//! first satisfied condition wins.
//!
//! A condition's `Display` output is its description. It is surfaced
//! verbatim as the run's termination details, so it must be deterministic
//! for identical parameters.

pub mod epoch;
pub mod iteration;

use std::fmt;
use std::time::Duration;

pub use epoch::{BestScore, MaxEpochs, NoImprovementInNEpochs};
pub use iteration::{CancellationFlag, Cancelled, InvalidScore, MaxScore, MaxTime};

/// State visible to iteration-level conditions after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationContext {
    /// Zero-based index of the epoch the step belongs to.
    pub epoch: usize,
    /// Steps taken since the run started, including this one.
    pub iteration: u64,
    /// Score estimate reported by the step just taken.
    pub last_score: f64,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
}

/// State visible to epoch-level conditions at an epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochContext {
    /// Zero-based index of the epoch that just completed.
    pub epoch: usize,
    /// Validation score of that epoch, if one was computed.
    pub score: Option<f64>,
}

impl EpochContext {
    /// Number of epochs completed, counting the current one.
    pub fn completed_epochs(&self) -> usize {
        self.epoch + 1
    }
}

/// A stateful predicate polled after every training step.
pub trait IterationTerminationCondition: fmt::Display + Send {
    /// Reset internal state. Called once at the start of every run.
    fn initialize(&mut self) {}

    /// Whether the run should stop now.
    fn terminate(&mut self, ctx: &IterationContext) -> bool;

    /// Human-readable identification of the condition and its parameters.
    fn describe(&self) -> String {
        self.to_string()
    }
}

/// A stateful predicate polled after every completed epoch.
pub trait EpochTerminationCondition: fmt::Display + Send {
    /// Reset internal state. Called once at the start of every run.
    fn initialize(&mut self) {}

    /// Whether the run should stop now.
    fn terminate(&mut self, ctx: &EpochContext) -> bool;

    /// Human-readable identification of the condition and its parameters.
    fn describe(&self) -> String {
        self.to_string()
    }
}

impl<C: IterationTerminationCondition + ?Sized> IterationTerminationCondition for Box<C> {
    fn initialize(&mut self) {
        (**self).initialize()
    }

    fn terminate(&mut self, ctx: &IterationContext) -> bool {
        (**self).terminate(ctx)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<C: EpochTerminationCondition + ?Sized> EpochTerminationCondition for Box<C> {
    fn initialize(&mut self) {
        (**self).initialize()
    }

    fn terminate(&mut self, ctx: &EpochContext) -> bool {
        (**self).terminate(ctx)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Evaluate `conditions` in order and return the description of the first
/// one that fires.
pub(crate) fn first_iteration_match(
    conditions: &mut [Box<dyn IterationTerminationCondition>],
    ctx: &IterationContext,
) -> Option<String> {
    conditions
        .iter_mut()
        .find_map(|c| c.terminate(ctx).then(|| c.describe()))
}

/// Epoch-level counterpart of [`first_iteration_match`].
pub(crate) fn first_epoch_match(
    conditions: &mut [Box<dyn EpochTerminationCondition>],
    ctx: &EpochContext,
) -> Option<String> {
    conditions
        .iter_mut()
        .find_map(|c| c.terminate(ctx).then(|| c.describe()))
}
