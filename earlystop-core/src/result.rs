//! Outcome of an early-stopping run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Which kind of condition ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    IterationTerminationCondition,
    EpochTerminationCondition,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::IterationTerminationCondition => {
                f.write_str("IterationTerminationCondition")
            }
            TerminationReason::EpochTerminationCondition => f.write_str("EpochTerminationCondition"),
        }
    }
}

/// Produced once at the end of [`crate::EarlyStoppingTrainer::fit`].
#[derive(Debug, Clone)]
pub struct EarlyStoppingResult<M> {
    pub run_id: String,
    pub termination_reason: TerminationReason,
    /// Description of the condition that fired.
    pub termination_details: String,
    /// Validation score per epoch, for every epoch that was scored.
    pub score_vs_epoch: BTreeMap<usize, f64>,
    pub best_model_epoch: Option<usize>,
    pub best_model_score: Option<f64>,
    /// Epochs that ran to completion.
    pub total_epochs: usize,
    pub total_iterations: u64,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub best_model: M,
}

impl<M> EarlyStoppingResult<M> {
    pub fn into_best_model(self) -> M {
        self.best_model
    }

    /// Everything but the model, in a serialisable form.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            termination_reason: self.termination_reason,
            termination_details: self.termination_details.clone(),
            score_vs_epoch: self.score_vs_epoch.clone(),
            best_model_epoch: self.best_model_epoch,
            best_model_score: self.best_model_score,
            total_epochs: self.total_epochs,
            total_iterations: self.total_iterations,
            elapsed_secs: self.elapsed.as_secs_f64(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

impl<M> fmt::Display for EarlyStoppingResult<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EarlyStoppingResult(terminationReason={}, details={}, bestModelEpoch={}, bestModelScore={}, totalEpochs={}, totalIterations={})",
            self.termination_reason,
            self.termination_details,
            self.best_model_epoch
                .map_or_else(|| "none".to_string(), |e| e.to_string()),
            self.best_model_score
                .map_or_else(|| "none".to_string(), |s| format!("{s:.6}")),
            self.total_epochs,
            self.total_iterations,
        )
    }
}

/// Serialisable view of an [`EarlyStoppingResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub termination_reason: TerminationReason,
    pub termination_details: String,
    pub score_vs_epoch: BTreeMap<usize, f64>,
    pub best_model_epoch: Option<usize>,
    pub best_model_score: Option<f64>,
    pub total_epochs: usize,
    pub total_iterations: u64,
    pub elapsed_secs: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
