//! The early-stopping supervisor.
//!
//! [`EarlyStoppingTrainer::fit`] drives a [`Trainable`] one step at a time on
//! the caller's thread. After every step it polls the iteration-level
//! conditions; after every pass over the training data it scores the model,
//! updates the best-so-far bookkeeping, checkpoints the "best" and "latest"
//! candidates and polls the epoch-level conditions. The first condition to
//! fire ends the run.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::EarlyStoppingConfig;
use crate::error::{EarlyStoppingError, ModelError, Phase, Result};
use crate::listener::{EarlyStoppingListener, notify_all};
use crate::result::{EarlyStoppingResult, TerminationReason};
use crate::termination::{EpochContext, IterationContext, first_epoch_match, first_iteration_match};
use crate::trainable::Trainable;

/// Bookkeeping for a single `fit()` call. Discarded when the call returns.
struct RunState {
    run_id: String,
    epoch: usize,
    completed_epochs: usize,
    iterations: u64,
    best_score: f64,
    best_epoch: Option<usize>,
    score_vs_epoch: BTreeMap<usize, f64>,
    started: Instant,
    started_at: chrono::DateTime<Utc>,
}

impl RunState {
    fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            epoch: 0,
            completed_epochs: 0,
            iterations: 0,
            best_score: f64::INFINITY,
            best_epoch: None,
            score_vs_epoch: BTreeMap::new(),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Record an epoch score. Returns true on a strict improvement.
    fn record_score(&mut self, score: f64) -> bool {
        self.score_vs_epoch.insert(self.epoch, score);
        if score < self.best_score {
            self.best_score = score;
            self.best_epoch = Some(self.epoch);
            true
        } else {
            false
        }
    }
}

/// Supervises one trainable process under an [`EarlyStoppingConfig`].
pub struct EarlyStoppingTrainer<T: Trainable> {
    config: EarlyStoppingConfig<T::Model>,
    trainable: T,
    listeners: Vec<Box<dyn EarlyStoppingListener<T::Model>>>,
}

impl<T: Trainable> EarlyStoppingTrainer<T> {
    pub fn new(config: EarlyStoppingConfig<T::Model>, trainable: T) -> Self {
        Self {
            config,
            trainable,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: impl EarlyStoppingListener<T::Model> + 'static) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn add_listener(&mut self, listener: impl EarlyStoppingListener<T::Model> + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn config(&self) -> &EarlyStoppingConfig<T::Model> {
        &self.config
    }

    pub fn trainable(&self) -> &T {
        &self.trainable
    }

    pub fn into_parts(self) -> (EarlyStoppingConfig<T::Model>, T) {
        (self.config, self.trainable)
    }

    /// Train until a termination condition fires.
    ///
    /// Blocks the calling thread. Saver and collaborator failures abort the
    /// run and no result is produced; listener failures are logged only.
    pub fn fit(&mut self) -> Result<EarlyStoppingResult<T::Model>> {
        match self.config.log_dispatch.clone() {
            Some(dispatch) => tracing::dispatcher::with_default(&dispatch, || self.run()),
            None => self.run(),
        }
    }

    fn run(&mut self) -> Result<EarlyStoppingResult<T::Model>> {
        let mut state = RunState::new();
        let span = tracing::info_span!("early_stopping", run_id = %state.run_id);
        let _enter = span.enter();

        for condition in self.config.epoch_conditions.iter_mut() {
            condition.initialize();
        }
        for condition in self.config.iteration_conditions.iter_mut() {
            condition.initialize();
        }
        tracing::info!(
            epoch_conditions = self.config.epoch_conditions.len(),
            iteration_conditions = self.config.iteration_conditions.len(),
            "Starting early stopping training"
        );

        let config = &self.config;
        let model = self.trainable.model();
        notify_all(&mut self.listeners, "on_start", |l| l.on_start(config, model));

        loop {
            self.trainable.begin_epoch();
            let steps_before = state.iterations;
            while !self.trainable.is_epoch_complete() {
                let last_score = self
                    .trainable
                    .advance_one_step()
                    .map_err(|source| EarlyStoppingError::Collaborator {
                        phase: Phase::Iteration,
                        source,
                    })?;
                state.iterations += 1;

                let ctx = IterationContext {
                    epoch: state.epoch,
                    iteration: state.iterations,
                    last_score,
                    elapsed: state.started.elapsed(),
                };
                if let Some(details) =
                    first_iteration_match(&mut self.config.iteration_conditions, &ctx)
                {
                    tracing::info!(
                        epoch = state.epoch,
                        iteration = state.iterations,
                        condition = %details,
                        "Iteration termination condition hit"
                    );
                    return self.finish(
                        state,
                        TerminationReason::IterationTerminationCondition,
                        details,
                    );
                }
            }
            // A pass with no steps never reaches the iteration checks.
            if state.iterations == steps_before {
                return Err(EarlyStoppingError::Collaborator {
                    phase: Phase::Iteration,
                    source: ModelError::StepFailed {
                        message: format!("epoch {} produced no training steps", state.epoch),
                    },
                });
            }
            state.completed_epochs += 1;

            let score = self.score_epoch(&mut state)?;

            let config = &self.config;
            let model = self.trainable.model();
            let epoch = state.epoch;
            notify_all(&mut self.listeners, "on_epoch", |l| {
                l.on_epoch(epoch, score, config, model)
            });

            let ctx = EpochContext {
                epoch: state.epoch,
                score,
            };
            if let Some(details) = first_epoch_match(&mut self.config.epoch_conditions, &ctx) {
                tracing::info!(
                    epoch = state.epoch,
                    condition = %details,
                    "Epoch termination condition hit"
                );
                return self.finish(state, TerminationReason::EpochTerminationCondition, details);
            }

            state.epoch += 1;
        }
    }

    /// Score the finished epoch and checkpoint the candidates.
    fn score_epoch(&mut self, state: &mut RunState) -> Result<Option<f64>> {
        let model = self.trainable.model();
        let score = match self.config.score_calculator.as_mut() {
            Some(calculator) => Some(calculator.calculate(model).map_err(|source| {
                EarlyStoppingError::Collaborator {
                    phase: Phase::Epoch,
                    source,
                }
            })?),
            None => None,
        };

        let persist = |source| EarlyStoppingError::Persistence {
            phase: Phase::Epoch,
            source,
        };
        if let Some(score) = score {
            if state.record_score(score) {
                tracing::info!(epoch = state.epoch, score, "New best model");
                self.config
                    .model_saver
                    .save_best(model, state.epoch, Some(score))
                    .map_err(persist)?;
            } else {
                tracing::debug!(
                    epoch = state.epoch,
                    score,
                    best_score = state.best_score,
                    "No improvement"
                );
            }
        }
        self.config
            .model_saver
            .save_latest(model, state.epoch, score)
            .map_err(persist)?;

        Ok(score)
    }

    fn finish(
        &mut self,
        state: RunState,
        reason: TerminationReason,
        details: String,
    ) -> Result<EarlyStoppingResult<T::Model>> {
        let finalize = |source| EarlyStoppingError::Persistence {
            phase: Phase::Finalize,
            source,
        };
        let best_model = if self.config.score_calculator.is_none() {
            self.trainable.snapshot()
        } else if let Some(best) = self.config.model_saver.get_best().map_err(finalize)? {
            best
        } else if let Some(latest) = self.config.model_saver.get_latest().map_err(finalize)? {
            tracing::debug!("No improving epoch recorded; using latest checkpoint");
            latest
        } else {
            tracing::debug!("No checkpoint written yet; using current model");
            self.trainable.snapshot()
        };

        let result = EarlyStoppingResult {
            run_id: state.run_id,
            termination_reason: reason,
            termination_details: details,
            best_model_score: state.best_epoch.map(|_| state.best_score),
            best_model_epoch: state.best_epoch,
            score_vs_epoch: state.score_vs_epoch,
            total_epochs: state.completed_epochs,
            total_iterations: state.iterations,
            elapsed: state.started.elapsed(),
            started_at: state.started_at,
            finished_at: Utc::now(),
            best_model,
        };
        tracing::info!(
            reason = %result.termination_reason,
            total_epochs = result.total_epochs,
            best_epoch = ?result.best_model_epoch,
            "Early stopping training complete"
        );

        notify_all(&mut self.listeners, "on_completion", |l| l.on_completion(&result));
        Ok(result)
    }
}
