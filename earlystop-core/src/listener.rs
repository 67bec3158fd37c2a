//! Lifecycle listeners notified by the supervisor.

use crate::config::EarlyStoppingConfig;
use crate::error::ListenerError;
use crate::result::EarlyStoppingResult;

/// Receives start, per-epoch and completion notifications.
///
/// Listeners are notified in registration order. A returned error is logged
/// and otherwise ignored: a faulty listener never stops training.
pub trait EarlyStoppingListener<M>: Send {
    fn on_start(&mut self, _config: &EarlyStoppingConfig<M>, _model: &M) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_epoch(
        &mut self,
        _epoch: usize,
        _score: Option<f64>,
        _config: &EarlyStoppingConfig<M>,
        _model: &M,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn on_completion(&mut self, _result: &EarlyStoppingResult<M>) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Name used in log output when the listener fails.
    fn name(&self) -> &str {
        "EarlyStoppingListener"
    }
}

/// Emits an `info` event for every lifecycle callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl<M> EarlyStoppingListener<M> for LoggingListener {
    fn on_start(&mut self, config: &EarlyStoppingConfig<M>, _model: &M) -> Result<(), ListenerError> {
        tracing::info!(
            epoch_conditions = ?config.epoch_condition_descriptions(),
            iteration_conditions = ?config.iteration_condition_descriptions(),
            scored = config.has_score_calculator(),
            "Early stopping run started"
        );
        Ok(())
    }

    fn on_epoch(
        &mut self,
        epoch: usize,
        score: Option<f64>,
        _config: &EarlyStoppingConfig<M>,
        _model: &M,
    ) -> Result<(), ListenerError> {
        match score {
            Some(score) => tracing::info!(epoch, score, "Epoch complete"),
            None => tracing::info!(epoch, "Epoch complete (unscored)"),
        }
        Ok(())
    }

    fn on_completion(&mut self, result: &EarlyStoppingResult<M>) -> Result<(), ListenerError> {
        tracing::info!(
            reason = %result.termination_reason,
            details = %result.termination_details,
            total_epochs = result.total_epochs,
            best_epoch = ?result.best_model_epoch,
            best_score = ?result.best_model_score,
            "Early stopping run complete"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// Call `event` on every listener, isolating and logging failures.
pub(crate) fn notify_all<M>(
    listeners: &mut [Box<dyn EarlyStoppingListener<M>>],
    event: &'static str,
    mut call: impl FnMut(&mut dyn EarlyStoppingListener<M>) -> Result<(), ListenerError>,
) {
    for listener in listeners.iter_mut() {
        if let Err(e) = call(listener.as_mut()) {
            tracing::warn!(listener = listener.name(), event, error = %e, "Listener failed; continuing");
        }
    }
}
