//! Error types for the early-stopping supervisor.
//!
//! Uses `thiserror` for public API error types. Fatal failures carry the
//! [`Phase`] of the run they happened in so the caller can tell a failed
//! training step apart from a failed checkpoint write.

use std::fmt;

/// Stage of a `fit()` run in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A single training step or the per-step condition checks.
    Iteration,
    /// Epoch-boundary scoring and checkpointing.
    Epoch,
    /// Retrieval of the best snapshot while building the result.
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Iteration => "iteration",
            Phase::Epoch => "epoch",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Top-level error returned by [`crate::EarlyStoppingTrainer::fit`].
#[derive(Debug, thiserror::Error)]
pub enum EarlyStoppingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error during {phase} phase: {source}")]
    Persistence {
        phase: Phase,
        #[source]
        source: SaverError,
    },

    #[error("Training collaborator failed during {phase} phase: {source}")]
    Collaborator {
        phase: Phase,
        #[source]
        source: ModelError,
    },
}

impl EarlyStoppingError {
    /// The phase a fatal error was raised in, if it is a runtime failure.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            EarlyStoppingError::Config(_) => None,
            EarlyStoppingError::Persistence { phase, .. }
            | EarlyStoppingError::Collaborator { phase, .. } => Some(*phase),
        }
    }
}

/// Errors from building or loading a supervisor configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No termination conditions configured; the run would never halt")]
    NoTerminationConditions,

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from a [`crate::ModelSaver`].
#[derive(Debug, thiserror::Error)]
pub enum SaverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checkpoint '{slot}' is corrupt: expected hash {expected}, found {actual}")]
    Corrupt {
        slot: String,
        expected: String,
        actual: String,
    },

    #[error("Model store unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors raised by the training collaborators (trainable process, score calculator).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Numerical divergence: {message}")]
    Diverged { message: String },

    #[error("Training step failed: {message}")]
    StepFailed { message: String },

    #[error("Score calculation failed: {message}")]
    ScoreFailed { message: String },
}

/// Error reported by a listener callback. Never aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener '{listener}' failed: {message}")]
    Failed { listener: String, message: String },
}

/// A type alias for results using [`EarlyStoppingError`].
pub type Result<T> = std::result::Result<T, EarlyStoppingError>;
