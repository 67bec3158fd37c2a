//! # earlystop-core
//!
//! Early-stopping supervisor for iterative model training.
//! Wraps a trainable process, polls pluggable termination conditions after
//! every step and every epoch, tracks the validation score, checkpoints the
//! best and latest candidates, and returns the best model seen.

pub mod config;
pub mod error;
pub mod listener;
pub mod result;
pub mod saver;
pub mod score;
pub mod termination;
pub mod trainable;
pub mod trainer;

// Re-export commonly used types at the crate root.
pub use config::{
    EarlyStoppingConfig, EarlyStoppingConfigBuilder, EpochConditionSettings,
    IterationConditionSettings, SaverSettings, SupervisorSettings, load_settings,
};
pub use error::{
    ConfigError, EarlyStoppingError, ListenerError, ModelError, Phase, Result, SaverError,
};
pub use listener::{EarlyStoppingListener, LoggingListener};
pub use result::{EarlyStoppingResult, RunSummary, TerminationReason};
pub use saver::{CheckpointRecord, InMemoryModelSaver, LocalFileModelSaver, ModelSaver, Slot};
pub use score::{DataSetLossCalculator, ScoreCalculator};
pub use termination::{
    BestScore, CancellationFlag, Cancelled, EpochContext, EpochTerminationCondition, InvalidScore,
    IterationContext, IterationTerminationCondition, MaxEpochs, MaxScore, MaxTime,
    NoImprovementInNEpochs,
};
pub use trainable::{DataSource, Model, ModelTrainer, Trainable, VecDataSource};
pub use trainer::EarlyStoppingTrainer;
pub use tokio_util::sync::CancellationToken;
