//! Collaborator traits for the process being supervised.
//!
//! The supervisor never updates parameters itself. It drives a [`Trainable`]
//! one step at a time; [`ModelTrainer`] adapts any [`Model`] plus a resettable
//! [`DataSource`] into that shape.

use crate::error::ModelError;

/// A resettable source of training or validation batches.
pub trait DataSource: Send {
    type Batch;

    /// Whether another batch is available in the current pass.
    fn has_next(&self) -> bool;

    /// Take the next batch of the current pass.
    fn next_batch(&mut self) -> Option<Self::Batch>;

    /// Rewind to the start of the data.
    fn reset(&mut self);
}

/// A model that can take a parameter update from a batch and score a batch.
pub trait Model: Clone + Send {
    type Batch;

    /// Apply one parameter update using `batch`, returning the step's training loss.
    fn fit_batch(&mut self, batch: &Self::Batch) -> Result<f64, ModelError>;

    /// Loss on `batch` without touching parameters.
    fn score(&self, batch: &Self::Batch) -> Result<f64, ModelError>;
}

/// The process driven by [`crate::EarlyStoppingTrainer`].
pub trait Trainable {
    type Model: Clone;

    /// Prepare a new pass over the training data.
    fn begin_epoch(&mut self);

    /// Apply exactly one parameter update. The returned value is the cheap
    /// per-step score estimate used by iteration-level conditions.
    fn advance_one_step(&mut self) -> Result<f64, ModelError>;

    /// Whether the current pass over the training data is finished.
    fn is_epoch_complete(&self) -> bool;

    /// The live model.
    fn model(&self) -> &Self::Model;

    /// An owned copy of the current model state.
    fn snapshot(&self) -> Self::Model {
        self.model().clone()
    }
}

/// Drives a [`Model`] over a [`DataSource`], one batch per step.
#[derive(Debug, Clone)]
pub struct ModelTrainer<M, D> {
    model: M,
    data: D,
}

impl<M, D> ModelTrainer<M, D>
where
    M: Model,
    D: DataSource<Batch = M::Batch>,
{
    pub fn new(model: M, data: D) -> Self {
        Self { model, data }
    }

    pub fn into_model(self) -> M {
        self.model
    }
}

impl<M, D> Trainable for ModelTrainer<M, D>
where
    M: Model,
    D: DataSource<Batch = M::Batch>,
{
    type Model = M;

    fn begin_epoch(&mut self) {
        self.data.reset();
    }

    fn advance_one_step(&mut self) -> Result<f64, ModelError> {
        let batch = self.data.next_batch().ok_or_else(|| ModelError::StepFailed {
            message: "data source exhausted mid-epoch".into(),
        })?;
        self.model.fit_batch(&batch)
    }

    fn is_epoch_complete(&self) -> bool {
        !self.data.has_next()
    }

    fn model(&self) -> &M {
        &self.model
    }
}

/// In-memory batch source that hands out clones of a fixed batch list.
#[derive(Debug, Clone)]
pub struct VecDataSource<B> {
    batches: Vec<B>,
    cursor: usize,
}

impl<B: Clone + Send> VecDataSource<B> {
    pub fn new(batches: Vec<B>) -> Self {
        Self { batches, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<B: Clone + Send> DataSource for VecDataSource<B> {
    type Batch = B;

    fn has_next(&self) -> bool {
        self.cursor < self.batches.len()
    }

    fn next_batch(&mut self) -> Option<B> {
        let batch = self.batches.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(batch)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Running mean of the batch values; the "loss" is the distance to it.
    #[derive(Debug, Clone, Default)]
    struct MeanModel {
        mean: f64,
        seen: u32,
    }

    impl Model for MeanModel {
        type Batch = f64;

        fn fit_batch(&mut self, batch: &f64) -> Result<f64, ModelError> {
            self.seen += 1;
            self.mean += (batch - self.mean) / f64::from(self.seen);
            self.score(batch)
        }

        fn score(&self, batch: &f64) -> Result<f64, ModelError> {
            Ok((batch - self.mean).abs())
        }
    }

    #[test]
    fn test_vec_data_source_reset() {
        let mut data = VecDataSource::new(vec![1.0, 2.0]);
        assert_eq!(data.next_batch(), Some(1.0));
        assert_eq!(data.next_batch(), Some(2.0));
        assert!(!data.has_next());
        assert_eq!(data.next_batch(), None);
        data.reset();
        assert!(data.has_next());
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_model_trainer_epoch_walk() {
        let mut trainer = ModelTrainer::new(MeanModel::default(), VecDataSource::new(vec![2.0, 4.0]));
        trainer.begin_epoch();
        let mut steps = 0;
        while !trainer.is_epoch_complete() {
            trainer.advance_one_step().unwrap();
            steps += 1;
        }
        assert_eq!(steps, 2);
        assert_eq!(trainer.model().mean, 3.0);

        trainer.begin_epoch();
        assert!(!trainer.is_epoch_complete());
    }

    #[test]
    fn test_model_trainer_exhausted_source_is_step_failure() {
        let mut trainer = ModelTrainer::new(MeanModel::default(), VecDataSource::<f64>::new(vec![]));
        trainer.begin_epoch();
        assert!(trainer.is_epoch_complete());
        let err = trainer.advance_one_step().unwrap_err();
        assert!(matches!(err, ModelError::StepFailed { .. }));
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut trainer = ModelTrainer::new(MeanModel::default(), VecDataSource::new(vec![10.0]));
        let before = trainer.snapshot();
        trainer.begin_epoch();
        trainer.advance_one_step().unwrap();
        assert_eq!(before.seen, 0);
        assert_eq!(trainer.model().seen, 1);
        assert_eq!(trainer.into_model().mean, 10.0);
    }
}
