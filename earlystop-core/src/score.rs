//! Validation scoring used at epoch boundaries. Lower is better.

use crate::error::ModelError;
use crate::trainable::{DataSource, Model};

/// Computes a scalar loss for a model against held-out data.
///
/// Implementations must not mutate the model. Any data they own is theirs
/// to rewind, and must be rewound before each call.
pub trait ScoreCalculator<M>: Send {
    fn calculate(&mut self, model: &M) -> Result<f64, ModelError>;
}

impl<M, F> ScoreCalculator<M> for F
where
    F: FnMut(&M) -> Result<f64, ModelError> + Send,
{
    fn calculate(&mut self, model: &M) -> Result<f64, ModelError> {
        self(model)
    }
}

/// Loss of a [`Model`] over every batch of a held-out [`DataSource`].
#[derive(Debug, Clone)]
pub struct DataSetLossCalculator<D> {
    data: D,
    average: bool,
}

impl<D: DataSource> DataSetLossCalculator<D> {
    /// With `average` the result is the mean per-batch loss, otherwise the sum.
    pub fn new(data: D, average: bool) -> Self {
        Self { data, average }
    }
}

impl<M, D> ScoreCalculator<M> for DataSetLossCalculator<D>
where
    M: Model,
    D: DataSource<Batch = M::Batch>,
{
    fn calculate(&mut self, model: &M) -> Result<f64, ModelError> {
        self.data.reset();
        let mut total = 0.0;
        let mut batches = 0usize;
        while let Some(batch) = self.data.next_batch() {
            total += model.score(&batch)?;
            batches += 1;
        }
        if batches == 0 {
            return Err(ModelError::ScoreFailed {
                message: "validation data source yielded no batches".into(),
            });
        }
        Ok(if self.average {
            total / batches as f64
        } else {
            total
        })
    }
}
