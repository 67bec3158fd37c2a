//! Built-in demo: a linear-regression model trained with mini-batch SGD on
//! synthetic data.

use earlystop_core::{Model, ModelError, VecDataSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One labelled example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f64>,
    pub target: f64,
}

pub type Batch = Vec<Sample>;

/// `y = w·x + b`, fitted against mean squared error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub learning_rate: f64,
}

impl LinearModel {
    pub fn new(features: usize, learning_rate: f64) -> Self {
        Self {
            weights: vec![0.0; features],
            bias: 0.0,
            learning_rate,
        }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias
    }

    fn mse(&self, batch: &[Sample]) -> Result<f64, ModelError> {
        if batch.is_empty() {
            return Err(ModelError::ScoreFailed {
                message: "empty batch".into(),
            });
        }
        let total: f64 = batch
            .iter()
            .map(|s| (self.predict(&s.features) - s.target).powi(2))
            .sum();
        Ok(total / batch.len() as f64)
    }
}

impl Model for LinearModel {
    type Batch = Batch;

    fn fit_batch(&mut self, batch: &Batch) -> Result<f64, ModelError> {
        if batch.is_empty() {
            return Err(ModelError::StepFailed {
                message: "empty batch".into(),
            });
        }
        let n = batch.len() as f64;
        let mut grad_w = vec![0.0; self.weights.len()];
        let mut grad_b = 0.0;
        for sample in batch {
            let err = self.predict(&sample.features) - sample.target;
            for (g, x) in grad_w.iter_mut().zip(&sample.features) {
                *g += 2.0 * err * x / n;
            }
            grad_b += 2.0 * err / n;
        }
        for (w, g) in self.weights.iter_mut().zip(&grad_w) {
            *w -= self.learning_rate * g;
        }
        self.bias -= self.learning_rate * grad_b;

        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err(ModelError::Diverged {
                message: format!("parameters left the finite range (lr={})", self.learning_rate),
            });
        }
        self.mse(batch)
    }

    fn score(&self, batch: &Batch) -> Result<f64, ModelError> {
        self.mse(batch)
    }
}

/// Shape of the synthetic regression problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetSpec {
    pub features: usize,
    pub samples: usize,
    pub batch_size: usize,
    /// Fraction of samples held out for validation.
    pub validation_fraction: f64,
    pub noise: f64,
    pub seed: u64,
}

impl Default for DatasetSpec {
    fn default() -> Self {
        Self {
            features: 4,
            samples: 1_000,
            batch_size: 32,
            validation_fraction: 0.2,
            noise: 0.1,
            seed: 42,
        }
    }
}

/// Fewest samples that leave both a training and a validation split.
pub const MIN_SAMPLES: usize = 2;

/// Training and validation batches drawn from one random linear function.
pub struct Dataset {
    pub train: VecDataSource<Batch>,
    pub validation: VecDataSource<Batch>,
    pub true_weights: Vec<f64>,
    pub true_bias: f64,
}

pub fn generate(spec: &DatasetSpec) -> Dataset {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let true_weights: Vec<f64> = (0..spec.features).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let true_bias = rng.gen_range(-1.0..1.0);

    let samples: Vec<Sample> = (0..spec.samples)
        .map(|_| {
            let features: Vec<f64> = (0..spec.features).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let clean: f64 = true_weights
                .iter()
                .zip(&features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
                + true_bias;
            let noise = if spec.noise > 0.0 {
                rng.gen_range(-spec.noise..spec.noise)
            } else {
                0.0
            };
            Sample {
                features,
                target: clean + noise,
            }
        })
        .collect();

    let held_out = ((spec.samples as f64) * spec.validation_fraction).round() as usize;
    // At least one sample on each side once there are two to split.
    let held_out = held_out.max(1).min(spec.samples.saturating_sub(1));
    let split = spec.samples - held_out;
    let batch_size = spec.batch_size.max(1);
    let to_batches = |slice: &[Sample]| -> Vec<Batch> {
        slice.chunks(batch_size).map(|c| c.to_vec()).collect()
    };

    Dataset {
        train: VecDataSource::new(to_batches(&samples[..split])),
        validation: VecDataSource::new(to_batches(&samples[split..])),
        true_weights,
        true_bias,
    }
}
