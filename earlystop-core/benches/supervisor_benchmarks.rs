use criterion::{Criterion, black_box, criterion_group, criterion_main};
use earlystop_core::{
    DataSetLossCalculator, EarlyStoppingConfig, EarlyStoppingTrainer, EpochContext,
    EpochTerminationCondition, InvalidScore, IterationContext, IterationTerminationCondition,
    MaxEpochs, MaxScore, MaxTime, Model, ModelError, ModelTrainer, NoImprovementInNEpochs,
    Trainable, VecDataSource,
};
use std::time::Duration;

/// Tracks the running mean of its batches. Cheap enough that the benchmark
/// measures supervisor overhead rather than training.
#[derive(Debug, Clone, Default)]
struct RunningMean {
    mean: f64,
    seen: f64,
}

impl Model for RunningMean {
    type Batch = f64;

    fn fit_batch(&mut self, batch: &f64) -> Result<f64, ModelError> {
        self.seen += 1.0;
        self.mean += (batch - self.mean) / self.seen;
        Ok((batch - self.mean).abs())
    }

    fn score(&self, batch: &f64) -> Result<f64, ModelError> {
        Ok((batch - self.mean).powi(2))
    }
}

/// Steps without doing any work, so only the loop itself is timed.
struct Idle {
    steps_per_epoch: usize,
    position: usize,
    model: u64,
}

impl Trainable for Idle {
    type Model = u64;

    fn begin_epoch(&mut self) {
        self.position = 0;
    }

    fn advance_one_step(&mut self) -> Result<f64, ModelError> {
        self.position += 1;
        self.model += 1;
        Ok(0.5)
    }

    fn is_epoch_complete(&self) -> bool {
        self.position >= self.steps_per_epoch
    }

    fn model(&self) -> &u64 {
        &self.model
    }
}

fn bench_supervisor_loop(c: &mut Criterion) {
    c.bench_function("fit_10_epochs_x_100_steps_unscored", |b| {
        b.iter(|| {
            let config = EarlyStoppingConfig::builder()
                .epoch_termination_condition(MaxEpochs::new(10))
                .iteration_termination_condition(MaxTime::new(Duration::from_secs(60)))
                .iteration_termination_condition(MaxScore::new(1e9))
                .iteration_termination_condition(InvalidScore)
                .build()
                .unwrap();
            let trainable = Idle {
                steps_per_epoch: 100,
                position: 0,
                model: 0,
            };
            EarlyStoppingTrainer::new(config, black_box(trainable))
                .fit()
                .unwrap()
        })
    });

    let train: Vec<f64> = (0..200).map(|i| (i % 17) as f64).collect();
    let validation: Vec<f64> = (0..50).map(|i| (i % 13) as f64).collect();
    c.bench_function("fit_model_trainer_with_validation", |b| {
        b.iter(|| {
            let config = EarlyStoppingConfig::builder()
                .epoch_termination_condition(MaxEpochs::new(20))
                .epoch_termination_condition(NoImprovementInNEpochs::new(5))
                .score_calculator(DataSetLossCalculator::new(
                    VecDataSource::new(validation.clone()),
                    true,
                ))
                .build()
                .unwrap();
            let trainable =
                ModelTrainer::new(RunningMean::default(), VecDataSource::new(train.clone()));
            EarlyStoppingTrainer::new(config, trainable).fit().unwrap()
        })
    });
}

fn bench_conditions(c: &mut Criterion) {
    c.bench_function("iteration_conditions_check", |b| {
        let mut conditions: Vec<Box<dyn IterationTerminationCondition>> = vec![
            Box::new(MaxTime::from_secs(3600)),
            Box::new(MaxScore::new(7.5)),
            Box::new(InvalidScore),
        ];
        let ctx = IterationContext {
            epoch: 3,
            iteration: 1_000,
            last_score: 0.25,
            elapsed: Duration::from_millis(1_500),
        };
        b.iter(|| {
            conditions
                .iter_mut()
                .any(|cond| cond.terminate(black_box(&ctx)))
        })
    });

    c.bench_function("no_improvement_over_100_epochs", |b| {
        b.iter(|| {
            let mut condition = NoImprovementInNEpochs::new(1_000);
            condition.initialize();
            for epoch in 0..100 {
                let ctx = EpochContext {
                    epoch,
                    score: Some(1.0 / (epoch + 1) as f64),
                };
                black_box(condition.terminate(&ctx));
            }
        })
    });
}

criterion_group!(benches, bench_supervisor_loop, bench_conditions);
criterion_main!(benches);
