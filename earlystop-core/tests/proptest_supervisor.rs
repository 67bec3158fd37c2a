//! Property-based tests for the supervisor using proptest.

use proptest::prelude::*;

use earlystop_core::{
    EarlyStoppingConfig, EarlyStoppingTrainer, MaxEpochs, ModelError, NoImprovementInNEpochs,
    TerminationReason, Trainable,
};

/// One step per epoch; the model is the number of steps taken.
#[derive(Default)]
struct Stepper {
    steps: u64,
    stepped: bool,
}

impl Trainable for Stepper {
    type Model = u64;

    fn begin_epoch(&mut self) {
        self.stepped = false;
    }

    fn advance_one_step(&mut self) -> Result<f64, ModelError> {
        self.steps += 1;
        self.stepped = true;
        Ok(0.0)
    }

    fn is_epoch_complete(&self) -> bool {
        self.stepped
    }

    fn model(&self) -> &u64 {
        &self.steps
    }
}

// --- Epoch budget properties ---

proptest! {
    #[test]
    fn max_epochs_alone_runs_exactly_n_epochs(n in 1usize..40) {
        let config = EarlyStoppingConfig::builder()
            .epoch_termination_condition(MaxEpochs::new(n))
            .build()
            .unwrap();
        let mut trainer = EarlyStoppingTrainer::new(config, Stepper::default());
        let result = trainer.fit().unwrap();

        prop_assert_eq!(result.total_epochs, n);
        prop_assert_eq!(result.termination_reason, TerminationReason::EpochTerminationCondition);
    }

    #[test]
    fn best_epoch_points_at_minimum_score(
        scores in prop::collection::vec(0.0f64..100.0, 1..30),
    ) {
        let n = scores.len();
        let script = scores.clone();
        let mut call = 0usize;
        let config = EarlyStoppingConfig::builder()
            .epoch_termination_condition(MaxEpochs::new(n))
            .score_calculator(move |_: &u64| -> Result<f64, ModelError> {
                let s = script[call];
                call += 1;
                Ok(s)
            })
            .build()
            .unwrap();
        let mut trainer = EarlyStoppingTrainer::new(config, Stepper::default());
        let result = trainer.fit().unwrap();

        prop_assert_eq!(result.score_vs_epoch.len(), result.total_epochs);
        let best_epoch = result.best_model_epoch.unwrap();
        prop_assert_eq!(result.score_vs_epoch.get(&best_epoch).copied(), result.best_model_score);

        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let first_min = scores.iter().position(|&s| s == min).unwrap();
        prop_assert_eq!(best_epoch, first_min);
        // One step per epoch, so the best snapshot is the step count at that epoch.
        prop_assert_eq!(result.best_model, first_min as u64 + 1);
    }

    #[test]
    fn flat_scores_stop_after_patience_plus_one(patience in 1usize..15, score in -10.0f64..10.0) {
        let config = EarlyStoppingConfig::builder()
            .epoch_termination_condition(NoImprovementInNEpochs::new(patience))
            .score_calculator(move |_: &u64| -> Result<f64, ModelError> { Ok(score) })
            .build()
            .unwrap();
        let mut trainer = EarlyStoppingTrainer::new(config, Stepper::default());
        let result = trainer.fit().unwrap();

        prop_assert_eq!(result.total_epochs, patience + 1);
        prop_assert_eq!(result.best_model_epoch, Some(0));
    }
}
