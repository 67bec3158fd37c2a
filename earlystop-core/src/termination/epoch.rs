//! Epoch-level conditions: epoch budgets, patience, target scores.

use super::{EpochContext, EpochTerminationCondition};
use std::fmt;

/// Stop once `max_epochs` epochs have completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxEpochs {
    max_epochs: usize,
}

impl MaxEpochs {
    pub fn new(max_epochs: usize) -> Self {
        Self { max_epochs }
    }

    pub fn max_epochs(&self) -> usize {
        self.max_epochs
    }
}

impl EpochTerminationCondition for MaxEpochs {
    fn terminate(&mut self, ctx: &EpochContext) -> bool {
        ctx.completed_epochs() >= self.max_epochs
    }
}

impl fmt::Display for MaxEpochs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaxEpochs({})", self.max_epochs)
    }
}

/// Stop after `patience` consecutive epochs without an improvement of the
/// validation score.
///
/// An epoch improves when `best - score > min_improvement`; with the default
/// `min_improvement` of zero that is strict less-than. The first scored
/// epoch only establishes the baseline. Epochs without a score are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct NoImprovementInNEpochs {
    patience: usize,
    min_improvement: f64,
    best_score: Option<f64>,
    pub(crate) epochs_without_improvement: usize,
}

impl NoImprovementInNEpochs {
    pub fn new(patience: usize) -> Self {
        Self::with_min_improvement(patience, 0.0)
    }

    pub fn with_min_improvement(patience: usize, min_improvement: f64) -> Self {
        Self {
            patience,
            min_improvement,
            best_score: None,
            epochs_without_improvement: 0,
        }
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn min_improvement(&self) -> f64 {
        self.min_improvement
    }

    fn record(&mut self, score: f64) {
        match self.best_score {
            Some(best) if !(best - score > self.min_improvement) => {
                self.epochs_without_improvement += 1;
            }
            _ => {
                self.best_score = Some(score);
                self.epochs_without_improvement = 0;
            }
        }
    }
}

impl EpochTerminationCondition for NoImprovementInNEpochs {
    fn initialize(&mut self) {
        self.best_score = None;
        self.epochs_without_improvement = 0;
    }

    fn terminate(&mut self, ctx: &EpochContext) -> bool {
        let Some(score) = ctx.score else {
            return false;
        };
        self.record(score);
        self.epochs_without_improvement >= self.patience
    }
}

impl fmt::Display for NoImprovementInNEpochs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NoImprovementInNEpochs({}, min_improvement={})",
            self.patience, self.min_improvement
        )
    }
}

/// Stop as soon as an epoch's validation score reaches `target` or better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestScore {
    target: f64,
}

impl BestScore {
    pub fn new(target: f64) -> Self {
        Self { target }
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

impl EpochTerminationCondition for BestScore {
    fn terminate(&mut self, ctx: &EpochContext) -> bool {
        ctx.score.is_some_and(|s| s <= self.target)
    }
}

impl fmt::Display for BestScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BestScore({})", self.target)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A run that never improves stops exactly `patience` epochs after the baseline.
        #[test]
        fn no_improvement_respects_patience(
            patience in 1usize..12,
            baseline in 0.1f64..10.0,
            worse_by in 0.0f64..5.0,
        ) {
            let mut cond = NoImprovementInNEpochs::new(patience);
            for epoch in 0..=patience {
                let score = if epoch == 0 { baseline } else { baseline + worse_by };
                let ctx = EpochContext { epoch, score: Some(score) };
                let stop = cond.terminate(&ctx);
                prop_assert_eq!(stop, epoch == patience);
            }
        }

        /// MaxEpochs fires on exactly the n-th completed epoch.
        #[test]
        fn max_epochs_fires_once_budget_is_spent(n in 1usize..500) {
            let mut cond = MaxEpochs::new(n);
            let fired = (0..n + 5)
                .find(|&epoch| cond.terminate(&EpochContext { epoch, score: None }));
            prop_assert_eq!(fired, Some(n - 1));
        }
    }
}
