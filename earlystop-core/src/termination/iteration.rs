//! Iteration-level conditions: time limits, divergence guards, cancellation.

use super::{IterationContext, IterationTerminationCondition};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Stop once the run has been going for at least `max_time`.
///
/// Checked after every step, so a limit can interrupt an epoch part way
/// through. It fires at most one step late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxTime {
    max_time: Duration,
}

impl MaxTime {
    pub fn new(max_time: Duration) -> Self {
        Self { max_time }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn max_time(&self) -> Duration {
        self.max_time
    }
}

impl IterationTerminationCondition for MaxTime {
    fn terminate(&mut self, ctx: &IterationContext) -> bool {
        ctx.elapsed >= self.max_time
    }
}

impl fmt::Display for MaxTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaxTime({:?})", self.max_time)
    }
}

/// Stop when the per-step score estimate exceeds `max_score`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxScore {
    max_score: f64,
}

impl MaxScore {
    pub fn new(max_score: f64) -> Self {
        Self { max_score }
    }

    pub fn max_score(&self) -> f64 {
        self.max_score
    }
}

impl IterationTerminationCondition for MaxScore {
    fn terminate(&mut self, ctx: &IterationContext) -> bool {
        ctx.last_score > self.max_score
    }
}

impl fmt::Display for MaxScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaxScore({})", self.max_score)
    }
}

/// Stop as soon as a step reports a NaN or infinite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidScore;

impl IterationTerminationCondition for InvalidScore {
    fn terminate(&mut self, ctx: &IterationContext) -> bool {
        !ctx.last_score.is_finite()
    }
}

impl fmt::Display for InvalidScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvalidScore")
    }
}

/// Shared handle used to request that a run stop at the next step boundary.
///
/// Wraps a [`CancellationToken`]; clones observe the same cancellation, and
/// child tokens of an outer token cancel along with it.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(CancellationToken);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// The underlying token, for sharing with code that already speaks it.
    pub fn token(&self) -> &CancellationToken {
        &self.0
    }

    /// A condition that fires once this flag has been set.
    pub fn condition(&self) -> Cancelled {
        Cancelled { flag: self.clone() }
    }
}

impl From<CancellationToken> for CancellationFlag {
    fn from(token: CancellationToken) -> Self {
        Self(token)
    }
}

/// Stop when an external [`CancellationFlag`] is set.
#[derive(Debug, Clone)]
pub struct Cancelled {
    flag: CancellationFlag,
}

impl IterationTerminationCondition for Cancelled {
    fn terminate(&mut self, _ctx: &IterationContext) -> bool {
        self.flag.is_cancelled()
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cancelled")
    }
}
