//! Timeout budgets
//!
//! A long wait of N seconds is consumed as `floor(N)` one-second ticks
//! followed by one remainder tick. Callers flush the cluster before every
//! tick, so no member's pipes go undrained for more than a second.

use std::time::Duration;

/// Length of a whole tick
pub const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Full,
    Remainder(Duration),
}

impl Tick {
    pub fn duration(&self) -> Duration {
        match self {
            Tick::Full => TICK,
            Tick::Remainder(d) => *d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    total: Duration,
}

impl TimeoutBudget {
    pub fn new(total: Duration) -> Self {
        Self { total }
    }

    /// Negative or non-finite values give an empty budget
    pub fn from_secs_f64(secs: f64) -> Self {
        let total = if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        };
        Self { total }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn whole_ticks(&self) -> u64 {
        self.total.as_secs()
    }

    pub fn remainder(&self) -> Duration {
        self.total - Duration::from_secs(self.total.as_secs())
    }

    /// The ticks in consumption order, the remainder always last
    pub fn ticks(&self) -> impl Iterator<Item = Tick> + use<> {
        let remainder = self.remainder();
        (0..self.whole_ticks())
            .map(|_| Tick::Full)
            .chain(std::iter::once(Tick::Remainder(remainder)))
    }
}

impl From<Duration> for TimeoutBudget {
    fn from(total: Duration) -> Self {
        Self::new(total)
    }
}
