//! Budget accounting for the tick loop.
//!
//! A tick runs against three stopwatches: one for the whole tick and one per
//! phase (poll, execute). Phase timers accumulate across repeated
//! start/stop pairs within the same tick; the budget is measured against the
//! whole-tick timer only.

use std::time::Duration;

use minstant::Instant;

use super::time::Micros;

/// Accumulating stopwatch for one phase of a tick.
///
/// `start`/`stop` may be called repeatedly; [`PhaseTimer::elapsed`] sums all
/// completed spans plus the currently running one.
#[derive(Debug)]
pub struct PhaseTimer {
    accumulated: Duration,
    started: Option<Instant>,
}

impl PhaseTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulated: Duration::ZERO,
            started: None,
        }
    }

    /// Starts a new span. No-op if already running.
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    /// Ends the current span, folding it into the accumulated total.
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    /// Total time across all spans so far.
    #[must_use]
    pub fn elapsed(&self) -> Micros {
        let live = self
            .started
            .map(|started| started.elapsed())
            .unwrap_or(Duration::ZERO);
        Micros::from_duration(self.accumulated + live)
    }
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall-clock allowance for one tick.
///
/// The continuation that is in flight when the budget expires is allowed to
/// finish; the check happens between executions, not during them.
#[derive(Debug)]
pub struct TickBudget {
    started: Instant,
    limit: Micros,
}

impl TickBudget {
    /// Starts measuring against `limit`.
    #[must_use]
    pub fn start(limit: Micros) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Time consumed since the budget started.
    #[must_use]
    pub fn elapsed(&self) -> Micros {
        Micros::from_duration(self.started.elapsed())
    }

    /// Whether the allowance has been used up.
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.elapsed() > self.limit
    }
}
