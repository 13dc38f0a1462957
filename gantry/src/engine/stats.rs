//! Counters, smoothed rates, and the adaptive rate controller.

use crate::engine::config::{MAX_TIME_PER_UPDATE, MIN_TIME_PER_UPDATE};
use crate::timing::{Ema, Micros};

/// The controller aims one tick short of the host's 60 Hz ceiling, so it is
/// always pushing against it rather than oscillating around it.
const TARGET_TICK_RATE: f64 = 59.0;

/// Asymmetric step applied to the budget each tick.
const ADJUST_STEP: Micros = Micros::new(100);

/// Budget restored when the engine goes idle, so a sudden burst is not
/// served with an over-shrunk allowance.
const IDLE_REARM: Micros = Micros::new(10_000);

/// Exec-time EMA below this means the engine is effectively idle.
const IDLE_EXEC_THRESHOLD: f64 = 0.001;

/// Retunes the per-tick budget toward the target frame period.
#[derive(Debug)]
pub(crate) struct RateController {
    target_period: f64,
}

impl RateController {
    pub fn new() -> Self {
        Self {
            target_period: 1.0 / TARGET_TICK_RATE,
        }
    }

    /// Next budget given the measured tick time and the exec-time EMA.
    pub fn adjust(&self, budget: Micros, tick_secs: f64, exec_ema_secs: f64) -> Micros {
        if tick_secs > self.target_period {
            budget.saturating_sub(ADJUST_STEP).clamp(
                MIN_TIME_PER_UPDATE,
                MAX_TIME_PER_UPDATE,
            )
        } else if exec_ema_secs < IDLE_EXEC_THRESHOLD {
            IDLE_REARM
        } else {
            budget
                .saturating_add(ADJUST_STEP)
                .clamp(MIN_TIME_PER_UPDATE, MAX_TIME_PER_UPDATE)
        }
    }
}

/// Counters and EMAs for the engine's observability surface.
///
/// Written only by the tick thread; readers take a [`StatsSnapshot`].
#[derive(Debug, Default)]
pub struct EngineStats {
    rpcs_executed: u64,
    last_tick_rpcs: u32,
    stream_rpcs: u32,
    stream_rpcs_executed: u64,
    bytes_read_total: u64,
    bytes_written_total: u64,
    bytes_read_base: u64,
    bytes_written_base: u64,
    last_bytes_read: u64,
    last_bytes_written: u64,
    bytes_read_rate: Ema,
    bytes_written_rate: Ema,
    rpc_rate: Ema,
    time_per_rpc_update: Ema,
    poll_time_per_rpc_update: Ema,
    exec_time_per_rpc_update: Ema,
    stream_rpc_rate: Ema,
    time_per_stream_update: Ema,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in one RPC loop pass.
    pub(crate) fn record_rpc_update(
        &mut self,
        executed: u32,
        total: Micros,
        poll: Micros,
        exec: Micros,
    ) {
        self.rpcs_executed += u64::from(executed);
        self.last_tick_rpcs = executed;
        self.time_per_rpc_update.update(total.as_secs_f64());
        self.poll_time_per_rpc_update.update(poll.as_secs_f64());
        self.exec_time_per_rpc_update.update(exec.as_secs_f64());
    }

    /// Folds in one stream loop pass. `executed` counts every invocation,
    /// sent or suppressed.
    pub(crate) fn record_stream_update(&mut self, executed: u32, elapsed: Micros) {
        self.stream_rpcs = executed;
        self.stream_rpcs_executed += u64::from(executed);
        self.time_per_stream_update.update(elapsed.as_secs_f64());
    }

    /// Updates the per-second rates from one whole host tick interval.
    pub(crate) fn record_interval(
        &mut self,
        bytes_read: u64,
        bytes_written: u64,
        interval_secs: f64,
    ) {
        self.bytes_read_total = bytes_read;
        self.bytes_written_total = bytes_written;
        if interval_secs > 0.0 {
            let read_delta = bytes_read.saturating_sub(self.last_bytes_read);
            let written_delta = bytes_written.saturating_sub(self.last_bytes_written);
            self.bytes_read_rate
                .update(read_delta as f64 / interval_secs);
            self.bytes_written_rate
                .update(written_delta as f64 / interval_secs);
            self.rpc_rate
                .update(f64::from(self.last_tick_rpcs) / interval_secs);
            self.stream_rpc_rate
                .update(f64::from(self.stream_rpcs) / interval_secs);
        }
        self.last_bytes_read = bytes_read;
        self.last_bytes_written = bytes_written;
    }

    pub(crate) fn exec_time_per_rpc_update(&self) -> f64 {
        self.exec_time_per_rpc_update.get()
    }

    /// Resets counters and smoothed values. Byte totals restart from zero by
    /// re-basing against the transports' cumulative counters.
    pub(crate) fn clear(&mut self) {
        self.rpcs_executed = 0;
        self.last_tick_rpcs = 0;
        self.stream_rpcs = 0;
        self.stream_rpcs_executed = 0;
        self.bytes_read_base = self.bytes_read_total;
        self.bytes_written_base = self.bytes_written_total;
        self.bytes_read_rate.clear();
        self.bytes_written_rate.clear();
        self.rpc_rate.clear();
        self.time_per_rpc_update.clear();
        self.poll_time_per_rpc_update.clear();
        self.exec_time_per_rpc_update.clear();
        self.stream_rpc_rate.clear();
        self.time_per_stream_update.clear();
    }

    /// Point-in-time copy of the surface.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rpcs_executed: self.rpcs_executed,
            stream_rpcs: self.stream_rpcs,
            stream_rpcs_executed: self.stream_rpcs_executed,
            bytes_read: self.bytes_read_total.saturating_sub(self.bytes_read_base),
            bytes_written: self
                .bytes_written_total
                .saturating_sub(self.bytes_written_base),
            bytes_read_rate: self.bytes_read_rate.get(),
            bytes_written_rate: self.bytes_written_rate.get(),
            rpc_rate: self.rpc_rate.get(),
            time_per_rpc_update: self.time_per_rpc_update.get(),
            poll_time_per_rpc_update: self.poll_time_per_rpc_update.get(),
            exec_time_per_rpc_update: self.exec_time_per_rpc_update.get(),
            stream_rpc_rate: self.stream_rpc_rate.get(),
            time_per_stream_update: self.time_per_stream_update.get(),
        }
    }
}

/// Point-in-time copy of the statistics surface.
///
/// Times are seconds; rates are per second.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub rpcs_executed: u64,
    /// Stream invocations during the most recent tick.
    pub stream_rpcs: u32,
    pub stream_rpcs_executed: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub bytes_read_rate: f64,
    pub bytes_written_rate: f64,
    pub rpc_rate: f64,
    pub time_per_rpc_update: f64,
    pub poll_time_per_rpc_update: f64,
    pub exec_time_per_rpc_update: f64,
    pub stream_rpc_rate: f64,
    pub time_per_stream_update: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_ticks_shrink_the_budget_to_the_floor() {
        let controller = RateController::new();
        let mut budget = Micros::new(5_000);
        let mut previous = budget;
        for _ in 0..100 {
            // 20 ms ticks, past the ~16.9 ms target period.
            budget = controller.adjust(budget, 0.020, 0.005);
            assert!(budget <= previous, "budget must decrease monotonically");
            previous = budget;
        }
        assert_eq!(budget, MIN_TIME_PER_UPDATE);
    }

    #[test]
    fn idle_ticks_rearm_the_budget() {
        let controller = RateController::new();
        let mut budget = MIN_TIME_PER_UPDATE;
        for _ in 0..100 {
            budget = controller.adjust(budget, 0.002, 0.0001);
        }
        assert_eq!(budget, IDLE_REARM);
    }

    #[test]
    fn busy_on_target_ticks_grow_to_the_ceiling() {
        let controller = RateController::new();
        let mut budget = Micros::new(24_900);
        budget = controller.adjust(budget, 0.010, 0.005);
        assert_eq!(budget, MAX_TIME_PER_UPDATE);
        budget = controller.adjust(budget, 0.010, 0.005);
        assert_eq!(budget, MAX_TIME_PER_UPDATE, "must clamp at the ceiling");
    }

    #[test]
    fn interval_rates_use_deltas() {
        let mut stats = EngineStats::new();
        stats.record_rpc_update(4, Micros::new(2_000), Micros::new(500), Micros::new(1_500));
        stats.record_interval(1_000, 500, 0.5);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rpcs_executed, 4);
        assert_eq!(snapshot.bytes_read, 1_000);
        // First sample: EMA moved a quarter of the way toward 2000 B/s.
        assert_eq!(snapshot.bytes_read_rate, 500.0);
        assert_eq!(snapshot.rpc_rate, 2.0);
    }

    #[test]
    fn clear_rebases_byte_totals() {
        let mut stats = EngineStats::new();
        stats.record_rpc_update(2, Micros::new(1_000), Micros::new(100), Micros::new(900));
        stats.record_interval(4_096, 1_024, 1.0);
        stats.clear();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rpcs_executed, 0);
        assert_eq!(snapshot.bytes_read, 0);
        assert_eq!(snapshot.rpc_rate, 0.0);

        stats.record_interval(5_096, 2_024, 1.0);
        assert_eq!(stats.snapshot().bytes_read, 1_000);
    }

    #[test]
    fn zero_interval_skips_rate_samples() {
        let mut stats = EngineStats::new();
        stats.record_interval(100, 100, 0.0);
        assert_eq!(stats.snapshot().bytes_read_rate, 0.0);
    }
}
