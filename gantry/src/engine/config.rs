//! Runtime configuration for the tick loops.

use crate::timing::Micros;

/// Lower clamp for the adaptive per-tick budget.
pub const MIN_TIME_PER_UPDATE: Micros = Micros::new(1_000);

/// Upper clamp for the adaptive per-tick budget.
pub const MAX_TIME_PER_UPDATE: Micros = Micros::new(25_000);

/// Configuration for the engine's per-tick behavior.
///
/// All fields are mutable at runtime through
/// [`RpcEngine::config_mut`](crate::engine::RpcEngine::config_mut); nothing
/// is persisted.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Execute at most one RPC per tick.
    ///
    /// **Default**: `false`
    pub one_rpc_per_update: bool,

    /// Wall-clock budget for one tick of the RPC loop. When the adaptive
    /// rate controller is enabled this field is retuned every tick.
    ///
    /// **Default**: 5 000 µs
    pub max_time_per_update: Micros,

    /// Keep polling within a tick until a request arrives, the receive
    /// timeout elapses, or the budget runs out. When `false`, each round
    /// polls every client once and moves on.
    ///
    /// **Default**: `true`
    pub blocking_recv: bool,

    /// Cap on one blocking poll wait.
    ///
    /// **Default**: 1 000 µs
    pub recv_timeout: Micros,

    /// Let the rate controller retune `max_time_per_update` toward the
    /// target frame period.
    ///
    /// **Default**: `true`
    pub adaptive_rate_control: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            one_rpc_per_update: false,
            max_time_per_update: Micros::new(5_000),
            blocking_recv: true,
            recv_timeout: Micros::new(1_000),
            adaptive_rate_control: true,
        }
    }
}

impl EngineConfig {
    /// Builder-style setter for `one_rpc_per_update`.
    #[must_use]
    pub const fn with_one_rpc_per_update(mut self, enabled: bool) -> Self {
        self.one_rpc_per_update = enabled;
        self
    }

    /// Builder-style setter for the per-tick budget.
    ///
    /// # Panics
    ///
    /// Panics if `budget` is zero.
    #[must_use]
    pub fn with_max_time_per_update(mut self, budget: Micros) -> Self {
        assert!(budget.as_u64() > 0, "budget must be > 0");
        self.max_time_per_update = budget;
        self
    }

    /// Builder-style setter for `blocking_recv`.
    #[must_use]
    pub const fn with_blocking_recv(mut self, enabled: bool) -> Self {
        self.blocking_recv = enabled;
        self
    }

    /// Builder-style setter for the receive timeout.
    #[must_use]
    pub const fn with_recv_timeout(mut self, timeout: Micros) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Builder-style setter for `adaptive_rate_control`.
    #[must_use]
    pub const fn with_adaptive_rate_control(mut self, enabled: bool) -> Self {
        self.adaptive_rate_control = enabled;
        self
    }
}
