//! Exponentially weighted moving average counters.

/// Smoothing factor applied to every sample.
const SMOOTHING: f64 = 0.25;

/// Exponential moving average with a fixed smoothing factor.
///
/// Starts at zero; each sample moves the value a quarter of the way toward
/// it. Used for the engine's rate and latency counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ema {
    value: f64,
}

impl Ema {
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0.0 }
    }

    /// Folds `sample` into the average and returns the new value.
    pub fn update(&mut self, sample: f64) -> f64 {
        self.value += SMOOTHING * (sample - self.value);
        self.value
    }

    /// Current smoothed value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> f64 {
        self.value
    }

    /// Resets the average to zero.
    pub fn clear(&mut self) {
        self.value = 0.0;
    }
}
