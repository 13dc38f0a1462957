//! Timing primitives.
//!
//! Microsecond budget quantities, accumulating phase stopwatches for the tick
//! loop's budget accounting, smoothed counters, and the host's universal time
//! source.

mod budget;
mod ema;
mod time;

pub use budget::{PhaseTimer, TickBudget};
pub use ema::Ema;
pub use time::{Micros, UniversalClock};
