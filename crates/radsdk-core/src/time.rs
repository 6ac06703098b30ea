//! Host time in 100 ns ticks
//!
//! Processors timestamp counts in ticks. Device reports carry elapsed
//! milliseconds, so the two conversions below are used at every boundary.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Length of a tick in nanoseconds
pub const TICK_NS: i64 = 100;

/// Ticks in one millisecond
pub const TICKS_PER_MS: i64 = 1_000_000 / TICK_NS;

/// Convert milliseconds to ticks
pub fn ms_to_ticks(ms: i64) -> i64 {
    ms * TICKS_PER_MS
}

/// Convert ticks to milliseconds, truncating
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Source of the current host time
pub trait Clock: Send + Sync {
    /// Current time in ticks
    fn now_ticks(&self) -> i64;

    /// Current time in milliseconds
    fn now_ms(&self) -> i64 {
        ticks_to_ms(self.now_ticks())
    }
}

/// Monotonic clock counting ticks from its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ticks(&self) -> i64 {
        let nanos = self.origin.elapsed().as_nanos();
        (nanos / TICK_NS as u128) as i64
    }
}

/// Clock that only moves when told to
///
/// Used by tests to make timestamp derivation deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `ms` milliseconds
    pub fn new(ms: i64) -> Self {
        Self {
            ticks: AtomicI64::new(ms_to_ticks(ms)),
        }
    }

    /// Set the current time in milliseconds
    pub fn set_ms(&self, ms: i64) {
        self.ticks.store(ms_to_ticks(ms), Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance_ms(&self, ms: i64) {
        self.ticks.fetch_add(ms_to_ticks(ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> i64 {
        self.ticks.load(Ordering::SeqCst)
    }
}
