//! Kernel time: tick counting and timeout values.

use portable_atomic::{AtomicU64, Ordering};

pub mod timeout_list;
pub mod timer;

pub use timeout_list::{ExpiryAction, TimeoutKey, TimeoutList};
pub use timer::{TimerCallback, TimerId, TimerState};

/// A count of kernel ticks, used both as a duration and as a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

/// How long a blocking call is willing to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately instead of pending.
    NoWait,
    /// Wait at most this many ticks.
    Ticks(u64),
    /// Wait until explicitly woken.
    Forever,
}

impl Timeout {
    /// Returns the finite tick count, if any.
    pub fn ticks(self) -> Option<u64> {
        match self {
            Timeout::Ticks(n) => Some(n),
            _ => None,
        }
    }
}

impl From<Ticks> for Timeout {
    fn from(t: Ticks) -> Self {
        Timeout::Ticks(t.0)
    }
}

/// Monotonic tick counter advanced by the timer driver's announcements.
///
/// The counter is read from both thread and interrupt context without the
/// scheduler lock, so it is a plain atomic.
pub struct TickCounter {
    ticks: AtomicU64,
    frequency: u32,
}

impl TickCounter {
    /// Create a counter for a tick source running at `frequency` Hz.
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
        }
    }

    /// Advance the counter; called only from the announce path.
    pub fn advance(&self, elapsed: u64) -> u64 {
        self.ticks.fetch_add(elapsed, Ordering::AcqRel) + elapsed
    }

    /// Ticks since boot.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Tick frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Convert a tick count to milliseconds, rounding down.
    pub fn ticks_to_millis(&self, ticks: u64) -> u64 {
        ticks * 1_000 / self.frequency as u64
    }

    /// Convert milliseconds to ticks, rounding up so a sleep never ends early.
    pub fn millis_to_ticks(&self, millis: u64) -> u64 {
        (millis * self.frequency as u64 + 999) / 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counter_advances() {
        let counter = TickCounter::new(1000);
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.advance(3), 3);
        assert_eq!(counter.advance(2), 5);
        assert_eq!(counter.ticks(), 5);
    }

    #[test]
    fn tick_conversions() {
        let counter = TickCounter::new(100); // 10ms per tick
        assert_eq!(counter.ticks_to_millis(10), 100);
        assert_eq!(counter.millis_to_ticks(100), 10);
        // Rounds up: 5ms still costs a whole tick
        assert_eq!(counter.millis_to_ticks(5), 1);
    }

    #[test]
    fn timeout_ticks_accessor() {
        assert_eq!(Timeout::NoWait.ticks(), None);
        assert_eq!(Timeout::Forever.ticks(), None);
        assert_eq!(Timeout::Ticks(7).ticks(), Some(7));
        assert_eq!(Timeout::from(Ticks(3)), Timeout::Ticks(3));
    }
}
