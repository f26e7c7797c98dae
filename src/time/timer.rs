//! Software timers driven off the timeout list.
//!
//! A timer fires a plain function callback from the announce path, either
//! once or periodically. Callbacks run after the scheduler lock has been
//! released, so they may call back into the kernel (to wake a thread,
//! restart a timer, and so on).

use crate::time::timeout_list::TimeoutKey;
use core::num::NonZeroU32;

/// Callback invoked when a timer expires.
pub type TimerCallback = fn(TimerId);

/// Handle to a software timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(NonZeroU32);

impl TimerId {
    pub(crate) fn from_parts(slot: u16, seq: u16) -> Self {
        let raw = ((seq as u32) << 16) | (slot as u32 + 1);
        // slot + 1 >= 1, so the low half is never zero
        Self(unsafe { NonZeroU32::new_unchecked(raw) })
    }

    pub(crate) fn slot(self) -> usize {
        ((self.0.get() & 0xffff) - 1) as usize
    }

    pub(crate) fn seq(self) -> u16 {
        (self.0.get() >> 16) as u16
    }
}

impl core::fmt::Display for TimerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "timer#{}.{}", self.slot(), self.seq())
    }
}

/// Per-timer bookkeeping, owned by the scheduler state.
pub struct TimerState {
    pub(crate) seq: u16,
    pub(crate) callback: Option<TimerCallback>,
    /// Re-arm interval in ticks; 0 means one-shot.
    pub(crate) period: u64,
    /// Armed timeout entry, present while the timer runs.
    pub(crate) key: Option<TimeoutKey>,
    /// Expirations since the last status read.
    pub(crate) expire_count: u32,
}

impl TimerState {
    pub(crate) fn new(seq: u16, callback: Option<TimerCallback>) -> Self {
        Self {
            seq,
            callback,
            period: 0,
            key: None,
            expire_count: 0,
        }
    }
}
