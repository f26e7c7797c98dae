//! Thread control blocks and scheduling state.
//!
//! Threads live in a fixed-capacity arena ([`table::ThreadTable`]) and are
//! referenced everywhere by [`ThreadId`], a slot index paired with a
//! reuse sequence, never by pointer. Queue linkage is by id, so a freed
//! slot can never dangle into a list.

use crate::time::timeout_list::TimeoutKey;
use core::num::NonZeroU32;

pub mod table;

pub use table::ThreadTable;

/// Unique identifier for a thread.
///
/// Packs the arena slot and a reuse sequence; stale ids from an earlier
/// occupant of the same slot fail to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU32);

impl ThreadId {
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

    /// Raw non-zero representation, useful for logging.
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "thread#{}.{}", self.slot(), self.seq())
    }
}

/// Thread lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// In the ready queue, eligible to run
    Ready = 0,
    /// Executing on a CPU
    Running = 1,
    /// Blocked on a wait queue or sleeping, possibly with a timeout
    Pending = 2,
    /// Explicitly parked; not time-bounded, not in any queue
    Suspended = 3,
    /// Exited or aborted; slot awaiting reuse
    Dead = 4,
}

/// Which structure currently owns a thread.
///
/// A thread belongs to at most one of these; wait-queue membership may
/// additionally carry an armed timeout ("blocked with timeout"), tracked
/// separately in [`Tcb::timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMembership {
    /// Not in any queue (running, suspended, sleeping or dead)
    None,
    /// In the ready queue
    Ready,
    /// In the wait queue with this handle
    Waiting(crate::sched::WaitQueueId),
}

/// Outcome a pending thread observes when it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// Not yet woken
    None,
    /// Explicitly woken by `wake_one`/`wake_all`/`wakeup`
    Woken,
    /// Wait deadline expired
    TimedOut,
}

/// Parameters for creating a thread.
///
/// `entry`, `arg`, `stack_base` and `stack_size` are opaque to the
/// scheduler: the embedding kernel's context-setup code reads them when it
/// builds the initial register frame for the platform context switch.
#[derive(Debug, Clone, Copy)]
pub struct ThreadOptions {
    pub priority: i8,
    pub entry: fn(usize),
    pub arg: usize,
    pub stack_base: usize,
    pub stack_size: usize,
    pub name: Option<&'static str>,
    /// Cookie the platform associates with this thread's saved context.
    pub context: usize,
}

impl ThreadOptions {
    /// Options for a preemptible priority-0 thread; adjust fields as needed.
    pub fn new(entry: fn(usize), stack_base: usize, stack_size: usize) -> Self {
        Self {
            priority: 0,
            entry,
            arg: 0,
            stack_base,
            stack_size,
            name: None,
            context: 0,
        }
    }
}

/// Thread control block.
///
/// Every field is mutated only under the scheduler lock, so plain fields
/// suffice; no per-field atomics.
pub struct Tcb {
    pub id: ThreadId,
    pub state: ThreadState,
    /// Static priority assigned at creation (or via `set_priority`).
    pub base_prio: i8,
    /// Inheritance-adjusted priority; all scheduling comparisons use this.
    pub prio: i8,
    /// Round-robin budget remaining, in ticks.
    pub slice_left: u32,
    pub membership: QueueMembership,
    /// Armed timeout entry, if blocked or sleeping with a deadline.
    pub timeout: Option<TimeoutKey>,
    pub wake_outcome: WakeOutcome,
    /// Ticks that remained when a sleep was cut short by `wakeup`.
    pub sleep_remaining: u64,
    pub entry: fn(usize),
    pub arg: usize,
    pub stack_base: usize,
    pub stack_size: usize,
    pub name: Option<&'static str>,
    /// Opaque saved-context cookie for the platform context switch.
    pub context: usize,
    /// CPU this thread is running on or last ran on.
    pub last_cpu: usize,
}

impl Tcb {
    pub(crate) fn new(id: ThreadId, opts: &ThreadOptions) -> Self {
        Self {
            id,
            state: ThreadState::Ready,
            base_prio: opts.priority,
            prio: opts.priority,
            slice_left: 0,
            membership: QueueMembership::None,
            timeout: None,
            wake_outcome: WakeOutcome::None,
            sleep_remaining: 0,
            entry: opts.entry,
            arg: opts.arg,
            stack_base: opts.stack_base,
            stack_size: opts.stack_size,
            name: opts.name,
            context: opts.context,
            last_cpu: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.state != ThreadState::Dead
    }
}
