//! Fatal-error path for scheduler invariant violations.
//!
//! Invariant violations (double queue membership, scheduling a dead thread)
//! indicate a caller bug that has already corrupted shared state. They are
//! never returned as `Result` errors: the only safe action is to hand
//! control to the system's fatal handler, which typically logs and halts
//! or resets.
//!
//! The embedding kernel registers its handler once at boot with
//! [`set_fatal_hook`]. If no hook is registered the crate falls back to
//! `panic!`, which the kernel image's panic handler turns into a halt.

use crate::thread::ThreadId;
use core::fmt;

/// Reasons the scheduler can declare the system unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// A thread was inserted into a queue while already owned by another
    DualMembership(ThreadId),
    /// A dead thread reached a scheduling decision
    DeadThreadScheduled(ThreadId),
    /// A wake path found a wait-queue member that is not pending
    NotPending(ThreadId),
    /// An internal handle resolved to a freed or mismatched slot
    StaleHandle,
    /// A CPU was left with nothing to run after a blocking call
    ///
    /// The embedding kernel must keep one always-runnable idle thread per
    /// CPU at the lowest preemptible priority.
    NoRunnableThread(usize),
    /// A timeout entry fired for a thread that is not waiting for one
    SpuriousTimeout(ThreadId),
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::DualMembership(id) => {
                write!(f, "thread {} inserted into a second queue", id)
            }
            FatalReason::DeadThreadScheduled(id) => {
                write!(f, "dead thread {} reached the scheduler", id)
            }
            FatalReason::NotPending(id) => {
                write!(f, "wait-queue member {} is not pending", id)
            }
            FatalReason::StaleHandle => write!(f, "internal handle is stale"),
            FatalReason::NoRunnableThread(cpu) => {
                write!(f, "cpu {} has no runnable thread", cpu)
            }
            FatalReason::SpuriousTimeout(id) => {
                write!(f, "timeout fired for thread {} with no armed timeout", id)
            }
        }
    }
}

/// Handler invoked on an unrecoverable invariant violation. Must not return.
pub type FatalHook = fn(&FatalReason) -> !;

static FATAL_HOOK: spin::Once<FatalHook> = spin::Once::new();

/// Register the system fatal handler. Only the first call takes effect.
pub fn set_fatal_hook(hook: FatalHook) {
    FATAL_HOOK.call_once(|| hook);
}

/// Report an invariant violation and never return.
pub fn kernel_fatal(reason: FatalReason) -> ! {
    if let Some(hook) = FATAL_HOOK.get() {
        hook(&reason);
    }
    panic!("kernel fatal: {}", reason);
}
