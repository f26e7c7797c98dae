//! Platform abstraction: everything the scheduler needs from hardware.
//!
//! The embedding kernel implements [`Platform`] once per port. The closed
//! capability set is deliberate: program the next timeout event, trigger a
//! reschedule IPI, and swap register contexts. The scheduler core never
//! touches a device register itself.

use crate::sched::CpuId;

/// Hardware services supplied by the embedding kernel.
pub trait Platform: Send + Sync {
    /// Perform a context switch.
    ///
    /// `from` and `to` are the opaque context cookies attached to each
    /// thread at creation; `from == 0` means the outgoing context must
    /// not be saved (first switch from the boot/idle context, or a dead
    /// thread).
    ///
    /// # Safety
    ///
    /// Must only be called from a context where switching is safe: thread
    /// context, or the outermost interrupt-exit path. The cookies must be
    /// the ones the embedding kernel associated with live thread contexts.
    unsafe fn context_switch(&self, from: usize, to: usize);

    /// Program the timer to fire in `ticks` from now (tickless mode).
    ///
    /// Implementations must clamp: a deadline closer than the hardware's
    /// minimum lead time fires as soon as possible, never silently late.
    fn set_timeout_event(&self, ticks: u64);

    /// Cancel any programmed timeout event; nothing is pending.
    fn clear_timeout_event(&self);

    /// Minimum programmable lead time of the timer hardware, in ticks.
    fn min_timeout_lead(&self) -> u64 {
        0
    }

    /// Trigger a scheduler interrupt on another CPU.
    fn send_ipi(&self, cpu: CpuId);

    /// The CPU this code is executing on.
    fn current_cpu(&self) -> CpuId;
}

/// Recording platform for host-side tests: context switches and IPIs are
/// logged instead of performed.
#[cfg(any(test, feature = "std-shim"))]
pub mod testing {
    use super::{CpuId, Platform};
    use alloc::vec::Vec;
    use spin::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Event {
        Switch { from: usize, to: usize },
        TimeoutEvent(u64),
        TimeoutCleared,
        Ipi(CpuId),
    }

    #[derive(Default)]
    pub struct RecordingPlatform {
        pub events: Mutex<Vec<Event>>,
        pub cpu: portable_atomic::AtomicUsize,
        pub min_lead: portable_atomic::AtomicU64,
    }

    impl RecordingPlatform {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn take_events(&self) -> Vec<Event> {
            core::mem::take(&mut *self.events.lock())
        }

        pub fn set_cpu(&self, cpu: CpuId) {
            self.cpu.store(cpu, portable_atomic::Ordering::Release);
        }

        pub fn set_min_lead(&self, ticks: u64) {
            self.min_lead.store(ticks, portable_atomic::Ordering::Release);
        }
    }

    impl Platform for RecordingPlatform {
        unsafe fn context_switch(&self, from: usize, to: usize) {
            self.events.lock().push(Event::Switch { from, to });
        }

        fn set_timeout_event(&self, ticks: u64) {
            self.events.lock().push(Event::TimeoutEvent(ticks));
        }

        fn clear_timeout_event(&self) {
            self.events.lock().push(Event::TimeoutCleared);
        }

        fn min_timeout_lead(&self) -> u64 {
            self.min_lead.load(portable_atomic::Ordering::Acquire)
        }

        fn send_ipi(&self, cpu: CpuId) {
            self.events.lock().push(Event::Ipi(cpu));
        }

        fn current_cpu(&self) -> CpuId {
            self.cpu.load(portable_atomic::Ordering::Acquire)
        }
    }
}
