//! Inter-processor interrupt dispatch.
//!
//! A scheduling event on one CPU that affects another is never applied
//! remotely: the originating CPU posts a reason bit and triggers a
//! hardware IPI; the target drains its mask in its own interrupt handler
//! and reschedules locally. The mask is an atomic RMW, so concurrent
//! posters from any number of CPUs cannot lose bits.

use crate::config::MAX_CPUS;
use crate::sched::CpuId;
use portable_atomic::{AtomicU32, Ordering};

/// Reason bits carried by a scheduler IPI.
pub mod reason {
    /// Re-run the local reschedule decision.
    pub const RESCHEDULE: u32 = 1 << 0;
    /// The running thread was aborted remotely; switch away and let its
    /// slot be recycled.
    pub const ABORT: u32 = 1 << 1;
}

/// Per-CPU pending-reason masks.
pub struct IpiRegistry {
    pending: [AtomicU32; MAX_CPUS],
}

impl IpiRegistry {
    #[allow(clippy::declare_interior_mutable_const)]
    pub const fn new() -> Self {
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            pending: [ZERO; MAX_CPUS],
        }
    }

    /// Post reason bits for `cpu`. Returns true if the mask was empty, in
    /// which case the caller must also trigger the hardware IPI (an
    /// already-signalled CPU will pick the new bits up in the same drain).
    pub fn post(&self, cpu: CpuId, reasons: u32) -> bool {
        self.pending[cpu].fetch_or(reasons, Ordering::AcqRel) == 0
    }

    /// Atomically take and clear the pending reasons for `cpu`.
    pub fn drain(&self, cpu: CpuId) -> u32 {
        self.pending[cpu].swap(0, Ordering::AcqRel)
    }

    /// Peek without clearing, for diagnostics.
    pub fn pending(&self, cpu: CpuId) -> u32 {
        self.pending[cpu].load(Ordering::Acquire)
    }
}

impl Default for IpiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_reports_first_signal() {
        let reg = IpiRegistry::new();
        assert!(reg.post(1, reason::RESCHEDULE));
        // Second post while undrained: hardware IPI already in flight.
        assert!(!reg.post(1, reason::ABORT));
        assert_eq!(reg.pending(1), reason::RESCHEDULE | reason::ABORT);
    }

    #[test]
    fn drain_clears_and_returns() {
        let reg = IpiRegistry::new();
        reg.post(0, reason::RESCHEDULE);
        assert_eq!(reg.drain(0), reason::RESCHEDULE);
        assert_eq!(reg.drain(0), 0);
        // Mask is per-CPU
        reg.post(2, reason::ABORT);
        assert_eq!(reg.drain(0), 0);
        assert_eq!(reg.drain(2), reason::ABORT);
    }
}
