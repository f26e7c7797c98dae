//! Static kernel configuration.
//!
//! All limits are fixed before the first thread runs; the scheduler never
//! grows its structures after [`crate::kernel::Kernel::init`].

use crate::errors::{KernelError, SpawnError};

/// Hard upper bound on CPUs the IPI registry is sized for.
pub const MAX_CPUS: usize = 8;

/// Minimum accepted thread stack size, in bytes.
pub const MIN_STACK_SIZE: usize = 256;

/// Kernel-wide configuration, validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of cooperative priority levels (priorities `-num_coop..0`).
    ///
    /// A running cooperative thread is only displaced by a strictly more
    /// important thread, never by time slicing.
    pub num_coop_prios: u8,
    /// Number of preemptible priority levels (priorities `0..num_preempt`).
    pub num_preempt_prios: u8,
    /// Capacity of the thread table.
    pub max_threads: usize,
    /// Round-robin slice budget in ticks; 0 disables time slicing.
    pub slice_ticks: u32,
    /// Least important priority still exempt from slicing: only
    /// preemptible threads with priority >= this value are sliced.
    pub slice_max_prio: i8,
    /// Number of CPUs scheduled by this kernel instance.
    pub num_cpus: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            num_coop_prios: 16,
            num_preempt_prios: 16,
            max_threads: 32,
            slice_ticks: 0,
            slice_max_prio: 0,
            num_cpus: 1,
        }
    }
}

impl KernelConfig {
    /// Validate the configuration.
    ///
    /// The combined priority range must fit the ready queue's 128-bit
    /// occupancy bitmap and every limit must be non-degenerate.
    pub fn validate(&self) -> Result<(), KernelError> {
        let total = self.num_coop_prios as usize + self.num_preempt_prios as usize;
        if total == 0 || total > 128 {
            return Err(SpawnError::InvalidPriority(0).into());
        }
        if self.max_threads == 0 {
            return Err(SpawnError::TooManyThreads.into());
        }
        #[cfg(feature = "smp")]
        let cpu_bound = MAX_CPUS;
        #[cfg(not(feature = "smp"))]
        let cpu_bound = 1;
        if self.num_cpus == 0 || self.num_cpus > cpu_bound {
            return Err(crate::errors::SchedError::InvalidCpu(self.num_cpus).into());
        }
        Ok(())
    }

    /// Whether `prio` lies in the configured valid range.
    pub fn prio_valid(&self, prio: i8) -> bool {
        let lo = -(self.num_coop_prios as i16);
        let hi = self.num_preempt_prios as i16;
        let p = prio as i16;
        p >= lo && p < hi
    }

    /// Total number of priority levels.
    pub fn num_prios(&self) -> usize {
        self.num_coop_prios as usize + self.num_preempt_prios as usize
    }

    /// Whether a thread at `prio` runs cooperatively.
    pub fn is_coop(&self, prio: i8) -> bool {
        prio < 0
    }

    /// Whether a running thread at `prio` is subject to round-robin slicing.
    pub fn is_sliceable(&self, prio: i8) -> bool {
        self.slice_ticks > 0 && !self.is_coop(prio) && prio >= self.slice_max_prio
    }
}
