#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Preemptive thread scheduler core for embedded real-time kernels.
//!
//! This crate is the scheduling heart of a small RTOS: a priority
//! ready queue, wait queues with priority inheritance, a delta-queue
//! timeout list, software timers, tick announcement and SMP rescheduling
//! signals. It contains no architecture code and performs no context
//! switches itself; the embedding kernel supplies those through the
//! [`Platform`] trait and drives the scheduler from its interrupt
//! entry/exit paths.
//!
//! # Priority model
//!
//! Priorities are signed bytes where numerically smaller means more
//! important. Negative priorities are cooperative: such a thread is
//! never preempted by an equal- or lower-priority thread and runs until
//! it blocks, yields or exits. Non-negative priorities are preemptible
//! and may also be round-robin time sliced.
//!
//! # Features
//!
//! - `smp`: multi-CPU support with IPI-based cross-CPU rescheduling (default)
//! - `std-shim`: host-test support, exposing the recording platform
//!
//! # Quick Start
//!
//! ```ignore
//! use rtsched::{Kernel, KernelConfig, ThreadOptions, Timeout};
//!
//! fn boot(platform: MyPlatform) -> ! {
//!     let kernel = Kernel::new(KernelConfig::default(), platform, 1000)
//!         .expect("bad config");
//!     kernel.init().expect("double init");
//!
//!     kernel.spawn(ThreadOptions {
//!         priority: 5,
//!         ..ThreadOptions::new(worker, stack_base, stack_size)
//!     }).expect("spawn failed");
//!
//!     kernel.start_cpu();
//!     unreachable!()
//! }
//! ```

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod errors;
pub mod fatal;
pub mod ipi;
pub mod kernel;
pub mod platform;
pub mod sched;
pub mod thread;
pub mod time;

#[cfg(test)]
mod tests;

pub use config::KernelConfig;
pub use errors::{KernelError, KernelResult, SchedError, SpawnError, TimerError, WaitError};
pub use fatal::{set_fatal_hook, FatalReason};
pub use kernel::{Kernel, SwitchFrames};
pub use platform::Platform;
pub use sched::{CpuId, WaitOrder, WaitQueueId};
pub use thread::{ThreadId, ThreadOptions, ThreadState};
pub use time::{TickCounter, Ticks, Timeout, TimerCallback, TimerId};
