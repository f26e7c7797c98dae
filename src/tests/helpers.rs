//! Shared fixtures for scheduler tests.

use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::platform::testing::RecordingPlatform;
use crate::sched::{CpuId, SchedState};
use crate::thread::{ThreadId, ThreadOptions};

pub(crate) fn entry(_arg: usize) {}

/// Options for a thread at `prio` with a plausible stack.
pub(crate) fn options(prio: i8) -> ThreadOptions {
    ThreadOptions {
        priority: prio,
        ..ThreadOptions::new(entry, 0x2000_0000, 4096)
    }
}

/// Options carrying a recognizable context cookie, so recorded switches
/// can be matched to threads.
pub(crate) fn options_ctx(prio: i8, context: usize) -> ThreadOptions {
    ThreadOptions {
        context,
        ..options(prio)
    }
}

pub(crate) fn state() -> SchedState {
    SchedState::new(KernelConfig::default())
}

pub(crate) fn state_with(cfg: KernelConfig) -> SchedState {
    SchedState::new(cfg)
}

/// Create a thread and immediately dispatch the best ready thread on `cpu`.
pub(crate) fn spawn_and_pick(st: &mut SchedState, prio: i8, cpu: CpuId) -> ThreadId {
    let id = st
        .create_thread(&options(prio))
        .expect("thread creation failed");
    st.pick(cpu);
    id
}

/// An initialized single-CPU kernel on a recording platform, with the
/// construction-time event log already drained.
pub(crate) fn kernel() -> Kernel<RecordingPlatform> {
    kernel_with(KernelConfig::default())
}

pub(crate) fn kernel_with(cfg: KernelConfig) -> Kernel<RecordingPlatform> {
    let k = Kernel::new(cfg, RecordingPlatform::new(), 1000).expect("config rejected");
    k.init().expect("double init");
    k.platform().take_events();
    k
}
