//! Error types for the scheduler core.
//!
//! Expected, recoverable conditions (bad creation parameters, a full thread
//! table, a timed-out wait) are reported through these types. Invariant
//! violations are not errors and never appear here; they go through the
//! fatal path in [`crate::fatal`].

use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level error type for all scheduler operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Thread creation errors
    Spawn(SpawnError),
    /// Scheduling and thread-state errors
    Sched(SchedError),
    /// Software timer errors
    Timer(TimerError),
}

/// Errors detected eagerly at thread-creation time.
///
/// When any of these is returned, no thread was created and no kernel
/// state was modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Kernel has not been initialized
    NotInitialized,
    /// Priority outside the configured cooperative/preemptible range
    InvalidPriority(i8),
    /// Stack size below the configured minimum
    InvalidStackSize(usize),
    /// Thread table is full
    TooManyThreads,
}

/// Errors from scheduling operations on existing threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Thread handle does not refer to a live thread
    BadThread,
    /// Operation is not valid for the thread's current state
    WrongState,
    /// CPU index outside the configured range
    InvalidCpu(usize),
    /// Wait-queue handle does not refer to a live queue
    InvalidQueue,
    /// Priority outside the configured range (on an existing thread)
    PriorityOutOfRange(i8),
}

/// Errors from software timer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Timer handle does not refer to a live timer
    BadTimer,
    /// Timer is not running
    NotRunning,
}

/// The non-success outcome of a blocking call.
///
/// A timeout is a normal, expected result of waiting, distinct from
/// success; it is not routed through [`KernelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The wait's deadline expired before a wake arrived
    TimedOut,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Spawn(e) => write!(f, "spawn error: {}", e),
            KernelError::Sched(e) => write!(f, "scheduling error: {}", e),
            KernelError::Timer(e) => write!(f, "timer error: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NotInitialized => write!(f, "kernel not initialized"),
            SpawnError::InvalidPriority(prio) => write!(f, "priority {} out of range", prio),
            SpawnError::InvalidStackSize(size) => write!(f, "invalid stack size: {}", size),
            SpawnError::TooManyThreads => write!(f, "thread table full"),
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::BadThread => write!(f, "stale or invalid thread handle"),
            SchedError::WrongState => write!(f, "operation invalid in current thread state"),
            SchedError::InvalidCpu(cpu) => write!(f, "invalid CPU index: {}", cpu),
            SchedError::InvalidQueue => write!(f, "stale or invalid wait-queue handle"),
            SchedError::PriorityOutOfRange(prio) => {
                write!(f, "priority {} out of range", prio)
            }
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::BadTimer => write!(f, "stale or invalid timer handle"),
            TimerError::NotRunning => write!(f, "timer is not running"),
        }
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::TimedOut => write!(f, "wait timed out"),
        }
    }
}

impl From<SpawnError> for KernelError {
    fn from(error: SpawnError) -> Self {
        KernelError::Spawn(error)
    }
}

impl From<SchedError> for KernelError {
    fn from(error: SchedError) -> Self {
        KernelError::Sched(error)
    }
}

impl From<TimerError> for KernelError {
    fn from(error: TimerError) -> Self {
        KernelError::Timer(error)
    }
}
