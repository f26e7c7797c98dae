//! Kernel facade coordinating the scheduler, timeouts and the platform.
//!
//! [`Kernel`] wraps the scheduler state in one spinlock and translates
//! committed scheduling decisions into platform context switches. From
//! thread context a decision is executed immediately; from interrupt
//! context it is recorded and handed back at the outermost
//! [`Kernel::irq_exit`], where the embedding kernel's interrupt epilogue
//! performs the actual restore.
//!
//! The embedding kernel must keep one always-runnable idle thread per CPU
//! at the lowest preemptible priority; a CPU left with nothing to run
//! after a blocking call is a fatal condition.

use crate::config::{KernelConfig, MAX_CPUS, MIN_STACK_SIZE};
use crate::errors::{KernelResult, SchedError, SpawnError, TimerError, WaitError};
use crate::platform::Platform;
use crate::sched::{CpuId, SchedState, Switch, WaitOrder, WaitQueueId};
use crate::thread::{ThreadId, ThreadOptions, ThreadState, WakeOutcome};
use crate::time::timer::{TimerCallback, TimerId};
use crate::time::{TickCounter, Ticks, Timeout};
use alloc::vec::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::ipi::reason;
#[cfg(feature = "smp")]
use crate::ipi::IpiRegistry;

/// The resolved register frames of a committed context switch.
///
/// `from == 0` means the outgoing context must not be saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFrames {
    pub from: usize,
    pub to: usize,
}

/// The scheduler kernel.
///
/// Generic over the [`Platform`] supplying context switches, the tickless
/// timer and IPIs.
pub struct Kernel<P: Platform> {
    state: spin::Mutex<SchedState>,
    platform: P,
    ticks: TickCounter,
    initialized: AtomicBool,
    /// Interrupt nesting depth per CPU, maintained by irq_enter/irq_exit.
    irq_nest: [AtomicU32; MAX_CPUS],
    /// A reschedule was requested in interrupt context and is owed at
    /// interrupt exit.
    resched_pending: [AtomicBool; MAX_CPUS],
    #[cfg(feature = "smp")]
    ipi: IpiRegistry,
}

impl<P: Platform> Kernel<P> {
    /// Create a kernel instance. Fails on a degenerate configuration.
    pub fn new(cfg: KernelConfig, platform: P, tick_hz: u32) -> KernelResult<Self> {
        cfg.validate()?;
        const NEST_ZERO: AtomicU32 = AtomicU32::new(0);
        const FLAG_CLEAR: AtomicBool = AtomicBool::new(false);
        Ok(Self {
            state: spin::Mutex::new(SchedState::new(cfg)),
            platform,
            ticks: TickCounter::new(tick_hz),
            initialized: AtomicBool::new(false),
            irq_nest: [NEST_ZERO; MAX_CPUS],
            resched_pending: [FLAG_CLEAR; MAX_CPUS],
            #[cfg(feature = "smp")]
            ipi: IpiRegistry::new(),
        })
    }

    /// Mark the kernel ready for threading operations. Must be called
    /// once, before any thread is created.
    pub fn init(&self) -> KernelResult<()> {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(())
        } else {
            Err(SchedError::WrongState.into())
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Access the platform implementation.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The monotonic tick counter.
    pub fn ticks(&self) -> &TickCounter {
        &self.ticks
    }

    // ------------------------------------------------------------------
    // Thread lifecycle
    // ------------------------------------------------------------------

    /// Create a thread. Priority and stack size are validated eagerly;
    /// on any error no thread exists. The new thread is READY and will
    /// preempt immediately if it outranks the running thread.
    pub fn spawn(&self, opts: ThreadOptions) -> Result<ThreadId, SpawnError> {
        if !self.is_initialized() {
            return Err(SpawnError::NotInitialized);
        }
        if opts.stack_size < MIN_STACK_SIZE {
            return Err(SpawnError::InvalidStackSize(opts.stack_size));
        }

        let cpu = self.platform.current_cpu();
        let (id, frames) = {
            let mut st = self.state.lock();
            if !st.cfg.prio_valid(opts.priority) {
                return Err(SpawnError::InvalidPriority(opts.priority));
            }
            let id = st.create_thread(&opts)?;
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            (id, frames)
        };
        self.commit(frames);
        Ok(id)
    }

    /// Voluntarily give up the CPU; the caller stays READY at the tail of
    /// its priority level.
    pub fn yield_now(&self) {
        let cpu = self.platform.current_cpu();
        let frames = {
            let mut st = self.state.lock();
            let sw = st.yield_current(cpu);
            sw.map(|sw| Self::resolve(&st, sw))
        };
        self.commit(frames);
    }

    /// Sleep for the given timeout. Returns the ticks that remained if
    /// the sleep was cut short by [`Kernel::wakeup`]; 0 after a full
    /// sleep. `NoWait` degrades to a yield, `Forever` sleeps until woken.
    pub fn sleep(&self, timeout: Timeout) -> Ticks {
        let deadline = match timeout {
            Timeout::NoWait => {
                self.yield_now();
                return Ticks::ZERO;
            }
            Timeout::Ticks(n) => Some(n),
            Timeout::Forever => None,
        };
        let cpu = self.platform.current_cpu();
        let (id, frames) = {
            let mut st = self.state.lock();
            let id = st.current_thread(cpu);
            let sw = match st.sleep_current(cpu, deadline) {
                Ok(sw) => sw,
                Err(_) => return Ticks::ZERO, // no current thread: idle context
            };
            self.reprogram_timer(&st);
            (id, Some(Self::resolve(&st, sw)))
        };
        self.commit(frames);

        // Running again: report how much of the sleep was left.
        let st = self.state.lock();
        let remaining = id
            .and_then(|id| st.threads.get(id))
            .map(|t| t.sleep_remaining)
            .unwrap_or(0);
        Ticks(remaining)
    }

    /// Park a thread until [`Kernel::resume`]. Suspending a thread
    /// running on another CPU signals that CPU to switch away.
    pub fn suspend(&self, id: ThreadId) -> KernelResult<()> {
        let cpu = self.platform.current_cpu();
        let mut frames = None;
        {
            let mut st = self.state.lock();
            let running_on = st.suspend(id)?;
            self.reprogram_timer(&st);
            match running_on {
                Some(victim_cpu) if victim_cpu == cpu => {
                    frames = self.local_resched_locked(&mut st, cpu);
                }
                Some(victim_cpu) => self.kick_remote(victim_cpu, reason::RESCHEDULE),
                None => {}
            }
            self.notify_remote(&st, cpu);
        }
        self.commit(frames);
        Ok(())
    }

    /// Make a suspended thread runnable again.
    pub fn resume(&self, id: ThreadId) -> KernelResult<()> {
        let cpu = self.platform.current_cpu();
        let frames = {
            let mut st = self.state.lock();
            st.resume(id)?;
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            frames
        };
        self.commit(frames);
        Ok(())
    }

    /// Kill a thread, removing it from every scheduler structure as one
    /// operation. Aborting the calling thread does not return.
    pub fn abort(&self, id: ThreadId) -> KernelResult<()> {
        let cpu = self.platform.current_cpu();
        let mut frames = None;
        {
            let mut st = self.state.lock();
            let running_on = st.abort(id)?;
            self.reprogram_timer(&st);
            match running_on {
                Some(victim_cpu) if victim_cpu == cpu => {
                    frames = self.local_resched_locked(&mut st, cpu);
                }
                Some(victim_cpu) => self.kick_remote(victim_cpu, reason::ABORT),
                None => {}
            }
        }
        self.commit(frames);
        Ok(())
    }

    /// Change a thread's base priority, range-checked like creation.
    pub fn set_priority(&self, id: ThreadId, prio: i8) -> KernelResult<()> {
        let cpu = self.platform.current_cpu();
        let frames = {
            let mut st = self.state.lock();
            if !st.cfg.prio_valid(prio) {
                return Err(SchedError::PriorityOutOfRange(prio).into());
            }
            st.set_priority(id, prio)?;
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            frames
        };
        self.commit(frames);
        Ok(())
    }

    /// Prematurely end another thread's sleep.
    pub fn wakeup(&self, id: ThreadId) -> KernelResult<()> {
        let cpu = self.platform.current_cpu();
        let frames = {
            let mut st = self.state.lock();
            st.wakeup(id)?;
            self.reprogram_timer(&st);
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            frames
        };
        self.commit(frames);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wait queues
    // ------------------------------------------------------------------

    /// Register a wait queue for a synchronization primitive.
    pub fn new_wait_queue(&self, order: WaitOrder) -> WaitQueueId {
        self.state.lock().new_wait_queue(order)
    }

    /// Tear down an empty wait queue.
    pub fn destroy_wait_queue(&self, wqid: WaitQueueId) -> KernelResult<()> {
        self.state.lock().destroy_wait_queue(wqid)?;
        Ok(())
    }

    /// Block the calling thread on `wqid`.
    ///
    /// Returns `Ok(())` when explicitly woken and `Err(TimedOut)` when the
    /// deadline expired first, exactly one of the two, never both. A
    /// `NoWait` timeout reports `TimedOut` without ever pending.
    pub fn wait(&self, wqid: WaitQueueId, timeout: Timeout) -> Result<(), WaitError> {
        let deadline = match timeout {
            Timeout::NoWait => return Err(WaitError::TimedOut),
            Timeout::Ticks(n) => Some(n),
            Timeout::Forever => None,
        };
        let cpu = self.platform.current_cpu();
        let (id, frames) = {
            let mut st = self.state.lock();
            let id = st.current_thread(cpu);
            let sw = match st.pend_current(cpu, wqid, deadline) {
                Ok(sw) => sw,
                // Blocking on a destroyed queue or from the idle context
                // is a caller bug that has already corrupted accounting.
                Err(_) => crate::fatal::kernel_fatal(crate::fatal::FatalReason::StaleHandle),
            };
            self.reprogram_timer(&st);
            // An inheritance boost may have left a ready holder more
            // important than what another CPU is running.
            self.notify_remote(&st, cpu);
            (id, Some(Self::resolve(&st, sw)))
        };
        self.commit(frames);

        // Resumed: exactly one wake path has run and recorded why.
        let st = self.state.lock();
        match id
            .and_then(|id| st.threads.get(id))
            .map(|t| t.wake_outcome)
        {
            Some(WakeOutcome::TimedOut) => Err(WaitError::TimedOut),
            _ => Ok(()),
        }
    }

    /// Wake the head waiter. Returns the woken thread, or `None` if the
    /// queue was empty (not an error).
    pub fn wake_one(&self, wqid: WaitQueueId) -> KernelResult<Option<ThreadId>> {
        let cpu = self.platform.current_cpu();
        let (woken, frames) = {
            let mut st = self.state.lock();
            let woken = st.wake_one(wqid)?;
            self.reprogram_timer(&st);
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            (woken, frames)
        };
        self.commit(frames);
        Ok(woken)
    }

    /// Wake every waiter; returns how many were woken.
    pub fn wake_all(&self, wqid: WaitQueueId) -> KernelResult<usize> {
        let cpu = self.platform.current_cpu();
        let (count, frames) = {
            let mut st = self.state.lock();
            let count = st.wake_all(wqid)?;
            self.reprogram_timer(&st);
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            (count, frames)
        };
        self.commit(frames);
        Ok(count)
    }

    /// Record the holder of the primitive behind an inheriting queue.
    /// Handing ownership off (or passing `None`) reverts the previous
    /// holder to the priority it had at acquisition.
    pub fn set_queue_owner(&self, wqid: WaitQueueId, owner: Option<ThreadId>) -> KernelResult<()> {
        let cpu = self.platform.current_cpu();
        let frames = {
            let mut st = self.state.lock();
            st.set_queue_owner(wqid, owner)?;
            let frames = self.preempt_locked(&mut st, cpu);
            self.notify_remote(&st, cpu);
            frames
        };
        self.commit(frames);
        Ok(())
    }

    /// Number of threads blocked on a queue.
    pub fn wait_count(&self, wqid: WaitQueueId) -> KernelResult<usize> {
        Ok(self.state.lock().wait_count(wqid)?)
    }

    // ------------------------------------------------------------------
    // Software timers
    // ------------------------------------------------------------------

    /// Register a software timer. The callback runs from the announce
    /// path with the scheduler lock released.
    pub fn new_timer(&self, callback: Option<TimerCallback>) -> TimerId {
        self.state.lock().new_timer(callback)
    }

    /// Start (or restart) a timer: first expiry after `delay`, then every
    /// `period` ticks; a zero period is one-shot.
    pub fn start_timer(&self, id: TimerId, delay: Ticks, period: Ticks) -> Result<(), TimerError> {
        let st = &mut *self.state.lock();
        st.start_timer(id, delay.0, period.0)?;
        self.reprogram_timer(st);
        Ok(())
    }

    /// Stop a running timer before it fires.
    pub fn stop_timer(&self, id: TimerId) -> Result<(), TimerError> {
        let st = &mut *self.state.lock();
        st.stop_timer(id)?;
        self.reprogram_timer(st);
        Ok(())
    }

    /// Expirations since the last status read.
    pub fn timer_status(&self, id: TimerId) -> Result<u32, TimerError> {
        self.state.lock().timer_status(id)
    }

    // ------------------------------------------------------------------
    // Tick announce and interrupt plumbing
    // ------------------------------------------------------------------

    /// Advance kernel time by `elapsed` ticks. Called from the platform
    /// timer interrupt between [`Kernel::irq_enter`] and
    /// [`Kernel::irq_exit`]; any required switch is performed at the
    /// outermost interrupt exit.
    pub fn announce(&self, elapsed: Ticks) {
        self.ticks.advance(elapsed.0);
        let cpu = self.platform.current_cpu();
        let mut callbacks = Vec::new();
        {
            let mut st = self.state.lock();
            st.announce(elapsed.0, &mut callbacks);
            if st.needs_resched(cpu) {
                self.resched_pending[cpu].store(true, Ordering::Release);
            }
            self.notify_remote(&st, cpu);
            self.reprogram_timer(&st);
        }
        for (cb, id) in callbacks {
            cb(id);
        }
    }

    /// Ticks until the nearest deadline, for a tickless idle routine.
    /// `None` means the CPU may sleep indefinitely.
    pub fn next_deadline(&self) -> Option<Ticks> {
        self.state.lock().next_deadline().map(Ticks)
    }

    /// Note interrupt entry on the current CPU.
    pub fn irq_enter(&self) {
        let cpu = self.platform.current_cpu();
        self.irq_nest[cpu].fetch_add(1, Ordering::AcqRel);
    }

    /// Note interrupt exit. At the outermost level, returns the context
    /// switch owed from work done in interrupt context; the interrupt
    /// epilogue must restore `to` instead of the interrupted context.
    pub fn irq_exit(&self) -> Option<SwitchFrames> {
        let cpu = self.platform.current_cpu();
        let depth = self.irq_nest[cpu].fetch_sub(1, Ordering::AcqRel);
        if depth != 1 {
            return None; // still nested
        }
        if !self.resched_pending[cpu].swap(false, Ordering::AcqRel) {
            return None;
        }
        let mut st = self.state.lock();
        st.pick(cpu).map(|sw| Self::resolve(&st, sw))
    }

    /// Handle a scheduler IPI on the current CPU: drain the pending
    /// reasons and arrange a local reschedule at interrupt exit.
    #[cfg(feature = "smp")]
    pub fn handle_ipi(&self) {
        let cpu = self.platform.current_cpu();
        let reasons = self.ipi.drain(cpu);
        if reasons != 0 {
            self.resched_pending[cpu].store(true, Ordering::Release);
        }
    }

    /// Dispatch the first thread on the calling CPU. Does not return if a
    /// thread is ready; returns false if nothing is runnable yet.
    pub fn start_cpu(&self) -> bool {
        let cpu = self.platform.current_cpu();
        let frames = {
            let mut st = self.state.lock();
            st.pick(cpu).map(|sw| Self::resolve(&st, sw))
        };
        match frames {
            Some(frames) => {
                unsafe { self.platform.context_switch(frames.from, frames.to) };
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn thread_state(&self, id: ThreadId) -> Option<ThreadState> {
        self.state.lock().thread_state(id)
    }

    /// A thread's current (inheritance-adjusted) priority.
    pub fn effective_priority(&self, id: ThreadId) -> Option<i8> {
        self.state.lock().effective_priority(id)
    }

    pub fn current_thread(&self, cpu: CpuId) -> Option<ThreadId> {
        self.state.lock().current_thread(cpu)
    }

    /// Most important ready thread, without committing to run it.
    pub fn peek_ready(&self) -> Option<(ThreadId, i8)> {
        self.state.lock().peek_ready()
    }

    /// (live, ready, pending) thread counts.
    pub fn thread_stats(&self) -> (usize, usize, usize) {
        let st = self.state.lock();
        (
            st.threads.live_count(),
            st.threads.count_state(ThreadState::Ready),
            st.threads.count_state(ThreadState::Pending),
        )
    }

    // ------------------------------------------------------------------
    // Decision plumbing
    // ------------------------------------------------------------------

    fn resolve(st: &SchedState, sw: Switch) -> SwitchFrames {
        let from = sw
            .from
            .and_then(|id| st.threads.get(id))
            .map(|t| t.context)
            .unwrap_or(0);
        let to = st.threads.expect(sw.to).context;
        SwitchFrames { from, to }
    }

    /// Apply the local preemption check: immediately in thread context,
    /// deferred to interrupt exit in ISR context.
    fn preempt_locked(&self, st: &mut SchedState, cpu: CpuId) -> Option<SwitchFrames> {
        if !st.needs_resched(cpu) {
            return None;
        }
        if self.in_isr(cpu) {
            self.resched_pending[cpu].store(true, Ordering::Release);
            return None;
        }
        st.pick(cpu).map(|sw| Self::resolve(st, sw))
    }

    /// Replace this CPU's displaced (suspended/aborted) thread.
    fn local_resched_locked(&self, st: &mut SchedState, cpu: CpuId) -> Option<SwitchFrames> {
        if self.in_isr(cpu) {
            self.resched_pending[cpu].store(true, Ordering::Release);
            return None;
        }
        st.pick(cpu).map(|sw| Self::resolve(st, sw))
    }

    /// Signal every other CPU whose scheduling decision this mutation
    /// invalidated.
    #[cfg(feature = "smp")]
    fn notify_remote(&self, st: &SchedState, me: CpuId) {
        for cpu in 0..st.cfg.num_cpus {
            if cpu != me && st.needs_resched(cpu) {
                self.kick_remote(cpu, reason::RESCHEDULE);
            }
        }
    }

    #[cfg(not(feature = "smp"))]
    fn notify_remote(&self, _st: &SchedState, _me: CpuId) {}

    #[cfg(feature = "smp")]
    fn kick_remote(&self, cpu: CpuId, reasons: u32) {
        if self.ipi.post(cpu, reasons) {
            self.platform.send_ipi(cpu);
        }
    }

    #[cfg(not(feature = "smp"))]
    fn kick_remote(&self, _cpu: CpuId, _reasons: u32) {}

    fn in_isr(&self, cpu: CpuId) -> bool {
        self.irq_nest[cpu].load(Ordering::Acquire) > 0
    }

    /// Keep the tickless timer aimed at the nearest deadline.
    fn reprogram_timer(&self, st: &SchedState) {
        match st.next_deadline() {
            Some(ticks) => {
                let lead = self.platform.min_timeout_lead();
                self.platform.set_timeout_event(ticks.max(lead));
            }
            None => self.platform.clear_timeout_event(),
        }
    }

    fn commit(&self, frames: Option<SwitchFrames>) {
        if let Some(frames) = frames {
            unsafe { self.platform.context_switch(frames.from, frames.to) };
        }
    }
}
