//! The scheduler core: the single authority for thread state transitions
//! and "what runs next" decisions.
//!
//! All mutable state lives in [`SchedState`], which the kernel wraps in
//! one spinlock. Every operation here assumes that lock is held; nothing
//! in this module blocks or calls out while holding borrowed state, and
//! the only non-local exits are fatal invariant violations.

use crate::config::KernelConfig;
use crate::errors::SchedError;
use crate::fatal::{kernel_fatal, FatalReason};
use crate::thread::{QueueMembership, ThreadId, ThreadOptions, ThreadState, ThreadTable, WakeOutcome};
use crate::time::timeout_list::{ExpiryAction, TimeoutList};
use crate::time::timer::{TimerCallback, TimerId, TimerState};
use alloc::vec::Vec;

pub mod ready_queue;
pub mod wait_queue;

pub use ready_queue::ReadyQueue;
pub use wait_queue::{WaitOrder, WaitQueue, WaitQueueId};

/// CPU identifier type.
pub type CpuId = usize;

/// Longest priority-inheritance chain followed on a single block.
const MAX_BOOST_DEPTH: usize = 8;

/// A committed context-switch decision.
///
/// `from: None` means the outgoing context must not be saved (the CPU was
/// idle, or the outgoing thread is dead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: Option<ThreadId>,
    pub to: ThreadId,
}

/// All scheduler-visible state, guarded by the kernel's scheduler lock.
pub struct SchedState {
    pub(crate) cfg: KernelConfig,
    pub(crate) threads: ThreadTable,
    pub(crate) ready: ReadyQueue,
    pub(crate) timeouts: TimeoutList,
    wait_queues: Vec<Option<WaitQueue>>,
    wq_free: Vec<u32>,
    timers: Vec<Option<TimerState>>,
    timer_free: Vec<u32>,
    /// Thread currently executing on each CPU.
    current: Vec<Option<ThreadId>>,
}

impl SchedState {
    pub(crate) fn new(cfg: KernelConfig) -> Self {
        let mut current = Vec::with_capacity(cfg.num_cpus);
        current.resize(cfg.num_cpus, None);
        Self {
            cfg,
            threads: ThreadTable::new(cfg.max_threads),
            ready: ReadyQueue::new(cfg.num_prios(), cfg.num_coop_prios),
            timeouts: TimeoutList::new(),
            wait_queues: Vec::new(),
            wq_free: Vec::new(),
            timers: Vec::new(),
            timer_free: Vec::new(),
            current,
        }
    }

    // ------------------------------------------------------------------
    // Thread creation and ready-queue admission
    // ------------------------------------------------------------------

    pub(crate) fn create_thread(
        &mut self,
        opts: &ThreadOptions,
    ) -> Result<ThreadId, crate::errors::SpawnError> {
        let id = self.threads.create(opts)?;
        self.make_ready(id);
        Ok(id)
    }

    /// Insert a READY thread at the tail of its level.
    fn make_ready(&mut self, id: ThreadId) {
        let t = self.threads.expect_mut(id);
        if t.membership != QueueMembership::None {
            kernel_fatal(FatalReason::DualMembership(id));
        }
        t.state = ThreadState::Ready;
        t.membership = QueueMembership::Ready;
        let prio = t.prio;
        self.ready.insert(id, prio);
    }

    /// Transition a thread popped from the ready queue to RUNNING on `cpu`.
    fn run(&mut self, id: ThreadId, cpu: CpuId) {
        let cfg = self.cfg;
        let t = self.threads.expect_mut(id);
        if t.state == ThreadState::Dead {
            kernel_fatal(FatalReason::DeadThreadScheduled(id));
        }
        t.state = ThreadState::Running;
        t.membership = QueueMembership::None;
        t.last_cpu = cpu;
        t.slice_left = if cfg.is_sliceable(t.prio) {
            cfg.slice_ticks
        } else {
            0
        };
        self.current[cpu] = Some(id);
    }

    // ------------------------------------------------------------------
    // The reschedule decision
    // ------------------------------------------------------------------

    /// Whether `cpu` should re-evaluate what it is running.
    ///
    /// True when the CPU is idle with ready work, its thread has been
    /// displaced (suspended/aborted/expired slice), or a strictly more
    /// important thread is ready. Equal priority never preempts here:
    /// cooperative semantics only hand the CPU over on blocking, yield,
    /// or slice expiry, all of which displace the thread first.
    pub(crate) fn needs_resched(&self, cpu: CpuId) -> bool {
        match self.current[cpu] {
            None => !self.ready.is_empty(),
            Some(c) => {
                let t = self.threads.expect(c);
                if t.state != ThreadState::Running {
                    return true;
                }
                match self.ready.peek_highest() {
                    Some((_, prio)) => prio < t.prio,
                    None => false,
                }
            }
        }
    }

    /// Commit a scheduling decision for `cpu`, returning the context
    /// switch to perform, if any.
    pub(crate) fn pick(&mut self, cpu: CpuId) -> Option<Switch> {
        let Some(c) = self.current[cpu] else {
            let (next, _) = self.ready.pop_highest()?;
            self.run(next, cpu);
            return Some(Switch {
                from: None,
                to: next,
            });
        };

        match self.threads.expect(c).state {
            ThreadState::Running => {
                // Preemption check: strictly more important only.
                let (_, cand_prio) = self.ready.peek_highest()?;
                let cur_prio = self.threads.expect(c).prio;
                if cand_prio >= cur_prio {
                    return None;
                }
                let (next, _) = self.ready.pop_highest()?;
                // The preempted thread goes back to the tail of its own
                // level, behind peers that became ready while it ran.
                let t = self.threads.expect_mut(c);
                t.state = ThreadState::Ready;
                t.membership = QueueMembership::Ready;
                self.ready.insert(c, cur_prio);
                self.run(next, cpu);
                Some(Switch {
                    from: Some(c),
                    to: next,
                })
            }
            ThreadState::Ready => {
                // Displaced into the ready queue (yield or slice expiry)
                // but still on the CPU: run whoever is best now, which
                // may be the same thread again.
                let (next, _) = match self.ready.pop_highest() {
                    Some(pick) => pick,
                    None => kernel_fatal(FatalReason::NoRunnableThread(cpu)),
                };
                if next == c {
                    self.run(c, cpu);
                    return None;
                }
                self.run(next, cpu);
                Some(Switch {
                    from: Some(c),
                    to: next,
                })
            }
            ThreadState::Pending | ThreadState::Suspended => {
                // Displaced by a blocking call or remote suspend; a
                // replacement must exist (idle thread contract).
                let (next, _) = match self.ready.pop_highest() {
                    Some(pick) => pick,
                    None => kernel_fatal(FatalReason::NoRunnableThread(cpu)),
                };
                self.run(next, cpu);
                Some(Switch {
                    from: Some(c),
                    to: next,
                })
            }
            ThreadState::Dead => {
                let (next, _) = match self.ready.pop_highest() {
                    Some(pick) => pick,
                    None => kernel_fatal(FatalReason::NoRunnableThread(cpu)),
                };
                self.run(next, cpu);
                // Safe to recycle now that the CPU has let go of it.
                self.threads.destroy(c);
                Some(Switch {
                    from: None,
                    to: next,
                })
            }
        }
    }

    /// Voluntary yield: tail of own level, then re-pick.
    pub(crate) fn yield_current(&mut self, cpu: CpuId) -> Option<Switch> {
        let c = self.current[cpu]?;
        let t = self.threads.expect_mut(c);
        if t.state != ThreadState::Running {
            return self.pick(cpu);
        }
        t.state = ThreadState::Ready;
        t.membership = QueueMembership::Ready;
        let prio = t.prio;
        self.ready.insert(c, prio);
        self.pick(cpu)
    }

    // ------------------------------------------------------------------
    // Blocking, waking, sleeping
    // ------------------------------------------------------------------

    /// Block the running thread on a wait queue, arming a timeout for
    /// finite waits and boosting the queue owner's priority chain for
    /// inheriting queues. Returns the switch away from the blocked thread.
    pub(crate) fn pend_current(
        &mut self,
        cpu: CpuId,
        wqid: WaitQueueId,
        timeout_ticks: Option<u64>,
    ) -> Result<Switch, SchedError> {
        let c = self.current[cpu].ok_or(SchedError::WrongState)?;
        self.wq(wqid)?; // validate before any mutation

        let t = self.threads.expect_mut(c);
        t.state = ThreadState::Pending;
        t.membership = QueueMembership::Waiting(wqid);
        t.wake_outcome = WakeOutcome::None;
        let prio = t.prio;
        self.wq_insert(wqid, c, prio);

        if let Some(ticks) = timeout_ticks {
            let key = self.timeouts.schedule(ExpiryAction::WakeThread(c), ticks);
            self.threads.expect_mut(c).timeout = Some(key);
        }

        let wq = self.wq(wqid)?;
        if wq.order == WaitOrder::Priority {
            if let Some(holder) = wq.owner {
                self.boost_chain(holder, prio);
            }
        }

        match self.pick(cpu) {
            Some(sw) => Ok(sw),
            None => kernel_fatal(FatalReason::NoRunnableThread(cpu)),
        }
    }

    /// Put the running thread to sleep. `None` sleeps until [`Self::wakeup`].
    pub(crate) fn sleep_current(
        &mut self,
        cpu: CpuId,
        timeout_ticks: Option<u64>,
    ) -> Result<Switch, SchedError> {
        let c = self.current[cpu].ok_or(SchedError::WrongState)?;
        let t = self.threads.expect_mut(c);
        t.state = ThreadState::Pending;
        t.membership = QueueMembership::None;
        t.wake_outcome = WakeOutcome::None;
        t.sleep_remaining = 0;
        if let Some(ticks) = timeout_ticks {
            let key = self.timeouts.schedule(ExpiryAction::WakeThread(c), ticks);
            self.threads.expect_mut(c).timeout = Some(key);
        }
        match self.pick(cpu) {
            Some(sw) => Ok(sw),
            None => kernel_fatal(FatalReason::NoRunnableThread(cpu)),
        }
    }

    /// Move a pending thread back to READY, clearing wait-queue and
    /// timeout membership as one atomic step.
    fn unpend(&mut self, id: ThreadId, outcome: WakeOutcome) {
        let t = self.threads.expect_mut(id);
        if t.state != ThreadState::Pending {
            kernel_fatal(FatalReason::NotPending(id));
        }
        let membership = t.membership;
        let key = t.timeout.take();
        t.membership = QueueMembership::None;

        if let QueueMembership::Waiting(wqid) = membership {
            if let Ok(wq) = self.wq_mut(wqid) {
                wq.remove(id);
            }
        }
        if let Some(key) = key {
            let remaining = self.timeouts.cancel(key).unwrap_or(0);
            self.threads.expect_mut(id).sleep_remaining = remaining;
        }

        let t = self.threads.expect_mut(id);
        t.wake_outcome = outcome;
        t.state = ThreadState::Ready;
        t.membership = QueueMembership::Ready;
        let prio = t.prio;
        self.ready.insert(id, prio);
    }

    /// Wake the head waiter of a queue. `Ok(None)` if the queue was empty.
    pub(crate) fn wake_one(&mut self, wqid: WaitQueueId) -> Result<Option<ThreadId>, SchedError> {
        let wq = self.wq(wqid)?;
        let Some(id) = wq.peek() else { return Ok(None) };
        self.unpend(id, WakeOutcome::Woken);
        Ok(Some(id))
    }

    /// Wake every waiter; returns how many were woken.
    pub(crate) fn wake_all(&mut self, wqid: WaitQueueId) -> Result<usize, SchedError> {
        let mut count = 0;
        while self.wake_one(wqid)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Prematurely end a sleep. Errors if the thread is not sleeping
    /// (threads blocked on a wait queue are woken via their queue).
    pub(crate) fn wakeup(&mut self, id: ThreadId) -> Result<(), SchedError> {
        let t = self.threads.get(id).ok_or(SchedError::BadThread)?;
        if t.state != ThreadState::Pending || !matches!(t.membership, QueueMembership::None) {
            return Err(SchedError::WrongState);
        }
        self.unpend(id, WakeOutcome::Woken);
        Ok(())
    }

    /// Timeout-list expiry action for a thread deadline.
    ///
    /// A wait-queue member gets a timed-out result; a sleeper just wakes.
    /// Firing for a thread with no armed timeout means a cancellation path
    /// was skipped; that is fatal.
    pub(crate) fn expire_thread(&mut self, id: ThreadId) {
        let Some(t) = self.threads.get_mut(id) else {
            kernel_fatal(FatalReason::SpuriousTimeout(id));
        };
        if t.state != ThreadState::Pending || t.timeout.is_none() {
            kernel_fatal(FatalReason::SpuriousTimeout(id));
        }
        t.timeout = None; // the entry just fired; nothing to cancel
        let outcome = match t.membership {
            QueueMembership::Waiting(_) => WakeOutcome::TimedOut,
            _ => WakeOutcome::Woken,
        };
        self.unpend(id, outcome);
    }

    // ------------------------------------------------------------------
    // Suspend / resume / abort / priority
    // ------------------------------------------------------------------

    /// Park a thread. Returns the CPU it was running on, if it was.
    pub(crate) fn suspend(&mut self, id: ThreadId) -> Result<Option<CpuId>, SchedError> {
        let t = self.threads.get_mut(id).ok_or(SchedError::BadThread)?;
        match t.state {
            ThreadState::Suspended => Ok(None),
            ThreadState::Dead => Err(SchedError::BadThread),
            ThreadState::Running => {
                t.state = ThreadState::Suspended;
                Ok(Some(t.last_cpu))
            }
            ThreadState::Ready => {
                let prio = t.prio;
                t.state = ThreadState::Suspended;
                t.membership = QueueMembership::None;
                self.ready.remove(id, prio);
                Ok(None)
            }
            ThreadState::Pending => {
                self.detach_pending(id);
                self.threads.expect_mut(id).state = ThreadState::Suspended;
                Ok(None)
            }
        }
    }

    /// Un-park a suspended thread.
    pub(crate) fn resume(&mut self, id: ThreadId) -> Result<(), SchedError> {
        let t = self.threads.get(id).ok_or(SchedError::BadThread)?;
        if t.state != ThreadState::Suspended {
            return Err(SchedError::WrongState);
        }
        self.make_ready(id);
        Ok(())
    }

    /// Kill a thread. Returns the CPU it was running on, if it was; a
    /// running victim's slot is recycled only once its CPU has switched
    /// away (see [`Self::pick`]).
    pub(crate) fn abort(&mut self, id: ThreadId) -> Result<Option<CpuId>, SchedError> {
        let t = self.threads.get_mut(id).ok_or(SchedError::BadThread)?;
        match t.state {
            ThreadState::Dead => Err(SchedError::BadThread),
            ThreadState::Running => {
                t.state = ThreadState::Dead;
                Ok(Some(t.last_cpu))
            }
            ThreadState::Ready => {
                let prio = t.prio;
                self.ready.remove(id, prio);
                self.threads.destroy(id);
                Ok(None)
            }
            ThreadState::Pending => {
                self.detach_pending(id);
                self.threads.destroy(id);
                Ok(None)
            }
            ThreadState::Suspended => {
                self.threads.destroy(id);
                Ok(None)
            }
        }
    }

    /// Remove a pending thread from its wait queue and the timeout list as
    /// one operation; the single cancellation path for both structures.
    fn detach_pending(&mut self, id: ThreadId) {
        let t = self.threads.expect_mut(id);
        let membership = t.membership;
        let key = t.timeout.take();
        t.membership = QueueMembership::None;
        if let QueueMembership::Waiting(wqid) = membership {
            if let Ok(wq) = self.wq_mut(wqid) {
                wq.remove(id);
            }
        }
        if let Some(key) = key {
            let remaining = self.timeouts.cancel(key).unwrap_or(0);
            self.threads.expect_mut(id).sleep_remaining = remaining;
        }
    }

    /// Change a thread's base priority, relocating it in whatever
    /// structure owns it. A boosted thread keeps its boost if the boost
    /// is still more important than the new base.
    pub(crate) fn set_priority(&mut self, id: ThreadId, prio: i8) -> Result<(), SchedError> {
        let t = self.threads.get_mut(id).ok_or(SchedError::BadThread)?;
        let old_eff = t.prio;
        let was_boosted = t.prio != t.base_prio;
        t.base_prio = prio;
        let new_eff = if was_boosted { old_eff.min(prio) } else { prio };
        if new_eff != old_eff {
            t.prio = new_eff;
            self.relocate(id, old_eff, new_eff);
        }
        Ok(())
    }

    /// Re-home a thread after an effective-priority change.
    fn relocate(&mut self, id: ThreadId, old_prio: i8, new_prio: i8) {
        match self.threads.expect(id).membership {
            QueueMembership::Ready => {
                self.ready.remove(id, old_prio);
                self.ready.insert(id, new_prio);
            }
            QueueMembership::Waiting(wqid) => {
                self.wq_reposition(wqid, id, new_prio);
            }
            QueueMembership::None => {}
        }
    }

    // ------------------------------------------------------------------
    // Priority inheritance
    // ------------------------------------------------------------------

    /// Raise `holder`'s effective priority to at least `prio`, following
    /// the chain of queue owners when the holder is itself blocked on an
    /// inheriting queue. Depth-bounded; a cycle would be a deadlock the
    /// primitives above this layer must prevent.
    fn boost_chain(&mut self, holder: ThreadId, prio: i8) {
        let mut cur = holder;
        for _ in 0..MAX_BOOST_DEPTH {
            let t = self.threads.expect(cur);
            let old = t.prio;
            if prio >= old {
                break;
            }
            let membership = t.membership;
            self.threads.expect_mut(cur).prio = prio;
            match membership {
                QueueMembership::Ready => {
                    self.ready.remove(cur, old);
                    self.ready.insert(cur, prio);
                    break;
                }
                QueueMembership::Waiting(wqid) => {
                    self.wq_reposition(wqid, cur, prio);
                    let next = match self.wq(wqid) {
                        Ok(wq) if wq.order == WaitOrder::Priority => wq.owner,
                        _ => None,
                    };
                    match next {
                        Some(owner) => cur = owner,
                        None => break,
                    }
                }
                QueueMembership::None => break, // running or sleeping
            }
        }
    }

    /// Record the thread holding the primitive behind an inheriting
    /// queue. Passing the previous owner out restores the priority it had
    /// when it took ownership.
    pub(crate) fn set_queue_owner(
        &mut self,
        wqid: WaitQueueId,
        owner: Option<ThreadId>,
    ) -> Result<(), SchedError> {
        let new_orig = match owner {
            Some(id) => self.threads.get(id).ok_or(SchedError::BadThread)?.prio,
            None => 0,
        };
        let wq = self.wq_mut(wqid)?;
        let old_owner = wq.owner;
        let old_orig = wq.owner_orig_prio;
        wq.owner = owner;
        wq.owner_orig_prio = new_orig;

        if let Some(prev) = old_owner {
            if Some(prev) != owner {
                self.restore_priority(prev, old_orig);
            }
        }
        Ok(())
    }

    /// Drop an inheritance boost back to `prio`, the effective priority
    /// the thread had when it took ownership.
    fn restore_priority(&mut self, id: ThreadId, prio: i8) {
        let Some(t) = self.threads.get_mut(id) else {
            return; // owner died while holding; nothing to restore
        };
        let old = t.prio;
        if old == prio {
            return;
        }
        t.prio = prio;
        self.relocate(id, old, prio);
    }

    // ------------------------------------------------------------------
    // Time slicing
    // ------------------------------------------------------------------

    /// Charge `elapsed` ticks against the running thread's slice budget.
    /// On exhaustion with a same-or-better-priority peer ready, the thread
    /// moves to the tail of its level; with no peer it keeps the CPU and
    /// its budget refills.
    pub(crate) fn slice_tick(&mut self, cpu: CpuId, elapsed: u64) {
        let Some(c) = self.current[cpu] else { return };
        let cfg = self.cfg;
        let t = self.threads.expect_mut(c);
        if t.state != ThreadState::Running || !cfg.is_sliceable(t.prio) {
            return;
        }
        t.slice_left = t.slice_left.saturating_sub(elapsed.min(u32::MAX as u64) as u32);
        if t.slice_left > 0 {
            return;
        }
        let prio = t.prio;
        match self.ready.peek_highest() {
            Some((_, cand)) if cand <= prio => {
                let t = self.threads.expect_mut(c);
                t.state = ThreadState::Ready;
                t.membership = QueueMembership::Ready;
                self.ready.insert(c, prio);
            }
            _ => {
                self.threads.expect_mut(c).slice_left = cfg.slice_ticks;
            }
        }
    }

    // ------------------------------------------------------------------
    // Timeout announce
    // ------------------------------------------------------------------

    /// Advance kernel time: expire due deadlines (waking threads in
    /// deadline order) and charge every CPU's slice budget. Timer
    /// callbacks are returned for the caller to invoke after the lock is
    /// released.
    pub(crate) fn announce(&mut self, elapsed: u64, callbacks: &mut Vec<(TimerCallback, TimerId)>) {
        let mut fired = Vec::new();
        self.timeouts.advance(elapsed, &mut fired);
        for action in fired {
            match action {
                ExpiryAction::WakeThread(id) => self.expire_thread(id),
                ExpiryAction::FireTimer(id) => {
                    if let Some(cb) = self.fire_timer(id) {
                        callbacks.push((cb, id));
                    }
                }
            }
        }
        for cpu in 0..self.cfg.num_cpus {
            self.slice_tick(cpu, elapsed);
        }
    }

    /// Ticks until the nearest pending deadline, for tickless idle.
    pub(crate) fn next_deadline(&self) -> Option<u64> {
        self.timeouts.next_deadline()
    }

    // ------------------------------------------------------------------
    // Wait-queue registry
    // ------------------------------------------------------------------

    pub(crate) fn new_wait_queue(&mut self, order: WaitOrder) -> WaitQueueId {
        let wq = WaitQueue::new(order);
        if let Some(slot) = self.wq_free.pop() {
            self.wait_queues[slot as usize] = Some(wq);
            WaitQueueId(slot)
        } else {
            self.wait_queues.push(Some(wq));
            WaitQueueId((self.wait_queues.len() - 1) as u32)
        }
    }

    /// Tear down an empty wait queue. Errors if threads still wait on it.
    pub(crate) fn destroy_wait_queue(&mut self, wqid: WaitQueueId) -> Result<(), SchedError> {
        let wq = self.wq(wqid)?;
        if !wq.is_empty() {
            return Err(SchedError::WrongState);
        }
        self.wait_queues[wqid.0 as usize] = None;
        self.wq_free.push(wqid.0);
        Ok(())
    }

    fn wq(&self, wqid: WaitQueueId) -> Result<&WaitQueue, SchedError> {
        self.wait_queues
            .get(wqid.0 as usize)
            .and_then(|o| o.as_ref())
            .ok_or(SchedError::InvalidQueue)
    }

    fn wq_mut(&mut self, wqid: WaitQueueId) -> Result<&mut WaitQueue, SchedError> {
        self.wait_queues
            .get_mut(wqid.0 as usize)
            .and_then(|o| o.as_mut())
            .ok_or(SchedError::InvalidQueue)
    }

    fn wq_insert(&mut self, wqid: WaitQueueId, id: ThreadId, prio: i8) {
        let threads = &self.threads;
        let wq = match self
            .wait_queues
            .get_mut(wqid.0 as usize)
            .and_then(|o| o.as_mut())
        {
            Some(wq) => wq,
            None => kernel_fatal(FatalReason::StaleHandle),
        };
        wq.insert(id, prio, |t| threads.expect(t).prio);
    }

    fn wq_reposition(&mut self, wqid: WaitQueueId, id: ThreadId, prio: i8) {
        let threads = &self.threads;
        if let Some(wq) = self
            .wait_queues
            .get_mut(wqid.0 as usize)
            .and_then(|o| o.as_mut())
        {
            wq.reposition(id, prio, |t| threads.expect(t).prio);
        }
    }

    pub(crate) fn wait_count(&self, wqid: WaitQueueId) -> Result<usize, SchedError> {
        Ok(self.wq(wqid)?.len())
    }

    // ------------------------------------------------------------------
    // Software timers
    // ------------------------------------------------------------------

    pub(crate) fn new_timer(&mut self, callback: Option<TimerCallback>) -> TimerId {
        if let Some(slot) = self.timer_free.pop() {
            let seq = match &self.timers[slot as usize] {
                Some(t) => t.seq.wrapping_add(1),
                None => 0,
            };
            self.timers[slot as usize] = Some(TimerState::new(seq, callback));
            TimerId::from_parts(slot as u16, seq)
        } else {
            let slot = self.timers.len() as u16;
            self.timers.push(Some(TimerState::new(0, callback)));
            TimerId::from_parts(slot, 0)
        }
    }

    pub(crate) fn start_timer(
        &mut self,
        id: TimerId,
        delay: u64,
        period: u64,
    ) -> Result<(), crate::errors::TimerError> {
        // Stop any previous run first so the timeout entry can't double-fire.
        if let Some(key) = self.timer_mut(id)?.key.take() {
            self.timeouts.cancel(key);
        }
        let key = self.timeouts.schedule(ExpiryAction::FireTimer(id), delay);
        let t = self.timer_mut(id)?;
        t.key = Some(key);
        t.period = period;
        t.expire_count = 0;
        Ok(())
    }

    pub(crate) fn stop_timer(&mut self, id: TimerId) -> Result<(), crate::errors::TimerError> {
        let key = self
            .timer_mut(id)?
            .key
            .take()
            .ok_or(crate::errors::TimerError::NotRunning)?;
        self.timeouts.cancel(key);
        Ok(())
    }

    /// Expirations since the last status read (read-and-clear).
    pub(crate) fn timer_status(&mut self, id: TimerId) -> Result<u32, crate::errors::TimerError> {
        let t = self.timer_mut(id)?;
        let count = t.expire_count;
        t.expire_count = 0;
        Ok(count)
    }

    fn fire_timer(&mut self, id: TimerId) -> Option<TimerCallback> {
        let Ok(t) = self.timer_mut(id) else {
            return None; // stopped-and-freed between scheduling and firing
        };
        t.expire_count = t.expire_count.wrapping_add(1);
        t.key = None;
        let period = t.period;
        let cb = t.callback;
        if period > 0 {
            let key = self.timeouts.schedule(ExpiryAction::FireTimer(id), period);
            if let Ok(t) = self.timer_mut(id) {
                t.key = Some(key);
            }
        }
        cb
    }

    fn timer_mut(&mut self, id: TimerId) -> Result<&mut TimerState, crate::errors::TimerError> {
        self.timers
            .get_mut(id.slot())
            .and_then(|o| o.as_mut())
            .filter(|t| t.seq == id.seq())
            .ok_or(crate::errors::TimerError::BadTimer)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub(crate) fn thread_state(&self, id: ThreadId) -> Option<ThreadState> {
        self.threads.get(id).map(|t| t.state)
    }

    pub(crate) fn effective_priority(&self, id: ThreadId) -> Option<i8> {
        self.threads.get(id).map(|t| t.prio)
    }

    pub(crate) fn current_thread(&self, cpu: CpuId) -> Option<ThreadId> {
        self.current.get(cpu).copied().flatten()
    }

    pub(crate) fn peek_ready(&self) -> Option<(ThreadId, i8)> {
        self.ready.peek_highest()
    }
}
