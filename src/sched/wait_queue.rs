//! Wait queues for blocked threads.
//!
//! Each synchronization primitive owns one wait queue, identified by a
//! [`WaitQueueId`] handle into the scheduler state. The wake order is a
//! construction-time property: FIFO for fairness, priority order for
//! primitives that need the most important waiter first (required for
//! priority-inheriting mutexes).

use crate::thread::ThreadId;
use alloc::collections::VecDeque;

/// Handle to a wait queue registered with the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitQueueId(pub(crate) u32);

/// Wake ordering policy, fixed per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOrder {
    /// First blocked, first woken.
    Fifo,
    /// Most important waiter woken first; FIFO among equals.
    Priority,
}

/// A single wait queue. Waiter priority lookups go through the caller so
/// the queue itself stays free of TCB references.
pub struct WaitQueue {
    pub(crate) order: WaitOrder,
    pub(crate) waiters: VecDeque<ThreadId>,
    /// Current holder of the associated primitive, when the primitive
    /// participates in priority inheritance.
    pub(crate) owner: Option<ThreadId>,
    /// The holder's effective priority when it took ownership; restored
    /// on release.
    pub(crate) owner_orig_prio: i8,
}

impl WaitQueue {
    pub(crate) fn new(order: WaitOrder) -> Self {
        Self {
            order,
            waiters: VecDeque::new(),
            owner: None,
            owner_orig_prio: 0,
        }
    }

    /// Insert a waiter according to the queue's policy.
    pub(crate) fn insert(&mut self, id: ThreadId, prio: i8, prio_of: impl Fn(ThreadId) -> i8) {
        match self.order {
            WaitOrder::Fifo => self.waiters.push_back(id),
            WaitOrder::Priority => {
                // Stable insert: after every waiter at least as important.
                let pos = self
                    .waiters
                    .iter()
                    .position(|&w| prio_of(w) > prio)
                    .unwrap_or(self.waiters.len());
                self.waiters.insert(pos, id);
            }
        }
    }

    /// Remove a specific waiter (timeout expiry, abort, suspend).
    pub(crate) fn remove(&mut self, id: ThreadId) -> bool {
        match self.waiters.iter().position(|&w| w == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Re-sort one waiter after its effective priority changed
    /// (inheritance boost while blocked). No-op for FIFO queues.
    pub(crate) fn reposition(&mut self, id: ThreadId, prio: i8, prio_of: impl Fn(ThreadId) -> i8) {
        if self.order == WaitOrder::Fifo {
            return;
        }
        if self.remove(id) {
            self.insert(id, prio, prio_of);
        }
    }

    /// Most important (or oldest) waiter without removing it.
    pub(crate) fn peek(&self) -> Option<ThreadId> {
        self.waiters.front().copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn tid(n: u16) -> ThreadId {
        ThreadId::from_parts(n, 0)
    }

    fn drain(q: &mut WaitQueue) -> Vec<ThreadId> {
        let mut order = Vec::new();
        while let Some(id) = q.peek() {
            q.remove(id);
            order.push(id);
        }
        order
    }

    #[test]
    fn fifo_order_preserves_block_order() {
        let mut q = WaitQueue::new(WaitOrder::Fifo);
        q.insert(tid(1), 5, |_| 5);
        q.insert(tid(2), 1, |_| 1);
        q.insert(tid(3), 9, |_| 9);
        assert_eq!(drain(&mut q), [tid(1), tid(2), tid(3)]);
    }

    #[test]
    fn priority_order_wakes_most_important_first() {
        let prio = |id: ThreadId| match id.slot() {
            1 => 5i8,
            2 => 1,
            3 => 9,
            _ => 0,
        };
        let mut q = WaitQueue::new(WaitOrder::Priority);
        q.insert(tid(1), 5, prio);
        q.insert(tid(2), 1, prio);
        q.insert(tid(3), 9, prio);
        assert_eq!(drain(&mut q), [tid(2), tid(1), tid(3)]);
    }

    #[test]
    fn priority_ties_stay_fifo() {
        let mut q = WaitQueue::new(WaitOrder::Priority);
        q.insert(tid(1), 4, |_| 4);
        q.insert(tid(2), 4, |_| 4);
        q.insert(tid(3), 4, |_| 4);
        assert_eq!(drain(&mut q), [tid(1), tid(2), tid(3)]);
    }

    #[test]
    fn remove_specific_waiter() {
        let mut q = WaitQueue::new(WaitOrder::Fifo);
        q.insert(tid(1), 0, |_| 0);
        q.insert(tid(2), 0, |_| 0);
        assert!(q.remove(tid(1)));
        assert!(!q.remove(tid(1)));
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek(), Some(tid(2)));
    }

    #[test]
    fn reposition_after_boost() {
        // tid(2) gets boosted from 8 to 0 while blocked; it must move to
        // the head of a priority queue.
        let mut q = WaitQueue::new(WaitOrder::Priority);
        q.insert(tid(1), 3, |_| 3);
        q.insert(tid(2), 8, |id| if id.slot() == 1 { 3 } else { 8 });
        assert_eq!(q.peek(), Some(tid(1)));

        let boosted = |id: ThreadId| match id.slot() {
            1 => 3i8,
            2 => 0,
            _ => 0,
        };
        q.reposition(tid(2), 0, boosted);
        assert_eq!(q.peek(), Some(tid(2)));
    }
}
