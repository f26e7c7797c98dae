//! Priority-bitmap ready queue.
//!
//! Priorities are small dense integers, so the queue keeps one FIFO list
//! per level plus a 128-bit occupancy bitmap; finding the most important
//! ready thread is a single find-first-set. Insert, remove and peek are
//! all O(1) for the configured priority range.

use crate::fatal::{kernel_fatal, FatalReason};
use crate::thread::ThreadId;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// The ready queue. Owns ids, not TCBs; the caller (the scheduler core)
/// keeps thread state and membership tags consistent.
pub struct ReadyQueue {
    /// Bit `i` set iff `levels[i]` is non-empty. Lower index = more
    /// important, so find-first-set yields the best level.
    bitmap: u128,
    levels: Vec<VecDeque<ThreadId>>,
    /// Dense-index offset: number of cooperative levels.
    offset: i16,
}

impl ReadyQueue {
    /// Build a queue for priorities `-num_coop..num_levels-num_coop`.
    pub fn new(num_levels: usize, num_coop: u8) -> Self {
        debug_assert!(num_levels <= 128);
        let mut levels = Vec::with_capacity(num_levels);
        levels.resize_with(num_levels, VecDeque::new);
        Self {
            bitmap: 0,
            levels,
            offset: num_coop as i16,
        }
    }

    fn index(&self, prio: i8) -> usize {
        (prio as i16 + self.offset) as usize
    }

    /// Insert at the tail of the thread's priority level (FIFO arrival;
    /// reinsertion after preemption, yield, or slice expiry).
    pub fn insert(&mut self, id: ThreadId, prio: i8) {
        let idx = self.index(prio);
        self.levels[idx].push_back(id);
        self.bitmap |= 1u128 << idx;
    }

    /// Remove a specific thread (run selection at a non-head position,
    /// priority relocation, abort while ready). Fatal if absent: the
    /// caller believed the ready queue owned this thread.
    pub fn remove(&mut self, id: ThreadId, prio: i8) {
        let idx = self.index(prio);
        let level = &mut self.levels[idx];
        match level.iter().position(|&t| t == id) {
            Some(pos) => {
                level.remove(pos);
            }
            None => kernel_fatal(FatalReason::StaleHandle),
        }
        if level.is_empty() {
            self.bitmap &= !(1u128 << idx);
        }
    }

    /// Most important ready thread, without removing it.
    pub fn peek_highest(&self) -> Option<(ThreadId, i8)> {
        if self.bitmap == 0 {
            return None;
        }
        let idx = self.bitmap.trailing_zeros() as usize;
        let id = *self.levels[idx].front()?;
        Some((id, (idx as i16 - self.offset) as i8))
    }

    /// Remove and return the most important ready thread.
    pub fn pop_highest(&mut self) -> Option<(ThreadId, i8)> {
        if self.bitmap == 0 {
            return None;
        }
        let idx = self.bitmap.trailing_zeros() as usize;
        let id = self.levels[idx].pop_front()?;
        if self.levels[idx].is_empty() {
            self.bitmap &= !(1u128 << idx);
        }
        Some((id, (idx as i16 - self.offset) as i8))
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    /// Whether the queue contains this thread at this priority.
    pub fn contains(&self, id: ThreadId, prio: i8) -> bool {
        self.levels[self.index(prio)].iter().any(|&t| t == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u16) -> ThreadId {
        ThreadId::from_parts(n, 0)
    }

    fn queue() -> ReadyQueue {
        ReadyQueue::new(32, 16) // priorities -16..16
    }

    #[test]
    fn peek_returns_most_important() {
        let mut q = queue();
        q.insert(tid(1), 10);
        q.insert(tid(2), 5);
        q.insert(tid(3), 1);
        assert_eq!(q.peek_highest(), Some((tid(3), 1)));
        assert_eq!(q.pop_highest(), Some((tid(3), 1)));
        assert_eq!(q.pop_highest(), Some((tid(2), 5)));
        assert_eq!(q.pop_highest(), Some((tid(1), 10)));
        assert!(q.is_empty());
    }

    #[test]
    fn cooperative_priorities_beat_preemptible() {
        let mut q = queue();
        q.insert(tid(1), 0);
        q.insert(tid(2), -3);
        assert_eq!(q.peek_highest(), Some((tid(2), -3)));
    }

    #[test]
    fn fifo_within_a_level() {
        let mut q = queue();
        q.insert(tid(1), 4);
        q.insert(tid(2), 4);
        q.insert(tid(3), 4);
        assert_eq!(q.pop_highest(), Some((tid(1), 4)));
        assert_eq!(q.pop_highest(), Some((tid(2), 4)));
        assert_eq!(q.pop_highest(), Some((tid(3), 4)));
    }

    #[test]
    fn remove_specific_thread() {
        let mut q = queue();
        q.insert(tid(1), 4);
        q.insert(tid(2), 4);
        q.remove(tid(1), 4);
        assert!(q.contains(tid(2), 4));
        assert!(!q.contains(tid(1), 4));
        assert_eq!(q.pop_highest(), Some((tid(2), 4)));
        assert!(q.is_empty());
    }

    #[test]
    fn bitmap_clears_when_level_drains() {
        let mut q = queue();
        q.insert(tid(1), 2);
        q.insert(tid(2), 9);
        q.remove(tid(1), 2);
        assert_eq!(q.peek_highest(), Some((tid(2), 9)));
        assert_eq!(q.len(), 1);
    }
}
