//! Delta-queue of pending timeouts.
//!
//! Entries are kept sorted by deadline, but each node stores only the tick
//! delta from its predecessor. Advancing time by N ticks touches just the
//! head (plus whatever expires), and the sum of deltas from the head to any
//! node always equals that node's absolute deadline minus the current tick.
//!
//! Nodes live in an index-linked arena; callers hold sequence-checked
//! [`TimeoutKey`] handles, so a cancelled entry can never be confused with
//! a later reuse of its slot.

use crate::thread::ThreadId;
use crate::time::timer::TimerId;
use alloc::vec::Vec;

/// What to do when an entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    /// Wake a sleeping or pending thread with a timed-out result.
    WakeThread(ThreadId),
    /// Fire a software timer.
    FireTimer(TimerId),
}

/// Handle to a scheduled entry, valid until it fires or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutKey {
    slot: u32,
    seq: u32,
}

struct Node {
    /// Ticks after the predecessor's deadline (head: after "now").
    /// Signed so `advance` can carry a negative remainder while draining.
    delta: i64,
    action: ExpiryAction,
    next: Option<u32>,
}

struct Slot {
    seq: u32,
    node: Option<Node>,
}

/// The timeout list itself. All access happens under the scheduler lock:
/// `advance` from interrupt context, `schedule`/`cancel` from thread context.
pub struct TimeoutList {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
}

impl TimeoutList {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
        }
    }

    fn alloc(&mut self, node: Node) -> (u32, u32) {
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.node = Some(node);
            (slot, s.seq)
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot {
                seq: 0,
                node: Some(node),
            });
            (slot, 0)
        }
    }

    fn release(&mut self, slot: u32) {
        let s = &mut self.slots[slot as usize];
        s.node = None;
        s.seq = s.seq.wrapping_add(1);
        self.free.push(slot);
    }

    /// Insert an entry expiring `delta` ticks from now.
    ///
    /// A zero delta fires on the next `advance`, however small.
    pub fn schedule(&mut self, action: ExpiryAction, delta: u64) -> TimeoutKey {
        let mut remaining = delta as i64;

        // Find the insertion point: the first node whose delta exceeds what
        // is left of ours, splitting its delta around the new entry.
        let mut prev: Option<u32> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node_delta = self.node(idx).delta;
            if remaining < node_delta {
                break;
            }
            remaining -= node_delta;
            prev = Some(idx);
            cursor = self.node(idx).next;
        }

        let (slot, seq) = self.alloc(Node {
            delta: remaining,
            action,
            next: cursor,
        });
        if let Some(idx) = cursor {
            self.node_mut(idx).delta -= remaining;
        }
        match prev {
            Some(p) => self.node_mut(p).next = Some(slot),
            None => self.head = Some(slot),
        }
        TimeoutKey { slot, seq }
    }

    /// Remove an entry before it fires.
    ///
    /// The removed entry's delta is folded into its successor so every
    /// later deadline is unaffected. Returns the ticks that remained until
    /// expiry, or `None` if the key is stale (already fired or cancelled).
    pub fn cancel(&mut self, key: TimeoutKey) -> Option<u64> {
        let slot = self.slots.get(key.slot as usize)?;
        if slot.seq != key.seq || slot.node.is_none() {
            return None;
        }

        let mut remaining: i64 = 0;
        let mut prev: Option<u32> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            remaining += self.node(idx).delta;
            if idx == key.slot {
                let next = self.node(idx).next;
                let delta = self.node(idx).delta;
                if let Some(n) = next {
                    self.node_mut(n).delta += delta;
                }
                match prev {
                    Some(p) => self.node_mut(p).next = next,
                    None => self.head = next,
                }
                self.release(idx);
                return Some(remaining.max(0) as u64);
            }
            prev = Some(idx);
            cursor = self.node(idx).next;
        }
        None
    }

    /// Advance time by `ticks`, collecting every expired action in order.
    pub fn advance(&mut self, ticks: u64, fired: &mut Vec<ExpiryAction>) {
        let Some(head) = self.head else { return };
        self.node_mut(head).delta -= ticks as i64;

        while let Some(idx) = self.head {
            if self.node(idx).delta > 0 {
                break;
            }
            // Carry the overshoot into the next entry so deadlines that
            // landed inside this advance still fire in the right order.
            let carry = self.node(idx).delta;
            let next = self.node(idx).next;
            if let Some(n) = next {
                self.node_mut(n).delta += carry;
            }
            fired.push(self.node(idx).action);
            self.head = next;
            self.release(idx);
        }
    }

    /// Ticks until the nearest deadline, or `None` when nothing is pending.
    pub fn next_deadline(&self) -> Option<u64> {
        self.head.map(|idx| self.node(idx).delta.max(0) as u64)
    }

    /// Ticks remaining until `key` fires, or `None` for a stale key.
    pub fn remaining(&self, key: TimeoutKey) -> Option<u64> {
        let slot = self.slots.get(key.slot as usize)?;
        if slot.seq != key.seq || slot.node.is_none() {
            return None;
        }
        let mut sum: i64 = 0;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            sum += self.node(idx).delta;
            if idx == key.slot {
                return Some(sum.max(0) as u64);
            }
            cursor = self.node(idx).next;
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn node(&self, idx: u32) -> &Node {
        match self.slots[idx as usize].node.as_ref() {
            Some(node) => node,
            None => crate::fatal::kernel_fatal(crate::fatal::FatalReason::StaleHandle),
        }
    }

    fn node_mut(&mut self, idx: u32) -> &mut Node {
        match self.slots[idx as usize].node.as_mut() {
            Some(node) => node,
            None => crate::fatal::kernel_fatal(crate::fatal::FatalReason::StaleHandle),
        }
    }
}

impl Default for TimeoutList {
    fn default() -> Self {
        Self::new()
    }
}
