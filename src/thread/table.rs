//! Fixed-capacity arena of thread control blocks.

use super::{Tcb, ThreadId, ThreadOptions, ThreadState};
use crate::errors::SpawnError;
use crate::fatal::{kernel_fatal, FatalReason};
use alloc::vec::Vec;

struct Slot {
    seq: u16,
    tcb: Option<Tcb>,
}

/// Arena of TCBs sized once at kernel construction.
///
/// Slots are recycled through a free list; each reuse bumps the slot's
/// sequence so stale [`ThreadId`]s stop resolving.
pub struct ThreadTable {
    slots: Vec<Slot>,
    free: Vec<u16>,
    live: usize,
}

impl ThreadTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        let mut free = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot { seq: 0, tcb: None });
            free.push((capacity - 1 - i) as u16);
        }
        Self {
            slots,
            free,
            live: 0,
        }
    }

    /// Create a TCB in a free slot. Priority and stack must already have
    /// been validated by the caller.
    pub fn create(&mut self, opts: &ThreadOptions) -> Result<ThreadId, SpawnError> {
        let slot = self.free.pop().ok_or(SpawnError::TooManyThreads)?;
        let seq = self.slots[slot as usize].seq;
        let id = ThreadId::from_parts(slot, seq);
        self.slots[slot as usize].tcb = Some(Tcb::new(id, opts));
        self.live += 1;
        Ok(id)
    }

    /// Mark a thread dead and recycle its slot.
    pub fn destroy(&mut self, id: ThreadId) {
        let slot = &mut self.slots[id.slot()];
        match slot.tcb {
            Some(ref tcb) if tcb.id == id => {}
            _ => kernel_fatal(FatalReason::StaleHandle),
        }
        slot.tcb = None;
        slot.seq = slot.seq.wrapping_add(1);
        self.free.push(id.slot() as u16);
        self.live -= 1;
    }

    /// Resolve an id, returning `None` for stale or never-issued handles.
    pub fn get(&self, id: ThreadId) -> Option<&Tcb> {
        self.slots
            .get(id.slot())
            .and_then(|s| s.tcb.as_ref())
            .filter(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Tcb> {
        self.slots
            .get_mut(id.slot())
            .and_then(|s| s.tcb.as_mut())
            .filter(|t| t.id == id)
    }

    /// Resolve an id the scheduler itself issued; a miss is an invariant
    /// violation, not an error.
    pub fn expect(&self, id: ThreadId) -> &Tcb {
        match self.get(id) {
            Some(tcb) => tcb,
            None => kernel_fatal(FatalReason::StaleHandle),
        }
    }

    pub fn expect_mut(&mut self, id: ThreadId) -> &mut Tcb {
        match self.get_mut(id) {
            Some(tcb) => tcb,
            None => kernel_fatal(FatalReason::StaleHandle),
        }
    }

    /// Number of live (non-dead) threads.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Iterate over live TCBs.
    pub fn iter(&self) -> impl Iterator<Item = &Tcb> {
        self.slots.iter().filter_map(|s| s.tcb.as_ref())
    }

    /// Count threads in a given state, for introspection.
    pub fn count_state(&self, state: ThreadState) -> usize {
        self.iter().filter(|t| t.state == state).count()
    }
}
