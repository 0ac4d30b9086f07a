//! The write-batching journal: slot claiming, per-slot ready latches, and
//! the flush-epoch wait writers block on.
//!
//! Two locks cooperate, always acquired in this order to avoid deadlock:
//! `state` (claiming + draining a batch) then `epoch` (the
//! flush-completion broadcast). A writer samples its `target_epoch`
//! *while still holding `state`*, immediately after claiming its slot —
//! sampling it after release would let a flush race into the gap and
//! leave the writer waiting one epoch longer than necessary. Holding
//! `state` for the full duration of a flush (including waiting out each
//! slot's `ready` latch) is deliberate: it is what makes "fill a batch"
//! and "drain a batch" mutually exclusive phases, the same separation
//! the reference engine gets from a single `pthread_mutex_t journal_mtx`.

use std::sync::{Condvar, Mutex, MutexGuard};

use kv_core::Item;

/// A one-shot per-slot latch: the writer holds it "acquired" while its
/// key+value copy is in flight, and releases it when the copy lands. The
/// flusher acquires-then-releases each slot's latch in turn to
/// synchronize-with that copy before reading the slot's bytes.
struct ReadyLatch {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl ReadyLatch {
    fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn reset(&self) {
        *self.ready.lock().unwrap() = false;
    }

    fn release(&self) {
        *self.ready.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut g = self.ready.lock().unwrap();
        while !*g {
            g = self.cv.wait(g).unwrap();
        }
    }
}

struct JournalState {
    items: Vec<Item>,
    n_journal: usize,
    p_current: usize,
    sz_current: usize,
    p_synced: usize,
    sz_synced: usize,
}

/// A claimed slot handle a writer uses to drive its own copy-then-release
/// step, outside the journal lock.
pub struct ClaimedSlot {
    pub index: usize,
    pub offset: u64,
    target_epoch: u64,
}

pub struct Journal {
    max_journal: usize,
    state: Mutex<JournalState>,
    slots: Vec<ReadyLatch>,
    epoch: Mutex<u64>,
    epoch_cv: Condvar,
}

impl Journal {
    pub fn new(max_journal: usize, loaded_chunks: usize) -> Self {
        Self {
            max_journal,
            state: Mutex::new(JournalState {
                items: Vec::with_capacity(max_journal),
                n_journal: 0,
                p_current: loaded_chunks,
                sz_current: 0,
                p_synced: loaded_chunks,
                sz_synced: 0,
            }),
            slots: (0..max_journal).map(|_| ReadyLatch::new()).collect(),
            epoch: Mutex::new(0),
            epoch_cv: Condvar::new(),
        }
    }

    pub fn max_journal(&self) -> usize {
        self.max_journal
    }

    pub fn is_full(&self) -> bool {
        let s = self.state.lock().unwrap();
        s.n_journal >= self.max_journal
    }

    pub fn watermarks(&self) -> (usize, usize, usize, usize) {
        let s = self.state.lock().unwrap();
        (s.p_current, s.sz_current, s.p_synced, s.sz_synced)
    }

    /// Claim a slot and reserve `n = key_len + value_len` bytes of arena
    /// space via `alloc`. Returns `None` if the journal is currently full
    /// — callers should trigger a flush and retry.
    pub fn try_claim(
        &self,
        arena: &crate::arena::Arena,
        key_len: usize,
        value_len: usize,
    ) -> Option<ClaimedSlot> {
        let mut s = self.state.lock().unwrap();
        if s.n_journal >= self.max_journal {
            return None;
        }

        let index = s.n_journal;
        let offset = arena.alloc(&mut s.p_current, &mut s.sz_current, key_len + value_len);
        s.items.push(Item::new(offset, key_len as u32, value_len as u32));
        s.n_journal += 1;

        // Sampled while `state` is still held: the flush that will cover
        // this slot cannot have completed before this point.
        let target_epoch = *self.epoch.lock().unwrap();

        self.slots[index].reset();
        Some(ClaimedSlot {
            index,
            offset,
            target_epoch,
        })
    }

    /// Writer-side: signal that the copy for `slot` has landed in the
    /// arena.
    pub fn mark_copied(&self, slot: &ClaimedSlot) {
        self.slots[slot.index].release();
    }

    /// Writer-side: block until a flush covering `slot` has completed.
    pub fn wait_for_flush(&self, slot: &ClaimedSlot) {
        let mut g = self.epoch.lock().unwrap();
        while *g <= slot.target_epoch {
            g = self.epoch_cv.wait(g).unwrap();
        }
    }

    /// Flusher-side: take the whole batch, blocking further claims until
    /// [`FlushBatch::commit`] drops the state lock. Returns `None` if
    /// there is nothing to flush.
    pub fn begin_flush(&self) -> Option<FlushBatch<'_>> {
        let guard = self.state.lock().unwrap();
        if guard.n_journal == 0 {
            return None;
        }
        Some(FlushBatch {
            journal: self,
            guard,
        })
    }
}

/// An in-progress flush, holding the journal's state lock for its whole
/// lifetime.
pub struct FlushBatch<'a> {
    journal: &'a Journal,
    guard: MutexGuard<'a, JournalState>,
}

impl FlushBatch<'_> {
    pub fn len(&self) -> usize {
        self.guard.n_journal
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn item(&self, i: usize) -> Item {
        self.guard.items[i]
    }

    /// Block until slot `i`'s writer has released its ready latch.
    pub fn wait_ready(&self, i: usize) {
        self.journal.slots[i].wait();
    }

    pub fn p_current(&self) -> usize {
        self.guard.p_current
    }

    pub fn sz_current(&self) -> usize {
        self.guard.sz_current
    }

    pub fn p_synced(&self) -> usize {
        self.guard.p_synced
    }

    pub fn sz_synced(&self) -> usize {
        self.guard.sz_synced
    }

    /// Commit the batch: advance the synced watermark to the current
    /// frontier, clear the journal, and broadcast to waiting writers.
    /// Consumes the batch, releasing the state lock on return.
    pub fn commit(self) {
        let FlushBatch { journal, mut guard } = self;
        guard.p_synced = guard.p_current;
        guard.sz_synced = guard.sz_current;
        guard.items.clear();
        guard.n_journal = 0;

        let mut epoch = journal.epoch.lock().unwrap();
        *epoch += 1;
        journal.epoch_cv.notify_all();
        drop(epoch);
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn claim_reserves_distinct_offsets() {
        let arena = Arena::new(1024);
        let journal = Journal::new(4, 0);
        let a = journal.try_claim(&arena, 3, 3).unwrap();
        let b = journal.try_claim(&arena, 3, 3).unwrap();
        assert_ne!(a.offset, b.offset);
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
    }

    #[test]
    fn claim_fails_when_full() {
        let arena = Arena::new(1024);
        let journal = Journal::new(1, 0);
        assert!(journal.try_claim(&arena, 1, 1).is_some());
        assert!(journal.try_claim(&arena, 1, 1).is_none());
    }

    #[test]
    fn flush_with_nothing_claimed_returns_none() {
        let journal = Journal::new(4, 0);
        assert!(journal.begin_flush().is_none());
    }

    #[test]
    fn flush_resets_n_journal_and_advances_watermarks() {
        let arena = Arena::new(1024);
        let journal = Journal::new(4, 0);
        let slot = journal.try_claim(&arena, 3, 3).unwrap();
        journal.mark_copied(&slot);

        let batch = journal.begin_flush().unwrap();
        assert_eq!(batch.len(), 1);
        batch.wait_ready(0);
        let (p, sz) = (batch.p_current(), batch.sz_current());
        batch.commit();

        assert!(journal.begin_flush().is_none());
        let (pc, szc, ps, szs) = journal.watermarks();
        assert_eq!((pc, szc), (p, sz));
        assert_eq!((ps, szs), (p, sz));
    }
}
