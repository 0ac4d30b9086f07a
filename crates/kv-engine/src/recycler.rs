//! The chunk recycler: periodically evicts the coldest resident chunks
//! once the resident set exceeds the RAM budget.
//!
//! Only chunks with index `< p_synced` are eligible — anything at or
//! past the synced watermark may still be receiving writes. Eviction is
//! best-effort: a chunk a reader is currently borrowing is simply
//! skipped until the next sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::arena::Arena;
use crate::config::EngineConfig;
use crate::journal::Journal;

pub struct Recycler {
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Recycler {
    pub fn spawn(journal: Arc<Journal>, arena: Arc<Arena>, config: EngineConfig) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let alive_thread = alive.clone();

        let handle = thread::spawn(move || {
            while alive_thread.load(Ordering::Acquire) {
                let (_, _, p_synced, _) = journal.watermarks();
                sweep(&arena, p_synced, config.max_chunks);
                thread::sleep(config.recycler_interval);
            }
        });

        Self {
            alive,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Recycler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One sweep: collect `(last_touch, index)` for every resident,
/// below-watermark chunk; if more than `max_chunks` are resident, evict
/// the oldest excess by a full sort on `last_touch` (Open Question (b):
/// a plain sort over the reference implementation's `nth_element`).
fn sweep(arena: &Arena, p_synced: usize, max_chunks: usize) {
    let mut candidates = arena.recyclable_snapshot(p_synced);
    if candidates.len() <= max_chunks {
        return;
    }
    candidates.sort_by_key(|&(ts, _)| ts);
    let evict_count = candidates.len() - max_chunks;
    for &(_, index) in candidates.iter().take(evict_count) {
        arena.try_evict(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_leaves_budget_untouched_when_under_limit() {
        let arena = Arena::new(16);
        let mut p = 0usize;
        let mut sz = 0usize;
        arena.alloc(&mut p, &mut sz, 4);
        sweep(&arena, 1, 10);
        assert!(arena.get(0).unwrap().is_resident());
    }

    #[test]
    fn sweep_evicts_oldest_first_when_over_budget() {
        let arena = Arena::new(16);
        let mut p = 0usize;
        let mut sz = 0usize;
        arena.alloc(&mut p, &mut sz, 16);
        arena.alloc(&mut p, &mut sz, 16);
        arena.alloc(&mut p, &mut sz, 16);
        // touch order is allocation order: chunk 0 is oldest.
        sweep(&arena, 3, 2);
        assert!(!arena.get(0).unwrap().is_resident());
        assert!(arena.get(1).unwrap().is_resident());
        assert!(arena.get(2).unwrap().is_resident());
    }

    #[test]
    fn sweep_skips_chunks_at_or_past_synced_watermark() {
        let arena = Arena::new(16);
        let mut p = 0usize;
        let mut sz = 0usize;
        arena.alloc(&mut p, &mut sz, 16);
        arena.alloc(&mut p, &mut sz, 16);
        // p_synced = 1 means only chunk 0 is eligible.
        sweep(&arena, 1, 0);
        assert!(!arena.get(0).unwrap().is_resident());
        assert!(arena.get(1).unwrap().is_resident());
    }
}
