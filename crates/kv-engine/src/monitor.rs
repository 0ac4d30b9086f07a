//! The optional stderr counters thread. Off by default —
//! `EngineConfig::monitor_enabled` — since an embedded library should not
//! chatter on stderr unless its host asks it to.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::arena::Arena;
use crate::config::EngineConfig;
use crate::journal::Journal;

/// Shared write/read/flush counters, bumped by the engine facade and the
/// flusher on every call.
#[derive(Default)]
pub struct Counters {
    pub writes: AtomicU64,
    pub reads: AtomicU64,
    pub not_found: AtomicU64,
    /// Records installed into the index by a completed flush (not flush
    /// *calls* — an empty flush leaves this untouched).
    pub flushed_writes: AtomicU64,
}

pub struct Monitor {
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn spawn(
        journal: Arc<Journal>,
        arena: Arc<Arena>,
        counters: Arc<Counters>,
        config: EngineConfig,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let alive_thread = alive.clone();

        let handle = thread::spawn(move || {
            let mut last_writes = 0u64;
            let mut last_page_ins = 0u64;
            while alive_thread.load(Ordering::Acquire) {
                thread::sleep(config.monitor_interval);
                let (p_current, _, p_synced, _) = journal.watermarks();

                let writes = counters.writes.load(Ordering::Relaxed);
                let page_ins = arena.page_ins();
                eprintln!(
                    "POLARSTASH: resident={} chunks={} page_ins_tick={} flushed_writes={} \
                     writes_tick={} writes={} reads={} not_found={}",
                    arena.resident_chunk_count(),
                    arena.chunk_count(),
                    page_ins.saturating_sub(last_page_ins),
                    counters.flushed_writes.load(Ordering::Relaxed),
                    writes.saturating_sub(last_writes),
                    writes,
                    counters.reads.load(Ordering::Relaxed),
                    counters.not_found.load(Ordering::Relaxed),
                );
                last_writes = writes;
                last_page_ins = page_ins;

                debug_assert!(p_synced <= p_current);
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

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
