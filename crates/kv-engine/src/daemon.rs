//! The background flush daemon: repeatedly drains the journal, halving
//! its poll interval toward the floor the moment it finds work and
//! doubling it toward the ceiling when a drain comes back empty.
//!
//! A plain `std::thread::spawn` closure over an `Arc`'d shared handle,
//! with no async runtime involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::arena::Arena;
use crate::config::EngineConfig;
use crate::index::MetaIndex;
use crate::journal::Journal;
use crate::mmap_file::MmapFile;
use crate::monitor::Counters;
use std::fs::File;
use std::sync::Mutex;

pub struct Daemon {
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Daemon {
    pub fn spawn(
        journal: Arc<Journal>,
        arena: Arc<Arena>,
        mmap: Arc<MmapFile>,
        index: Arc<Mutex<MetaIndex>>,
        meta_file: Arc<Mutex<File>>,
        counters: Arc<Counters>,
        config: EngineConfig,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let alive_thread = alive.clone();

        let handle = thread::spawn(move || {
            let mut interval = config.daemon_start_interval;
            while alive_thread.load(Ordering::Acquire) {
                let flusher = crate::flusher::Flusher {
                    journal: &journal,
                    arena: &arena,
                    mmap: &mmap,
                    index: &index,
                    meta_file: &meta_file,
                    counters: Some(&counters),
                };
                match flusher.flush_once() {
                    Ok(true) => {
                        interval = (interval / 2).max(config.daemon_min_interval);
                    }
                    Ok(false) => {
                        interval = (interval * 2).min(config.daemon_max_interval);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "daemon: flush attempt failed, will retry");
                        interval = (interval * 2).min(config.daemon_max_interval);
                    }
                }
                thread::sleep(interval);
            }
        });

        Self {
            alive,
            handle: Some(handle),
        }
    }

    /// Signal shutdown and join the thread. Safe to call more than once.
    pub fn stop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.stop();
    }
}
