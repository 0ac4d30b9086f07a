//! The engine facade: `open`, `write`, `read`, `range`, `close`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use kv_core::{EngineError, EngineResult};

use crate::arena::Arena;
use crate::config::EngineConfig;
use crate::daemon::Daemon;
use crate::flusher::Flusher;
use crate::index::{self, MetaIndex};
use crate::journal::Journal;
use crate::mmap_file::MmapFile;
use crate::monitor::{Counters, Monitor};
use crate::recycler::Recycler;

/// Index/chunk metrics snapshot returned by [`Engine::stats`].
#[derive(Clone, Debug)]
pub struct EngineStats {
    pub key_count: usize,
    pub chunk_count: usize,
    pub resident_chunk_count: usize,
    pub synced_chunk_count: usize,
    pub current_chunk_index: usize,
    pub chunk_size: usize,
    pub writes: u64,
    pub reads: u64,
    pub not_found: u64,
    pub flushed_writes: u64,
    pub page_ins: u64,
}

pub struct Engine {
    config: EngineConfig,
    journal: Arc<Journal>,
    arena: Arc<Arena>,
    mmap: Arc<MmapFile>,
    index: Arc<Mutex<MetaIndex>>,
    meta_file: Arc<Mutex<File>>,
    counters: Arc<Counters>,
    daemon: Daemon,
    recycler: Recycler,
    monitor: Option<Monitor>,
}

impl Engine {
    /// Open (or create) the database rooted at `prefix` — the two backing
    /// files are `<prefix>.meta` and `<prefix>.data`.
    pub fn open<P: AsRef<Path>>(prefix: P, config: EngineConfig) -> EngineResult<Self> {
        let prefix = prefix.as_ref();
        let meta_path = with_ext(prefix, "meta");
        let data_path = with_ext(prefix, "data");

        let items = index::load_items(&meta_path)?;

        let mmap = MmapFile::open(&data_path, config.chunk_size as u64)?;
        let loaded_chunks = mmap.chunk_count(config.chunk_size as u64);

        let mut meta_index = MetaIndex::from_items(items);
        for slot in 0..meta_index.len() {
            let item = *meta_index.get(slot).expect("slot within bounds");
            let key = mmap.read_at(item.offset, item.key_size as usize);
            meta_index.register_key(slot, &key);
        }

        let arena = Arc::new(Arena::recover(config.chunk_size, loaded_chunks));
        let journal = Arc::new(Journal::new(config.max_journal, loaded_chunks));
        let mmap = Arc::new(mmap);
        let index = Arc::new(Mutex::new(meta_index));

        let meta_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&meta_path)?;
        let meta_file = Arc::new(Mutex::new(meta_file));

        let counters = Arc::new(Counters::default());

        let daemon = Daemon::spawn(
            journal.clone(),
            arena.clone(),
            mmap.clone(),
            index.clone(),
            meta_file.clone(),
            counters.clone(),
            config.clone(),
        );
        let recycler = Recycler::spawn(journal.clone(), arena.clone(), config.clone());

        let monitor = config.monitor_enabled.then(|| {
            Monitor::spawn(journal.clone(), arena.clone(), counters.clone(), config.clone())
        });

        Ok(Self {
            config,
            journal,
            arena,
            mmap,
            index,
            meta_file,
            counters,
            daemon,
            recycler,
            monitor,
        })
    }

    /// Write `value` under `key`, replacing any prior value. Blocks until
    /// the covering flush has completed (§4.3, §4.5's ordering guarantee).
    pub fn write(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        if key.len() + value.len() > self.config.chunk_size {
            return Err(EngineError::RecordTooLarge {
                size: key.len() + value.len(),
                chunk_size: self.config.chunk_size,
            });
        }

        let slot = loop {
            if let Some(slot) = self.journal.try_claim(&self.arena, key.len(), value.len()) {
                break slot;
            }
            // Journal is full: drain it ourselves rather than spin-waiting
            // on the daemon's next tick.
            self.flush_once()?;
        };

        self.arena.copy_in(slot.offset, key, value);
        self.journal.mark_copied(&slot);
        self.journal.wait_for_flush(&slot);

        self.counters.writes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    /// Read the current value for `key`, or `Err(NotFound)`.
    pub fn read(&self, key: &[u8]) -> EngineResult<Vec<u8>> {
        let item = {
            let index = self.index.lock().unwrap();
            let slot = index.find(key);
            slot.and_then(|s| index.get(s).copied())
        };

        self.counters.reads.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        match item {
            Some(item) => Ok(self.arena.read_value(&item, &self.mmap)?),
            None => {
                self.counters.not_found.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Err(EngineError::NotFound)
            }
        }
    }

    /// Iterate entries in key order. Not implemented upstream either — a
    /// deliberate stub (Open Question (c)).
    pub fn range(&self) -> EngineResult<()> {
        Ok(())
    }

    /// A point-in-time snapshot of index/chunk metrics, for operator
    /// tooling (`kv-cli`'s `status` subcommand) and the optional monitor.
    pub fn stats(&self) -> EngineStats {
        let (p_current, _, p_synced, _) = self.journal.watermarks();
        EngineStats {
            key_count: self.index.lock().unwrap().len(),
            chunk_count: self.arena.chunk_count(),
            resident_chunk_count: self.arena.resident_chunk_count(),
            synced_chunk_count: p_synced,
            current_chunk_index: p_current,
            chunk_size: self.config.chunk_size,
            writes: self.counters.writes.load(std::sync::atomic::Ordering::Relaxed),
            reads: self.counters.reads.load(std::sync::atomic::Ordering::Relaxed),
            not_found: self.counters.not_found.load(std::sync::atomic::Ordering::Relaxed),
            flushed_writes: self.counters.flushed_writes.load(std::sync::atomic::Ordering::Relaxed),
            page_ins: self.arena.page_ins(),
        }
    }

    /// Drain any in-flight journal entries, then stop the background
    /// threads. Idempotent — safe to call more than once, and safe to skip
    /// entirely, since dropping the `Engine` runs the same sequence (§4.1).
    /// Further use of the `Engine` after `close` is a logic error in the
    /// caller, not something this method guards against.
    pub fn close(&mut self) -> EngineResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> EngineResult<()> {
        while self.flush_once()? {}
        self.daemon.stop();
        self.recycler.stop();
        if let Some(m) = self.monitor.as_mut() {
            m.stop();
        }
        Ok(())
    }

    fn flush_once(&self) -> EngineResult<bool> {
        let flusher = Flusher {
            journal: &self.journal,
            arena: &self.arena,
            mmap: &self.mmap,
            index: &self.index,
            meta_file: &self.meta_file,
            counters: Some(&self.counters),
        };
        flusher.flush_once()
    }
}

impl Drop for Engine {
    /// Close is implicit via `Drop` (§4.1, §6): a caller that never calls
    /// [`Engine::close`] explicitly still gets a final flush and an orderly
    /// thread shutdown. A failure here can't be propagated from `drop`, so
    /// it is logged rather than silently swallowed.
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "engine: final flush on drop failed");
        }
    }
}

fn with_ext(prefix: &Path, ext: &str) -> PathBuf {
    let mut p = prefix.to_path_buf();
    let name = p
        .file_name()
        .map(|n| format!("{}.{}", n.to_string_lossy(), ext))
        .unwrap_or_else(|| format!("db.{}", ext));
    p.set_file_name(name);
    p
}
