//! The flush algorithm: drains one journal batch into the index and the
//! mmap mirror,
//!
//! A flush that fails partway through (a growth, a meta write, an mmap
//! flush) is logged via `tracing::warn!` and returns
//! [`EngineError::Io`] without calling [`crate::journal::FlushBatch::commit`] —
//! the journal's state lock is simply dropped, leaving `n_journal` and
//! the watermarks untouched, so the same batch is safe to retry on the
//! next tick.

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::sync::Mutex;

use kv_core::{EngineError, EngineResult};

use crate::arena::Arena;
use crate::index::MetaIndex;
use crate::journal::Journal;
use crate::mmap_file::MmapFile;
use crate::monitor::Counters;

pub struct Flusher<'a> {
    pub journal: &'a Journal,
    pub arena: &'a Arena,
    pub mmap: &'a MmapFile,
    pub index: &'a Mutex<MetaIndex>,
    pub meta_file: &'a Mutex<File>,
    /// Diagnostic counters for the optional monitor thread. `None` in unit
    /// tests that don't care about the monitor's reporting.
    pub counters: Option<&'a Counters>,
}

impl Flusher<'_> {
    /// Drain and integrate one batch. Returns `Ok(true)` if a batch was
    /// flushed, `Ok(false)` if the journal was empty.
    pub fn flush_once(&self) -> EngineResult<bool> {
        let batch = match self.journal.begin_flush() {
            Some(b) => b,
            None => return Ok(false),
        };

        let (p_synced, sz_synced) = (batch.p_synced(), batch.sz_synced());
        let (p_current, sz_current) = (batch.p_current(), batch.sz_current());

        let mut dirty_blocks = BTreeSet::new();
        {
            let mut index = self.index.lock().unwrap();
            for i in 0..batch.len() {
                batch.wait_ready(i);
                let item = batch.item(i);
                let key = self.arena.read_key(&item);
                let slot = index.upsert(item, &key);
                dirty_blocks.insert(MetaIndex::block_of(slot));
            }
        }

        if let Err(e) = self.mirror_dirty_chunks(p_synced, sz_synced, p_current, sz_current) {
            tracing::warn!(error = %e, "flush: failed mirroring arena to mmap");
            return Err(EngineError::Io(e));
        }

        if let Err(e) = self.persist_index(&dirty_blocks) {
            tracing::warn!(error = %e, "flush: failed persisting index blocks");
            return Err(EngineError::Io(e));
        }

        if let Some(counters) = self.counters {
            counters
                .flushed_writes
                .fetch_add(batch.len() as u64, std::sync::atomic::Ordering::Relaxed);
        }

        batch.commit();
        Ok(true)
    }

    fn mirror_dirty_chunks(
        &self,
        p_synced: usize,
        sz_synced: usize,
        p_current: usize,
        sz_current: usize,
    ) -> io::Result<()> {
        if p_current == p_synced && sz_current == sz_synced {
            return Ok(());
        }
        let chunk_size = self.arena.chunk_size();
        self.mmap
            .ensure_capacity(((p_current + 1) * chunk_size) as u64)?;

        for idx in p_synced..=p_current {
            let chunk = match self.arena.get(idx) {
                Some(c) => c,
                None => continue,
            };
            let buf = chunk.writer_buffer();
            let chunk_end = if idx < p_current { chunk_size } else { sz_current };
            let chunk_start = if idx == p_synced { sz_synced.min(chunk_end) } else { 0 };
            if chunk_end <= chunk_start {
                continue;
            }
            let bytes = buf.read_at(chunk_start, chunk_end - chunk_start);
            let dest = (idx as u64) * (chunk_size as u64) + chunk_start as u64;
            self.mmap.write_at(dest, bytes);
        }
        self.mmap.flush()
    }

    fn persist_index(&self, dirty: &BTreeSet<usize>) -> io::Result<()> {
        if dirty.is_empty() {
            return Ok(());
        }
        let index = self.index.lock().unwrap();
        let mut file = self.meta_file.lock().unwrap();
        index.persist_dirty_blocks(&mut file, dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open_meta_file(path: &std::path::Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap()
    }

    #[test]
    fn flush_once_installs_key_and_mirrors_bytes() {
        crate::test_support::init_tracing();
        let dir = tempdir().unwrap();
        let chunk_size = 64usize;

        let arena = Arena::new(chunk_size);
        let journal = Journal::new(4, 0);
        let mmap = MmapFile::open(&dir.path().join("x.data"), chunk_size as u64).unwrap();
        let index = Mutex::new(MetaIndex::new());
        let meta_file = Mutex::new(open_meta_file(&dir.path().join("x.meta")));

        let slot = journal.try_claim(&arena, 3, 3).unwrap();
        arena.copy_in(slot.offset, b"abc", b"xyz");
        journal.mark_copied(&slot);

        let flusher = Flusher {
            journal: &journal,
            arena: &arena,
            mmap: &mmap,
            index: &index,
            meta_file: &meta_file,
            counters: None,
        };

        let flushed = flusher.flush_once().unwrap();
        assert!(flushed);

        let idx = index.lock().unwrap();
        let found = idx.find(b"abc").unwrap();
        let item = idx.get(found).unwrap();
        assert_eq!(item.key_size, 3);
        assert_eq!(item.value_size, 3);

        assert_eq!(mmap.read_at(item.offset + 3, 3), b"xyz");
    }

    #[test]
    fn flush_once_on_empty_journal_is_noop() {
        let dir = tempdir().unwrap();
        let chunk_size = 64usize;
        let arena = Arena::new(chunk_size);
        let journal = Journal::new(4, 0);
        let mmap = MmapFile::open(&dir.path().join("x.data"), chunk_size as u64).unwrap();
        let index = Mutex::new(MetaIndex::new());
        let meta_file = Mutex::new(open_meta_file(&dir.path().join("x.meta")));

        let flusher = Flusher {
            journal: &journal,
            arena: &arena,
            mmap: &mmap,
            index: &index,
            meta_file: &meta_file,
            counters: None,
        };
        assert!(!flusher.flush_once().unwrap());
    }

    #[test]
    fn second_write_to_same_key_overwrites_slot_not_meta_len() {
        let dir = tempdir().unwrap();
        let chunk_size = 64usize;
        let arena = Arena::new(chunk_size);
        let journal = Journal::new(4, 0);
        let mmap = MmapFile::open(&dir.path().join("x.data"), chunk_size as u64).unwrap();
        let index = Mutex::new(MetaIndex::new());
        let meta_file = Mutex::new(open_meta_file(&dir.path().join("x.meta")));
        let flusher = Flusher {
            journal: &journal,
            arena: &arena,
            mmap: &mmap,
            index: &index,
            meta_file: &meta_file,
            counters: None,
        };

        let s1 = journal.try_claim(&arena, 3, 3).unwrap();
        arena.copy_in(s1.offset, b"abc", b"one");
        journal.mark_copied(&s1);
        flusher.flush_once().unwrap();

        let s2 = journal.try_claim(&arena, 3, 5).unwrap();
        arena.copy_in(s2.offset, b"abc", b"two!!");
        journal.mark_copied(&s2);
        flusher.flush_once().unwrap();

        let idx = index.lock().unwrap();
        assert_eq!(idx.len(), 1);
        let found = idx.find(b"abc").unwrap();
        assert_eq!(idx.get(found).unwrap().value_size, 5);
    }
}
