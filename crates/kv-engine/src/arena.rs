//! The chunked arena directory.
//!
//! Chunks are appended on demand as the allocation frontier advances.
//! `alloc` itself is only ever called by a writer holding the journal
//! latch (see `journal.rs`), so the watermark pair it advances
//! (`p_current`, `sz_current`) lives in the journal's own guarded state —
//! `Arena` only owns the chunk directory and chunk size.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::chunk::ChunkEntry;
use crate::mmap_file::MmapFile;
use kv_core::Item;

pub struct Arena {
    chunks: RwLock<Vec<Arc<ChunkEntry>>>,
    chunk_size: usize,
    page_ins: AtomicU64,
}

impl Arena {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            chunk_size,
            page_ins: AtomicU64::new(0),
        }
    }

    /// Total count of chunk page-ins (resident buffer re-materialised from
    /// the mmap mirror) since this arena was created. Diagnostic only —
    /// consulted by the optional monitor thread, not by correctness-critical
    /// code.
    pub fn page_ins(&self) -> u64 {
        self.page_ins.load(Ordering::Relaxed)
    }

    /// Rebuild the directory for `loaded_chunks` chunks recovered from an
    /// existing `.data` file at open time — all paged-out.
    pub fn recover(chunk_size: usize, loaded_chunks: usize) -> Self {
        let arena = Self::new(chunk_size);
        let mut w = arena.chunks.write().unwrap();
        for i in 0..loaded_chunks {
            w.push(Arc::new(ChunkEntry::new_paged_out(i)));
        }
        drop(w);
        arena
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    /// Count of chunks with a resident buffer installed right now.
    /// Diagnostic only — the recycler drives its own eligibility sweep via
    /// [`Self::recyclable_snapshot`], not this.
    pub fn resident_chunk_count(&self) -> usize {
        self.chunks.read().unwrap().iter().filter(|c| c.is_resident()).count()
    }

    pub fn get(&self, index: usize) -> Option<Arc<ChunkEntry>> {
        self.chunks.read().unwrap().get(index).cloned()
    }

    fn push_resident(&self, index: usize) -> Arc<ChunkEntry> {
        let mut w = self.chunks.write().unwrap();
        debug_assert_eq!(w.len(), index, "chunks must be appended in order");
        let entry = Arc::new(ChunkEntry::new_resident(index, self.chunk_size));
        w.push(entry.clone());
        entry
    }

    /// Reserve `n` bytes in the arena, advancing `(p_current, sz_current)`
    /// in place. `n` must not exceed `chunk_size` — callers check this at
    /// the API boundary (`EngineError::RecordTooLarge`) before calling.
    ///
    /// Returns the logical arena offset the reservation starts at.
    pub fn alloc(&self, p_current: &mut usize, sz_current: &mut usize, n: usize) -> u64 {
        debug_assert!(n <= self.chunk_size);

        if *sz_current + n > self.chunk_size {
            *p_current += 1;
            *sz_current = 0;
        }

        if self.chunk_count() <= *p_current {
            self.push_resident(*p_current);
        }

        let offset = (*p_current as u64) * (self.chunk_size as u64) + (*sz_current as u64);
        *sz_current += n;
        offset
    }

    /// Copy `key` then `value` into the arena at `offset`. The target
    /// chunk must already be resident (it was just created, or extended,
    /// by `alloc`) — writers never page anything in.
    ///
    /// # Safety invariant
    /// Every offset handed out by `alloc` is disjoint from every other
    /// live reservation, so concurrent calls from different writer
    /// threads never overlap within a chunk.
    pub fn copy_in(&self, offset: u64, key: &[u8], value: &[u8]) {
        let (chunk_index, local) = self.locate(offset);
        let chunk = self.get(chunk_index).expect("chunk must exist for offset");
        let buf = chunk.writer_buffer();
        unsafe {
            buf.write_at(local, key);
            buf.write_at(local + key.len(), value);
        }
    }

    /// Durable key bytes for a slot, read straight out of the (already
    /// resident, just-written) arena chunk. Used by the flusher to
    /// compute `find`/`upsert` strictly post-copy.
    pub fn read_key(&self, item: &Item) -> Vec<u8> {
        let (chunk_index, local) = self.locate(item.offset);
        let chunk = self.get(chunk_index).expect("chunk must exist for offset");
        let buf = chunk.writer_buffer();
        buf.read_at(local, item.key_size as usize).to_vec()
    }

    /// Value bytes for a slot, via the borrow/release protocol — this is
    /// the read path, which may need to page a chunk in from the mmap
    /// mirror if it has been recycled.
    pub fn read_value(&self, item: &Item, mmap: &MmapFile) -> std::io::Result<Vec<u8>> {
        let (chunk_index, local) = self.locate(item.offset);
        let chunk = self.get(chunk_index).expect("chunk must exist for offset");
        let was_resident = chunk.is_resident();
        let borrow = chunk.borrow(mmap, self.chunk_size)?;
        if !was_resident {
            self.page_ins.fetch_add(1, Ordering::Relaxed);
        }
        let start = local + item.key_size as usize;
        Ok(borrow.data().read_at(start, item.value_size as usize).to_vec())
    }

    fn locate(&self, offset: u64) -> (usize, usize) {
        let chunk_size = self.chunk_size as u64;
        ((offset / chunk_size) as usize, (offset % chunk_size) as usize)
    }

    /// Iterate resident, recyclable chunk indices (`< p_synced`) for the
    /// recycler's sweep.
    pub fn recyclable_snapshot(&self, p_synced: usize) -> Vec<(u64, usize)> {
        let chunks = self.chunks.read().unwrap();
        chunks
            .iter()
            .take(p_synced)
            .filter_map(|c| c.touch_snapshot().map(|ts| (ts, c.index())))
            .collect()
    }

    pub fn try_evict(&self, index: usize) -> bool {
        match self.get(index) {
            Some(c) => c.try_evict(),
            None => false,
        }
    }
}
