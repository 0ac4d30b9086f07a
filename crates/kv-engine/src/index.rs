//! The in-memory metadata index and its `.meta` persistence.
//!
//! Keys are split by length for lookup efficiency: short keys (`<= 8`
//! bytes) go through the big-endian packing hash preserved bit-for-bit
//! from the reference engine (`kv_core::short_key_hash`); longer keys are
//! keyed directly by their owned bytes. Both tables only ever point at
//! slots whose key bytes have already landed durably in the arena — the
//! flusher is the only caller that inserts (see `flusher.rs`).

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use kv_core::{short_key_hash, Item, ITEM_SIZE, META_BLOCK_LEN};

const SHORT_KEY_MAX: usize = 8;

pub struct MetaIndex {
    meta: Vec<Item>,
    short: HashMap<u64, usize>,
    long: HashMap<Vec<u8>, usize>,
}

impl MetaIndex {
    pub fn new() -> Self {
        Self {
            meta: Vec::new(),
            short: HashMap::new(),
            long: HashMap::new(),
        }
    }

    /// Rebuild with a pre-loaded `meta[]` array (e.g. from `.meta` at open
    /// time). The key tables start empty — callers must re-register each
    /// slot's key via [`Self::register_key`] once they can read the
    /// corresponding arena bytes.
    pub fn from_items(items: Vec<Item>) -> Self {
        Self {
            meta: items,
            short: HashMap::new(),
            long: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Item> {
        self.meta.get(slot)
    }

    /// Point `key` at `slot` without touching `meta[]` itself. Used during
    /// recovery, once the durable key bytes for an already-loaded slot are
    /// available.
    pub fn register_key(&mut self, slot: usize, key: &[u8]) {
        if key.len() <= SHORT_KEY_MAX {
            self.short.insert(short_key_hash(key), slot);
        } else {
            self.long.insert(key.to_vec(), slot);
        }
    }

    /// Two-path lookup keyed on `key.len() > 8`.
    pub fn find(&self, key: &[u8]) -> Option<usize> {
        if key.len() <= SHORT_KEY_MAX {
            self.short.get(&short_key_hash(key)).copied()
        } else {
            self.long.get(key).copied()
        }
    }

    /// Install or overwrite the slot for `key`. `key` must be the durable
    /// arena copy, never the caller's input buffer.
    ///
    /// Returns the slot index and whether the containing 32-slot block
    /// should be marked dirty by the caller.
    pub fn upsert(&mut self, item: Item, key: &[u8]) -> usize {
        if let Some(&slot) = self.find_mut_lookup(key) {
            self.meta[slot] = item;
            slot
        } else {
            let slot = self.meta.len();
            self.meta.push(item);
            self.register_key(slot, key);
            slot
        }
    }

    fn find_mut_lookup(&self, key: &[u8]) -> Option<&usize> {
        if key.len() <= SHORT_KEY_MAX {
            self.short.get(&short_key_hash(key))
        } else {
            self.long.get(key)
        }
    }

    pub fn block_of(slot: usize) -> usize {
        slot / META_BLOCK_LEN
    }

    /// Rewrite only the dirty 32-slot blocks at their byte offset in
    /// `<prefix>.meta`.
    pub fn persist_dirty_blocks(&self, file: &mut File, dirty: &BTreeSet<usize>) -> io::Result<()> {
        for &block in dirty {
            let start = block * META_BLOCK_LEN;
            if start >= self.meta.len() {
                continue;
            }
            let end = (start + META_BLOCK_LEN).min(self.meta.len());
            let mut bytes = Vec::with_capacity((end - start) * ITEM_SIZE);
            for item in &self.meta[start..end] {
                bytes.extend_from_slice(&item.to_bytes());
            }
            file.seek(SeekFrom::Start((start * ITEM_SIZE) as u64))?;
            file.write_all(&bytes)?;
        }
        file.flush()?;
        Ok(())
    }
}

impl Default for MetaIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Read every `Item` record out of an existing `.meta` file, in order.
pub fn load_items(path: &Path) -> io::Result<Vec<Item>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut file = File::open(path)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;

    let count = raw.len() / ITEM_SIZE;
    let mut items = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * ITEM_SIZE;
        items.push(Item::from_bytes(&raw[start..start + ITEM_SIZE]));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn find_returns_none_for_unseen_key() {
        let idx = MetaIndex::new();
        assert_eq!(idx.find(b"nope"), None);
    }

    #[test]
    fn upsert_new_key_appends_slot() {
        let mut idx = MetaIndex::new();
        let item = Item::new(0, 3, 3);
        let slot = idx.upsert(item, b"abc");
        assert_eq!(slot, 0);
        assert_eq!(idx.find(b"abc"), Some(0));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn upsert_existing_key_overwrites_in_place() {
        let mut idx = MetaIndex::new();
        idx.upsert(Item::new(0, 3, 3), b"abc");
        let slot = idx.upsert(Item::new(16, 3, 5), b"abc");
        assert_eq!(slot, 0);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get(0).unwrap().offset, 16);
        assert_eq!(idx.get(0).unwrap().value_size, 5);
    }

    #[test]
    fn short_and_long_keys_use_separate_tables() {
        let mut idx = MetaIndex::new();
        idx.upsert(Item::new(0, 3, 3), b"abc");
        idx.upsert(Item::new(32, 20, 3), b"this key is over eight bytes");
        assert_eq!(idx.find(b"abc"), Some(0));
        assert_eq!(idx.find(b"this key is over eight bytes"), Some(1));
    }

    #[test]
    fn persist_and_reload_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.meta");

        let mut idx = MetaIndex::new();
        idx.upsert(Item::new(0, 3, 3), b"abc");
        idx.upsert(Item::new(16, 3, 3), b"xyz");

        let mut dirty = BTreeSet::new();
        dirty.insert(MetaIndex::block_of(0));
        let mut file = File::create(&path).unwrap();
        idx.persist_dirty_blocks(&mut file, &dirty).unwrap();
        drop(file);

        let items = load_items(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].offset, 0);
        assert_eq!(items[1].offset, 16);
    }

    #[test]
    fn load_items_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.meta");
        assert_eq!(load_items(&path).unwrap().len(), 0);
    }
}
