//! The mmap'd on-disk mirror of the arena.
//!
//! A single file, grown by doubling and mmap'd read/write. This is the
//! authoritative persistent image of every chunk once the flusher has
//! mirrored it, generalized to a growable region instead of a single
//! pre-allocated size.
//!
//! Growth invalidates the previous mapping, so the map lives behind an
//! `RwLock`: growth (and the flusher's own mirror-copy, already
//! serialised by the journal latch) take the write half; chunk page-in
//! reads take the read half. This is the safe-Rust realization of the
//! "remap lock" design note — no outstanding raw pointer survives a grow.
//! A brand new database starts with a zero-length file: `mmap(2)` rejects
//! zero-length mappings, so the map is `None` until the first
//! [`MmapFile::ensure_capacity`] call actually needs bytes on disk.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::RwLock;

use memmap2::MmapMut;

pub struct MmapFile {
    file: File,
    mmap: RwLock<Option<MmapMut>>,
    len: RwLock<u64>,
}

impl MmapFile {
    /// Open (or create) the data file at `path`, rounding its length up to
    /// a multiple of `chunk_size` if it has a partial trailing chunk.
    pub fn open(path: &Path, chunk_size: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self {
                file,
                mmap: RwLock::new(None),
                len: RwLock::new(0),
            });
        }

        if chunk_size > 0 && len % chunk_size != 0 {
            len = (len / chunk_size + 1) * chunk_size;
            file.set_len(len)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            mmap: RwLock::new(Some(mmap)),
            len: RwLock::new(len),
        })
    }

    /// Current mapped length, in bytes.
    pub fn len(&self) -> u64 {
        *self.len.read().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of whole chunks currently backed by the file.
    pub fn chunk_count(&self, chunk_size: u64) -> usize {
        (self.len() / chunk_size) as usize
    }

    /// Ensure the file (and its mapping) covers at least `needed` bytes.
    ///
    /// The first growth sizes to exactly `needed`; subsequent growths
    /// double the previous length until it covers `needed`,
    pub fn ensure_capacity(&self, needed: u64) -> io::Result<()> {
        let mut len_guard = self.len.write().unwrap();
        if *len_guard >= needed {
            return Ok(());
        }
        let mut new_len = if *len_guard == 0 { needed } else { *len_guard * 2 };
        while new_len < needed {
            new_len *= 2;
        }

        self.file.set_len(new_len)?;
        let new_mmap = unsafe { MmapMut::map_mut(&self.file)? };
        *self.mmap.write().unwrap() = Some(new_mmap);
        *len_guard = new_len;
        Ok(())
    }

    /// Copy `data` into the mapping at `offset`. Caller must have already
    /// called [`Self::ensure_capacity`] for `offset + data.len()`.
    pub fn write_at(&self, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut guard = self.mmap.write().unwrap();
        let mmap = guard.as_mut().expect("write_at before ensure_capacity");
        let start = offset as usize;
        mmap[start..start + data.len()].copy_from_slice(data);
    }

    /// Copy `len` bytes starting at `offset` out of the mapping.
    pub fn read_at(&self, offset: u64, len: usize) -> Vec<u8> {
        if len == 0 {
            return Vec::new();
        }
        let guard = self.mmap.read().unwrap();
        let mmap = guard.as_ref().expect("read_at on an empty mapping");
        let start = offset as usize;
        mmap[start..start + len].to_vec()
    }

    /// Flush the mapping to disk (best-effort; subject to OS writeback).
    pub fn flush(&self) -> io::Result<()> {
        if let Some(mmap) = self.mmap.read().unwrap().as_ref() {
            mmap.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_fresh_file_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.data");
        let f = MmapFile::open(&path, 4096).unwrap();
        assert_eq!(f.len(), 0);
        assert!(f.is_empty());
    }

    #[test]
    fn grows_by_doubling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.data");
        let f = MmapFile::open(&path, 1024).unwrap();
        f.ensure_capacity(1024).unwrap();
        assert_eq!(f.len(), 1024);
        f.ensure_capacity(1025).unwrap();
        assert_eq!(f.len(), 2048);
        f.ensure_capacity(5000).unwrap();
        assert_eq!(f.len(), 8192);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.data");
        let f = MmapFile::open(&path, 4096).unwrap();
        f.ensure_capacity(4096).unwrap();
        f.write_at(10, b"hello");
        assert_eq!(f.read_at(10, 5), b"hello");
    }

    #[test]
    fn reopen_preserves_length_rounded_to_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.data");
        {
            let f = MmapFile::open(&path, 100).unwrap();
            f.ensure_capacity(250).unwrap();
            f.write_at(0, b"persisted");
            f.flush().unwrap();
        }
        let reopened = MmapFile::open(&path, 100).unwrap();
        // 400 was already a multiple of 100, so no further rounding.
        assert_eq!(reopened.len(), 400);
        assert_eq!(reopened.read_at(0, 9), b"persisted");
    }
}
