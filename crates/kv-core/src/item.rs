//! Index slot layout and the short-key hash used to bucket it.
//!
//! [`Item`] is the fixed-layout record persisted (16 bytes, no padding, no
//! version field) to the `.meta` file: one per distinct key, dense and
//! append-only. Its in-memory representation and its on-disk byte layout
//! are the same bytes — a deliberate zero-copy struct with no transmute
//! involved in getting there.

/// On-disk size of one `Item` record, in bytes.
pub const ITEM_SIZE: usize = 16;

/// Number of `Item` records rewritten per dirty-index-block flush.
pub const META_BLOCK_SHIFT: u32 = 5;
pub const META_BLOCK_LEN: usize = 1 << META_BLOCK_SHIFT;

/// A fixed-layout index slot: `{ offset: u64, key_size: u32, value_size: u32 }`.
///
/// `offset` is a logical arena address — `chunk_index * chunk_size +
/// chunk_offset` — never a pointer. No two live slots describe the same
/// key; a second write of an existing key overwrites its slot in place
/// without reusing or rewriting the arena bytes of the earlier write.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Item {
    pub offset: u64,
    pub key_size: u32,
    pub value_size: u32,
}

impl Item {
    #[inline]
    pub const fn new(offset: u64, key_size: u32, value_size: u32) -> Self {
        Self {
            offset,
            key_size,
            value_size,
        }
    }

    #[inline]
    pub const fn size_bytes() -> usize {
        ITEM_SIZE
    }

    /// Encode as the on-disk little-endian byte layout.
    pub fn to_bytes(&self) -> [u8; ITEM_SIZE] {
        let mut buf = [0u8; ITEM_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.key_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.value_size.to_le_bytes());
        buf
    }

    /// Decode from the on-disk little-endian byte layout.
    ///
    /// # Panics
    /// Panics if `bytes.len() != ITEM_SIZE`. Callers only ever hand this
    /// exactly-sized slices sliced out of a `.meta` file read in
    /// `ITEM_SIZE`-aligned chunks.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), ITEM_SIZE);
        Self {
            offset: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            key_size: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            value_size: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        }
    }
}

/// Reference-engine short-key hash (`hashPolar`): successive bytes packed
/// big-endian into a 64-bit accumulator.
///
/// Preserved bit-for-bit from `polarkv`'s `hashPolar` rather than replaced
/// with a generic hasher, since it is the bucket key for the short-key
/// lookup table (keys of 8 bytes or fewer) and changing it would be an
/// observable behavior change, not just an implementation detail.
///
/// # Panics
/// Panics if `key.len() > 8` — callers route keys longer than 8 bytes to
/// the long-key table instead.
pub fn short_key_hash(key: &[u8]) -> u64 {
    assert!(key.len() <= 8, "short_key_hash called with a long key");
    let mut acc: u64 = 0;
    for &b in key {
        acc = (acc << 8) | b as u64;
    }
    acc
}
