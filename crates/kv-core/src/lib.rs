//! # kv-core — The "Physics" of POLARSTASH
//!
//! Defines the physical data layout the storage engine builds on: a
//! non-owning byte view for keys and values, the fixed-layout index slot
//! persisted to the `.meta` file, and the error taxonomy threaded through
//! every fallible operation.

pub mod byteview;
pub mod error;
pub mod item;

pub use byteview::ByteView;
pub use error::{EngineError, EngineResult};
pub use item::{short_key_hash, Item, ITEM_SIZE, META_BLOCK_LEN, META_BLOCK_SHIFT};
