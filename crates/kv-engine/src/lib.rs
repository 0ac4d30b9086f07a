//! # kv-engine — The "Engine" of POLARSTASH
//!
//! The mmap'd chunked arena, the write-batching journal, the flusher
//! that integrates a batch into the index and the on-disk mirror, and
//! the daemon/recycler/monitor background threads that keep it that way
//! without per-write fsync.

pub mod arena;
pub mod chunk;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod flusher;
pub mod index;
pub mod journal;
pub mod mmap_file;
pub mod monitor;
pub mod recycler;

pub use config::EngineConfig;
pub use engine::{Engine, EngineStats};
