//! Engine tunables.
//!
//! A plain struct with a `Default` impl, constructed programmatically by
//! the embedding application. There is no file-based configuration layer
//! — this is an embedded library, not a standalone service.

use std::time::Duration;

/// Tunable parameters for an [`crate::engine::Engine`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Size of one arena chunk, in bytes. Keys+values must not exceed this.
    pub chunk_size: usize,

    /// Capacity of the write-batching journal.
    pub max_journal: usize,

    /// Resident chunk budget for the recycler (e.g. `8 GiB / chunk_size`).
    pub max_chunks: usize,

    /// Daemon poll interval floor.
    pub daemon_min_interval: Duration,

    /// Daemon poll interval ceiling.
    pub daemon_max_interval: Duration,

    /// Daemon's initial poll interval, before the first backoff/reset
    /// decision. Distinct from `daemon_min_interval`: the daemon starts
    /// partway up its range, not pinned to the floor.
    pub daemon_start_interval: Duration,

    /// Recycler sweep interval.
    pub recycler_interval: Duration,

    /// Whether to launch the optional stderr counters thread.
    pub monitor_enabled: bool,

    /// Monitor tick interval, when enabled.
    pub monitor_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32 << 20,
            max_journal: 1 << 10,
            max_chunks: (8usize << 30) / (32 << 20),
            daemon_min_interval: Duration::from_micros(1),
            daemon_max_interval: Duration::from_micros(1024),
            daemon_start_interval: Duration::from_micros(8),
            recycler_interval: Duration::from_millis(500),
            monitor_enabled: false,
            monitor_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let cfg = EngineConfig::default();
        assert!(cfg.max_journal > 0);
        assert!(cfg.max_chunks > 0);
        assert!(cfg.daemon_min_interval <= cfg.daemon_max_interval);
        assert!(cfg.daemon_start_interval >= cfg.daemon_min_interval);
        assert!(cfg.daemon_start_interval <= cfg.daemon_max_interval);
    }
}
