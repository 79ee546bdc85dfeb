//! Tunables for a [`crate::LockManager`] (SPEC_FULL.md §A.3).

use std::time::Duration;

/// Construction-time configuration for a `LockManager`.
///
/// Bundles the shard count and the default wait timeout into one struct
/// since both are fixed for the manager's lifetime.
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// Number of independent shards the key space is hashed across.
    /// Must be non-zero; rounded up internally if not a power of two.
    pub num_shards: usize,

    /// Wait deadline used by [`crate::LockManager::lock`] and
    /// [`crate::LockManager::lock_no_wait`]'s follow-up wait when the
    /// locker does not override [`crate::Locker::lock_timeout_time`].
    pub default_timeout: Duration,

    /// Emit per-attempt `trace!` events in addition to the coarser
    /// `debug!`/`info!` ones. Off by default; expensive under
    /// contention-heavy workloads since every blocked attempt logs.
    pub trace_fine_events: bool,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            num_shards: 64,
            default_timeout: Duration::from_secs(10),
            trace_fine_events: false,
        }
    }
}

impl LockManagerConfig {
    pub fn with_num_shards(mut self, num_shards: usize) -> Self {
        self.num_shards = num_shards.max(1);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_trace_fine_events(mut self, enabled: bool) -> Self {
        self.trace_fine_events = enabled;
        self
    }
}
