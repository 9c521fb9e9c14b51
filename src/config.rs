use std::time::Duration;

use crate::routing_table::MAX_BUCKET_SIZE_K;

/// A bucket that hasn't seen a new or refreshed contact for this long is lonely.
pub const DEFAULT_BUCKET_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Default capacity of [MemoryStorage](crate::MemoryStorage).
pub const DEFAULT_MAX_VALUES: usize = 1000;

#[derive(Debug, Clone)]
/// Protocol configurations
pub struct Config {
    /// Maximum size of a k-bucket, and the number of neighbors
    /// returned from `find_node` and `find_value`.
    ///
    /// Defaults to [MAX_BUCKET_SIZE_K]
    pub k: usize,
    /// How long a bucket may go without updates before
    /// [Protocol::refresh_ids](crate::Protocol::refresh_ids) targets it.
    ///
    /// Defaults to [DEFAULT_BUCKET_REFRESH_INTERVAL]
    pub bucket_refresh_interval: Duration,
    /// Maximum number of values kept by the default [MemoryStorage](crate::MemoryStorage),
    /// least recently used values are dropped first.
    ///
    /// Dropping is silent: a `store` that was answered with `Store(true)` may
    /// later be evicted to make room for newer values.
    ///
    /// Defaults to [DEFAULT_MAX_VALUES]
    pub max_values: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: MAX_BUCKET_SIZE_K,
            bucket_refresh_interval: DEFAULT_BUCKET_REFRESH_INTERVAL,
            max_values: DEFAULT_MAX_VALUES,
        }
    }
}
