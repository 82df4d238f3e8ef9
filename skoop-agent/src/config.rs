//! Cache timing configuration

use std::time::Duration;

/// Default period between refresh cycles
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Non-pinned store entries live this many refresh intervals
pub const TTL_INTERVALS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Period of the refresh daemon, also the per-cycle deadline
    pub refresh_interval: Duration,
}

impl CacheConfig {
    pub fn new(refresh_interval: Duration) -> Self {
        Self { refresh_interval }
    }

    /// Lifetime of an entry that stops being re-observed
    pub fn entry_ttl(&self) -> Duration {
        self.refresh_interval * TTL_INTERVALS
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_INTERVAL)
    }
}
