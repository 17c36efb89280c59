//! Cache usage counters.

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of entries currently stored, expired ones included until reclaimed.
    pub entry_count: u64,
    /// Number of live entries evicted due to capacity.
    pub evictions: u64,
    /// Number of expired entries reclaimed.
    pub expirations: u64,
    /// Number of keys with a fetch in flight. Filled in by the client.
    pub in_flight: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
