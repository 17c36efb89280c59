//! Bounded key/value store with per-entry expiry.
//!
//! All state lives behind a single mutex that is never held across an await
//! point. Two ordered indexes sit beside the entry map: insertion order, keyed
//! by a monotonically increasing sequence number, and expiry order, keyed by
//! `(expires_at, seq)`. Evicting the least-recently-inserted entry is
//! O(log n); purging touches only the entries that have actually expired.
//!
//! Reads never reorder entries and never reclaim expired ones; only `put`,
//! `invalidate` and `purge_expired` mutate the store.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::stats::CacheStats;

/// A cached entry with expiration time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    /// Entry is logically absent once `now >= expires_at`.
    pub expires_at: Instant,
    /// Wall-clock insertion time, reported to callers.
    pub cached_at: DateTime<Utc>,
    /// Insertion sequence; the smallest live `seq` is evicted first.
    seq: u64,
}

impl<V> CacheEntry<V> {
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// seq -> key, oldest insertion first.
    order: BTreeMap<u64, String>,
    /// (expires_at, seq) -> key, soonest expiry first.
    expiry: BTreeMap<(Instant, u64), String>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> CacheState<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.expiry.remove(&(entry.expires_at, entry.seq));
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        while let Some(entry) = self.expiry.first_entry() {
            let (expires_at, seq) = *entry.key();
            if expires_at > now {
                break;
            }
            let key = entry.remove();
            self.order.remove(&seq);
            self.entries.remove(&key);
            purged += 1;
        }
        self.expirations += purged as u64;
        purged
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        if let Some(entry) = self.entries.remove(&key) {
            self.expiry.remove(&(entry.expires_at, entry.seq));
        }
        self.evictions += 1;
        Some(key)
    }
}

/// Thread-safe TTL cache with a fixed capacity.
#[derive(Debug)]
pub struct TtlCache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(4096)),
                order: BTreeMap::new(),
                expiry: BTreeMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            capacity,
        }
    }

    // Cache operations never fail, so a poisoned lock is recovered rather than
    // propagated. Every mutation leaves `entries` and `order` consistent before
    // any code that could panic runs.
    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a copy of the value if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|(value, _)| value)
    }

    /// Like [`TtlCache::get`], also returning when the value was stored.
    pub fn get_entry(&self, key: &str) -> Option<(V, DateTime<Utc>)> {
        let now = Instant::now();
        let mut state = self.lock();
        let hit = state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| (entry.value.clone(), entry.cached_at));
        if hit.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        hit
    }

    /// Like [`TtlCache::get_entry`] without touching the hit/miss counters.
    pub fn peek_entry(&self, key: &str) -> Option<(V, DateTime<Utc>)> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| (entry.value.clone(), entry.cached_at))
    }

    /// Insert or replace `key`, expiring `ttl` from now.
    ///
    /// When a new key arrives at a full cache, expired entries are reclaimed
    /// first; if none were expired the least-recently-inserted entry is evicted.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(far_future);

        let mut state = self.lock();
        let replaced = state.remove(&key).is_some();
        if !replaced && state.entries.len() >= self.capacity {
            let reclaimed = state.purge_expired(now);
            if reclaimed > 0 {
                tracing::trace!(reclaimed, "Reclaimed expired cache entries");
            }
            while state.entries.len() >= self.capacity {
                match state.evict_oldest() {
                    Some(evicted) => tracing::trace!(key = %evicted, "Evicted cache entry"),
                    None => break,
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.clone());
        state.expiry.insert((expires_at, seq), key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                cached_at: Utc::now(),
                seq,
            },
        );
    }

    /// Remove `key` if present. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Reclaim every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Remove all entries. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.expiry.clear();
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entry_count: state.entries.len() as u64,
            evictions: state.evictions,
            expirations: state.expirations,
            in_flight: 0,
        }
    }
}

// Roughly 30 years out, used when `now + ttl` overflows.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}
