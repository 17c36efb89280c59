//! Fetch results annotated with where they came from and how old they are.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Where a fetched value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    /// Served from the TTL cache without any network activity.
    Cache,
    /// Produced by a transport call, either started by this caller or by a
    /// concurrent caller whose in-flight fetch this caller joined.
    Origin,
}

/// Result of a fetch, carrying staleness metadata.
///
/// The value is the caller's own copy; mutating it never touches the cache.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When this value was stored in the cache (or fetched from origin).
    cached_at: DateTime<Utc>,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    /// Create a new read from a cache hit.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Cache,
        }
    }

    /// Create a new read from an origin fetch.
    pub fn from_origin(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: fetched_at,
            source: ReadSource::Origin,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    /// Time elapsed since the value was stored.
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            source: self.source,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_read_from_cache() {
        let cached_at = Utc::now();
        let read = CacheRead::from_cache("payload".to_string(), cached_at);

        assert!(read.was_cache_hit());
        assert_eq!(read.source(), ReadSource::Cache);
        assert_eq!(read.value(), "payload");
        assert_eq!(read.cached_at(), cached_at);
    }

    #[test]
    fn test_cache_read_from_origin() {
        let read = CacheRead::from_origin(42i32, Utc::now());
        assert!(!read.was_cache_hit());
        assert_eq!(read.into_value(), 42);
    }

    #[test]
    fn test_cache_read_age() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let read = CacheRead::from_cache("v", past);

        let age = read.age();
        assert!(age >= Duration::from_secs(4));
        assert!(age <= Duration::from_secs(10));
    }

    #[test]
    fn test_future_timestamp_has_zero_age() {
        let future = Utc::now() + chrono::Duration::seconds(30);
        let read = CacheRead::from_origin("v", future);
        assert_eq!(read.age(), Duration::ZERO);
    }

    #[test]
    fn test_cache_read_map() {
        let read = CacheRead::from_origin(7u8, Utc::now());
        let mapped = read.map(|v| v.to_string());
        assert_eq!(mapped.source(), ReadSource::Origin);
        assert_eq!(mapped.into_value(), "7");
    }
}
