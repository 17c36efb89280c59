//! Resilient client: cache, then single-flight, then retrying transport call.
//!
//! ```text
//! fetch(k) ── cache hit ─────────────────────────────────────────→ value
//!    │
//!    └─ miss ──→ single-flight(k) ── joined ──→ shared outcome ──→ value | error
//!                     │
//!                     └─ owner ──→ re-probe cache ──→ retry(transport) ──→ cache.put
//! ```
//!
//! Each client owns its cache and in-flight table. Two clients never share
//! state, however they are configured.

use std::sync::Arc;

use chrono::Utc;
use ferry_core::{ClientConfig, FerryResult, FetchResult, Transport};
use futures_util::stream::{self, StreamExt};

use crate::backoff::BackoffPolicy;
use crate::cache::{CacheRead, CacheStats, TtlCache};
use crate::retry::RetryPlan;
use crate::single_flight::SingleFlight;

struct ClientInner<T: Transport> {
    transport: T,
    cache: TtlCache<T::Value>,
    flights: SingleFlight<CacheRead<T::Value>>,
    retry: RetryPlan,
    config: ClientConfig,
}

impl<T: Transport> ClientInner<T> {
    /// Owner-side work of a flight.
    async fn load(&self, key: &str) -> FetchResult<CacheRead<T::Value>> {
        // A previous flight for this key may have settled between the caller's
        // probe and its registration as owner.
        if let Some((value, cached_at)) = self.cache.peek_entry(key) {
            return Ok(CacheRead::from_cache(value, cached_at));
        }

        let value = self.retry.run(key, || self.transport.call(key)).await?;
        self.cache.put(key, value.clone(), self.config.default_ttl());
        Ok(CacheRead::from_origin(value, Utc::now()))
    }
}

/// Caching, deduplicating, retrying client over a [`Transport`].
///
/// Cloning is cheap and clones share the same cache and in-flight table.
///
/// # Example
///
/// ```ignore
/// let client = ResilientClient::new(HttpTransport::new(base_url), ClientConfig::default())?;
///
/// let user = client.fetch("user:123").await?;
/// ```
pub struct ResilientClient<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> ResilientClient<T> {
    /// Create a client after validating `config`.
    pub fn new(transport: T, config: ClientConfig) -> FerryResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(transport, config))
    }

    /// Create a client with default configuration.
    pub fn with_defaults(transport: T) -> Self {
        Self::from_parts(transport, ClientConfig::default())
    }

    fn from_parts(transport: T, config: ClientConfig) -> Self {
        let retry = RetryPlan {
            max_attempts: config.max_retries,
            backoff: BackoffPolicy::from_config(&config),
            attempt_timeout: config.request_timeout(),
        };
        Self {
            inner: Arc::new(ClientInner {
                transport,
                cache: TtlCache::new(config.cache_capacity),
                flights: SingleFlight::new(),
                retry,
                config,
            }),
        }
    }

    /// Fetch `key`, serving from cache when possible.
    ///
    /// Concurrent misses for the same key collapse into one transport call
    /// sequence whose outcome every caller shares. Failures are returned with
    /// their concrete kind; a failed fetch never looks like an empty success.
    pub async fn fetch(&self, key: &str) -> FetchResult<T::Value> {
        self.fetch_read(key).await.map(CacheRead::into_value)
    }

    /// Like [`ResilientClient::fetch`], keeping the staleness metadata.
    pub async fn fetch_read(&self, key: &str) -> FetchResult<CacheRead<T::Value>> {
        if let Some((value, cached_at)) = self.inner.cache.get_entry(key) {
            tracing::debug!(key, "Cache hit");
            return Ok(CacheRead::from_cache(value, cached_at));
        }
        tracing::debug!(key, "Cache miss");

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();
        self.inner
            .flights
            .run(key, move || async move { inner.load(&owned_key).await })
            .await
    }

    /// Fetch several keys with at most `batch_concurrency` fetches running at
    /// once. Results come back in input order, one per key; a failing key
    /// never hides the others.
    pub async fn fetch_many<I, K>(&self, keys: I) -> Vec<(String, FetchResult<T::Value>)>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let concurrency = self.inner.config.batch_concurrency.max(1);
        stream::iter(keys.into_iter().map(Into::into))
            .map(|key: String| async move {
                let result = self.fetch(&key).await;
                (key, result)
            })
            .buffered(concurrency)
            .collect()
            .await
    }

    /// Drop the cached value for `key`. Returns whether one was present.
    ///
    /// A fetch already in flight for `key` is not affected and will store its
    /// result when it settles.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.cache.invalidate(key)
    }

    /// Reclaim expired cache entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.cache.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            in_flight: self.inner.flights.in_flight() as u64,
            ..self.inner.cache.stats()
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn cache(&self) -> &TtlCache<T::Value> {
        &self.inner.cache
    }
}

impl<T: Transport> Clone for ResilientClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for ResilientClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("config", &self.inner.config)
            .field("cached", &self.inner.cache.len())
            .field("in_flight", &self.inner.flights.in_flight())
            .finish()
    }
}
