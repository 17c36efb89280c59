//! ferry Client - Resilient Remote-Resource Client
//!
//! Fetches resources by key through a [`Transport`], caching successes in a
//! bounded TTL cache, collapsing concurrent identical requests into a single
//! flight, and retrying transient failures with jittered exponential backoff.
//!
//! Components, leaf-first:
//! - [`BackoffPolicy`]: retry delay schedule
//! - [`TtlCache`]: bounded key/value store with expiry
//! - [`SingleFlight`]: at most one in-flight fetch per key
//! - [`ResilientClient`]: orchestration of the above

pub mod backoff;
pub mod cache;
pub mod client;
pub mod retry;
pub mod single_flight;
pub mod transport;

pub use backoff::BackoffPolicy;
pub use cache::{CacheEntry, CacheRead, CacheStats, ReadSource, TtlCache};
pub use client::ResilientClient;
pub use retry::{RetryPlan, RetryState};
pub use single_flight::SingleFlight;
pub use transport::HttpTransport;

// Re-export the shared contracts so most users only depend on this crate.
pub use ferry_core::{
    resource_key, ClientConfig, ConfigError, FerryError, FerryResult, FetchError, FetchResult,
    Jitter, Transport, TransportError,
};
