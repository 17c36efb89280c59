//! TTL cache with explicit staleness metadata.
//!
//! The cache is a bounded store: every insert enforces the capacity fixed at
//! construction, evicting expired entries first and then the
//! least-recently-inserted one. Expired entries are never returned by a read.
//!
//! Reads served through the client come back as [`CacheRead<T>`], which
//! records whether the value came from the cache or from origin and when it
//! was stored.
//!
//! # Example
//!
//! ```ignore
//! let cache = TtlCache::new(1024);
//! cache.put("user:123", user, Duration::from_secs(30));
//!
//! if let Some(user) = cache.get("user:123") {
//!     // A copy; the cached value is never aliased mutably.
//! }
//! ```

pub mod read;
pub mod stats;
pub mod ttl;

pub use read::{CacheRead, ReadSource};
pub use stats::CacheStats;
pub use ttl::{CacheEntry, TtlCache};
