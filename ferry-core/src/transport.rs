//! Transport contract.
//!
//! The resilient client only knows how to ask a [`Transport`] for a resource
//! by key. How that request reaches the network is the implementor's concern.

use crate::FetchResult;
use async_trait::async_trait;

/// The underlying "fetch a resource by key" primitive.
///
/// Implementations must be thread-safe (Send + Sync) and report failures with
/// the concrete [`FetchError`](crate::FetchError) kind:
///
/// - `Transport` for network or timeout failures (retried)
/// - `Decode` for malformed payloads (not retried)
/// - `NotFound` when the resource does not exist (not retried)
///
/// # Example
/// ```ignore
/// struct UserService { /* ... */ }
///
/// #[async_trait]
/// impl Transport for UserService {
///     type Value = Arc<User>;
///
///     async fn call(&self, key: &str) -> FetchResult<Self::Value> {
///         // Issue the request
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Payload produced on success. Cloned out of the cache for every caller,
    /// so large payloads should be wrapped in an `Arc`.
    type Value: Clone + Send + Sync + 'static;

    /// Fetch the resource identified by `key` exactly once.
    async fn call(&self, key: &str) -> FetchResult<Self::Value>;
}

/// Join key segments into a resource key, e.g. `("user", "123")` -> `"user:123"`.
pub fn resource_key(kind: &str, id: impl std::fmt::Display) -> String {
    format!("{}:{}", kind, id)
}
