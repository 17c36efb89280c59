//! JSON-over-HTTP transport built on reqwest.
//!
//! Keys map onto paths by turning `:` separators into `/`, so `user:123` is
//! fetched from `{base_url}/user/123`. The status is checked before the body
//! is decoded; an HTML error page is never handed to the JSON decoder as if it
//! were a payload.
//!
//! Payloads are decoded into `T` (untyped [`JsonValue`] by default), so a
//! well-formed body of the wrong shape is a decode failure, not a success.

use async_trait::async_trait;
use ferry_core::{FetchError, FetchResult, Transport, TransportError};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;
use std::time::Duration;

/// Longest slice of an error body kept in an error message.
const ERROR_BODY_LIMIT: usize = 256;

pub struct HttpTransport<T = JsonValue> {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
    _payload: PhantomData<fn() -> T>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Use a preconfigured client (connection pool, TLS roots, proxies).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: None,
            _payload: PhantomData,
        }
    }
}

impl<T> HttpTransport<T> {
    /// Decode payloads into `U` instead.
    ///
    /// ```ignore
    /// let users = HttpTransport::new(base_url).decoding::<User>();
    /// ```
    pub fn decoding<U>(self) -> HttpTransport<U> {
        HttpTransport {
            client: self.client,
            base_url: self.base_url,
            timeout: self.timeout,
            _payload: PhantomData,
        }
    }

    /// Per-request timeout enforced by reqwest.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the resource `key` is fetched from.
    pub fn url_for(&self, key: &str) -> String {
        let path = key.trim_start_matches(':').replace(':', "/");
        format!("{}/{}", self.base_url, path)
    }

    fn map_request_error(&self, key: &str, err: reqwest::Error) -> FetchError {
        let source = match self.timeout {
            Some(after) if err.is_timeout() => TransportError::Timeout { after },
            // A timeout set on a caller-supplied client has no known duration.
            None if err.is_timeout() => TransportError::Connection {
                reason: format!("timed out: {}", err),
            },
            _ => TransportError::Connection {
                reason: err.to_string(),
            },
        };
        FetchError::transport(key, source)
    }
}

impl<T> Clone for HttpTransport<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            _payload: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for HttpTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}

#[async_trait]
impl<T> Transport for HttpTransport<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Value = T;

    async fn call(&self, key: &str) -> FetchResult<T> {
        let mut request = self.client.get(self.url_for(key));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_request_error(key, e))?;
        let status = response.status().as_u16();

        if !is_success(status) {
            if is_gone(status) {
                return Err(FetchError::not_found(key));
            }
            // The body only feeds the error message; failing to read it must
            // not change how the status is classified.
            let body = match response.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(err) => {
                    tracing::debug!(key, status, error = %err, "Failed to read error body");
                    Vec::new()
                }
            };
            return Err(status_error(key, status, &body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_request_error(key, e))?;
        decode_json(key, &body)
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn is_gone(status: u16) -> bool {
    matches!(status, 404 | 410)
}

/// Map a non-success status onto the fetch error taxonomy.
///
/// - 404 and 410: not found, never retried
/// - 408, 429 and 5xx: transient, retried
/// - any other non-2xx: rejected, never retried
pub fn classify_status(key: &str, status: u16, body: &[u8]) -> Option<FetchError> {
    if is_success(status) {
        return None;
    }
    Some(status_error(key, status, body))
}

fn status_error(key: &str, status: u16, body: &[u8]) -> FetchError {
    if is_gone(status) {
        return FetchError::not_found(key);
    }
    let reason = body_snippet(body);
    match status {
        408 | 429 | 500..=599 => {
            FetchError::transport(key, TransportError::Status { status, reason })
        }
        _ => FetchError::Rejected {
            key: key.to_string(),
            status,
            reason,
        },
    }
}

/// Decode a success body into `T`.
///
/// An empty body (e.g. `204 No Content`) is decoded as JSON `null`: it is a
/// successful empty result for `JsonValue`, `Option<_>` or `()`, and a decode
/// failure for payload types that require content.
pub fn decode_json<T: DeserializeOwned>(key: &str, body: &[u8]) -> FetchResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(JsonValue::Null)
            .map_err(|e| FetchError::decode(key, format!("empty response body: {}", e)));
    }
    serde_json::from_slice(body).map_err(|e| FetchError::decode(key, e.to_string()))
}

fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
