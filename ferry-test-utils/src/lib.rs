//! ferry Test Utilities
//!
//! Centralized test infrastructure for the ferry workspace:
//! - Mock transports with scripted outcomes and call accounting
//! - Proptest generators for keys, errors and configurations
//! - Fixtures for common scenarios

// Re-export core types for convenience
pub use ferry_core::{
    ClientConfig, FetchError, FetchResult, Jitter, Transport, TransportError,
};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// MOCK TRANSPORTS
// ============================================================================

type Fallback<V> = Arc<dyn Fn(&str) -> FetchResult<V> + Send + Sync>;

#[derive(Default)]
struct CallLog {
    per_key: HashMap<String, Vec<Instant>>,
    total: usize,
}

/// Transport that replays scripted outcomes per key.
///
/// Each call pops the next outcome scripted for the key. Once a key's script
/// is used up the fallback answers; the default fallback reports not-found.
/// Every call is recorded with its start time so tests can inspect ordering
/// and spacing.
pub struct ScriptedTransport<V> {
    scripts: Mutex<HashMap<String, VecDeque<FetchResult<V>>>>,
    fallback: Fallback<V>,
    latency: Duration,
    log: Mutex<CallLog>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Clone + Send + Sync + 'static> ScriptedTransport<V> {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Arc::new(|key: &str| Err(FetchError::not_found(key))),
            latency: Duration::ZERO,
            log: Mutex::new(CallLog::default()),
        }
    }

    /// Sleep this long inside every call before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer calls for keys without a (remaining) script.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&str) -> FetchResult<V> + Send + Sync + 'static,
    {
        self.fallback = Arc::new(fallback);
        self
    }

    /// Append outcomes to `key`'s script.
    pub fn script<I>(self, key: &str, outcomes: I) -> Self
    where
        I: IntoIterator<Item = FetchResult<V>>,
    {
        lock(&self.scripts)
            .entry(key.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Number of calls made for `key`.
    pub fn calls_for(&self, key: &str) -> usize {
        lock(&self.log).per_key.get(key).map_or(0, Vec::len)
    }

    /// Number of calls made for all keys.
    pub fn total_calls(&self) -> usize {
        lock(&self.log).total
    }

    /// Start times of the calls made for `key`, in call order.
    pub fn call_times(&self, key: &str) -> Vec<Instant> {
        lock(&self.log)
            .per_key
            .get(key)
            .cloned()
            .unwrap_or_default()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ScriptedTransport<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> Transport for ScriptedTransport<V> {
    type Value = V;

    async fn call(&self, key: &str) -> FetchResult<V> {
        {
            let mut log = lock(&self.log);
            log.per_key
                .entry(key.to_string())
                .or_default()
                .push(Instant::now());
            log.total += 1;
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = lock(&self.scripts)
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(outcome) => outcome,
            None => (self.fallback)(key),
        }
    }
}

/// Transport that answers every key with `"value-of-{key}"`.
pub fn echo_transport() -> ScriptedTransport<String> {
    ScriptedTransport::new().with_fallback(|key| Ok(expected_echo(key)))
}

/// The value [`echo_transport`] produces for `key`.
pub fn expected_echo(key: &str) -> String {
    format!("value-of-{}", key)
}

/// A retryable connection failure for `key`.
pub fn connection_error(key: &str) -> FetchError {
    FetchError::transport(
        key,
        TransportError::Connection {
            reason: "connection reset by peer".to_string(),
        },
    )
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Config with deterministic, short delays for retry tests.
pub fn fast_config(max_retries: u32) -> ClientConfig {
    ClientConfig::new()
        .with_max_retries(max_retries)
        .with_delays(Duration::from_millis(10), Duration::from_millis(80))
        .with_jitter(Jitter::None)
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for ferry types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a resource key like `user:42`.
    pub fn arb_key() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", 0u32..10_000).prop_map(|(kind, id)| format!("{}:{}", kind, id))
    }

    pub fn arb_jitter() -> impl Strategy<Value = Jitter> {
        prop_oneof![Just(Jitter::None), Just(Jitter::Full), Just(Jitter::Equal)]
    }

    pub fn arb_transport_error() -> impl Strategy<Value = TransportError> {
        prop_oneof![
            "[a-z ]{1,24}".prop_map(|reason| TransportError::Connection { reason }),
            (1u64..60_000).prop_map(|ms| TransportError::Timeout {
                after: Duration::from_millis(ms)
            }),
            (500u16..600, "[a-z ]{0,24}")
                .prop_map(|(status, reason)| TransportError::Status { status, reason }),
        ]
    }

    /// Generate a failure a transport may report (never a client-side one).
    pub fn arb_transport_failure(key: String) -> impl Strategy<Value = FetchError> {
        let k1 = key.clone();
        let k2 = key.clone();
        let k3 = key.clone();
        prop_oneof![
            arb_transport_error().prop_map(move |source| FetchError::transport(k1.clone(), source)),
            "[a-z ]{1,24}".prop_map(move |reason| FetchError::decode(k2.clone(), reason)),
            (400u16..404, "[a-z ]{0,24}").prop_map(move |(status, reason)| FetchError::Rejected {
                key: k3.clone(),
                status,
                reason,
            }),
            Just(FetchError::not_found(key)),
        ]
    }

    /// Generate a configuration that passes validation.
    pub fn arb_config() -> impl Strategy<Value = ClientConfig> {
        (
            1usize..4096,
            1u64..600_000,
            1u32..10,
            0u64..1_000,
            0u64..60_000,
            1.0f64..4.0,
            arb_jitter(),
            proptest::option::of(1u64..30_000),
            1usize..64,
        )
            .prop_map(
                |(capacity, ttl, retries, base, extra, multiplier, jitter, timeout, batch)| {
                    ClientConfig {
                        cache_capacity: capacity,
                        default_ttl_ms: ttl,
                        max_retries: retries,
                        base_delay_ms: base,
                        max_delay_ms: base + extra,
                        backoff_multiplier: multiplier,
                        jitter,
                        request_timeout_ms: timeout,
                        batch_concurrency: batch,
                    }
                },
            )
    }
}
