//! At most one in-flight operation per key.
//!
//! The in-flight table is a [`DashMap`]; looking up and registering an entry
//! happen under the same shard lock through the entry API, so two concurrent
//! first callers for a key can never both become owners.
//!
//! The owner's work runs on its own tokio task and every caller, the owner
//! included, waits on a `watch` channel for the outcome. A caller that stops
//! waiting (timeout, dropped future) therefore never aborts the work: it still
//! completes for the remaining subscribers.
//!
//! # Settlement
//!
//! ```text
//! run(k) ── vacant ──→ register(id) ──→ spawn(work) ──→ remove_if(id) ──→ publish
//!    │                                                        ▲
//!    └──── occupied ──→ subscribe ────── wait ────────────────┘
//! ```
//!
//! Removal happens before the outcome is published. A caller that subscribed
//! before removal reads the published outcome; one arriving after removal
//! registers a fresh flight.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ferry_core::{FetchError, FetchResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

type Outcome<V> = Option<FetchResult<V>>;

struct Flight<V> {
    id: u64,
    tx: watch::Sender<Outcome<V>>,
}

/// Removes the flight if the owner task ends without settling, e.g. because
/// the work panicked. Dropping the sender wakes every subscriber.
struct SettleGuard<V> {
    flights: Arc<DashMap<String, Flight<V>>>,
    key: String,
    id: u64,
    settled: bool,
}

impl<V> SettleGuard<V> {
    fn settle(mut self, outcome: FetchResult<V>) {
        self.settled = true;
        if let Some((_, flight)) = self.flights.remove_if(&self.key, |_, f| f.id == self.id) {
            flight.tx.send_replace(Some(outcome));
        }
    }
}

impl<V> Drop for SettleGuard<V> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(key = %self.key, "In-flight fetch ended without an outcome");
            self.flights.remove_if(&self.key, |_, f| f.id == self.id);
        }
    }
}

/// Single-flight coordinator keyed by resource key.
pub struct SingleFlight<V> {
    flights: Arc<DashMap<String, Flight<V>>>,
    next_id: AtomicU64,
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `work` for `key` unless a run for `key` is already in flight, in
    /// which case wait for that run's outcome instead.
    ///
    /// `work` is invoked at most once per flight and only by the owner. Every
    /// subscriber receives a clone of the same value or the same error.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let (mut rx, owner) = match self.flights.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!(key, "Joining in-flight fetch");
                (entry.get().tx.subscribe(), None)
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                entry.insert(Flight { id, tx });
                (rx, Some(id))
            }
        };

        if let Some(id) = owner {
            let guard = SettleGuard {
                flights: Arc::clone(&self.flights),
                key: key.to_string(),
                id,
                settled: false,
            };
            let fut = work();
            tokio::spawn(async move {
                let outcome = fut.await;
                guard.settle(outcome);
            });
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(FetchError::Abandoned {
                key: key.to_string(),
            })
        })
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Number of callers currently waiting on `key`'s flight, or 0 when
    /// nothing is in flight for it.
    pub fn subscribers(&self, key: &str) -> usize {
        self.flights
            .get(key)
            .map(|flight| flight.tx.receiver_count())
            .unwrap_or(0)
    }
}

impl<V> Default for SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for SingleFlight<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}
