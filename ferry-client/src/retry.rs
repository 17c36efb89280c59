//! Sequential retry driver.
//!
//! One attempt at a time: attempt `n + 1` is only started after attempt `n`
//! has settled and the failure was classified as retryable. Waiting between
//! attempts is a timer suspension, so other fetches keep making progress.

use crate::backoff::BackoffPolicy;
use ferry_core::{FetchError, FetchResult, TransportError};
use std::future::Future;
use std::time::Duration;

/// Progress of one logical fetch across its attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    last_error: Option<TransportError>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts that have settled with a retryable failure.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    fn record_failure(&mut self, err: TransportError) {
        self.attempt += 1;
        self.last_error = Some(err);
    }
}

/// Retry settings for a single fetch.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    /// Total attempts allowed, the first included. Treated as at least one.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Timeout applied to each attempt individually.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPlan {
    /// Drive `op` until it succeeds, fails terminally, or runs out of attempts.
    ///
    /// Only [`FetchError::Transport`] failures are retried. An elapsed
    /// `attempt_timeout` counts as a transport timeout. When attempts run out
    /// the last transport failure is wrapped in
    /// [`FetchError::RetriesExhausted`].
    pub async fn run<F, Fut, V>(&self, key: &str, mut op: F) -> FetchResult<V>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<V>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut state = RetryState::new();

        loop {
            let result = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::transport(
                        key,
                        TransportError::Timeout { after: limit },
                    )),
                },
                None => op().await,
            };

            match result {
                Ok(value) => {
                    if state.attempt() > 0 {
                        tracing::debug!(
                            key,
                            attempts = state.attempt() + 1,
                            "Fetch succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(FetchError::Transport { source, .. }) => {
                    state.record_failure(source.clone());
                    if state.attempt() >= max_attempts {
                        tracing::info!(
                            key,
                            attempts = state.attempt(),
                            error = %source,
                            "Retries exhausted"
                        );
                        return Err(FetchError::RetriesExhausted {
                            key: key.to_string(),
                            attempts: state.attempt(),
                            last: source,
                        });
                    }

                    let delay = self.backoff.delay_for(state.attempt() - 1);
                    tracing::warn!(
                        key,
                        attempt = state.attempt(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %source,
                        "Retryable fetch failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::debug!(key, error = %err, "Terminal fetch failure");
                    return Err(err);
                }
            }
        }
    }
}
