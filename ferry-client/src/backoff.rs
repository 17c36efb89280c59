//! Jittered exponential backoff.
//!
//! The deterministic part of the schedule is [`BackoffPolicy::ceiling`]:
//! `min(base * multiplier^attempt, max)`. Jitter then picks the actual delay
//! inside that ceiling so that many clients failing together do not retry in
//! lockstep.

use ferry_core::{ClientConfig, Jitter};
use rand::Rng;
use std::time::Duration;

/// Retry delay schedule. Holds no per-fetch state.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter: Jitter,
}

impl BackoffPolicy {
    /// Create a policy. A multiplier below 1.0 is clamped to 1.0 and `base` is
    /// clamped to `max`.
    pub fn new(base: Duration, max: Duration, multiplier: f64, jitter: Jitter) -> Self {
        let multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        Self {
            base: base.min(max),
            max,
            multiplier,
            jitter,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.base_delay(),
            config.max_delay(),
            config.backoff_multiplier,
            config.jitter,
        )
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Upper bound of the delay for the 0-indexed `attempt`.
    ///
    /// `ceiling(0)` is the base delay.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Delay to wait after the failure of 0-indexed `attempt`, jittered with
    /// the thread-local generator.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_for_with(attempt, &mut rand::rng())
    }

    /// Same as [`BackoffPolicy::delay_for`] with an explicit random source.
    pub fn delay_for_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let ceiling = self.ceiling(attempt);
        let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        match self.jitter {
            Jitter::None => ceiling,
            Jitter::Full => Duration::from_nanos(rng.random_range(0..=nanos)),
            Jitter::Equal => {
                let half = nanos / 2;
                Duration::from_nanos(half + rng.random_range(0..=nanos - half))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}
