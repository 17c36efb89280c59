//! Configuration types

use crate::{ConfigError, FerryResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How much randomness is applied to a computed backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// Use the computed delay as-is
    None,
    /// Uniform in `[0, computed]`
    #[default]
    Full,
    /// Half fixed, half random: uniform in `[computed / 2, computed]`
    Equal,
}

impl Jitter {
    /// Convert to config string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Full => "full",
            Self::Equal => "equal",
        }
    }

    /// Parse from config string representation.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "full" => Ok(Self::Full),
            "equal" => Ok(Self::Equal),
            other => Err(ConfigError::InvalidValue {
                field: "jitter".to_string(),
                value: other.to_string(),
                reason: "expected one of none, full, equal".to_string(),
            }),
        }
    }
}

/// Resilient client configuration.
///
/// Durations are expressed in milliseconds so the TOML form stays flat:
///
/// ```toml
/// cache_capacity = 1024
/// default_ttl_ms = 30000
/// max_retries = 4
/// base_delay_ms = 100
/// max_delay_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    /// Maximum number of cached entries.
    pub cache_capacity: usize,
    /// Time-to-live applied to values stored after a successful fetch.
    pub default_ttl_ms: u64,
    /// Maximum number of transport attempts per fetch, the first one included.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    pub jitter: Jitter,
    /// Optional timeout applied to each individual transport attempt.
    pub request_timeout_ms: Option<u64>,
    /// Maximum number of keys fetched concurrently by a batch fetch.
    pub batch_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            default_ttl_ms: 30_000,
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: Jitter::Full,
            request_timeout_ms: None,
            batch_concurrency: 8,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Set the cache capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = duration_to_ms(ttl);
        self
    }

    /// Set the maximum number of attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base and maximum backoff delays.
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = duration_to_ms(base);
        self.max_delay_ms = duration_to_ms(max);
        self
    }

    /// Set the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the jitter mode.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Set the batch concurrency.
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency;
        self
    }

    /// Parse a config from TOML text. Missing fields fall back to defaults.
    pub fn from_toml_str(contents: &str) -> FerryResult<Self> {
        let config: ClientConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn from_path(path: &Path) -> FerryResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `FERRY_CACHE_CAPACITY`
    /// - `FERRY_DEFAULT_TTL_MS`
    /// - `FERRY_MAX_RETRIES`
    /// - `FERRY_BASE_DELAY_MS`
    /// - `FERRY_MAX_DELAY_MS`
    /// - `FERRY_BACKOFF_MULTIPLIER`
    /// - `FERRY_JITTER` (`none`, `full`, `equal`)
    /// - `FERRY_REQUEST_TIMEOUT_MS`
    /// - `FERRY_BATCH_CONCURRENCY`
    ///
    /// Variables that are present but unparseable are reported, not ignored.
    pub fn from_env() -> FerryResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> FerryResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            cache_capacity: parse_var(&lookup, "FERRY_CACHE_CAPACITY")?
                .unwrap_or(defaults.cache_capacity),
            default_ttl_ms: parse_var(&lookup, "FERRY_DEFAULT_TTL_MS")?
                .unwrap_or(defaults.default_ttl_ms),
            max_retries: parse_var(&lookup, "FERRY_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            base_delay_ms: parse_var(&lookup, "FERRY_BASE_DELAY_MS")?
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: parse_var(&lookup, "FERRY_MAX_DELAY_MS")?
                .unwrap_or(defaults.max_delay_ms),
            backoff_multiplier: parse_var(&lookup, "FERRY_BACKOFF_MULTIPLIER")?
                .unwrap_or(defaults.backoff_multiplier),
            jitter: match lookup("FERRY_JITTER") {
                Some(raw) => Jitter::parse(&raw)?,
                None => defaults.jitter,
            },
            request_timeout_ms: parse_var(&lookup, "FERRY_REQUEST_TIMEOUT_MS")?
                .or(defaults.request_timeout_ms),
            batch_concurrency: parse_var(&lookup, "FERRY_BATCH_CONCURRENCY")?
                .unwrap_or(defaults.batch_concurrency),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - cache_capacity > 0
    /// - max_retries >= 1
    /// - base_delay_ms <= max_delay_ms
    /// - backoff_multiplier is finite and >= 1.0
    /// - batch_concurrency > 0
    /// - request_timeout_ms > 0 when set
    pub fn validate(&self) -> FerryResult<()> {
        if self.cache_capacity == 0 {
            return Err(invalid(
                "cache_capacity",
                self.cache_capacity,
                "cache_capacity must be greater than 0",
            ));
        }

        if self.max_retries == 0 {
            return Err(invalid(
                "max_retries",
                self.max_retries,
                "max_retries must allow at least one attempt",
            ));
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(invalid(
                "base_delay_ms",
                self.base_delay_ms,
                "base_delay_ms must not exceed max_delay_ms",
            ));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(invalid(
                "backoff_multiplier",
                self.backoff_multiplier,
                "backoff_multiplier must be a finite value >= 1.0",
            ));
        }

        if self.batch_concurrency == 0 {
            return Err(invalid(
                "batch_concurrency",
                self.batch_concurrency,
                "batch_concurrency must be greater than 0",
            ));
        }

        if self.request_timeout_ms == Some(0) {
            return Err(invalid(
                "request_timeout_ms",
                0,
                "request_timeout_ms must be positive when set",
            ));
        }

        Ok(())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::FerryError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
                reason: "could not be parsed".to_string(),
            }),
    }
}

// =============================================================================
// TESTS
// =============================================================================
