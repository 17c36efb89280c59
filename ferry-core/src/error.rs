//! Error types for ferry operations

use std::time::Duration;
use thiserror::Error;

/// Failures of the underlying transport call.
///
/// Every variant is considered transient: a later attempt may succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Upstream returned status {status}: {reason}")]
    Status { status: u16, reason: String },
}

/// Fetch errors surfaced to callers of the resilient client.
///
/// Errors are `Clone` so that a single settled outcome can be handed to every
/// caller that joined the same in-flight fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error fetching {key}: {source}")]
    Transport {
        key: String,
        #[source]
        source: TransportError,
    },

    #[error("Decode error for {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Resource not found: {key}")]
    NotFound { key: String },

    #[error("Request for {key} rejected with status {status}: {reason}")]
    Rejected {
        key: String,
        status: u16,
        reason: String,
    },

    #[error("Retries exhausted for {key} after {attempts} attempts: {last}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("In-flight fetch for {key} ended without an outcome")]
    Abandoned { key: String },
}

impl FetchError {
    /// Build a transport failure for `key`.
    pub fn transport(key: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            key: key.into(),
            source,
        }
    }

    /// Build a decode failure for `key`.
    pub fn decode(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Build a not-found failure for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Only transport failures are worth another attempt. A malformed payload
    /// or a missing resource will not change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The resource key this failure refers to.
    pub fn key(&self) -> &str {
        match self {
            Self::Transport { key, .. }
            | Self::Decode { key, .. }
            | Self::NotFound { key }
            | Self::Rejected { key, .. }
            | Self::RetriesExhausted { key, .. }
            | Self::Abandoned { key } => key,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all ferry errors.
#[derive(Debug, Clone, Error)]
pub enum FerryError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type alias for ferry operations.
pub type FerryResult<T> = Result<T, FerryError>;

// =============================================================================
// TESTS
// =============================================================================
