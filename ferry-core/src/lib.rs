//! ferry Core - Shared Contracts
//!
//! Error taxonomy, configuration and the transport boundary used by the
//! resilient client. This crate contains no caching or retry logic.

pub mod config;
pub mod error;
pub mod transport;

pub use config::{ClientConfig, Jitter};
pub use error::{
    ConfigError, FerryError, FerryResult, FetchError, FetchResult, TransportError,
};
pub use transport::{resource_key, Transport};
