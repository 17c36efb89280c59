//! Transport implementations.
//!
//! The [`Transport`](ferry_core::Transport) contract lives in `ferry-core`;
//! this module provides the HTTP implementation.

pub mod http;

pub use http::{classify_status, decode_json, HttpTransport};
