//! Authentication for the adapter's serving layer.
//!
//! This crate provides:
//! - API key authentication via a configurable header (default `x-api-key`)
//! - Bearer token authentication
//! - Plaintext and hashed (`sha256:<hex>`) key storage
//! - An axum middleware that runs strictly before body parsing
//!
//! A missing or invalid credential yields 401 even when the request body
//! is malformed; an `authorize` callback can further deny with 403.

mod config;
mod key;
mod middleware;

pub use config::AuthConfig;
pub use key::{credential_fingerprint, KeyVerifier};
pub use middleware::{auth_middleware, AuthLayerState, AuthMethod, AuthorizeFn, Principal};
