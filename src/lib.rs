//! Unified LLM adapter.
//!
//! A provider-agnostic server and coordinator: one declarative call
//! specification (messages, provider priority, tools, retrieval
//! context, settings) executed against any of several model backends,
//! with payloads, streaming chunks, and tool-calling protocols
//! normalized into a single wire-level contract.
//!
//! Crate layout:
//! - [`server`]: HTTP/SSE endpoints with admission control
//! - [`coordinator`]: per-request execution, the tool loop, and the
//!   streaming aggregator
//! - [`context`]: vector-context injection and the `vector_search`
//!   tool handler
//! - [`logging`]: wire-forensics loggers and file retention
//! - [`config`]: server configuration
//! - [`error`]: the adapter-internal error type mapped onto the wire
//!   error-code set

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod server;

pub use config::AdapterConfig;
pub use coordinator::Coordinator;
pub use error::{AdapterError, AdapterResult};
