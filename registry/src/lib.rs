//! Plugin registry façade for the unified LLM adapter.
//!
//! Plugins are manifest files (`*.yaml`, `*.yml`, `*.json`) under a
//! plugins directory, each declaring any mix of providers, function
//! tools, MCP servers, vector stores, embedding providers, compat
//! modules, and process routes. The registry loads them lazily,
//! resolves duplicates first-file-wins, and exposes everything by name.
//!
//! Live collaborators (tool executors, MCP clients, vector stores,
//! embedding providers, compat modules) are reached through the trait
//! interfaces in [`interfaces`]; drivers are registered by the host and
//! bound to manifest entries on first lookup.

mod error;
mod executors;
mod interfaces;
mod loader;
mod manifest;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use executors::{HttpToolExecutor, StaticToolExecutor};
pub use interfaces::{
    CompatError, CompatKind, CompatModule, CompatResult, CompatShapeExt, CompatStream,
    EmbeddingProvider, McpClient, ProviderRequest, StreamingFlags, ToolError, ToolExecutor,
    VectorMatch, VectorQueryOptions, VectorStore,
};
pub use manifest::{
    CompatEntry, EmbeddingProviderEntry, FunctionToolEntry, McpServerEntry, PluginManifest,
    ProcessRoute, ProviderEntry, VectorStoreEntry,
};
pub use registry::{Registry, ToolDriverFactory};
