//! Collaborator interfaces.
//!
//! The adapter core consumes tool execution, MCP transports, vector
//! stores, embedding providers, and provider compat modules through
//! these traits. Concrete drivers live outside the core; tests register
//! mocks.

use std::pin::Pin;

use adapter_protocol::{Message, ParsedChunk, Response, Settings, ToolSpec};
use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// Function tools
// ============================================================================

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// A callable function tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Declaration shown to the model.
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;
}

// ============================================================================
// MCP
// ============================================================================

/// A connected MCP server.
///
/// The transport behind this trait is external; the core only lists and
/// calls tools and closes the connection when the coordinator is
/// dropped.
#[async_trait]
pub trait McpClient: Send + Sync {
    fn id(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;

    async fn close(&self);
}

// ============================================================================
// Vector stores and embeddings
// ============================================================================

/// One retrieval hit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Options forwarded to a store query.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorQueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub include_payload: bool,
    #[serde(default)]
    pub include_vector: bool,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn id(&self) -> &str;

    /// Collection configured for this store, if any.
    fn default_collection(&self) -> Option<&str>;

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: u32,
        options: &VectorQueryOptions,
    ) -> Result<Vec<VectorMatch>, ToolError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ToolError>;
}

// ============================================================================
// Provider compat modules
// ============================================================================

#[derive(Debug, Error)]
pub enum CompatError {
    /// An HTTP-shape operation invoked on an SDK-only compat, or vice
    /// versa.
    #[error("Operation '{operation}' is not supported by {kind} compat '{name}'")]
    UnsupportedShape {
        operation: &'static str,
        kind: CompatKind,
        name: String,
    },

    #[error("Provider payload error: {0}")]
    Payload(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

pub type CompatResult<T> = Result<T, CompatError>;

/// Which calling shape a compat implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatKind {
    /// `build_payload` / `parse_response` / `parse_stream_chunk`; the
    /// core owns the HTTP exchange.
    Http,
    /// `call_sdk` / `stream_sdk`; the compat owns the exchange.
    Sdk,
}

impl std::fmt::Display for CompatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompatKind::Http => f.write_str("http"),
            CompatKind::Sdk => f.write_str("sdk"),
        }
    }
}

/// Flags the aggregator consults before opening a provider stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamingFlags {
    pub supports_streaming: bool,
    /// Whether chunks carry usage totals on the final frame.
    pub reports_usage: bool,
}

impl Default for StreamingFlags {
    fn default() -> Self {
        Self {
            supports_streaming: true,
            reports_usage: true,
        }
    }
}

/// Everything a compat needs to address one provider call.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub settings: Settings,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<Value>,
    pub stream: bool,
}

pub type CompatStream = Pin<Box<dyn Stream<Item = CompatResult<ParsedChunk>> + Send>>;

/// Per-provider-family strategy.
///
/// A compat implements exactly one shape; the other shape's defaults
/// fail with [`CompatError::UnsupportedShape`]. Compats must sanitize
/// tool names on the way out and preserve provider-opaque fields across
/// round-trips by stashing them in `ToolCall::metadata`.
#[async_trait]
pub trait CompatModule: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CompatKind;

    // ---- HTTP shape ----

    fn build_payload(&self, request: &ProviderRequest) -> CompatResult<Value> {
        let _ = request;
        Err(self.unsupported("build_payload"))
    }

    fn parse_response(&self, raw: &Value, model: &str) -> CompatResult<Response> {
        let _ = (raw, model);
        Err(self.unsupported("parse_response"))
    }

    /// Parse one raw stream frame. `Ok(None)` means the frame carries
    /// nothing (keep-alives, `[DONE]` sentinels).
    fn parse_stream_chunk(&self, raw: &str) -> CompatResult<Option<ParsedChunk>> {
        let _ = raw;
        Err(self.unsupported("parse_stream_chunk"))
    }

    fn streaming_flags(&self) -> StreamingFlags {
        StreamingFlags::default()
    }

    /// Provider-specific payload adjustments from the provider entry's
    /// options map.
    fn apply_provider_extensions(&self, payload: &mut Value, options: &Map<String, Value>) {
        let _ = (payload, options);
    }

    // ---- SDK shape ----

    async fn call_sdk(&self, request: &ProviderRequest) -> CompatResult<Response> {
        let _ = request;
        Err(self.unsupported("call_sdk"))
    }

    async fn stream_sdk(&self, request: &ProviderRequest) -> CompatResult<CompatStream> {
        let _ = request;
        Err(self.unsupported("stream_sdk"))
    }
}

/// Helper so default shape methods can name the offending compat.
pub trait CompatShapeExt {
    fn unsupported(&self, operation: &'static str) -> CompatError;
}

impl<T: CompatModule + ?Sized> CompatShapeExt for T {
    fn unsupported(&self, operation: &'static str) -> CompatError {
        CompatError::UnsupportedShape {
            operation,
            kind: self.kind(),
            name: self.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SdkOnly;

    #[async_trait]
    impl CompatModule for SdkOnly {
        fn name(&self) -> &str {
            "gemini-sdk"
        }

        fn kind(&self) -> CompatKind {
            CompatKind::Sdk
        }
    }

    #[test]
    fn test_http_shape_on_sdk_compat_is_explanatory() {
        let compat = SdkOnly;
        let err = compat.build_payload(&ProviderRequest {
            model: "m".to_string(),
            settings: Settings::default(),
            messages: vec![],
            tools: vec![],
            tool_choice: None,
            stream: false,
        });
        let message = err.unwrap_err().to_string();
        assert!(message.contains("build_payload"));
        assert!(message.contains("gemini-sdk"));
        assert!(message.contains("sdk"));
    }
}
