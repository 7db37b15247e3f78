//! Wire-level protocol definitions for the unified LLM adapter.
//!
//! Everything the server accepts or emits lives here: the call
//! specification, the normalized message model, streaming events, tool
//! declarations, and the closed error-code set. Provider compat modules
//! translate between these types and each provider's own wire format.

pub mod error;
pub mod events;
pub mod message;
pub mod response;
pub mod spec;
pub mod tool;

pub use error::{ErrorBody, ErrorCode, ErrorEnvelope, ResponseEnvelope};
pub use events::{ParsedChunk, StreamEvent, ToolCallEvent};
pub use message::{ContentPart, DocumentSource, ImageSource, Message, Role, ToolCall};
pub use response::{FinishReason, Response, Usage};
pub use spec::{
    CallSpec, IncludeSystemPrompt, InjectAs, LlmTarget, QueryConstruction, RuntimeOptions,
    Settings, ToolSchemaOverride, ToolSchemaOverrides, VectorContextConfig, VectorLocks,
    VectorMode,
};
pub use tool::{sanitize_tool_name, ToolNameMap, ToolSpec};
