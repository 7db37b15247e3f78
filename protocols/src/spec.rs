//! The call specification: the adapter's input unit.
//!
//! A `CallSpec` is one declarative request: conversation messages, an
//! ordered provider priority list, tool sources, retrieval
//! configuration, and runtime knobs for the tool loop.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;
use crate::tool::ToolSpec;

// ============================================================================
// Call specification
// ============================================================================

/// One {provider, model} target in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmTarget {
    pub provider: String,
    pub model: String,
}

/// Recognized sampling and generation options.
///
/// Unrecognized keys are preserved in `other` and handed to the compat
/// module untouched.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub reasoning_budget: Option<u32>,
    pub batch_size: Option<u32>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Tool-loop runtime options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Per-request tool-call budget. Parsed permissively: numbers are
    /// truncated, numeric strings coerced, and NaN/Infinity/null/absent
    /// fall back to the default of 10.
    #[serde(
        default = "default_max_tool_iterations",
        deserialize_with = "permissive_iterations"
    )]
    pub max_tool_iterations: u32,
    #[serde(default = "default_true")]
    pub tool_countdown_enabled: bool,
    #[serde(default)]
    pub tool_final_prompt_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            tool_countdown_enabled: true,
            tool_final_prompt_enabled: false,
            batch_id: None,
        }
    }
}

fn default_true() -> bool {
    true
}

pub(crate) fn default_max_tool_iterations() -> u32 {
    10
}

fn permissive_iterations<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_iterations(&value))
}

/// Coerce an arbitrary JSON value into an iteration count.
pub fn coerce_iterations(value: &Value) -> u32 {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.is_finite() {
                    return f.max(0.0).trunc() as u32;
                }
            }
            default_max_tool_iterations()
        }
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => f.max(0.0).trunc() as u32,
            _ => default_max_tool_iterations(),
        },
        _ => default_max_tool_iterations(),
    }
}

/// The adapter's input unit.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSpec {
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Ordered provider/model targets. Must be non-empty.
    #[serde(default)]
    pub llm_priority: Vec<LlmTarget>,
    #[serde(default)]
    pub settings: Settings,
    /// Inline tool declarations.
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    /// References to registry-loaded function tools.
    #[serde(default)]
    pub function_tool_names: Vec<String>,
    /// References to registry-loaded MCP servers.
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    /// Vector stores queried for tool retrieval, in priority order.
    pub vector_priority: Option<Vec<String>>,
    pub vector_context: Option<VectorContextConfig>,
    #[serde(default)]
    pub runtime: RuntimeOptions,
    /// Free-form correlation map, threaded into logs.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CallSpec {
    /// Text of the latest user message, used as the default retrieval
    /// query.
    pub fn latest_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::User)
            .map(Message::joined_text)
            .filter(|t| !t.trim().is_empty())
    }
}

// ============================================================================
// Vector context configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMode {
    /// Automatic pre-call context injection only.
    #[default]
    Auto,
    /// Expose the synthetic `vector_search` tool only.
    Tool,
    /// Both injection and the tool.
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectAs {
    #[default]
    System,
    UserContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncludeSystemPrompt {
    Always,
    Never,
    /// Included iff the total message count fits inside
    /// `messages_to_include`.
    #[default]
    IfInRange,
}

/// How the retrieval query is assembled from the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConstruction {
    /// Number of trailing messages to include; 0 means all.
    #[serde(default)]
    pub messages_to_include: usize,
    #[serde(default = "default_true")]
    pub include_assistant_messages: bool,
    #[serde(default)]
    pub include_system_prompt: IncludeSystemPrompt,
}

impl Default for QueryConstruction {
    fn default() -> Self {
        Self {
            messages_to_include: 0,
            include_assistant_messages: true,
            include_system_prompt: IncludeSystemPrompt::default(),
        }
    }
}

/// Server-enforced values that override any LLM-supplied argument of the
/// synthetic `vector_search` tool. Locked keys are hidden from the tool
/// schema entirely.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorLocks {
    pub store: Option<String>,
    pub top_k: Option<u32>,
    pub score_threshold: Option<f64>,
    pub collection: Option<String>,
    pub filter: Option<Value>,
}

/// Per-parameter schema adjustments for the synthetic `vector_search`
/// tool.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchemaOverride {
    /// Expose the parameter under a different name. The handler
    /// un-maps it before execution.
    pub rename: Option<String>,
    pub description: Option<String>,
    /// Expose (`true`) or hide (`false`) an optional parameter. Locked
    /// parameters stay hidden regardless.
    pub expose: Option<bool>,
}

/// Overrides keyed by the canonical parameter name.
pub type ToolSchemaOverrides = std::collections::BTreeMap<String, ToolSchemaOverride>;

/// Retrieval configuration for one call. Created per call, consumed by
/// the injector or tool discovery, then discarded.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorContextConfig {
    /// Store IDs in priority order.
    #[serde(default)]
    pub stores: Vec<String>,
    #[serde(default)]
    pub mode: VectorMode,
    pub top_k: Option<u32>,
    pub score_threshold: Option<f64>,
    pub filter: Option<Value>,
    pub collection: Option<String>,
    /// Embedding providers tried in order; falls back to the first
    /// configured provider.
    pub embedding_priority: Option<Vec<String>>,
    #[serde(default)]
    pub inject_as: InjectAs,
    pub inject_template: Option<String>,
    pub result_format: Option<String>,
    #[serde(default)]
    pub query_construction: QueryConstruction,
    pub override_embedding_query: Option<String>,
    #[serde(default)]
    pub locks: VectorLocks,
    pub tool_schema_overrides: Option<ToolSchemaOverrides>,
}

impl VectorContextConfig {
    pub fn wants_injection(&self) -> bool {
        matches!(self.mode, VectorMode::Auto | VectorMode::Both)
    }

    pub fn wants_tool(&self) -> bool {
        matches!(self.mode, VectorMode::Tool | VectorMode::Both)
    }
}
