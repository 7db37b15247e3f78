//! Normalized message model.
//!
//! Every provider family is translated into this shape by its compat
//! module. Content is an ordered sequence of tagged parts so multimodal
//! payloads and tool results survive round-trips through the adapter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Roles
// ============================================================================

/// Conversation role.
///
/// `Other` carries roles the adapter does not interpret itself but must
/// pass through to providers unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    #[serde(untagged)]
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other(s) => s,
        }
    }
}

// ============================================================================
// Content parts
// ============================================================================

/// Source of an image content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageSource {
    Url(String),
    Base64(String),
}

/// Source of a document content part.
///
/// Compat modules serialize these per the target's file/document schema:
/// inline base64 with a mime prefix, a file-ID reference, or a URL. A
/// compat that cannot express a given source fails with an explanatory
/// error rather than silently dropping the part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentSource {
    Base64 { data: String },
    Url { url: String },
    FileId { id: String },
}

/// One element of a message's content sequence.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        image: ImageSource,
    },
    #[serde(rename_all = "camelCase")]
    Document {
        source: DocumentSource,
        mime_type: String,
        filename: Option<String>,
        provider_options: Option<Map<String, Value>>,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_name: String,
        result: Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Text payload when this part is textual, `None` otherwise.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Tool calls
// ============================================================================

/// A tool invocation requested by the model.
///
/// `metadata` preserves provider-specific opaque fields (reasoning
/// signatures and the like) byte-for-byte across round-trips. Compats
/// stash anything they need back on the next call here.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub metadata: Option<Map<String, Value>>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            metadata: None,
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A single conversation message.
///
/// Invariant: tool-role messages carry a `tool_call_id` matching a prior
/// assistant message's `tool_calls` entry.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    pub reasoning: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            reasoning: None,
            metadata: None,
        }
    }

    /// Convenience constructor for a single-text-part message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentPart::text(text)])
    }

    /// Tool-role reply carrying a stringified tool result.
    pub fn tool_reply(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(Role::Tool, text)
        }
    }

    /// Concatenated text of all textual content parts.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_part_text_round_trip() {
        let part = ContentPart::text("hello");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json, json!({"type": "text", "text": "hello"}));
        let back: ContentPart = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn test_tool_result_part_wire_shape() {
        let part = ContentPart::ToolResult {
            tool_name: "lookup".to_string(),
            result: json!({"ok": true}),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["toolName"], "lookup");
    }

    #[test]
    fn test_unknown_role_passes_through() {
        let msg: Message =
            serde_json::from_value(json!({"role": "developer", "content": []})).unwrap();
        assert_eq!(msg.role, Role::Other("developer".to_string()));
        assert_eq!(msg.role.as_str(), "developer");
    }

    #[test]
    fn test_document_part_sources() {
        let doc: ContentPart = serde_json::from_value(json!({
            "type": "document",
            "source": {"type": "file_id", "id": "file-123"},
            "mimeType": "application/pdf"
        }))
        .unwrap();
        match doc {
            ContentPart::Document { source, mime_type, .. } => {
                assert_eq!(source, DocumentSource::FileId { id: "file-123".to_string() });
                assert_eq!(mime_type, "application/pdf");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn test_joined_text_skips_non_text_parts() {
        let msg = Message::new(
            Role::User,
            vec![
                ContentPart::text("a"),
                ContentPart::Image {
                    image: ImageSource::Url("http://x/y.png".to_string()),
                },
                ContentPart::text("b"),
            ],
        );
        assert_eq!(msg.joined_text(), "a\nb");
    }

    #[test]
    fn test_tool_call_metadata_round_trip() {
        let mut metadata = Map::new();
        metadata.insert("thoughtSignature".to_string(), json!("sig-bytes=="));
        let call = ToolCall {
            metadata: Some(metadata),
            ..ToolCall::new("c1", "search", json!({"q": "rust"}))
        };
        let wire = serde_json::to_string(&call).unwrap();
        let back: ToolCall = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.metadata.unwrap()["thoughtSignature"], "sig-bytes==");
    }
}
