//! Normalized streaming events.
//!
//! The streaming aggregator converts provider-specific chunks into this
//! event vocabulary. Ordering invariant per tool call: `tool_call_start`
//! strictly precedes all `tool_call_arguments_delta` events, which
//! precede `tool_call_end`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorBody;
use crate::response::{Response, Usage};

/// One step of a provider-streamed tool call.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallEvent {
    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        call_id: String,
        name: String,
        metadata: Option<Map<String, Value>>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCallArgumentsDelta {
        call_id: String,
        arguments_delta: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCallEnd {
        call_id: String,
        name: String,
        arguments: Value,
    },
}

impl ToolCallEvent {
    pub fn call_id(&self) -> &str {
        match self {
            ToolCallEvent::ToolCallStart { call_id, .. }
            | ToolCallEvent::ToolCallArgumentsDelta { call_id, .. }
            | ToolCallEvent::ToolCallEnd { call_id, .. } => call_id,
        }
    }
}

/// A normalized stream event delivered over SSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "delta")]
    Delta { content: String },
    #[serde(rename = "tool", rename_all = "camelCase")]
    Tool { tool_event: ToolCallEvent },
    #[serde(rename = "reasoning")]
    Reasoning { text: String },
    #[serde(rename = "error")]
    Error { error: ErrorBody },
    #[serde(rename = "DONE")]
    Done { response: Response },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// What a compat module extracted from one raw provider chunk.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedChunk {
    pub text: Option<String>,
    pub tool_events: Option<Vec<ToolCallEvent>>,
    pub reasoning: Option<String>,
    #[serde(default)]
    pub finished_with_tool_calls: bool,
    pub usage: Option<Usage>,
}

impl ParsedChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_delta_wire_shape() {
        let event = StreamEvent::Delta {
            content: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "delta", "content": "hi"})
        );
    }

    #[test]
    fn test_done_tag_is_uppercase() {
        let wire = serde_json::to_value(StreamEvent::Done {
            response: Response {
                provider: "p".to_string(),
                model: "m".to_string(),
                role: crate::message::Role::Assistant,
                content: vec![],
                tool_calls: None,
                reasoning: None,
                usage: None,
                finish_reason: None,
                raw: None,
            },
        })
        .unwrap();
        assert_eq!(wire["type"], "DONE");
    }

    #[test]
    fn test_tool_event_wire_shape() {
        let event = StreamEvent::Tool {
            tool_event: ToolCallEvent::ToolCallArgumentsDelta {
                call_id: "c1".to_string(),
                arguments_delta: "{\"q\":".to_string(),
            },
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "tool");
        assert_eq!(wire["toolEvent"]["type"], "tool_call_arguments_delta");
        assert_eq!(wire["toolEvent"]["callId"], "c1");
    }

    #[test]
    fn test_error_event_round_trip() {
        let event = StreamEvent::Error {
            error: ErrorBody::new(ErrorCode::Internal, "boom"),
        };
        let wire = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, event);
        assert!(back.is_terminal());
    }

    #[test]
    fn test_parsed_chunk_defaults() {
        let chunk: ParsedChunk = serde_json::from_value(json!({})).unwrap();
        assert!(chunk.text.is_none());
        assert!(!chunk.finished_with_tool_calls);
    }
}
