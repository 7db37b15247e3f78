//! The closed error-code set and wire envelopes.
//!
//! Every error the adapter emits over the wire carries one of these
//! codes. Handlers map codes to HTTP statuses; the SSE path embeds them
//! in terminal `error` events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::Response;

/// Closed set of wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input
    InvalidJson,
    ValidationError,
    UnsupportedMediaType,
    PayloadTooLarge,
    BodyReadTimeout,
    // Auth
    Unauthorized,
    Forbidden,
    // Admission
    RateLimited,
    ServerBusy,
    QueueTimeout,
    // Execution
    Timeout,
    StreamIdleTimeout,
    MalformedResponse,
    ProviderError,
    ToolExecutionFailed,
    ToolCallBudgetExhausted,
    // Infrastructure
    ManifestError,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::UnsupportedMediaType => "unsupported_media_type",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::BodyReadTimeout => "body_read_timeout",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::ServerBusy => "server_busy",
            ErrorCode::QueueTimeout => "queue_timeout",
            ErrorCode::Timeout => "timeout",
            ErrorCode::StreamIdleTimeout => "stream_idle_timeout",
            ErrorCode::MalformedResponse => "malformed_response",
            ErrorCode::ProviderError => "provider_error",
            ErrorCode::ToolExecutionFailed => "tool_execution_failed",
            ErrorCode::ToolCallBudgetExhausted => "tool_call_budget_exhausted",
            ErrorCode::ManifestError => "manifest_error",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload carried by JSON envelopes and SSE error events.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Successful `/run` envelope: `{type: "response", data: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "response")]
pub struct ResponseEnvelope {
    pub data: Response,
}

/// Error envelope: `{type: "error", error: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "error")]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(
            serde_json::to_value(ErrorCode::StreamIdleTimeout).unwrap(),
            json!("stream_idle_timeout")
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::PayloadTooLarge).unwrap(),
            json!("payload_too_large")
        );
        for code in [
            ErrorCode::InvalidJson,
            ErrorCode::ValidationError,
            ErrorCode::RateLimited,
            ErrorCode::ServerBusy,
            ErrorCode::QueueTimeout,
            ErrorCode::Internal,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
    }

    #[test]
    fn test_error_envelope_shape() {
        let env = ErrorEnvelope {
            error: ErrorBody::new(ErrorCode::ServerBusy, "queue full"),
        };
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["type"], "error");
        assert_eq!(wire["error"]["code"], "server_busy");
        assert_eq!(wire["error"]["message"], "queue full");
        assert!(wire["error"].get("details").is_none());
    }

    #[test]
    fn test_response_envelope_shape() {
        let env = ResponseEnvelope {
            data: Response {
                provider: "p".to_string(),
                model: "m".to_string(),
                role: crate::message::Role::Assistant,
                content: vec![crate::message::ContentPart::text("ok")],
                tool_calls: None,
                reasoning: None,
                usage: None,
                finish_reason: None,
                raw: None,
            },
        };
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["type"], "response");
        assert_eq!(wire["data"]["content"][0]["text"], "ok");
    }
}
