//! Adapter-internal error type and its wire mapping.

use adapter_protocol::{ErrorBody, ErrorCode, ErrorEnvelope};
use adapter_registry::{CompatError, RegistryError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Everything that can fail inside the adapter, keyed to the closed
/// wire error-code set.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Request body exceeds {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    #[error("Timed out reading request body")]
    BodyReadTimeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Server is at capacity")]
    ServerBusy,

    #[error("Timed out waiting for a free slot")]
    QueueTimeout,

    #[error("Request timed out")]
    Timeout,

    #[error("Stream idle timeout")]
    StreamIdleTimeout,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("{0}")]
    Internal(String),
}

impl AdapterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AdapterError::InvalidJson(_) => ErrorCode::InvalidJson,
            AdapterError::Validation(_) => ErrorCode::ValidationError,
            AdapterError::UnsupportedMediaType(_) => ErrorCode::UnsupportedMediaType,
            AdapterError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AdapterError::BodyReadTimeout => ErrorCode::BodyReadTimeout,
            AdapterError::RateLimited => ErrorCode::RateLimited,
            AdapterError::ServerBusy => ErrorCode::ServerBusy,
            AdapterError::QueueTimeout => ErrorCode::QueueTimeout,
            AdapterError::Timeout => ErrorCode::Timeout,
            AdapterError::StreamIdleTimeout => ErrorCode::StreamIdleTimeout,
            AdapterError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            AdapterError::Provider(_) => ErrorCode::ProviderError,
            AdapterError::Manifest(_) => ErrorCode::ManifestError,
            AdapterError::ToolExecution(_) => ErrorCode::ToolExecutionFailed,
            AdapterError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AdapterError::InvalidJson(_)
            | AdapterError::Validation(_) => StatusCode::BAD_REQUEST,
            AdapterError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AdapterError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AdapterError::BodyReadTimeout => StatusCode::REQUEST_TIMEOUT,
            AdapterError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AdapterError::ServerBusy | AdapterError::QueueTimeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AdapterError::Timeout | AdapterError::StreamIdleTimeout => StatusCode::GATEWAY_TIMEOUT,
            AdapterError::Provider(_) => StatusCode::BAD_GATEWAY,
            AdapterError::MalformedResponse(_)
            | AdapterError::Manifest(_)
            | AdapterError::ToolExecution(_)
            | AdapterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.to_string())
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorEnvelope {
                error: self.to_body(),
            }),
        )
            .into_response()
    }
}

impl From<RegistryError> for AdapterError {
    fn from(err: RegistryError) -> Self {
        AdapterError::Manifest(err.to_string())
    }
}

impl From<CompatError> for AdapterError {
    fn from(err: CompatError) -> Self {
        match err {
            CompatError::MalformedResponse(m) => AdapterError::MalformedResponse(m),
            other => AdapterError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AdapterError::InvalidJson("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AdapterError::PayloadTooLarge { max_bytes: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AdapterError::BodyReadTimeout.status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            AdapterError::ServerBusy.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AdapterError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            AdapterError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_code_mapping_is_closed_set() {
        assert_eq!(AdapterError::QueueTimeout.code(), ErrorCode::QueueTimeout);
        assert_eq!(
            AdapterError::StreamIdleTimeout.code(),
            ErrorCode::StreamIdleTimeout
        );
        assert_eq!(
            AdapterError::Manifest("m".into()).code(),
            ErrorCode::ManifestError
        );
    }

    #[test]
    fn test_registry_error_converts_to_manifest() {
        let err: AdapterError = RegistryError::missing("provider", "p").into();
        assert_eq!(err.code(), ErrorCode::ManifestError);
    }
}
