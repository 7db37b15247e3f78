//! Route handlers.
//!
//! `/run` and `/stream` read the body themselves so size and stall
//! limits apply before any JSON work, and so the JSON-vs-SSE decision
//! for `/stream` is made before the first response byte.

use std::time::Duration;

use adapter_protocol::{CallSpec, ResponseEnvelope};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde_json::json;
use uuid::Uuid;

use super::admission::Admission;
use super::sse::{build_sse_response, SseStream};
use super::AppState;
use crate::coordinator::Coordinator;
use crate::error::AdapterError;

pub async fn health() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Ready iff the configured plugins path exists on disk.
pub async fn ready(State(state): State<AppState>) -> Response {
    if state.config.plugins_dir.exists() {
        Json(json!({"ok": true})).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"ok": false}))).into_response()
    }
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "not_found", "message": "Unknown path"}})))
        .into_response()
}

pub async fn run(State(state): State<AppState>, request: Request) -> Response {
    let spec = match read_spec(&state, request).await {
        Ok(spec) => spec,
        Err(error) => return error.into_response(),
    };

    let _guard = match state.run_gate.admit().await {
        Admission::Admitted(guard) => guard,
        Admission::Busy => return AdapterError::ServerBusy.into_response(),
        Admission::QueueTimeout => return AdapterError::QueueTimeout.into_response(),
    };

    let request_id = Uuid::new_v4().to_string();
    let coordinator = Coordinator::new(
        state.registry.clone(),
        state.http.clone(),
        request_id,
    );
    let deadline = Duration::from_millis(state.config.server.request_timeout_ms);
    let result = tokio::time::timeout(deadline, coordinator.run(spec)).await;
    coordinator.close().await;

    match result {
        Err(_elapsed) => AdapterError::Timeout.into_response(),
        Ok(Err(error)) => error.into_response(),
        Ok(Ok(response)) => Json(ResponseEnvelope { data: response }).into_response(),
    }
}

pub async fn stream(State(state): State<AppState>, request: Request) -> Response {
    let spec = match read_spec(&state, request).await {
        Ok(spec) => spec,
        Err(error) => return error.into_response(),
    };

    let guard = match state.stream_gate.admit().await {
        Admission::Admitted(guard) => guard,
        Admission::Busy => return AdapterError::ServerBusy.into_response(),
        Admission::QueueTimeout => return AdapterError::QueueTimeout.into_response(),
    };

    let request_id = Uuid::new_v4().to_string();
    let coordinator = Coordinator::new(
        state.registry.clone(),
        state.http.clone(),
        request_id,
    );

    // Setup failures surface as plain JSON; once the event stream
    // exists, everything is SSE.
    match coordinator.run_stream(spec).await {
        Err(error) => {
            coordinator.close().await;
            error.into_response()
        }
        Ok(events) => {
            let sse = SseStream::new(
                events,
                Some(guard),
                Duration::from_millis(state.config.server.stream_idle_timeout_ms),
                Duration::from_millis(state.config.server.request_timeout_ms),
            );
            build_sse_response(Body::from_stream(sse))
        }
    }
}

/// Content-type check, bounded body read, JSON parse, shape validation.
async fn read_spec(state: &AppState, request: Request) -> Result<CallSpec, AdapterError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    if let Some(content_type) = &content_type {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if media_type != "application/json" {
            return Err(AdapterError::UnsupportedMediaType(media_type));
        }
    }

    let max_bytes = state.config.server.max_request_bytes;
    if let Some(length) = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > max_bytes {
            return Err(AdapterError::PayloadTooLarge { max_bytes });
        }
    }

    let body = read_body(
        request.into_body(),
        max_bytes,
        Duration::from_millis(state.config.server.body_read_timeout_ms),
    )
    .await?;

    // Syntax first (invalid_json), then shape (validation_error).
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AdapterError::InvalidJson(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| AdapterError::Validation(e.to_string()))
}

/// Read the body with the size cap and the stall timeout applied.
async fn read_body(
    body: Body,
    max_bytes: usize,
    read_timeout: Duration,
) -> Result<Vec<u8>, AdapterError> {
    let mut stream = body.into_data_stream();
    let mut collected: Vec<u8> = Vec::new();
    loop {
        let next = tokio::time::timeout(read_timeout, stream.next())
            .await
            .map_err(|_| AdapterError::BodyReadTimeout)?;
        match next {
            Some(Ok(chunk)) => {
                if collected.len() + chunk.len() > max_bytes {
                    return Err(AdapterError::PayloadTooLarge { max_bytes });
                }
                collected.extend_from_slice(&chunk);
            }
            Some(Err(e)) => {
                return Err(AdapterError::InvalidJson(format!("body read failed: {e}")));
            }
            None => return Ok(collected),
        }
    }
}
