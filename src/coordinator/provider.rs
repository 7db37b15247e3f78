//! Provider invocation through compat modules.
//!
//! HTTP-shape compats build a payload the client posts itself; SDK-shape
//! compats own the whole exchange. Targets from `llmPriority` are tried
//! in order; the last failure surfaces when every target fails. All
//! traffic is mirrored to the LLM wire log with credentials redacted.

use std::collections::HashMap;
use std::sync::Arc;

use adapter_protocol::{LlmTarget, Response, Role};
use adapter_registry::{
    CompatKind, CompatModule, CompatStream, ProviderEntry, ProviderRequest, Registry,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AdapterError, AdapterResult};
use crate::logging::{redact_headers, WireLogger};

/// Buffered chunks between the SSE reader task and the aggregator.
const CHUNK_CHANNEL_SIZE: usize = 64;

#[derive(Clone)]
pub struct ProviderClient {
    registry: Arc<Registry>,
    http: reqwest::Client,
    llm_log: WireLogger,
}

impl ProviderClient {
    pub fn new(registry: Arc<Registry>, http: reqwest::Client, llm_log: WireLogger) -> Self {
        Self {
            registry,
            http,
            llm_log,
        }
    }

    /// Blocking call: targets in priority order, first success wins.
    pub async fn invoke(
        &self,
        targets: &[LlmTarget],
        request: &ProviderRequest,
    ) -> AdapterResult<Response> {
        let mut last_error = AdapterError::Provider("no provider targets".to_string());
        for target in targets {
            let mut request = request.clone();
            request.model = target.model.clone();
            request.stream = false;
            match self.invoke_target(target, &request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    self.llm_log.warn(
                        "Provider target failed",
                        json!({"provider": target.provider, "model": target.model, "error": error.to_string()}),
                    );
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    /// Streaming call: returns the chunk stream and the target that
    /// accepted it.
    pub async fn open_stream(
        &self,
        targets: &[LlmTarget],
        request: &ProviderRequest,
    ) -> AdapterResult<(CompatStream, LlmTarget)> {
        let mut last_error = AdapterError::Provider("no provider targets".to_string());
        for target in targets {
            let mut request = request.clone();
            request.model = target.model.clone();
            request.stream = true;
            match self.open_target_stream(target, &request).await {
                Ok(stream) => return Ok((stream, target.clone())),
                Err(error) => {
                    self.llm_log.warn(
                        "Provider stream target failed",
                        json!({"provider": target.provider, "model": target.model, "error": error.to_string()}),
                    );
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    async fn invoke_target(
        &self,
        target: &LlmTarget,
        request: &ProviderRequest,
    ) -> AdapterResult<Response> {
        let (entry, compat) = self.resolve(target)?;
        let response = match compat.kind() {
            CompatKind::Sdk => {
                self.log_request(target, &entry, None, None);
                compat.call_sdk(request).await?
            }
            CompatKind::Http => {
                let raw = self.exchange(target, &entry, &compat, request).await?;
                self.llm_log.debug(
                    "LLM raw response",
                    json!({"provider": target.provider, "raw": raw}),
                );
                compat.parse_response(&raw, &request.model)?
            }
        };
        validate_shape(&response)?;
        self.llm_log.info(
            "LLM response",
            json!({
                "provider": target.provider,
                "model": target.model,
                "finishReason": response.finish_reason,
                "usage": response.usage,
                "toolCalls": response.tool_calls.as_ref().map(Vec::len).unwrap_or(0),
            }),
        );
        Ok(response)
    }

    async fn open_target_stream(
        &self,
        target: &LlmTarget,
        request: &ProviderRequest,
    ) -> AdapterResult<CompatStream> {
        let (entry, compat) = self.resolve(target)?;
        if !compat.streaming_flags().supports_streaming {
            return Err(AdapterError::Provider(format!(
                "compat '{}' does not support streaming",
                compat.name()
            )));
        }
        match compat.kind() {
            CompatKind::Sdk => {
                self.log_request(target, &entry, None, None);
                Ok(compat.stream_sdk(request).await?)
            }
            CompatKind::Http => {
                let (payload, url, headers) = self.prepare(target, &entry, &compat, request)?;
                self.log_request(target, &entry, Some(&headers), Some(&payload));
                let response = self.post(&url, &headers, &payload).await?;
                Ok(spawn_sse_reader(response, compat))
            }
        }
    }

    fn resolve(
        &self,
        target: &LlmTarget,
    ) -> AdapterResult<(ProviderEntry, Arc<dyn CompatModule>)> {
        let entry = self.registry.get_provider(&target.provider)?;
        let compat = self.registry.get_compat_module(&entry.compat)?;
        Ok((entry, compat))
    }

    fn prepare(
        &self,
        target: &LlmTarget,
        entry: &ProviderEntry,
        compat: &Arc<dyn CompatModule>,
        request: &ProviderRequest,
    ) -> AdapterResult<(Value, String, HashMap<String, String>)> {
        let mut payload = compat.build_payload(request)?;
        compat.apply_provider_extensions(&mut payload, &entry.options);
        let url = entry.base_url.clone().ok_or_else(|| {
            AdapterError::Manifest(format!("provider '{}' has no baseUrl", target.provider))
        })?;
        Ok((payload, url, provider_headers(entry)))
    }

    async fn exchange(
        &self,
        target: &LlmTarget,
        entry: &ProviderEntry,
        compat: &Arc<dyn CompatModule>,
        request: &ProviderRequest,
    ) -> AdapterResult<Value> {
        let (payload, url, headers) = self.prepare(target, entry, compat, request)?;
        self.log_request(target, entry, Some(&headers), Some(&payload));
        let response = self.post(&url, &headers, &payload).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Provider(format!(
                "provider returned {status}: {body}"
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
    }

    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        payload: &Value,
    ) -> AdapterResult<reqwest::Response> {
        let mut builder = self.http.post(url).json(payload);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder
            .send()
            .await
            .map_err(|e| AdapterError::Provider(e.to_string()))
    }

    fn log_request(
        &self,
        target: &LlmTarget,
        entry: &ProviderEntry,
        headers: Option<&HashMap<String, String>>,
        payload: Option<&Value>,
    ) {
        let headers = headers
            .map(|h| Value::Object(redact_headers(h)))
            .unwrap_or(Value::Null);
        self.llm_log.info(
            "LLM request",
            json!({
                "provider": target.provider,
                "model": target.model,
                "compat": entry.compat,
                "headers": headers,
                "payload": payload,
            }),
        );
    }
}

/// Assemble auth and default headers for a provider entry. The API key
/// comes from the environment variable the manifest names.
fn provider_headers(entry: &ProviderEntry) -> HashMap<String, String> {
    let mut headers = entry.default_headers.clone();
    if let Some(env_name) = &entry.api_key_env {
        if let Ok(key) = std::env::var(env_name) {
            headers
                .entry("Authorization".to_string())
                .or_insert_with(|| format!("Bearer {key}"));
        }
    }
    headers
}

/// Shape guards on a parsed provider response.
pub fn validate_shape(response: &Response) -> AdapterResult<()> {
    if response.role != Role::Assistant {
        return Err(AdapterError::MalformedResponse(format!(
            "provider returned role '{}', expected 'assistant'",
            response.role.as_str()
        )));
    }
    Ok(())
}

/// Read an SSE byte stream, parse `data:` frames through the compat,
/// and hand chunks to the aggregator over a channel.
fn spawn_sse_reader(response: reqwest::Response, compat: Arc<dyn CompatModule>) -> CompatStream {
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_SIZE);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(next) = stream.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx
                        .send(Err(adapter_registry::CompatError::Provider(e.to_string())))
                        .await;
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(frame_end) = buffer.find("\n\n") {
                let frame: String = buffer.drain(..frame_end + 2).collect();
                for line in frame.lines() {
                    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                        continue;
                    };
                    match compat.parse_stream_chunk(data) {
                        Ok(Some(chunk)) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_headers_reads_env_key() {
        let entry: ProviderEntry = serde_json::from_value(json!({
            "id": "p",
            "compat": "c",
            "apiKeyEnv": "ADAPTER_TEST_KEY_VAR",
            "defaultHeaders": {"x-extra": "1"}
        }))
        .unwrap();
        std::env::set_var("ADAPTER_TEST_KEY_VAR", "sk-test");
        let headers = provider_headers(&entry);
        assert_eq!(headers["Authorization"], "Bearer sk-test");
        assert_eq!(headers["x-extra"], "1");
        std::env::remove_var("ADAPTER_TEST_KEY_VAR");
    }

    #[test]
    fn test_validate_shape_rejects_non_assistant() {
        let response = Response {
            provider: "p".to_string(),
            model: "m".to_string(),
            role: Role::User,
            content: vec![],
            tool_calls: None,
            reasoning: None,
            usage: None,
            finish_reason: None,
            raw: None,
        };
        let err = validate_shape(&response).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedResponse(_)));
    }
}
