//! Shared fixtures: a scripted compat module, canned responses, and a
//! registry/app harness.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use adapter::config::AdapterConfig;
use adapter::server::{build_router, AppState};
use adapter_protocol::{
    ContentPart, FinishReason, ParsedChunk, Response, Role, ToolCall, ToolSpec,
};
use adapter_registry::{
    CompatKind, CompatModule, CompatResult, CompatStream, ProviderRequest, Registry, ToolError,
    ToolExecutor,
};
use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Notify;

// ============================================================================
// Scripted compat module
// ============================================================================

pub enum ScriptedCall {
    Respond(Response),
    Fail(String),
    /// Wait for the notify, then respond. Used to hold a slot open.
    WaitThenRespond(Arc<Notify>, Response),
}

#[derive(Default)]
pub struct MockCompat {
    calls: Mutex<VecDeque<ScriptedCall>>,
    streams: Mutex<VecDeque<CompatStream>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl MockCompat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_call(&self, call: ScriptedCall) {
        self.calls.lock().unwrap().push_back(call);
    }

    pub fn push_response(&self, response: Response) {
        self.push_call(ScriptedCall::Respond(response));
    }

    pub fn push_stream(&self, stream: CompatStream) {
        self.streams.lock().unwrap().push_back(stream);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CompatModule for MockCompat {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> CompatKind {
        CompatKind::Sdk
    }

    async fn call_sdk(&self, request: &ProviderRequest) -> CompatResult<Response> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.calls.lock().unwrap().pop_front();
        match next {
            Some(ScriptedCall::Respond(response)) => Ok(response),
            Some(ScriptedCall::Fail(message)) => {
                Err(adapter_registry::CompatError::Provider(message))
            }
            Some(ScriptedCall::WaitThenRespond(notify, response)) => {
                notify.notified().await;
                Ok(response)
            }
            None => Err(adapter_registry::CompatError::Provider(
                "no scripted call".to_string(),
            )),
        }
    }

    async fn stream_sdk(&self, request: &ProviderRequest) -> CompatResult<CompatStream> {
        self.requests.lock().unwrap().push(request.clone());
        self.streams.lock().unwrap().pop_front().ok_or_else(|| {
            adapter_registry::CompatError::Provider("no scripted stream".to_string())
        })
    }
}

// ============================================================================
// Canned responses and chunks
// ============================================================================

pub fn text_response(text: &str) -> Response {
    Response {
        provider: "p".to_string(),
        model: "m".to_string(),
        role: Role::Assistant,
        content: vec![ContentPart::text(text)],
        tool_calls: None,
        reasoning: None,
        usage: None,
        finish_reason: Some(FinishReason::Stop),
        raw: None,
    }
}

pub fn tool_call_response(calls: Vec<ToolCall>) -> Response {
    Response {
        tool_calls: Some(calls),
        finish_reason: Some(FinishReason::ToolCalls),
        ..text_response("")
    }
}

pub fn delta_chunk(text: &str) -> CompatResult<ParsedChunk> {
    Ok(ParsedChunk::text(text))
}

pub fn iter_stream(items: Vec<CompatResult<ParsedChunk>>) -> CompatStream {
    Box::pin(futures::stream::iter(items))
}

// ============================================================================
// Counting tool executor
// ============================================================================

pub struct CountingTool {
    name: String,
    result: Value,
    pub invocations: std::sync::atomic::AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &str, result: Value) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result,
            invocations: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.invocations.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolExecutor for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(&self.name, "test tool", json!({"type": "object"}))
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        self.invocations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub registry: Arc<Registry>,
    pub compat: Arc<MockCompat>,
}

/// Registry over a temp plugins dir declaring provider `p` bound to the
/// scripted `mock` compat.
pub fn harness() -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("provider.yaml"),
        "providers:\n  - id: p\n    compat: mock\n",
    )
    .unwrap();
    let registry = Arc::new(Registry::new(dir.path()));
    let compat = MockCompat::new();
    registry.register_compat_module(compat.clone());
    TestHarness {
        dir,
        registry,
        compat,
    }
}

pub fn app(mut config: AdapterConfig, harness: &TestHarness) -> Router {
    config.plugins_dir = harness.dir.path().to_path_buf();
    build_router(AppState::new(config, Arc::clone(&harness.registry)))
}

pub fn basic_spec() -> Value {
    json!({
        "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
        "llmPriority": [{"provider": "p", "model": "m"}],
        "settings": {}
    })
}
