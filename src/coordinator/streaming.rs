//! The streaming aggregator.
//!
//! Converts the provider's chunk stream into normalized events and
//! drives the tool loop without breaking the event sequence: consume
//! chunks until the provider signals `finished_with_tool_calls`, freeze
//! the buffered tool calls, execute them, open a follow-up provider
//! stream with the extended history, and keep yielding. Ordering per
//! tool call is `start` before every `arguments_delta` before `end`.
//!
//! The driver runs in a spawned task feeding an `mpsc` channel; a
//! dropped receiver (client disconnect) stops it at the next send.

use std::collections::HashMap;
use std::sync::Arc;

use adapter_protocol::{
    CallSpec, ContentPart, ErrorBody, ErrorCode, FinishReason, LlmTarget, Message, Response, Role,
    StreamEvent, ToolCall, ToolCallEvent, ToolNameMap, ToolSpec, Usage,
};
use adapter_registry::{CompatStream, ProviderRequest};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::budget::ToolCallBudget;
use super::provider::ProviderClient;
use super::tool_router::ToolRouter;
use super::{append_countdown, budget_exhausted_message, stringify_result, tool_failure_message};
use crate::logging::WireLogger;

// ============================================================================
// Per-stream tool-call state
// ============================================================================

#[derive(Default)]
struct ToolState {
    name: String,
    buffer: String,
    metadata: Option<Map<String, Value>>,
    final_arguments: Option<Value>,
}

/// Buffers tool-call events keyed by normalized call id, preserving
/// arrival order. Deltas without an id default to `"0"`, starts to the
/// empty string.
struct ToolStateSet {
    order: Vec<String>,
    states: HashMap<String, ToolState>,
}

impl ToolStateSet {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            states: HashMap::new(),
        }
    }

    fn entry(&mut self, key: String) -> &mut ToolState {
        if !self.states.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.states.entry(key).or_default()
    }

    fn apply(&mut self, event: &ToolCallEvent) {
        match event {
            ToolCallEvent::ToolCallStart {
                call_id,
                name,
                metadata,
            } => {
                let state = self.entry(call_id.clone());
                state.name = name.clone();
                state.metadata = metadata.clone();
            }
            ToolCallEvent::ToolCallArgumentsDelta {
                call_id,
                arguments_delta,
            } => {
                let key = if call_id.is_empty() {
                    "0".to_string()
                } else {
                    call_id.clone()
                };
                self.entry(key).buffer.push_str(arguments_delta);
            }
            ToolCallEvent::ToolCallEnd {
                call_id,
                name,
                arguments,
            } => {
                let key = if call_id.is_empty() {
                    "0".to_string()
                } else {
                    call_id.clone()
                };
                let state = self.entry(key);
                if !name.is_empty() {
                    state.name = name.clone();
                }
                state.final_arguments = Some(arguments.clone());
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Turn buffered state into concrete tool calls, in arrival order.
    fn freeze(self) -> Vec<ToolCall> {
        let mut states = self.states;
        self.order
            .into_iter()
            .filter_map(|key| states.remove(&key).map(|state| (key, state)))
            .map(|(key, state)| {
                let arguments = state.final_arguments.unwrap_or_else(|| {
                    if state.buffer.is_empty() {
                        Value::Object(Map::new())
                    } else {
                        serde_json::from_str(&state.buffer)
                            .unwrap_or(Value::String(state.buffer))
                    }
                });
                ToolCall {
                    id: key,
                    name: state.name,
                    arguments,
                    metadata: state.metadata,
                }
            })
            .collect()
    }
}

// ============================================================================
// Stream driver
// ============================================================================

pub(crate) struct StreamDriver {
    provider: ProviderClient,
    router: Arc<ToolRouter>,
    name_map: ToolNameMap,
    tools: Vec<ToolSpec>,
    spec: CallSpec,
    messages: Vec<Message>,
    logger: WireLogger,
}

impl StreamDriver {
    pub(crate) fn new(
        provider: ProviderClient,
        router: Arc<ToolRouter>,
        name_map: ToolNameMap,
        tools: Vec<ToolSpec>,
        spec: CallSpec,
        messages: Vec<Message>,
        logger: WireLogger,
    ) -> Self {
        Self {
            provider,
            router,
            name_map,
            tools,
            spec,
            messages,
            logger,
        }
    }

    fn request(&self) -> ProviderRequest {
        ProviderRequest {
            model: String::new(),
            settings: self.spec.settings.clone(),
            messages: self.messages.clone(),
            tools: self.tools.clone(),
            tool_choice: None,
            stream: true,
        }
    }

    /// Run the stream to completion, then release the tool router's
    /// pooled resources whichever way it ended.
    pub(crate) async fn drive(
        self,
        stream: CompatStream,
        target: LlmTarget,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let router = Arc::clone(&self.router);
        self.drive_inner(stream, target, tx).await;
        router.close().await;
    }

    async fn drive_inner(
        mut self,
        mut stream: CompatStream,
        mut target: LlmTarget,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let mut text_acc = String::new();
        let mut reasoning_acc = String::new();
        let mut all_tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = Usage::default();
        let mut saw_usage = false;
        let mut budget = ToolCallBudget::new(self.spec.runtime.max_tool_iterations);
        let mut budget_feedback_rounds = 0u32;

        loop {
            let mut states = ToolStateSet::new();
            let mut segment_text = String::new();
            let mut finished_with_tools = false;

            while let Some(item) = stream.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        let _ = tx
                            .send(StreamEvent::Error {
                                error: ErrorBody::new(ErrorCode::Internal, error.to_string()),
                            })
                            .await;
                        return;
                    }
                };

                if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                    if tx
                        .send(StreamEvent::Delta {
                            content: text.clone(),
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    segment_text.push_str(&text);
                    text_acc.push_str(&text);
                }
                for event in chunk.tool_events.unwrap_or_default() {
                    states.apply(&event);
                    if tx
                        .send(StreamEvent::Tool { tool_event: event })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                if let Some(reasoning) = chunk.reasoning.filter(|r| !r.is_empty()) {
                    if tx
                        .send(StreamEvent::Reasoning {
                            text: reasoning.clone(),
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    reasoning_acc.push_str(&reasoning);
                }
                if let Some(chunk_usage) = chunk.usage {
                    usage.accumulate(&chunk_usage);
                    saw_usage = true;
                }
                if chunk.finished_with_tool_calls {
                    finished_with_tools = true;
                    break;
                }
            }

            if !finished_with_tools || states.is_empty() {
                let response = assemble_response(
                    &target,
                    text_acc,
                    reasoning_acc,
                    all_tool_calls,
                    saw_usage.then_some(usage),
                );
                let _ = tx.send(StreamEvent::Done { response }).await;
                return;
            }

            let calls = states.freeze();
            if budget.is_exhausted() && budget_feedback_rounds > 0 {
                // The model keeps requesting tools with no budget left;
                // end the stream with what we have.
                all_tool_calls.extend(calls);
                let response = assemble_response(
                    &target,
                    text_acc,
                    reasoning_acc,
                    all_tool_calls,
                    saw_usage.then_some(usage),
                );
                let _ = tx.send(StreamEvent::Done { response }).await;
                return;
            }

            self.messages.push(assistant_turn(&segment_text, &calls));
            for call in &calls {
                if budget.remaining() == 0 {
                    self.logger.warn(
                        "Tool budget exhausted; skipping invocation",
                        json!({"tool": call.name}),
                    );
                    self.messages
                        .push(budget_exhausted_message(call, &self.name_map));
                    budget_feedback_rounds += 1;
                    break;
                }
                if !budget.consume() {
                    self.logger.warn(
                        "Tool budget refused consumption; skipping invocation",
                        json!({"tool": call.name}),
                    );
                    self.messages
                        .push(budget_exhausted_message(call, &self.name_map));
                    budget_feedback_rounds += 1;
                    break;
                }
                let original = self.name_map.resolve_or_fallback(&call.name);
                match self.router.execute(&original, call.arguments.clone()).await {
                    Ok(value) => {
                        self.messages
                            .push(Message::tool_reply(call.id.as_str(), stringify_result(value)));
                    }
                    Err(error) => {
                        self.logger.warn(
                            "Tool execution failed",
                            json!({"tool": original, "error": error.to_string()}),
                        );
                        self.messages
                            .push(tool_failure_message(call, &original, &error.to_string()));
                    }
                }
            }
            all_tool_calls.extend(calls);

            if self.spec.runtime.tool_countdown_enabled {
                append_countdown(&mut self.messages, budget.used(), budget.initial());
            }

            // Follow-up provider stream with the extended history. Open
            // failures terminate the event sequence with an error.
            match self
                .provider
                .open_stream(&self.spec.llm_priority, &self.request())
                .await
            {
                Ok((next_stream, next_target)) => {
                    stream = next_stream;
                    target = next_target;
                }
                Err(error) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: error.to_body(),
                        })
                        .await;
                    return;
                }
            }
        }
    }
}

fn assistant_turn(segment_text: &str, calls: &[ToolCall]) -> Message {
    let content = if segment_text.is_empty() {
        Vec::new()
    } else {
        vec![ContentPart::text(segment_text)]
    };
    Message {
        tool_calls: Some(calls.to_vec()),
        ..Message::new(Role::Assistant, content)
    }
}

fn assemble_response(
    target: &LlmTarget,
    text: String,
    reasoning: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<Usage>,
) -> Response {
    Response {
        provider: target.provider.clone(),
        model: target.model.clone(),
        role: Role::Assistant,
        content: if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::text(text)]
        },
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
        usage,
        finish_reason: Some(FinishReason::Stop),
        raw: None,
    }
}
