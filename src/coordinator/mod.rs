//! Per-request execution.
//!
//! A `Coordinator` owns one call spec end to end: tool resolution,
//! optional context injection, the provider call, the tool-execution
//! loop with its budget, and (for `/stream`) the streaming aggregator.

pub mod budget;
pub mod provider;
pub mod streaming;
pub mod tool_router;
pub mod tools;

use std::sync::Arc;

use adapter_protocol::{CallSpec, ContentPart, Message, Response, Role, StreamEvent, ToolCall};
use adapter_registry::{ProviderRequest, Registry};
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::context::ContextInjector;
use crate::error::{AdapterError, AdapterResult};
use crate::logging::{self, Correlation, WireLogger};
use budget::ToolCallBudget;
use provider::ProviderClient;
use streaming::StreamDriver;
use tool_router::ToolRouter;
use tools::{collect_tools, ToolSetup};

/// Events buffered between the stream driver and the SSE encoder.
const EVENT_CHANNEL_SIZE: usize = 128;

pub struct Coordinator {
    registry: Arc<Registry>,
    provider: ProviderClient,
    logger: WireLogger,
    request_id: String,
    router: tokio::sync::Mutex<Option<Arc<ToolRouter>>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<Registry>,
        http: reqwest::Client,
        request_id: impl Into<String>,
    ) -> Self {
        let request_id = request_id.into();
        let llm_log = logging::llm_logger().with_correlation(request_id.as_str());
        Self {
            provider: ProviderClient::new(Arc::clone(&registry), http, llm_log),
            registry,
            logger: logging::adapter_logger().with_correlation(request_id.as_str()),
            request_id,
            router: tokio::sync::Mutex::new(None),
        }
    }

    /// Correlation for this request: the request id, plus the batch id
    /// when the spec carries one.
    fn correlation(&self, spec: &CallSpec) -> Correlation {
        match &spec.runtime.batch_id {
            Some(batch) => Correlation::Many(vec![self.request_id.clone(), batch.clone()]),
            None => Correlation::One(self.request_id.clone()),
        }
    }

    /// Execute the spec to a single response.
    pub async fn run(&self, spec: CallSpec) -> AdapterResult<Response> {
        let (mut messages, setup, spec) = self.prepare(spec).await?;
        let logger = self.logger.with_correlation(self.correlation(&spec));
        let ToolSetup {
            specs: tool_specs,
            name_map,
            router,
        } = setup;
        let router = Arc::new(router);
        *self.router.lock().await = Some(Arc::clone(&router));

        let mut budget = ToolCallBudget::new(spec.runtime.max_tool_iterations);
        // One round of budget-error feedback; a model that keeps
        // requesting tools after seeing it gets its response returned
        // as-is.
        let mut budget_feedback_rounds = 0u32;

        loop {
            let request = self.request(&spec, &tool_specs, messages.clone(), false);
            let response = self.provider.invoke(&spec.llm_priority, &request).await?;
            if !response.has_tool_calls() {
                return Ok(response);
            }
            if budget.is_exhausted() && budget_feedback_rounds > 0 {
                return Ok(response);
            }

            messages.push(response.to_message());
            let calls = response.tool_calls.clone().unwrap_or_default();
            for call in &calls {
                if budget.remaining() == 0 {
                    logger.warn(
                        "Tool budget exhausted; skipping invocation",
                        json!({"tool": call.name, "initial": budget.initial()}),
                    );
                    messages.push(budget_exhausted_message(call, &name_map));
                    budget_feedback_rounds += 1;
                    break;
                }
                if !budget.consume() {
                    logger.warn(
                        "Tool budget refused consumption; skipping invocation",
                        json!({"tool": call.name, "initial": budget.initial()}),
                    );
                    messages.push(budget_exhausted_message(call, &name_map));
                    budget_feedback_rounds += 1;
                    break;
                }
                let original = name_map.resolve_or_fallback(&call.name);
                match router.execute(&original, call.arguments.clone()).await {
                    Ok(value) => {
                        messages.push(Message::tool_reply(call.id.as_str(), stringify_result(value)));
                    }
                    Err(error) => {
                        logger.warn(
                            "Tool execution failed",
                            json!({"tool": original, "error": error.to_string()}),
                        );
                        messages.push(tool_failure_message(call, &original, &error.to_string()));
                    }
                }
            }

            if spec.runtime.tool_countdown_enabled {
                append_countdown(&mut messages, budget.used(), budget.initial());
            }

            if spec.runtime.tool_final_prompt_enabled && budget.is_exhausted() {
                messages.push(Message::text(
                    Role::System,
                    "No further tool calls are available. Respond with your final answer using the tool results above.",
                ));
                let request = self.request(&spec, &tool_specs, messages.clone(), false);
                // Returned regardless of any tool calls it may carry.
                return self.provider.invoke(&spec.llm_priority, &request).await;
            }
        }
    }

    /// Execute the spec as a normalized event stream.
    ///
    /// Setup failures (validation, tool resolution, the initial
    /// provider connection) surface here, before the first response
    /// byte; everything later arrives as stream events.
    pub async fn run_stream(
        &self,
        spec: CallSpec,
    ) -> AdapterResult<ReceiverStream<StreamEvent>> {
        let (messages, setup, spec) = self.prepare(spec).await?;
        let logger = self.logger.with_correlation(self.correlation(&spec));
        let ToolSetup {
            specs: tool_specs,
            name_map,
            router,
        } = setup;
        let router = Arc::new(router);
        *self.router.lock().await = Some(Arc::clone(&router));

        let request = self.request(&spec, &tool_specs, messages.clone(), true);
        let (first_stream, target) = self.provider.open_stream(&spec.llm_priority, &request).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(EVENT_CHANNEL_SIZE);
        let driver = StreamDriver::new(
            self.provider.clone(),
            router,
            name_map,
            tool_specs,
            spec,
            messages,
            logger,
        );
        tokio::spawn(driver.drive(first_stream, target, tx));
        Ok(ReceiverStream::new(rx))
    }

    /// Release pooled resources (tool router, MCP connections).
    /// Idempotent.
    pub async fn close(&self) {
        if let Some(router) = self.router.lock().await.take() {
            router.close().await;
        }
    }

    /// Shared head of `run` and `run_stream`: validation, tool
    /// collection, context injection.
    async fn prepare(
        &self,
        mut spec: CallSpec,
    ) -> AdapterResult<(Vec<Message>, ToolSetup, CallSpec)> {
        if spec.llm_priority.is_empty() {
            return Err(AdapterError::Validation(
                "llmPriority must not be empty".to_string(),
            ));
        }
        let logger = self.logger.with_correlation(self.correlation(&spec));
        let setup = collect_tools(&self.registry, &spec, &logger).await?;

        if let Some(config) = spec.vector_context.clone().filter(|c| c.wants_injection()) {
            let injector = ContextInjector::new(
                Arc::clone(&self.registry),
                logging::vector_logger().with_correlation(self.correlation(&spec)),
            );
            let outcome = injector.apply(&mut spec.messages, &config).await;
            logger.debug(
                "Vector context injection",
                json!({"resultsInjected": outcome.results_injected}),
            );
        }

        let messages = spec.messages.clone();
        Ok((messages, setup, spec))
    }

    fn request(
        &self,
        spec: &CallSpec,
        tools: &[adapter_protocol::ToolSpec],
        messages: Vec<Message>,
        stream: bool,
    ) -> ProviderRequest {
        ProviderRequest {
            // The per-target model is substituted by the provider
            // client.
            model: String::new(),
            settings: spec.settings.clone(),
            messages,
            tools: tools.to_vec(),
            tool_choice: None,
            stream,
        }
    }
}

// ============================================================================
// Tool-loop message helpers
// ============================================================================

/// Raw strings pass through; everything else is JSON-stringified.
pub(crate) fn stringify_result(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub(crate) fn budget_exhausted_message(
    call: &ToolCall,
    name_map: &adapter_protocol::ToolNameMap,
) -> Message {
    let original = name_map.resolve_or_fallback(&call.name);
    Message {
        tool_call_id: Some(call.id.clone()),
        ..Message::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                tool_name: original,
                result: json!({"error": "tool_call_budget_exhausted"}),
            }],
        )
    }
}

pub(crate) fn tool_failure_message(call: &ToolCall, original: &str, detail: &str) -> Message {
    Message {
        tool_call_id: Some(call.id.clone()),
        ..Message::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                tool_name: original.to_string(),
                result: json!({"error": "tool_execution_failed", "detail": detail}),
            }],
        )
    }
}

/// Record the budget state on the last assistant message so the model
/// sees how much it has spent.
pub(crate) fn append_countdown(messages: &mut [Message], used: u32, initial: u32) {
    if let Some(assistant) = messages
        .iter_mut()
        .rev()
        .find(|m| m.role == Role::Assistant)
    {
        assistant
            .content
            .push(ContentPart::text(format!("Tool calls used {used} of {initial}")));
    }
}
