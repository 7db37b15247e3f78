//! Pre-call vector-context injection.
//!
//! When `vector_context.mode` is `auto` or `both`, the message list is
//! rewritten before the provider call: a retrieval query is derived
//! from the conversation, embedded, matched against the configured
//! stores in priority order, and the formatted passages are injected as
//! a system addendum or a user-context message.
//!
//! Failure policy: any retrieval or embedding error leaves the messages
//! unchanged and reports zero injected results. The injector never
//! propagates an error to its caller.

use std::sync::Arc;

use adapter_protocol::{
    ContentPart, IncludeSystemPrompt, InjectAs, Message, Role, VectorContextConfig,
};
use adapter_registry::{Registry, VectorMatch, VectorQueryOptions};
use serde_json::json;

use super::{interpolate, lookup_path, render_value, resolve_embedder};
use crate::logging::WireLogger;

const DEFAULT_RESULT_FORMAT: &str = "- {{id}} (score {{score}}): {{payload}}";
const DEFAULT_INJECT_TEMPLATE: &str =
    "Relevant context retrieved for this conversation:\n{{results}}";

/// What the injector did to the message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionOutcome {
    pub results_injected: usize,
}

pub struct ContextInjector {
    registry: Arc<Registry>,
    logger: WireLogger,
}

impl ContextInjector {
    pub fn new(registry: Arc<Registry>, logger: WireLogger) -> Self {
        Self { registry, logger }
    }

    /// Rewrite `messages` per the config. Infallible by contract.
    pub async fn apply(
        &self,
        messages: &mut Vec<Message>,
        config: &VectorContextConfig,
    ) -> InjectionOutcome {
        let none = InjectionOutcome {
            results_injected: 0,
        };

        let Some(query) = build_query(messages, config) else {
            self.logger
                .debug("Context injection skipped: empty query", json!({}));
            return none;
        };

        let results = match self.retrieve(&query, config).await {
            Ok(results) => results,
            Err(message) => {
                self.logger.warn(
                    "Context retrieval failed; messages unchanged",
                    json!({"error": message}),
                );
                return none;
            }
        };
        if results.is_empty() {
            self.logger
                .debug("Context retrieval returned no results", json!({"query": query}));
            return none;
        }

        let block = format_results(&results, config);
        inject(messages, config.inject_as, &block);
        self.logger.debug(
            "Context injected",
            json!({"results": results.len(), "injectAs": format!("{:?}", config.inject_as)}),
        );
        InjectionOutcome {
            results_injected: results.len(),
        }
    }

    async fn retrieve(
        &self,
        query: &str,
        config: &VectorContextConfig,
    ) -> Result<Vec<VectorMatch>, String> {
        let embedder = resolve_embedder(&self.registry, config.embedding_priority.as_deref())?;
        let vector = embedder.embed(query).await.map_err(|e| e.to_string())?;

        let top_k = config.top_k.unwrap_or(5);
        let options = VectorQueryOptions {
            filter: config.filter.clone(),
            include_payload: true,
            include_vector: false,
        };

        let mut last_error: Option<String> = None;
        for store_id in &config.stores {
            let store = match self.registry.get_vector_store(store_id) {
                Ok(store) => store,
                Err(e) => {
                    last_error = Some(e.to_string());
                    continue;
                }
            };
            let collection = config
                .collection
                .clone()
                .or_else(|| store.default_collection().map(String::from))
                .unwrap_or_else(|| "default".to_string());
            match store.query(&collection, &vector, top_k, &options).await {
                Ok(mut results) => {
                    if let Some(threshold) = config.score_threshold {
                        results.retain(|m| m.score >= threshold);
                    }
                    // First store with any surviving result wins.
                    if !results.is_empty() {
                        return Ok(results);
                    }
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        if let Some(error) = last_error {
            self.logger
                .debug("Stores failed during retrieval", json!({"error": error}));
        }
        Ok(Vec::new())
    }
}

/// Derive the retrieval query from the conversation.
fn build_query(messages: &[Message], config: &VectorContextConfig) -> Option<String> {
    if let Some(query) = config
        .override_embedding_query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
    {
        return Some(query.to_string());
    }

    let qc = &config.query_construction;
    let system_prompt: Option<String> = messages
        .first()
        .filter(|m| m.role == Role::System)
        .map(Message::joined_text)
        .filter(|t| !t.trim().is_empty());
    let conversation: Vec<&Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();

    let window_start = if qc.messages_to_include == 0 {
        0
    } else {
        conversation.len().saturating_sub(qc.messages_to_include)
    };
    let mut parts: Vec<String> = conversation[window_start..]
        .iter()
        .filter(|m| qc.include_assistant_messages || m.role != Role::Assistant)
        .map(|m| m.joined_text())
        .filter(|t| !t.trim().is_empty())
        .collect();

    let include_system = match qc.include_system_prompt {
        IncludeSystemPrompt::Always => true,
        IncludeSystemPrompt::Never => false,
        IncludeSystemPrompt::IfInRange => {
            qc.messages_to_include == 0 || messages.len() <= qc.messages_to_include
        }
    };
    if include_system {
        if let Some(system) = system_prompt {
            parts.insert(0, system);
        }
    }

    let query = parts.join("\n");
    if query.trim().is_empty() {
        None
    } else {
        Some(query)
    }
}

/// Render retrieved matches through the per-result and block templates.
fn format_results(results: &[VectorMatch], config: &VectorContextConfig) -> String {
    let result_format = config
        .result_format
        .as_deref()
        .unwrap_or(DEFAULT_RESULT_FORMAT);
    let lines: Vec<String> = results
        .iter()
        .map(|m| {
            interpolate(result_format, |key| match key {
                "id" => Some(m.id.clone()),
                "score" => Some(format_score(m.score)),
                "payload" => Some(render_value(&m.payload)),
                other => other
                    .strip_prefix("payload.")
                    .map(|path| {
                        lookup_path(&m.payload, path)
                            .map(render_value)
                            .unwrap_or_default()
                    }),
            })
        })
        .collect();
    let block = lines.join("\n");

    let template = config
        .inject_template
        .as_deref()
        .unwrap_or(DEFAULT_INJECT_TEMPLATE);
    interpolate(template, |key| match key {
        "results" => Some(block.clone()),
        _ => None,
    })
}

fn format_score(score: f64) -> String {
    let formatted = format!("{score:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Splice the formatted block into the message list.
fn inject(messages: &mut Vec<Message>, inject_as: InjectAs, block: &str) {
    match inject_as {
        InjectAs::System => {
            if let Some(first) = messages.first_mut().filter(|m| m.role == Role::System) {
                first.content.push(ContentPart::text(format!("\n\n{block}")));
            } else {
                messages.insert(0, Message::text(Role::System, block));
            }
        }
        InjectAs::UserContext => {
            let last_user = messages.iter().rposition(|m| m.role == Role::User);
            let message = Message::text(Role::User, block);
            match last_user {
                Some(index) => messages.insert(index, message),
                None => messages.push(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_registry::{EmbeddingProvider, Registry, ToolError, VectorStore};
    use async_trait::async_trait;
    use serde_json::json;

    fn config(value: serde_json::Value) -> VectorContextConfig {
        serde_json::from_value(value).unwrap()
    }

    fn msg(role: Role, text: &str) -> Message {
        Message::text(role, text)
    }

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn id(&self) -> &str {
            "e1"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ToolError> {
            if self.fail {
                Err(ToolError::Execution("embedding backend down".to_string()))
            } else {
                Ok(vec![0.1, 0.2, 0.3])
            }
        }
    }

    struct FixedStore {
        id: &'static str,
        results: Vec<VectorMatch>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        fn id(&self) -> &str {
            self.id
        }

        fn default_collection(&self) -> Option<&str> {
            Some("kb")
        }

        async fn query(
            &self,
            _collection: &str,
            _vector: &[f32],
            _top_k: u32,
            _options: &adapter_registry::VectorQueryOptions,
        ) -> Result<Vec<VectorMatch>, ToolError> {
            Ok(self.results.clone())
        }
    }

    fn matches(scores: &[f64]) -> Vec<VectorMatch> {
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| VectorMatch {
                id: format!("r{i}"),
                score: *score,
                payload: json!({"text": format!("passage {i}")}),
                vector: None,
            })
            .collect()
    }

    fn registry_with(
        embedder_fails: bool,
        stores: Vec<(&'static str, Vec<VectorMatch>)>,
    ) -> std::sync::Arc<Registry> {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path());
        registry.load_all();
        registry.register_embedding_provider(std::sync::Arc::new(FixedEmbedder {
            fail: embedder_fails,
        }));
        for (id, results) in stores {
            registry.register_vector_store(std::sync::Arc::new(FixedStore { id, results }));
        }
        std::sync::Arc::new(registry)
    }

    fn injector(registry: std::sync::Arc<Registry>) -> ContextInjector {
        ContextInjector::new(registry, crate::logging::vector_logger())
    }

    #[tokio::test]
    async fn test_apply_injects_into_system() {
        let registry = registry_with(false, vec![("s1", matches(&[0.9, 0.8]))]);
        let mut messages = vec![msg(Role::User, "what is rust")];
        let outcome = injector(registry)
            .apply(&mut messages, &config(json!({"stores": ["s1"]})))
            .await;
        assert_eq!(outcome.results_injected, 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].joined_text().contains("passage 0"));
    }

    #[tokio::test]
    async fn test_apply_threshold_filters_everything() {
        let registry = registry_with(false, vec![("s1", matches(&[0.5]))]);
        let mut messages = vec![msg(Role::User, "q")];
        let before = messages.clone();
        let outcome = injector(registry)
            .apply(
                &mut messages,
                &config(json!({"stores": ["s1"], "scoreThreshold": 0.8})),
            )
            .await;
        assert_eq!(outcome.results_injected, 0);
        assert_eq!(messages, before);
    }

    #[tokio::test]
    async fn test_apply_embedding_failure_leaves_messages_unchanged() {
        let registry = registry_with(true, vec![("s1", matches(&[0.9]))]);
        let mut messages = vec![msg(Role::User, "q")];
        let before = messages.clone();
        let outcome = injector(registry)
            .apply(&mut messages, &config(json!({"stores": ["s1"]})))
            .await;
        assert_eq!(outcome.results_injected, 0);
        assert_eq!(messages, before);
    }

    #[tokio::test]
    async fn test_apply_store_priority_short_circuits() {
        let registry = registry_with(
            false,
            vec![("empty", vec![]), ("full", matches(&[0.95]))],
        );
        let mut messages = vec![msg(Role::User, "q")];
        let outcome = injector(registry)
            .apply(
                &mut messages,
                &config(json!({"stores": ["empty", "full"], "injectAs": "user_context"})),
            )
            .await;
        assert_eq!(outcome.results_injected, 1);
        // Injected as a user message before the latest user message.
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].joined_text().contains("passage 0"));
        assert_eq!(messages[1].joined_text(), "q");
    }

    #[tokio::test]
    async fn test_apply_missing_store_reports_zero() {
        let registry = registry_with(false, vec![]);
        let mut messages = vec![msg(Role::User, "q")];
        let before = messages.clone();
        let outcome = injector(registry)
            .apply(&mut messages, &config(json!({"stores": ["ghost"]})))
            .await;
        assert_eq!(outcome.results_injected, 0);
        assert_eq!(messages, before);
    }

    #[test]
    fn test_query_override_wins() {
        let cfg = config(json!({"stores": ["s"], "overrideEmbeddingQuery": "  exact query "}));
        let messages = vec![msg(Role::User, "ignored")];
        assert_eq!(build_query(&messages, &cfg).as_deref(), Some("exact query"));
    }

    #[test]
    fn test_query_window_and_assistant_filter() {
        let cfg = config(json!({
            "stores": ["s"],
            "queryConstruction": {
                "messagesToInclude": 2,
                "includeAssistantMessages": false,
                "includeSystemPrompt": "never"
            }
        }));
        let messages = vec![
            msg(Role::System, "sys"),
            msg(Role::User, "one"),
            msg(Role::Assistant, "two"),
            msg(Role::User, "three"),
        ];
        assert_eq!(build_query(&messages, &cfg).as_deref(), Some("three"));
    }

    #[test]
    fn test_query_includes_system_if_in_range() {
        let cfg = config(json!({
            "stores": ["s"],
            "queryConstruction": {"messagesToInclude": 5, "includeSystemPrompt": "if-in-range"}
        }));
        let messages = vec![msg(Role::System, "sys"), msg(Role::User, "hello")];
        assert_eq!(build_query(&messages, &cfg).as_deref(), Some("sys\nhello"));

        let cfg_out_of_range = config(json!({
            "stores": ["s"],
            "queryConstruction": {"messagesToInclude": 1, "includeSystemPrompt": "if-in-range"}
        }));
        assert_eq!(
            build_query(&messages, &cfg_out_of_range).as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_query_empty_messages_is_none() {
        let cfg = config(json!({"stores": ["s"]}));
        assert_eq!(build_query(&[], &cfg), None);
    }

    #[test]
    fn test_format_results_templates() {
        let cfg = config(json!({
            "stores": ["s"],
            "resultFormat": "{{id}}|{{score}}|{{payload.text}}|{{payload.meta.lang}}",
            "injectTemplate": "CTX:\n{{results}}"
        }));
        let results = vec![
            VectorMatch {
                id: "r1".to_string(),
                score: 0.75,
                payload: json!({"text": "alpha", "meta": {"lang": "en"}}),
                vector: None,
            },
            VectorMatch {
                id: "r2".to_string(),
                score: 0.5,
                payload: json!({"text": "beta", "meta": null}),
                vector: None,
            },
        ];
        let block = format_results(&results, &cfg);
        assert_eq!(block, "CTX:\nr1|0.75|alpha|en\nr2|0.5|beta|");
    }

    #[test]
    fn test_inject_system_appends_to_existing() {
        let mut messages = vec![msg(Role::System, "base"), msg(Role::User, "q")];
        inject(&mut messages, InjectAs::System, "ctx");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].joined_text().contains("base"));
        assert!(messages[0].joined_text().contains("ctx"));
    }

    #[test]
    fn test_inject_system_inserts_when_absent() {
        let mut messages = vec![msg(Role::User, "q")];
        inject(&mut messages, InjectAs::System, "ctx");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].joined_text(), "ctx");
    }

    #[test]
    fn test_inject_user_context_before_latest_user() {
        let mut messages = vec![
            msg(Role::User, "first"),
            msg(Role::Assistant, "a"),
            msg(Role::User, "latest"),
        ];
        inject(&mut messages, InjectAs::UserContext, "ctx");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].joined_text(), "ctx");
        assert_eq!(messages[3].joined_text(), "latest");
    }
}
