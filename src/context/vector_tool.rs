//! The synthetic `vector_search` tool.
//!
//! Exposed to the model when `vector_context.mode` is `tool` or `both`,
//! so the LLM can explicitly request retrieval. Locked parameters are
//! hidden from the schema and substituted server-side at execution
//! time, guaranteeing policy regardless of what the model sends.

use std::collections::HashMap;
use std::sync::Arc;

use adapter_protocol::{ToolSpec, VectorContextConfig};
use adapter_registry::{Registry, VectorQueryOptions};
use serde_json::{json, Map, Value};

use crate::error::{AdapterError, AdapterResult};
use crate::logging::WireLogger;

pub const VECTOR_SEARCH_TOOL_NAME: &str = "vector_search";

const DEFAULT_TOP_K: u32 = 5;

struct CanonicalParam {
    name: &'static str,
    json_type: &'static str,
    description: &'static str,
    required: bool,
}

const CANONICAL_PARAMS: &[CanonicalParam] = &[
    CanonicalParam {
        name: "query",
        json_type: "string",
        description: "The search query to retrieve relevant passages for.",
        required: true,
    },
    CanonicalParam {
        name: "topK",
        json_type: "integer",
        description: "Maximum number of results to return.",
        required: false,
    },
    CanonicalParam {
        name: "store",
        json_type: "string",
        description: "Identifier of the vector store to search.",
        required: false,
    },
    CanonicalParam {
        name: "filter",
        json_type: "object",
        description: "Metadata filter applied to the search.",
        required: false,
    },
];

fn is_locked(config: &VectorContextConfig, name: &str) -> bool {
    match name {
        "store" => config.locks.store.is_some(),
        "topK" => config.locks.top_k.is_some(),
        "filter" => config.locks.filter.is_some(),
        _ => false,
    }
}

/// Build the tool declaration and the exposed-name → canonical-name
/// alias map.
///
/// Locked keys are omitted; overrides may rename parameters, replace
/// descriptions, or expose/hide optional parameters. Duplicate exposed
/// names fail.
pub fn build_vector_search_tool(
    config: &VectorContextConfig,
) -> AdapterResult<(ToolSpec, HashMap<String, String>)> {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut aliases = HashMap::new();

    for param in CANONICAL_PARAMS {
        if is_locked(config, param.name) {
            continue;
        }
        let override_entry = config
            .tool_schema_overrides
            .as_ref()
            .and_then(|o| o.get(param.name));

        match override_entry.and_then(|o| o.expose) {
            Some(false) if param.required => {
                return Err(AdapterError::Validation(format!(
                    "vector_search parameter '{}' cannot be hidden",
                    param.name
                )));
            }
            Some(false) => continue,
            _ => {}
        }

        let exposed_name = override_entry
            .and_then(|o| o.rename.clone())
            .unwrap_or_else(|| param.name.to_string());
        let description = override_entry
            .and_then(|o| o.description.clone())
            .unwrap_or_else(|| param.description.to_string());

        if properties.contains_key(&exposed_name) {
            return Err(AdapterError::Validation(format!(
                "duplicate vector_search parameter name '{exposed_name}'"
            )));
        }
        properties.insert(
            exposed_name.clone(),
            json!({"type": param.json_type, "description": description}),
        );
        if param.required {
            required.push(exposed_name.clone());
        }
        aliases.insert(exposed_name, param.name.to_string());
    }

    let spec = ToolSpec::new(
        VECTOR_SEARCH_TOOL_NAME,
        "Search configured vector stores for passages relevant to a query.",
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        }),
    );
    Ok((spec, aliases))
}

/// Executes `vector_search` invocations from the model.
pub struct VectorSearchHandler {
    registry: Arc<Registry>,
    config: VectorContextConfig,
    /// Exposed name → canonical name, from the schema builder.
    aliases: HashMap<String, String>,
    logger: WireLogger,
}

impl VectorSearchHandler {
    pub fn new(
        registry: Arc<Registry>,
        config: VectorContextConfig,
        aliases: HashMap<String, String>,
        logger: WireLogger,
    ) -> Self {
        Self {
            registry,
            config,
            aliases,
            logger,
        }
    }

    /// Execute one invocation. Never fails: every error (including
    /// non-Error throws from drivers) is stringified into
    /// `{success: false, error}`.
    pub async fn execute(&self, arguments: Value) -> Value {
        match self.try_execute(arguments).await {
            Ok(result) => result,
            Err(message) => {
                self.logger
                    .warn("vector_search failed", json!({"error": message}));
                json!({"success": false, "error": message})
            }
        }
    }

    async fn try_execute(&self, arguments: Value) -> Result<Value, String> {
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(format!("arguments must be an object, got {other}")),
        };

        // Un-map renamed parameters back to canonical names.
        let mut canonical: Map<String, Value> = Map::new();
        for (key, value) in args {
            let name = self.aliases.get(&key).cloned().unwrap_or(key);
            canonical.insert(name, value);
        }

        // Precedence: config defaults, then model args, then locks.
        let locks = &self.config.locks;
        let store_id = locks
            .store
            .clone()
            .or_else(|| canonical.get("store").and_then(Value::as_str).map(String::from))
            .or_else(|| self.config.stores.first().cloned())
            .ok_or_else(|| "no vector store configured".to_string())?;
        let top_k = locks
            .top_k
            .or_else(|| canonical.get("topK").and_then(Value::as_u64).map(|v| v as u32))
            .or(self.config.top_k)
            .unwrap_or(DEFAULT_TOP_K);
        let score_threshold = locks.score_threshold.or(self.config.score_threshold);
        let filter = locks
            .filter
            .clone()
            .or_else(|| canonical.get("filter").cloned().filter(|v| !v.is_null()))
            .or_else(|| self.config.filter.clone());
        let query = canonical
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| "query is required".to_string())?
            .to_string();

        let embedder = super::resolve_embedder(
            &self.registry,
            self.config.embedding_priority.as_deref(),
        )?;
        let vector = embedder
            .embed(&query)
            .await
            .map_err(|e| e.to_string())?;

        let store = self
            .registry
            .get_vector_store(&store_id)
            .map_err(|e| e.to_string())?;
        let collection = locks
            .collection
            .clone()
            .or_else(|| self.config.collection.clone())
            .or_else(|| store.default_collection().map(String::from))
            .unwrap_or_else(|| "default".to_string());

        let options = VectorQueryOptions {
            filter: filter.clone(),
            include_payload: true,
            include_vector: false,
        };
        let mut results = store
            .query(&collection, &vector, top_k, &options)
            .await
            .map_err(|e| e.to_string())?;
        if let Some(threshold) = score_threshold {
            results.retain(|m| m.score >= threshold);
        }

        self.logger.debug(
            "vector_search executed",
            json!({"store": store_id, "collection": collection, "results": results.len()}),
        );

        Ok(json!({
            "success": true,
            "results": results,
            "effectiveParams": {
                "store": store_id,
                "collection": collection,
                "topK": top_k,
                "scoreThreshold": score_threshold,
                "filter": filter,
            },
            "query": query,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> VectorContextConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_schema_has_required_query() {
        let (spec, aliases) = build_vector_search_tool(&config(json!({"stores": ["s"]}))).unwrap();
        assert_eq!(spec.name, VECTOR_SEARCH_TOOL_NAME);
        assert_eq!(spec.parameters["required"], json!(["query"]));
        assert!(spec.parameters["properties"].get("topK").is_some());
        assert_eq!(aliases["query"], "query");
    }

    #[test]
    fn test_locked_keys_omitted_from_schema() {
        let (spec, _) = build_vector_search_tool(&config(json!({
            "stores": ["s"],
            "locks": {"store": "s", "topK": 3}
        })))
        .unwrap();
        let properties = spec.parameters["properties"].as_object().unwrap();
        assert!(properties.contains_key("query"));
        assert!(!properties.contains_key("store"));
        assert!(!properties.contains_key("topK"));
        assert!(properties.contains_key("filter"));
    }

    #[test]
    fn test_override_rename_builds_alias() {
        let (spec, aliases) = build_vector_search_tool(&config(json!({
            "stores": ["s"],
            "toolSchemaOverrides": {"topK": {"rename": "limit", "description": "Max hits"}}
        })))
        .unwrap();
        let properties = spec.parameters["properties"].as_object().unwrap();
        assert!(properties.contains_key("limit"));
        assert!(!properties.contains_key("topK"));
        assert_eq!(properties["limit"]["description"], "Max hits");
        assert_eq!(aliases["limit"], "topK");
    }

    #[test]
    fn test_override_hide_optional() {
        let (spec, _) = build_vector_search_tool(&config(json!({
            "stores": ["s"],
            "toolSchemaOverrides": {"filter": {"expose": false}}
        })))
        .unwrap();
        let properties = spec.parameters["properties"].as_object().unwrap();
        assert!(!properties.contains_key("filter"));
    }

    #[test]
    fn test_hiding_query_fails() {
        let err = build_vector_search_tool(&config(json!({
            "stores": ["s"],
            "toolSchemaOverrides": {"query": {"expose": false}}
        })))
        .unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[test]
    fn test_duplicate_exposed_names_fail() {
        let err = build_vector_search_tool(&config(json!({
            "stores": ["s"],
            "toolSchemaOverrides": {"topK": {"rename": "store"}}
        })))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    // ------------------------------------------------------------------
    // Handler execution
    // ------------------------------------------------------------------

    use adapter_registry::{EmbeddingProvider, Registry, ToolError, VectorMatch, VectorStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc as StdArc;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn id(&self) -> &str {
            "e1"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ToolError> {
            Ok(vec![1.0])
        }
    }

    #[derive(Default)]
    struct RecordedQuery {
        collection: String,
        top_k: u32,
        filter: Option<Value>,
    }

    struct RecordingStore {
        id: &'static str,
        results: Vec<VectorMatch>,
        last: Mutex<RecordedQuery>,
    }

    impl RecordingStore {
        fn new(id: &'static str, scores: &[f64]) -> StdArc<Self> {
            StdArc::new(Self {
                id,
                results: scores
                    .iter()
                    .enumerate()
                    .map(|(i, score)| VectorMatch {
                        id: format!("r{i}"),
                        score: *score,
                        payload: json!({"text": "t"}),
                        vector: None,
                    })
                    .collect(),
                last: Mutex::new(RecordedQuery::default()),
            })
        }
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        fn id(&self) -> &str {
            self.id
        }

        fn default_collection(&self) -> Option<&str> {
            Some("store-default")
        }

        async fn query(
            &self,
            collection: &str,
            _vector: &[f32],
            top_k: u32,
            options: &adapter_registry::VectorQueryOptions,
        ) -> Result<Vec<VectorMatch>, ToolError> {
            *self.last.lock() = RecordedQuery {
                collection: collection.to_string(),
                top_k,
                filter: options.filter.clone(),
            };
            Ok(self.results.clone())
        }
    }

    fn handler_with(
        config_value: Value,
        stores: Vec<StdArc<RecordingStore>>,
    ) -> VectorSearchHandler {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path());
        registry.load_all();
        registry.register_embedding_provider(StdArc::new(FixedEmbedder));
        for store in stores {
            registry.register_vector_store(store);
        }
        let cfg = config(config_value);
        let (_, aliases) = build_vector_search_tool(&cfg).unwrap();
        VectorSearchHandler::new(
            StdArc::new(registry),
            cfg,
            aliases,
            crate::logging::vector_logger(),
        )
    }

    #[tokio::test]
    async fn test_execute_defaults() {
        let store = RecordingStore::new("s1", &[0.9]);
        let handler = handler_with(json!({"stores": ["s1"], "mode": "tool"}), vec![store.clone()]);
        let result = handler.execute(json!({"query": "find it"})).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["effectiveParams"]["store"], "s1");
        assert_eq!(result["effectiveParams"]["topK"], 5);
        assert_eq!(result["effectiveParams"]["collection"], "store-default");
        assert_eq!(result["query"], "find it");
        assert_eq!(store.last.lock().top_k, 5);
        assert_eq!(store.last.lock().collection, "store-default");
    }

    #[tokio::test]
    async fn test_execute_locks_override_model_args() {
        let locked = RecordingStore::new("locked-store", &[0.9]);
        let other = RecordingStore::new("other", &[0.9]);
        let handler = handler_with(
            json!({
                "stores": ["other"],
                "mode": "tool",
                "locks": {"store": "locked-store", "topK": 2, "collection": "policy"}
            }),
            vec![locked.clone(), other.clone()],
        );
        // The model tries to pick another store and a bigger topK; the
        // locks win.
        let result = handler
            .execute(json!({"query": "q", "store": "other", "topK": 50}))
            .await;
        assert_eq!(result["success"], true);
        assert_eq!(result["effectiveParams"]["store"], "locked-store");
        assert_eq!(result["effectiveParams"]["topK"], 2);
        assert_eq!(locked.last.lock().top_k, 2);
        assert_eq!(locked.last.lock().collection, "policy");
        assert_eq!(other.last.lock().collection, "");
    }

    #[tokio::test]
    async fn test_execute_model_args_override_config_defaults() {
        let store = RecordingStore::new("s1", &[0.9]);
        let handler = handler_with(
            json!({"stores": ["s1"], "mode": "tool", "topK": 3}),
            vec![store.clone()],
        );
        let result = handler
            .execute(json!({"query": "q", "topK": 7, "filter": {"lang": "en"}}))
            .await;
        assert_eq!(result["effectiveParams"]["topK"], 7);
        assert_eq!(store.last.lock().top_k, 7);
        assert_eq!(store.last.lock().filter, Some(json!({"lang": "en"})));
    }

    #[tokio::test]
    async fn test_execute_renamed_parameter_unmapped() {
        let store = RecordingStore::new("s1", &[0.9]);
        let handler = handler_with(
            json!({
                "stores": ["s1"],
                "mode": "tool",
                "toolSchemaOverrides": {"topK": {"rename": "limit"}}
            }),
            vec![store.clone()],
        );
        let result = handler.execute(json!({"query": "q", "limit": 9})).await;
        assert_eq!(result["success"], true);
        assert_eq!(store.last.lock().top_k, 9);
    }

    #[tokio::test]
    async fn test_execute_threshold_filters_results() {
        let store = RecordingStore::new("s1", &[0.9, 0.4]);
        let handler = handler_with(
            json!({"stores": ["s1"], "mode": "tool", "scoreThreshold": 0.8}),
            vec![store],
        );
        let result = handler.execute(json!({"query": "q"})).await;
        assert_eq!(result["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_missing_query_fails_softly() {
        let handler = handler_with(json!({"stores": ["s1"], "mode": "tool"}), vec![]);
        let result = handler.execute(json!({})).await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("query"));
    }

    #[tokio::test]
    async fn test_execute_unknown_store_fails_softly() {
        let handler = handler_with(json!({"stores": ["ghost"], "mode": "tool"}), vec![]);
        let result = handler.execute(json!({"query": "q"})).await;
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_execute_non_object_arguments_fail_softly() {
        let handler = handler_with(json!({"stores": ["s1"], "mode": "tool"}), vec![]);
        let result = handler.execute(json!([1, 2])).await;
        assert_eq!(result["success"], false);
    }
}
