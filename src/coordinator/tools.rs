//! Tool discovery for one call.
//!
//! Merges, in order: inline spec tools, registry function tools, MCP
//! tools, vector-retrieved tools, and the synthetic `vector_search`
//! tool. Every name exposed to the provider is sanitized; the alias map
//! reverses provider-returned identifiers before routing.

use std::collections::HashSet;
use std::sync::Arc;

use adapter_protocol::{CallSpec, ToolNameMap, ToolSpec};
use adapter_registry::{Registry, VectorQueryOptions};
use serde_json::json;

use super::tool_router::ToolRouter;
use crate::context::{build_vector_search_tool, resolve_embedder, VectorSearchHandler};
use crate::error::{AdapterError, AdapterResult};
use crate::logging::WireLogger;

/// Everything tool-related the coordinator needs for one call.
pub struct ToolSetup {
    /// Declarations handed to the provider, names sanitized.
    pub specs: Vec<ToolSpec>,
    pub name_map: ToolNameMap,
    pub router: ToolRouter,
}

impl std::fmt::Debug for ToolSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSetup")
            .field("specs", &self.specs)
            .field("name_map", &self.name_map)
            .finish_non_exhaustive()
    }
}

impl ToolSetup {
    pub fn has_tools(&self) -> bool {
        !self.specs.is_empty()
    }
}

pub async fn collect_tools(
    registry: &Arc<Registry>,
    spec: &CallSpec,
    logger: &WireLogger,
) -> AdapterResult<ToolSetup> {
    let mut specs: Vec<ToolSpec> = Vec::new();
    let mut name_map = ToolNameMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut router = ToolRouter::new(Arc::clone(registry));

    let mut add_spec = |tool: &ToolSpec, name_map: &mut ToolNameMap, specs: &mut Vec<ToolSpec>| {
        let sanitized = name_map.register(&tool.name);
        if !seen.insert(sanitized.clone()) {
            logger.debug(
                "Skipping duplicate tool name",
                json!({"tool": tool.name}),
            );
            return;
        }
        specs.push(ToolSpec {
            name: sanitized,
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        });
    };

    // 1. Inline declarations from the spec.
    for tool in &spec.tools {
        add_spec(tool, &mut name_map, &mut specs);
    }

    // 2. Registry function tools, by name.
    let executors = registry.get_tools(&spec.function_tool_names)?;
    for executor in executors {
        let tool = executor.spec();
        add_spec(&tool, &mut name_map, &mut specs);
        router.add_function_tool(tool.name, executor);
    }

    // 3. MCP-gathered tools.
    let clients = registry.get_mcp_servers(&spec.mcp_servers)?;
    for client in clients {
        let tools = client
            .list_tools()
            .await
            .map_err(|e| AdapterError::ToolExecution(format!(
                "MCP server '{}': {e}",
                client.id()
            )))?;
        for tool in tools {
            add_spec(&tool, &mut name_map, &mut specs);
            router.add_mcp_tool(tool.name, Arc::clone(&client));
        }
        router.add_mcp_client(client);
    }

    // 4. Vector-retrieved tools.
    if let Some(stores) = spec.vector_priority.as_deref().filter(|s| !s.is_empty()) {
        for tool in retrieve_tools(registry, spec, stores, logger).await {
            add_spec(&tool, &mut name_map, &mut specs);
        }
    }

    // 5. Synthetic vector_search.
    if let Some(config) = spec.vector_context.as_ref().filter(|c| c.wants_tool()) {
        let (tool, aliases) = build_vector_search_tool(config)?;
        add_spec(&tool, &mut name_map, &mut specs);
        router.set_vector_tool(VectorSearchHandler::new(
            Arc::clone(registry),
            config.clone(),
            aliases,
            crate::logging::vector_logger().with_correlation(logger.correlation().clone()),
        ));
    }

    Ok(ToolSetup {
        specs,
        name_map,
        router,
    })
}

/// Query the priority stores for tool declarations semantically close
/// to the conversation. Retrieval problems degrade to no extra tools.
async fn retrieve_tools(
    registry: &Arc<Registry>,
    spec: &CallSpec,
    stores: &[String],
    logger: &WireLogger,
) -> Vec<ToolSpec> {
    let query = spec
        .vector_context
        .as_ref()
        .and_then(|c| c.override_embedding_query.clone())
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .or_else(|| spec.latest_user_text());
    let Some(query) = query else {
        return Vec::new();
    };

    let priority = spec
        .vector_context
        .as_ref()
        .and_then(|c| c.embedding_priority.as_deref());
    let embedder = match resolve_embedder(registry, priority) {
        Ok(embedder) => embedder,
        Err(error) => {
            logger.debug("Tool retrieval skipped", json!({"error": error}));
            return Vec::new();
        }
    };
    let vector = match embedder.embed(&query).await {
        Ok(vector) => vector,
        Err(error) => {
            logger.debug("Tool retrieval embedding failed", json!({"error": error.to_string()}));
            return Vec::new();
        }
    };

    let top_k = spec
        .vector_context
        .as_ref()
        .and_then(|c| c.top_k)
        .unwrap_or(5);
    let threshold = spec.vector_context.as_ref().and_then(|c| c.score_threshold);
    let options = VectorQueryOptions {
        filter: None,
        include_payload: true,
        include_vector: false,
    };

    for store_id in stores {
        let store = match registry.get_vector_store(store_id) {
            Ok(store) => store,
            Err(error) => {
                logger.debug(
                    "Tool retrieval store unavailable",
                    json!({"store": store_id, "error": error.to_string()}),
                );
                continue;
            }
        };
        let collection = store
            .default_collection()
            .unwrap_or("default")
            .to_string();
        let matches = match store.query(&collection, &vector, top_k, &options).await {
            Ok(matches) => matches,
            Err(error) => {
                logger.debug(
                    "Tool retrieval query failed",
                    json!({"store": store_id, "error": error.to_string()}),
                );
                continue;
            }
        };
        let tools: Vec<ToolSpec> = matches
            .into_iter()
            .filter(|m| threshold.is_none_or(|t| m.score >= t))
            .filter_map(|m| match serde_json::from_value::<ToolSpec>(m.payload.clone()) {
                Ok(tool) => Some(tool),
                Err(error) => {
                    logger.debug(
                        "Skipping malformed retrieved tool",
                        json!({"id": m.id, "error": error.to_string()}),
                    );
                    None
                }
            })
            .collect();
        if !tools.is_empty() {
            return tools;
        }
    }
    Vec::new()
}
