//! Routes tool calls to their executors.

use std::collections::HashMap;
use std::sync::Arc;

use adapter_registry::{McpClient, Registry, ToolError, ToolExecutor};
use serde_json::Value;

use crate::context::{VectorSearchHandler, VECTOR_SEARCH_TOOL_NAME};

/// Per-call tool dispatcher. Holds the executors discovered by tool
/// collection; unknown names fall back to a registry lookup so
/// vector-retrieved declarations still route.
pub struct ToolRouter {
    registry: Arc<Registry>,
    function_tools: HashMap<String, Arc<dyn ToolExecutor>>,
    mcp_tools: HashMap<String, Arc<dyn McpClient>>,
    mcp_clients: Vec<Arc<dyn McpClient>>,
    vector_tool: Option<VectorSearchHandler>,
}

impl ToolRouter {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            function_tools: HashMap::new(),
            mcp_tools: HashMap::new(),
            mcp_clients: Vec::new(),
            vector_tool: None,
        }
    }

    pub fn add_function_tool(&mut self, name: String, executor: Arc<dyn ToolExecutor>) {
        self.function_tools.entry(name).or_insert(executor);
    }

    pub fn add_mcp_tool(&mut self, name: String, client: Arc<dyn McpClient>) {
        self.mcp_tools.entry(name).or_insert(client);
    }

    pub fn add_mcp_client(&mut self, client: Arc<dyn McpClient>) {
        self.mcp_clients.push(client);
    }

    pub fn set_vector_tool(&mut self, handler: VectorSearchHandler) {
        self.vector_tool = Some(handler);
    }

    /// Execute a tool by its original (un-sanitized) name.
    pub async fn execute(&self, original_name: &str, arguments: Value) -> Result<Value, ToolError> {
        if original_name == VECTOR_SEARCH_TOOL_NAME {
            if let Some(handler) = &self.vector_tool {
                // The handler reports failures inside its result value.
                return Ok(handler.execute(arguments).await);
            }
        }
        if let Some(executor) = self.function_tools.get(original_name) {
            return executor.execute(arguments).await;
        }
        if let Some(client) = self.mcp_tools.get(original_name) {
            return client.call_tool(original_name, arguments).await;
        }
        // Inline and vector-retrieved declarations: resolve lazily.
        if let Ok(executor) = self.registry.get_tool(original_name) {
            return executor.execute(arguments).await;
        }
        Err(ToolError::Execution(format!(
            "unknown tool '{original_name}'"
        )))
    }

    /// Release pooled resources (MCP connections). Idempotent.
    pub async fn close(&self) {
        for client in &self.mcp_clients {
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_protocol::ToolSpec;
    use async_trait::async_trait;
    use serde_json::json;

    struct Doubler;

    #[async_trait]
    impl ToolExecutor for Doubler {
        fn name(&self) -> &str {
            "doubler"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new("doubler", "doubles", json!({"type": "object"}))
        }

        async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
            let n = arguments["n"].as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        }
    }

    fn router() -> ToolRouter {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(dir.path());
        registry.load_all();
        ToolRouter::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_function_tool_routing() {
        let mut router = router();
        router.add_function_tool("doubler".to_string(), Arc::new(Doubler));
        let result = router.execute("doubler", json!({"n": 4})).await.unwrap();
        assert_eq!(result, json!(8));
    }

    #[tokio::test]
    async fn test_unknown_tool_errors() {
        let router = router();
        let err = router.execute("nope", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }
}
