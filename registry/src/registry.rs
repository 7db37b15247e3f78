//! The registry façade.
//!
//! Manifests resolve names to entries; live handles come from
//! programmatic registration (host bootstrap, tests) or from driver
//! factories bound to manifest entries on first lookup. References
//! between compats and providers are plain string IDs resolved lazily,
//! so manifest files may reference each other in any order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::executors::{HttpToolExecutor, StaticToolExecutor};
use crate::interfaces::{CompatModule, EmbeddingProvider, McpClient, ToolExecutor, VectorStore};
use crate::loader::{load_dir, LoadedManifests};
use crate::manifest::{
    EmbeddingProviderEntry, FunctionToolEntry, ProcessRoute, ProviderEntry, VectorStoreEntry,
};

/// Builds a live tool executor from a manifest entry.
pub type ToolDriverFactory =
    Arc<dyn Fn(&FunctionToolEntry) -> RegistryResult<Arc<dyn ToolExecutor>> + Send + Sync>;

/// Lazy plugin registry.
pub struct Registry {
    plugins_dir: PathBuf,
    manifests: OnceCell<LoadedManifests>,
    compat_modules: DashMap<String, Arc<dyn CompatModule>>,
    tool_executors: DashMap<String, Arc<dyn ToolExecutor>>,
    tool_drivers: DashMap<String, ToolDriverFactory>,
    mcp_clients: DashMap<String, Arc<dyn McpClient>>,
    vector_stores: DashMap<String, Arc<dyn VectorStore>>,
    embedding_providers: DashMap<String, Arc<dyn EmbeddingProvider>>,
}

impl Registry {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        let registry = Self {
            plugins_dir: plugins_dir.into(),
            manifests: OnceCell::new(),
            compat_modules: DashMap::new(),
            tool_executors: DashMap::new(),
            tool_drivers: DashMap::new(),
            mcp_clients: DashMap::new(),
            vector_stores: DashMap::new(),
            embedding_providers: DashMap::new(),
        };
        registry.register_builtin_tool_drivers();
        registry
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Load every manifest under the plugins directory. Idempotent;
    /// every lookup also triggers this lazily.
    pub fn load_all(&self) {
        self.manifests();
    }

    fn manifests(&self) -> &LoadedManifests {
        self.manifests.get_or_init(|| {
            debug!(dir = %self.plugins_dir.display(), "Loading plugin manifests");
            load_dir(&self.plugins_dir)
        })
    }

    fn register_builtin_tool_drivers(&self) {
        self.tool_drivers.insert(
            "http".to_string(),
            Arc::new(|entry: &FunctionToolEntry| {
                Ok(Arc::new(HttpToolExecutor::from_entry(entry)?) as Arc<dyn ToolExecutor>)
            }) as ToolDriverFactory,
        );
        self.tool_drivers.insert(
            "static".to_string(),
            Arc::new(|entry: &FunctionToolEntry| {
                Ok(Arc::new(StaticToolExecutor::from_entry(entry)) as Arc<dyn ToolExecutor>)
            }) as ToolDriverFactory,
        );
    }

    // ========================================================================
    // Programmatic registration
    // ========================================================================

    pub fn register_compat_module(&self, module: Arc<dyn CompatModule>) {
        self.compat_modules.insert(module.name().to_string(), module);
    }

    pub fn register_tool_executor(&self, executor: Arc<dyn ToolExecutor>) {
        self.tool_executors.insert(executor.name().to_string(), executor);
    }

    pub fn register_tool_driver(&self, driver: &str, factory: ToolDriverFactory) {
        self.tool_drivers.insert(driver.to_string(), factory);
    }

    pub fn register_mcp_client(&self, client: Arc<dyn McpClient>) {
        self.mcp_clients.insert(client.id().to_string(), client);
    }

    pub fn register_vector_store(&self, store: Arc<dyn VectorStore>) {
        self.vector_stores.insert(store.id().to_string(), store);
    }

    pub fn register_embedding_provider(&self, provider: Arc<dyn EmbeddingProvider>) {
        self.embedding_providers
            .insert(provider.id().to_string(), provider);
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get_provider(&self, id: &str) -> RegistryResult<ProviderEntry> {
        self.manifests()
            .providers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::missing("provider", id))
    }

    pub fn get_compat_module(&self, name: &str) -> RegistryResult<Arc<dyn CompatModule>> {
        if let Some(module) = self.compat_modules.get(name) {
            return Ok(Arc::clone(module.value()));
        }
        if self.manifests().compats.contains_key(name) {
            return Err(RegistryError::DriverMissing {
                kind: "compat module",
                name: name.to_string(),
            });
        }
        Err(RegistryError::missing("compat module", name))
    }

    pub fn get_tool(&self, name: &str) -> RegistryResult<Arc<dyn ToolExecutor>> {
        if let Some(executor) = self.tool_executors.get(name) {
            return Ok(Arc::clone(executor.value()));
        }
        let Some(entry) = self.manifests().tools.get(name) else {
            return Err(RegistryError::missing("function tool", name));
        };
        let Some(factory) = self.tool_drivers.get(&entry.driver) else {
            return Err(RegistryError::DriverMissing {
                kind: "tool driver",
                name: entry.driver.clone(),
            });
        };
        let executor = factory(entry)?;
        self.tool_executors
            .insert(name.to_string(), Arc::clone(&executor));
        Ok(executor)
    }

    pub fn get_tools(&self, names: &[String]) -> RegistryResult<Vec<Arc<dyn ToolExecutor>>> {
        names.iter().map(|n| self.get_tool(n)).collect()
    }

    pub fn get_mcp_server(&self, id: &str) -> RegistryResult<Arc<dyn McpClient>> {
        if let Some(client) = self.mcp_clients.get(id) {
            return Ok(Arc::clone(client.value()));
        }
        if self.manifests().mcp_servers.contains_key(id) {
            return Err(RegistryError::DriverMissing {
                kind: "MCP transport",
                name: id.to_string(),
            });
        }
        Err(RegistryError::missing("MCP server", id))
    }

    pub fn get_mcp_servers(&self, ids: &[String]) -> RegistryResult<Vec<Arc<dyn McpClient>>> {
        ids.iter().map(|id| self.get_mcp_server(id)).collect()
    }

    pub fn get_vector_store(&self, id: &str) -> RegistryResult<Arc<dyn VectorStore>> {
        if let Some(store) = self.vector_stores.get(id) {
            return Ok(Arc::clone(store.value()));
        }
        if self.manifests().vector_stores.contains_key(id) {
            return Err(RegistryError::DriverMissing {
                kind: "vector store driver",
                name: id.to_string(),
            });
        }
        Err(RegistryError::missing("vector store", id))
    }

    /// Driver descriptor for a store, from its manifest entry.
    pub fn get_vector_store_compat(&self, id: &str) -> RegistryResult<VectorStoreEntry> {
        self.manifests()
            .vector_stores
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::missing("vector store", id))
    }

    pub fn get_embedding_provider(&self, id: &str) -> RegistryResult<Arc<dyn EmbeddingProvider>> {
        if let Some(provider) = self.embedding_providers.get(id) {
            return Ok(Arc::clone(provider.value()));
        }
        if self.manifests().embedding_providers.contains_key(id) {
            return Err(RegistryError::DriverMissing {
                kind: "embedding driver",
                name: id.to_string(),
            });
        }
        Err(RegistryError::missing("embedding provider", id))
    }

    /// Driver descriptor for an embedding provider.
    pub fn get_embedding_compat(&self, id: &str) -> RegistryResult<EmbeddingProviderEntry> {
        self.manifests()
            .embedding_providers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::missing("embedding provider", id))
    }

    /// First embedding provider with a live handle, in manifest scan
    /// order falling back to registration order.
    pub fn first_embedding_provider(&self) -> Option<Arc<dyn EmbeddingProvider>> {
        for id in &self.manifests().embedding_order {
            if let Some(provider) = self.embedding_providers.get(id) {
                return Some(Arc::clone(provider.value()));
            }
        }
        self.embedding_providers
            .iter()
            .next()
            .map(|e| Arc::clone(e.value()))
    }

    pub fn get_process_routes(&self) -> Vec<ProcessRoute> {
        self.manifests().process_routes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_protocol::ToolSpec;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn registry_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let registry = Registry::new(dir.path());
        (dir, registry)
    }

    #[test]
    fn test_missing_provider_is_manifest_error() {
        let (_dir, registry) = registry_with(&[]);
        let err = registry.get_provider("nope").unwrap_err();
        assert!(matches!(err, RegistryError::Manifest(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_provider_lookup() {
        let (_dir, registry) = registry_with(&[(
            "p.yaml",
            "providers:\n  - id: openai\n    compat: chat-completions\n",
        )]);
        let entry = registry.get_provider("openai").unwrap();
        assert_eq!(entry.compat, "chat-completions");
    }

    #[test]
    fn test_load_all_idempotent() {
        let (dir, registry) = registry_with(&[(
            "p.yaml",
            "providers:\n  - id: a\n    compat: c\n",
        )]);
        registry.load_all();
        // A file added after the first load is not picked up.
        std::fs::write(
            dir.path().join("late.yaml"),
            "providers:\n  - id: b\n    compat: c\n",
        )
        .unwrap();
        registry.load_all();
        assert!(registry.get_provider("b").is_err());
        assert!(registry.get_provider("a").is_ok());
    }

    #[tokio::test]
    async fn test_static_tool_from_manifest() {
        let (_dir, registry) = registry_with(&[(
            "t.yaml",
            r#"
tools:
  - name: echo
    description: Echo tool
    driver: static
    options:
      result: {"ok": true}
"#,
        )]);
        let tool = registry.get_tool("echo").unwrap();
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[test]
    fn test_tool_with_unknown_driver() {
        let (_dir, registry) = registry_with(&[(
            "t.yaml",
            "tools:\n  - name: x\n    driver: bespoke\n",
        )]);
        let err = registry.get_tool("x").unwrap_err();
        assert!(matches!(err, RegistryError::DriverMissing { .. }));
    }

    #[test]
    fn test_mcp_server_without_transport_driver() {
        let (_dir, registry) = registry_with(&[(
            "m.yaml",
            "mcpServers:\n  - id: brave\n    transport: http\n    url: http://localhost:1\n",
        )]);
        let err = registry.get_mcp_server("brave").unwrap_err();
        assert!(matches!(err, RegistryError::DriverMissing { .. }));
        assert!(matches!(
            registry.get_mcp_server("absent").unwrap_err(),
            RegistryError::Manifest(_)
        ));
    }

    struct FakeEmbedder(String);

    #[async_trait]
    impl crate::interfaces::EmbeddingProvider for FakeEmbedder {
        fn id(&self) -> &str {
            &self.0
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, crate::interfaces::ToolError> {
            Ok(vec![0.0])
        }
    }

    #[test]
    fn test_first_embedding_provider_follows_manifest_order() {
        let (_dir, registry) = registry_with(&[(
            "e.yaml",
            "embeddingProviders:\n  - id: e1\n    driver: d\n  - id: e2\n    driver: d\n",
        )]);
        registry.register_embedding_provider(Arc::new(FakeEmbedder("e2".to_string())));
        registry.register_embedding_provider(Arc::new(FakeEmbedder("e1".to_string())));
        assert_eq!(registry.first_embedding_provider().unwrap().id(), "e1");
    }

    struct NamedTool;

    #[async_trait]
    impl crate::interfaces::ToolExecutor for NamedTool {
        fn name(&self) -> &str {
            "named"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new("named", "A tool", json!({"type": "object"}))
        }

        async fn execute(&self, _arguments: Value) -> Result<Value, crate::interfaces::ToolError> {
            Ok(json!("done"))
        }
    }

    #[test]
    fn test_programmatic_registration_wins() {
        let (_dir, registry) = registry_with(&[]);
        registry.register_tool_executor(Arc::new(NamedTool));
        assert!(registry.get_tool("named").is_ok());
        assert!(registry.get_tools(&["named".to_string()]).is_ok());
        assert!(registry
            .get_tools(&["named".to_string(), "ghost".to_string()])
            .is_err());
    }
}
