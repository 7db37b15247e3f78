//! Plugin manifest shapes.
//!
//! One manifest file may declare any mix of sections; all are optional.
//! Entries are merged across files with first-file-wins on name
//! collisions (lexicographic scan order).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A model provider: which compat module speaks its wire format and how
/// to reach it.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    pub id: String,
    /// Name of the compat module translating to this provider's format.
    pub compat: String,
    pub base_url: Option<String>,
    /// Environment variable holding the API key. The key itself never
    /// appears in manifests.
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

/// A registry-loaded function tool.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionToolEntry {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    /// Driver binding, e.g. `http` or `static`.
    pub driver: String,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// An MCP server reachable through a registered transport driver.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerEntry {
    pub id: String,
    pub transport: String,
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

/// A vector store binding.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreEntry {
    pub id: String,
    /// Driver (store compat) name, e.g. `qdrant`.
    pub driver: String,
    pub collection: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

/// An embedding provider binding.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingProviderEntry {
    pub id: String,
    /// Driver (embedding compat) name.
    pub driver: String,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

/// Declares a compat module a provider entry may reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatEntry {
    pub name: String,
    /// `http` or `sdk`.
    pub kind: String,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

/// A host-process route advertised by a plugin.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRoute {
    pub path: String,
    pub target: String,
    pub description: Option<String>,
}

/// One plugin manifest file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginManifest {
    pub providers: Vec<ProviderEntry>,
    pub tools: Vec<FunctionToolEntry>,
    pub mcp_servers: Vec<McpServerEntry>,
    pub vector_stores: Vec<VectorStoreEntry>,
    pub embedding_providers: Vec<EmbeddingProviderEntry>,
    pub compats: Vec<CompatEntry>,
    pub process_routes: Vec<ProcessRoute>,
}

impl PluginManifest {
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
            && self.tools.is_empty()
            && self.mcp_servers.is_empty()
            && self.vector_stores.is_empty()
            && self.embedding_providers.is_empty()
            && self.compats.is_empty()
            && self.process_routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_manifest_parses() {
        let yaml = r#"
providers:
  - id: openai
    compat: chat-completions
    baseUrl: https://api.openai.com/v1
    apiKeyEnv: OPENAI_API_KEY
tools:
  - name: get_weather
    description: Current weather
    driver: http
    options:
      url: http://localhost:9000/weather
vectorStores:
  - id: docs
    driver: qdrant
    collection: kb
"#;
        let manifest: PluginManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.providers[0].id, "openai");
        assert_eq!(manifest.providers[0].compat, "chat-completions");
        assert_eq!(manifest.tools[0].driver, "http");
        assert_eq!(manifest.vector_stores[0].collection.as_deref(), Some("kb"));
        assert!(manifest.mcp_servers.is_empty());
    }

    #[test]
    fn test_empty_manifest() {
        let manifest: PluginManifest = serde_yaml::from_str("{}").unwrap();
        assert!(manifest.is_empty());
    }
}
