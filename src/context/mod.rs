//! Retrieval integration: pre-call context injection and the synthetic
//! `vector_search` tool.

pub mod injector;
pub mod vector_tool;

use std::sync::Arc;

use adapter_registry::{EmbeddingProvider, Registry};

pub use injector::{ContextInjector, InjectionOutcome};
pub use vector_tool::{build_vector_search_tool, VectorSearchHandler, VECTOR_SEARCH_TOOL_NAME};

/// Resolve an embedding provider: each entry of `priority` in order,
/// else the first configured provider.
pub(crate) fn resolve_embedder(
    registry: &Registry,
    priority: Option<&[String]>,
) -> Result<Arc<dyn EmbeddingProvider>, String> {
    if let Some(priority) = priority {
        for id in priority {
            if let Ok(provider) = registry.get_embedding_provider(id) {
                return Ok(provider);
            }
        }
    }
    registry
        .first_embedding_provider()
        .ok_or_else(|| "no embedding provider available".to_string())
}

/// `{{key}}` template interpolation with null-safe nested lookup.
///
/// The resolver receives the dotted key and returns `None` for unknown
/// roots; a null mid-chain renders as the empty string.
pub(crate) fn interpolate(template: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    static PLACEHOLDER: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap());
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            resolve(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Render a JSON value for template output: strings bare, everything
/// else compact JSON, null as "".
pub(crate) fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Null-safe dotted-path lookup into a JSON value.
pub(crate) fn lookup_path<'a>(
    root: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpolate_replaces_known_keys() {
        let out = interpolate("a {{x}} b {{ y }} c", |key| match key {
            "x" => Some("1".to_string()),
            "y" => Some("2".to_string()),
            _ => None,
        });
        assert_eq!(out, "a 1 b 2 c");
    }

    #[test]
    fn test_interpolate_unknown_key_renders_empty() {
        let out = interpolate("[{{missing}}]", |_| None);
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_lookup_path_nested() {
        let value = json!({"a": {"b": {"c": 7}}});
        assert_eq!(lookup_path(&value, "a.b.c"), Some(&json!(7)));
        assert_eq!(lookup_path(&value, "a.x.c"), None);
    }

    #[test]
    fn test_render_value_null_is_empty() {
        assert_eq!(render_value(&serde_json::Value::Null), "");
        assert_eq!(render_value(&json!("s")), "s");
        assert_eq!(render_value(&json!({"k": 1})), r#"{"k":1}"#);
    }
}
