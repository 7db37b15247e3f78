//! Manifest discovery and merging.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::manifest::{
    CompatEntry, EmbeddingProviderEntry, FunctionToolEntry, McpServerEntry, PluginManifest,
    ProcessRoute, ProviderEntry, VectorStoreEntry,
};

/// Merged view of every valid manifest under the plugins directory.
#[derive(Debug, Default)]
pub(crate) struct LoadedManifests {
    pub providers: HashMap<String, ProviderEntry>,
    pub tools: HashMap<String, FunctionToolEntry>,
    pub mcp_servers: HashMap<String, McpServerEntry>,
    pub vector_stores: HashMap<String, VectorStoreEntry>,
    pub embedding_providers: HashMap<String, EmbeddingProviderEntry>,
    pub compats: HashMap<String, CompatEntry>,
    pub process_routes: Vec<ProcessRoute>,
    /// Embedding provider IDs in scan order; the injector falls back to
    /// the first configured provider.
    pub embedding_order: Vec<String>,
}

/// Scan `dir` for manifest files in lexicographic order and merge them.
///
/// Duplicate names resolve first-file-wins. Invalid manifests are
/// skipped with a warning; loading of the rest proceeds.
pub(crate) fn load_dir(dir: &Path) -> LoadedManifests {
    let mut loaded = LoadedManifests::default();
    let mut files = manifest_files(dir);
    files.sort();

    for path in files {
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable manifest");
                continue;
            }
        };
        let manifest = match parse_manifest(&path, &text) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping invalid manifest");
                continue;
            }
        };
        merge(&mut loaded, manifest, &path);
    }

    debug!(
        providers = loaded.providers.len(),
        tools = loaded.tools.len(),
        mcp_servers = loaded.mcp_servers.len(),
        vector_stores = loaded.vector_stores.len(),
        embedding_providers = loaded.embedding_providers.len(),
        compats = loaded.compats.len(),
        "Loaded plugin manifests"
    );
    loaded
}

fn manifest_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %current.display(), error = %e, "Cannot read plugins directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml") | Some("json")
            ) {
                files.push(path);
            }
        }
    }
    files
}

fn parse_manifest(path: &Path, text: &str) -> Result<PluginManifest, String> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    }
}

fn merge(loaded: &mut LoadedManifests, manifest: PluginManifest, path: &Path) {
    fn insert_first_wins<V>(map: &mut HashMap<String, V>, key: String, value: V, path: &Path) {
        if map.contains_key(&key) {
            debug!(name = %key, path = %path.display(), "Duplicate manifest entry ignored (first file wins)");
        } else {
            map.insert(key, value);
        }
    }

    for p in manifest.providers {
        insert_first_wins(&mut loaded.providers, p.id.clone(), p, path);
    }
    for t in manifest.tools {
        insert_first_wins(&mut loaded.tools, t.name.clone(), t, path);
    }
    for s in manifest.mcp_servers {
        insert_first_wins(&mut loaded.mcp_servers, s.id.clone(), s, path);
    }
    for v in manifest.vector_stores {
        insert_first_wins(&mut loaded.vector_stores, v.id.clone(), v, path);
    }
    for e in manifest.embedding_providers {
        if !loaded.embedding_providers.contains_key(&e.id) {
            loaded.embedding_order.push(e.id.clone());
        }
        insert_first_wins(&mut loaded.embedding_providers, e.id.clone(), e, path);
    }
    for c in manifest.compats {
        insert_first_wins(&mut loaded.compats, c.name.clone(), c, path);
    }
    loaded.process_routes.extend(manifest.process_routes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_first_file_wins_on_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.yaml",
            "providers:\n  - id: p1\n    compat: first\n",
        );
        write(
            dir.path(),
            "b.yaml",
            "providers:\n  - id: p1\n    compat: second\n",
        );
        let loaded = load_dir(dir.path());
        assert_eq!(loaded.providers["p1"].compat, "first");
    }

    #[test]
    fn test_invalid_manifest_skipped_others_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.yaml", ":: not yaml ::[");
        write(
            dir.path(),
            "good.yaml",
            "tools:\n  - name: t1\n    driver: static\n",
        );
        let loaded = load_dir(dir.path());
        assert!(loaded.tools.contains_key("t1"));
    }

    #[test]
    fn test_json_manifests_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plugin.json",
            r#"{"compats": [{"name": "chat-completions", "kind": "http"}]}"#,
        );
        let loaded = load_dir(dir.path());
        assert_eq!(loaded.compats["chat-completions"].kind, "http");
    }

    #[test]
    fn test_nested_directories_scanned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write(
            &dir.path().join("sub"),
            "inner.yaml",
            "vectorStores:\n  - id: docs\n    driver: qdrant\n",
        );
        let loaded = load_dir(dir.path());
        assert!(loaded.vector_stores.contains_key("docs"));
    }

    #[test]
    fn test_embedding_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "a.yaml",
            "embeddingProviders:\n  - id: e1\n    driver: d\n  - id: e2\n    driver: d\n",
        );
        let loaded = load_dir(dir.path());
        assert_eq!(loaded.embedding_order, vec!["e1", "e2"]);
    }
}
