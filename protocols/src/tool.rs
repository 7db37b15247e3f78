//! Tool declarations and name sanitization.
//!
//! Provider APIs restrict tool identifiers to `[A-Za-z0-9_-]`. The
//! adapter sanitizes every outbound name and keeps a per-call alias map
//! so identifiers coming back from the provider can be routed to the
//! tool they originally named.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static INVALID_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// A tool declaration exposed to the model.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON-schema description of the tool's arguments.
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }
}

/// Replace every byte outside `[A-Za-z0-9_-]` with `_`.
///
/// An all-invalid (or empty) name becomes `"tool"` so providers never
/// see an empty identifier.
pub fn sanitize_tool_name(name: &str) -> String {
    let sanitized = INVALID_NAME_CHARS.replace_all(name, "_");
    if sanitized.is_empty() {
        "tool".to_string()
    } else {
        sanitized.into_owned()
    }
}

/// Per-call bidirectional alias map: sanitized name → original name.
///
/// Distinct originals that sanitize to the same identifier get a numeric
/// suffix so the map stays invertible.
#[derive(Debug, Clone, Default)]
pub struct ToolNameMap {
    forward: HashMap<String, String>,
}

impl ToolNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `original`, returning the (possibly suffixed) sanitized
    /// name the provider will see. Registering the same original twice
    /// returns the same sanitized name.
    pub fn register(&mut self, original: &str) -> String {
        let base = sanitize_tool_name(original);
        if let Some(existing) = self.forward.get(&base) {
            if existing == original {
                return base;
            }
        } else {
            self.forward.insert(base.clone(), original.to_string());
            return base;
        }

        let mut n = 2usize;
        loop {
            let candidate = format!("{base}_{n}");
            match self.forward.get(&candidate) {
                Some(existing) if existing == original => return candidate,
                Some(_) => n += 1,
                None => {
                    self.forward.insert(candidate.clone(), original.to_string());
                    return candidate;
                }
            }
        }
    }

    /// Original name for a provider-returned identifier, if registered.
    pub fn resolve(&self, sanitized: &str) -> Option<&str> {
        self.forward.get(sanitized).map(String::as_str)
    }

    /// Resolve with the streaming aggregator's fallback chain:
    /// alias-map hit, else the name itself, else `"unknown"`.
    pub fn resolve_or_fallback(&self, sanitized: &str) -> String {
        if let Some(original) = self.resolve(sanitized) {
            return original.to_string();
        }
        if sanitized.is_empty() {
            "unknown".to_string()
        } else {
            sanitized.to_string()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forward.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
