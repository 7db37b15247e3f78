//! Built-in function-tool drivers.
//!
//! `http` posts the model-supplied arguments to a configured endpoint
//! and returns its JSON body; `static` returns a fixed value from the
//! manifest (handy for wiring checks and demos).

use adapter_protocol::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RegistryError, RegistryResult};
use crate::interfaces::{ToolError, ToolExecutor};
use crate::manifest::FunctionToolEntry;

/// Posts arguments as JSON to `options.url`.
#[derive(Debug)]
pub struct HttpToolExecutor {
    name: String,
    description: Option<String>,
    parameters: Value,
    url: String,
    client: reqwest::Client,
}

impl HttpToolExecutor {
    pub fn from_entry(entry: &FunctionToolEntry) -> RegistryResult<Self> {
        let url = entry
            .options
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RegistryError::Manifest(format!(
                    "http tool '{}' is missing options.url",
                    entry.name
                ))
            })?;
        Ok(Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            parameters: entry.parameters.clone(),
            url: url.to_string(),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let response = self.client.post(&self.url).json(&arguments).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "endpoint returned {status}: {body}"
            )));
        }
        Ok(response.json().await?)
    }
}

/// Returns `options.result` unchanged.
pub struct StaticToolExecutor {
    name: String,
    description: Option<String>,
    parameters: Value,
    result: Value,
}

impl StaticToolExecutor {
    pub fn from_entry(entry: &FunctionToolEntry) -> Self {
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            parameters: entry.parameters.clone(),
            result: entry.options.get("result").cloned().unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl ToolExecutor for StaticToolExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<Value, ToolError> {
        Ok(self.result.clone())
    }
}
