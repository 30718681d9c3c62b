//! Externally hosted tool capabilities.
//!
//! A tool configuration document (conventionally `tools.json`, discovered
//! next to the graph definition) declares HTTP-hosted tools to register
//! before a run starts. Each entry becomes a [`RemoteTool`]: arguments are
//! POSTed to the endpoint as JSON, and the JSON response body becomes the
//! tool result.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ToolError, ToolHandler, ToolSchema};

/// Top-level shape of the tool configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolConfigFile {
    #[serde(default)]
    pub tools: Vec<RemoteToolConfig>,
}

/// One externally hosted tool declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// URL the tool's arguments are POSTed to.
    pub endpoint: String,
    /// JSON Schema for the arguments object; defaults to an open object.
    #[serde(default = "default_parameters")]
    pub parameters: Value,
    /// Extra headers sent with every call (e.g. an authorization token).
    #[serde(default)]
    pub headers: FxHashMap<String, String>,
}

fn default_parameters() -> Value {
    json!({"type": "object"})
}

/// HTTP-backed tool capability.
pub struct RemoteTool {
    config: RemoteToolConfig,
    client: reqwest::Client,
}

impl RemoteTool {
    #[must_use]
    pub fn new(config: RemoteToolConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ToolHandler for RemoteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            parameters: self.config.parameters.clone(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        if !args.is_object() {
            return Err(ToolError::InvalidArguments {
                name: self.config.name.clone(),
                message: "arguments must be a JSON object".to_string(),
            });
        }

        let mut request = self.client.post(&self.config.endpoint).json(&args);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| ToolError::Failed {
            name: self.config.name.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Failed {
                name: self.config.name.clone(),
                message: format!("endpoint returned {status}: {body}"),
            });
        }

        response.json().await.map_err(|e| ToolError::Failed {
            name: self.config.name.clone(),
            message: format!("invalid JSON response: {e}"),
        })
    }
}
