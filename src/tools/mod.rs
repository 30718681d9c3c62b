//! Tool capabilities: registration, schemas, and dispatch.
//!
//! A [`ToolRegistry`] maps tool names to [`ToolHandler`] implementations and
//! hands out immutable [`ToolExecutor`] snapshots for the duration of a run,
//! so concurrent runs never observe each other's registrations. Nodes
//! declare tools by name; a node naming an unregistered tool fails fast at
//! graph-build time (see [`crate::graph::GraphSpec::validate`]), not
//! mid-run.
//!
//! Execution failures are surfaced back into the model's context as tool
//! error results rather than aborting the node, unless the failure is
//! classified fatal ([`ToolError::is_fatal`]).

pub mod remote;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Model-facing description of one tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: Value,
}

/// An executable tool capability.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The schema advertised to the model.
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with parsed JSON arguments.
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Tool resolution and execution errors.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    /// The registry cannot route the name at all.
    #[error("unknown tool: '{name}'")]
    #[diagnostic(code(hiveflow::tools::unknown))]
    Unknown { name: String },

    /// Arguments so malformed the call cannot be dispatched.
    #[error("tool '{name}' rejected arguments: {message}")]
    #[diagnostic(code(hiveflow::tools::invalid_arguments))]
    InvalidArguments { name: String, message: String },

    /// The tool ran and failed; the model may retry or change approach.
    #[error("tool '{name}' failed: {message}")]
    #[diagnostic(code(hiveflow::tools::failed))]
    Failed { name: String, message: String },
}

impl ToolError {
    /// Fatal errors abort the node; recoverable ones are reported back into
    /// the model's context as a tool-error result.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolError::Unknown { .. } | ToolError::InvalidArguments { .. }
        )
    }
}

/// Errors reading a tool configuration document.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolConfigError {
    #[error("failed to read tool config {path}: {source}")]
    #[diagnostic(code(hiveflow::tools::config_io))]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tool config {path}: {source}")]
    #[diagnostic(
        code(hiveflow::tools::config_parse),
        help("The document must be a JSON object with a top-level \"tools\" array.")
    )]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Capability provider resolving tool names to callable handlers.
///
/// Safe to share across concurrent runs; registration takes a write lock,
/// and each run works from an [`executor`](Self::executor) snapshot.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<FxHashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its schema name, replacing any previous
    /// registration of the same name.
    pub fn register(&self, handler: impl ToolHandler + 'static) {
        let handler: Arc<dyn ToolHandler> = Arc::new(handler);
        self.tools
            .write()
            .insert(handler.schema().name.clone(), handler);
    }

    /// Loads externally hosted tool capabilities from a configuration
    /// document. A missing file is not an error and registers nothing.
    ///
    /// Returns the number of tools registered.
    pub fn load_config(&self, path: &Path) -> Result<usize, ToolConfigError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(ToolConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let config: remote::ToolConfigFile =
            serde_json::from_str(&json).map_err(|e| ToolConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        let count = config.tools.len();
        for tool in config.tools {
            self.register(remote::RemoteTool::new(tool));
        }
        Ok(count)
    }

    /// True if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// The set of registered tool names, for graph validation.
    #[must_use]
    pub fn names(&self) -> FxHashSet<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// The schemas of all registered tools.
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> =
            self.tools.read().values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// An immutable dispatch snapshot for one run.
    #[must_use]
    pub fn executor(&self) -> ToolExecutor {
        ToolExecutor {
            tools: Arc::new(self.tools.read().clone()),
        }
    }
}

/// Immutable tool dispatcher captured at run start.
#[derive(Clone)]
pub struct ToolExecutor {
    tools: Arc<FxHashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolExecutor {
    /// Schema lookup for the named subset a node declares.
    #[must_use]
    pub fn schemas_for(&self, names: &[String]) -> Vec<ToolSchema> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n).map(|t| t.schema()))
            .collect()
    }

    /// Dispatches one call to the named tool.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let handler = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Unknown {
                name: name.to_string(),
            })?
            .clone();
        handler.call(args).await
    }
}
