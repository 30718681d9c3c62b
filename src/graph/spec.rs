//! Static workflow definitions and build-time validation.
//!
//! [`GraphSpec`] is the complete declarative description of a workflow:
//! nodes, edges, entry/terminal/pause sets, and loop budgets. Specs are
//! immutable for the duration of a run; the executor interprets them but
//! never mutates them. [`GraphSpec::validate`] rejects malformed graphs
//! (dangling references, unregistered tools, duplicate ids) before a run
//! starts, so those defects never surface mid-run.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::edges::EdgeSpec;

/// Budgets bounding a run's turn loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum model turns across the whole run.
    pub max_iterations: u32,
    /// Maximum tool dispatches within a single turn.
    pub max_tool_calls_per_turn: u32,
    /// Approximate token cap on the history portion of each prompt.
    pub max_history_tokens: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            max_tool_calls_per_turn: 10,
            max_history_tokens: 64_000,
        }
    }
}

/// Discriminates how the executor drives a node.
///
/// Nodes are tagged data rather than polymorphic objects; the executor
/// dispatches on this tag through a fixed match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Conversational turn loop: repeated model turns with tool use until
    /// the node's declared outputs are set or a budget runs out.
    #[default]
    EventLoop,
}

/// Declarative description of one workflow step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique id within the graph.
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub node_type: NodeType,
    /// Context keys exposed to this node's prompt.
    #[serde(default)]
    pub input_keys: Vec<String>,
    /// Context keys this node must populate before leaving.
    #[serde(default)]
    pub output_keys: Vec<String>,
    /// Model-facing instruction for this step.
    pub system_prompt: String,
    /// Names of registered tools this node may use.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Whether this node's responses are shown to the user.
    #[serde(default)]
    pub client_facing: bool,
}

impl NodeSpec {
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            node_type: NodeType::EventLoop,
            input_keys: Vec::new(),
            output_keys: Vec::new(),
            system_prompt: String::new(),
            tools: Vec::new(),
            client_facing: false,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn with_input_keys(mut self, keys: &[&str]) -> Self {
        self.input_keys = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_output_keys(mut self, keys: &[&str]) -> Self {
        self.output_keys = keys.iter().map(|k| (*k).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| (*t).to_string()).collect();
        self
    }

    #[must_use]
    pub fn client_facing(mut self) -> Self {
        self.client_facing = true;
        self
    }
}

/// The complete static workflow a run executes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub id: String,
    /// Id of the goal this graph serves.
    pub goal_id: String,
    pub version: String,
    /// Node the run starts at.
    pub entry_node: String,
    /// Named alternative entry points ("start" conventionally maps to
    /// `entry_node`).
    #[serde(default)]
    pub entry_points: FxHashMap<String, String>,
    /// Nodes whose completion ends the run.
    pub terminal_nodes: Vec<String>,
    /// Nodes at which execution suspends awaiting external input.
    #[serde(default)]
    pub pause_nodes: Vec<String>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    /// Model identifier used when the provider does not override it.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Per-turn completion token budget handed to the provider.
    pub max_tokens: u32,
    pub loop_config: LoopConfig,
}

/// Malformed-graph errors, detected at build time.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph '{graph}' declares node id '{id}' more than once")]
    #[diagnostic(code(hiveflow::graph::duplicate_node))]
    DuplicateNode { graph: String, id: String },

    #[error("graph '{graph}' declares edge id '{id}' more than once")]
    #[diagnostic(code(hiveflow::graph::duplicate_edge))]
    DuplicateEdge { graph: String, id: String },

    #[error("edge '{edge}' references unknown node '{node}'")]
    #[diagnostic(
        code(hiveflow::graph::dangling_edge),
        help("Edge sources and targets must name declared nodes.")
    )]
    DanglingEdge { edge: String, node: String },

    #[error("{role} node '{node}' is not declared in the graph")]
    #[diagnostic(code(hiveflow::graph::unknown_node))]
    UnknownNode { role: &'static str, node: String },

    #[error("node '{node}' references unregistered tool '{tool}'")]
    #[diagnostic(
        code(hiveflow::graph::unregistered_tool),
        help("Register the tool before executing, or drop it from the node.")
    )]
    UnregisteredTool { node: String, tool: String },

    #[error("graph '{graph}' declares no terminal nodes")]
    #[diagnostic(
        code(hiveflow::graph::no_terminals),
        help("A run can only complete at a terminal node.")
    )]
    NoTerminalNodes { graph: String },
}

impl GraphSpec {
    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns true if `id` names a terminal node.
    #[must_use]
    pub fn is_terminal(&self, id: &str) -> bool {
        self.terminal_nodes.iter().any(|n| n == id)
    }

    /// Returns true if `id` names a pause node.
    #[must_use]
    pub fn is_pause(&self, id: &str) -> bool {
        self.pause_nodes.iter().any(|n| n == id)
    }

    /// Validates the graph against its structural invariants and the set of
    /// registered tool names.
    ///
    /// Checks: unique node and edge ids, entry/terminal/pause membership,
    /// edge endpoints referencing declared nodes, at least one terminal
    /// node, and every node tool resolving to a registered capability.
    /// Edge *coverage* (an edge for every reachable outcome) is not checked
    /// here; gaps surface at run time as a no-viable-transition failure.
    pub fn validate(&self, registered_tools: &FxHashSet<String>) -> Result<(), GraphError> {
        let mut node_ids = FxHashSet::default();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode {
                    graph: self.id.clone(),
                    id: node.id.clone(),
                });
            }
        }

        if !node_ids.contains(self.entry_node.as_str()) {
            return Err(GraphError::UnknownNode {
                role: "entry",
                node: self.entry_node.clone(),
            });
        }
        for (_, target) in &self.entry_points {
            if !node_ids.contains(target.as_str()) {
                return Err(GraphError::UnknownNode {
                    role: "entry point",
                    node: target.clone(),
                });
            }
        }
        if self.terminal_nodes.is_empty() {
            return Err(GraphError::NoTerminalNodes {
                graph: self.id.clone(),
            });
        }
        for node in &self.terminal_nodes {
            if !node_ids.contains(node.as_str()) {
                return Err(GraphError::UnknownNode {
                    role: "terminal",
                    node: node.clone(),
                });
            }
        }
        for node in &self.pause_nodes {
            if !node_ids.contains(node.as_str()) {
                return Err(GraphError::UnknownNode {
                    role: "pause",
                    node: node.clone(),
                });
            }
        }

        let mut edge_ids = FxHashSet::default();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(GraphError::DuplicateEdge {
                    graph: self.id.clone(),
                    id: edge.id.clone(),
                });
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_ids.contains(endpoint.as_str()) {
                    return Err(GraphError::DanglingEdge {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
        }

        for node in &self.nodes {
            for tool in &node.tools {
                if !registered_tools.contains(tool) {
                    return Err(GraphError::UnregisteredTool {
                        node: node.id.clone(),
                        tool: tool.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edges::EdgeCondition;

    fn two_node_graph() -> GraphSpec {
        GraphSpec {
            id: "g".to_string(),
            goal_id: "goal".to_string(),
            version: "0.1.0".to_string(),
            entry_node: "a".to_string(),
            entry_points: FxHashMap::default(),
            terminal_nodes: vec!["b".to_string()],
            pause_nodes: vec![],
            nodes: vec![NodeSpec::new("a", "A"), NodeSpec::new("b", "B")],
            edges: vec![EdgeSpec::new("a-b", "a", "b", EdgeCondition::OnSuccess, 1)],
            default_model: None,
            max_tokens: 4096,
            loop_config: LoopConfig::default(),
        }
    }

    #[test]
    /// A well-formed graph validates with no registered tools.
    fn test_valid_graph() {
        let graph = two_node_graph();
        assert!(graph.validate(&FxHashSet::default()).is_ok());
        assert!(graph.is_terminal("b"));
        assert!(!graph.is_terminal("a"));
        assert!(graph.node("a").is_some());
        assert!(graph.node("missing").is_none());
    }

    #[test]
    /// Duplicate node ids are rejected.
    fn test_duplicate_node() {
        let mut graph = two_node_graph();
        graph.nodes.push(NodeSpec::new("a", "A again"));
        assert!(matches!(
            graph.validate(&FxHashSet::default()),
            Err(GraphError::DuplicateNode { .. })
        ));
    }

    #[test]
    /// Edges must reference declared nodes.
    fn test_dangling_edge() {
        let mut graph = two_node_graph();
        graph
            .edges
            .push(EdgeSpec::new("a-x", "a", "x", EdgeCondition::Always, 9));
        assert!(matches!(
            graph.validate(&FxHashSet::default()),
            Err(GraphError::DanglingEdge { .. })
        ));
    }

    #[test]
    /// Entry, terminal, and pause nodes must all be declared.
    fn test_membership_checks() {
        let mut graph = two_node_graph();
        graph.entry_node = "missing".to_string();
        assert!(matches!(
            graph.validate(&FxHashSet::default()),
            Err(GraphError::UnknownNode { role: "entry", .. })
        ));

        let mut graph = two_node_graph();
        graph.pause_nodes.push("missing".to_string());
        assert!(matches!(
            graph.validate(&FxHashSet::default()),
            Err(GraphError::UnknownNode { role: "pause", .. })
        ));

        let mut graph = two_node_graph();
        graph.terminal_nodes.clear();
        assert!(matches!(
            graph.validate(&FxHashSet::default()),
            Err(GraphError::NoTerminalNodes { .. })
        ));
    }

    #[test]
    /// A node naming an unregistered tool fails fast at build time.
    fn test_unregistered_tool() {
        let mut graph = two_node_graph();
        graph.nodes[0] = NodeSpec::new("a", "A").with_tools(&["web_search"]);
        assert!(matches!(
            graph.validate(&FxHashSet::default()),
            Err(GraphError::UnregisteredTool { .. })
        ));

        let mut registered = FxHashSet::default();
        registered.insert("web_search".to_string());
        assert!(graph.validate(&registered).is_ok());
    }
}
