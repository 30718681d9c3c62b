//! Mutable run state: shared context, conversation history, and budgets.
//!
//! One [`ExecutionState`] is exclusively owned by a single executor run at a
//! time; the [`crate::runtime::Runtime`] holds a durable copy keyed by run
//! id so a new executor instance can resume it.
//!
//! Outputs a node produces are *staged* first and committed to the shared
//! context only once every declared output key is present, so a downstream
//! node either sees all of a node's outputs or none of them.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// Lifecycle marker persisted with the run state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is mid-flight (or was interrupted mid-flight).
    Running,
    /// The run suspended at a pause node and is resumable.
    Paused,
    /// The run reached a terminal node.
    Completed,
    /// The run ended in failure.
    Failed,
}

/// The mutable state of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub run_id: String,
    /// Node the run is currently at.
    pub current_node: String,
    /// Shared key→value context; writes persist across subsequent nodes.
    pub context: FxHashMap<String, Value>,
    /// Outputs of the current node awaiting commit.
    #[serde(default)]
    pub staged_outputs: FxHashMap<String, Value>,
    /// Append-only conversation history (truncated only at prompt-build
    /// time, never in place).
    pub history: Vec<Message>,
    /// Model turns consumed so far, across all nodes.
    pub iterations: u32,
    /// Tool dispatches within the current turn.
    pub tool_calls_this_turn: u32,
    pub status: RunStatus,
    /// Failure description when `status` is [`RunStatus::Failed`].
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionState {
    /// Seeds fresh state at the graph's entry node with the caller's input.
    #[must_use]
    pub fn new(run_id: &str, entry_node: &str, input: FxHashMap<String, Value>) -> Self {
        Self {
            run_id: run_id.to_string(),
            current_node: entry_node.to_string(),
            context: input,
            staged_outputs: FxHashMap::default(),
            history: Vec::new(),
            iterations: 0,
            tool_calls_this_turn: 0,
            status: RunStatus::Running,
            error: None,
        }
    }

    /// The context restricted to a node's declared input keys.
    #[must_use]
    pub fn input_view(&self, input_keys: &[String]) -> FxHashMap<String, Value> {
        input_keys
            .iter()
            .filter_map(|k| self.context.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    /// Stages one output of the current node. Returns the previous staged
    /// value, if any.
    pub fn stage_output(&mut self, key: &str, value: Value) -> Option<Value> {
        self.staged_outputs.insert(key.to_string(), value)
    }

    /// True when every declared output key has been staged.
    #[must_use]
    pub fn outputs_complete(&self, output_keys: &[String]) -> bool {
        output_keys
            .iter()
            .all(|k| self.staged_outputs.contains_key(k))
    }

    /// Moves the staged outputs into the shared context.
    ///
    /// Callers must only invoke this once [`outputs_complete`]
    /// (Self::outputs_complete) holds; the all-or-nothing discipline is what
    /// keeps partial outputs invisible downstream.
    pub fn commit_outputs(&mut self) {
        for (key, value) in self.staged_outputs.drain() {
            self.context.insert(key, value);
        }
    }

    /// Appends a message to the history.
    pub fn push_history(&mut self, message: Message) {
        self.history.push(message);
    }

    /// The history tail fitting within `max_tokens` (approximate), dropping
    /// oldest turns first.
    ///
    /// The cut never lands on a tool result whose initiating assistant
    /// message was dropped; the window slides forward past orphaned tool
    /// messages so the prompt stays well-formed.
    #[must_use]
    pub fn truncated_history(&self, max_tokens: usize) -> Vec<Message> {
        let mut total = 0usize;
        let mut start = self.history.len();
        for (i, message) in self.history.iter().enumerate().rev() {
            let cost = message.approx_tokens();
            if total + cost > max_tokens {
                break;
            }
            total += cost;
            start = i;
        }
        while start < self.history.len() && self.history[start].has_role(Message::TOOL) {
            start += 1;
        }
        self.history[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    /// Fresh state starts at the entry node with the caller's input as
    /// context and zeroed budgets.
    fn test_new_state() {
        let mut input = FxHashMap::default();
        input.insert("business_category".to_string(), json!("law firms"));
        let state = ExecutionState::new("run-1", "discovery", input);
        assert_eq!(state.current_node, "discovery");
        assert_eq!(state.iterations, 0);
        assert_eq!(state.status, RunStatus::Running);
        assert_eq!(state.context["business_category"], json!("law firms"));
    }

    #[test]
    /// The input view exposes only declared keys, silently skipping absent
    /// ones.
    fn test_input_view_restriction() {
        let mut input = FxHashMap::default();
        input.insert("a".to_string(), json!(1));
        input.insert("b".to_string(), json!(2));
        let state = ExecutionState::new("run-1", "n", input);

        let view = state.input_view(&keys(&["a", "missing"]));
        assert_eq!(view.len(), 1);
        assert_eq!(view["a"], json!(1));
    }

    #[test]
    /// Staged outputs become visible in the context only after every
    /// declared key is present and the commit runs.
    fn test_all_or_nothing_commit() {
        let declared = keys(&["list", "notes"]);
        let mut state = ExecutionState::new("run-1", "n", FxHashMap::default());

        state.stage_output("list", json!(["acme"]));
        assert!(!state.outputs_complete(&declared));
        assert!(state.context.is_empty());

        state.stage_output("notes", json!("ok"));
        assert!(state.outputs_complete(&declared));
        state.commit_outputs();
        assert_eq!(state.context.len(), 2);
        assert!(state.staged_outputs.is_empty());
    }

    #[test]
    /// Re-staging a key overwrites the prior value.
    fn test_restage_overwrites() {
        let mut state = ExecutionState::new("run-1", "n", FxHashMap::default());
        assert!(state.stage_output("k", json!(1)).is_none());
        assert_eq!(state.stage_output("k", json!(2)), Some(json!(1)));
    }

    #[test]
    /// Truncation drops oldest messages first and keeps the newest tail.
    fn test_truncation_drops_oldest() {
        let mut state = ExecutionState::new("run-1", "n", FxHashMap::default());
        for i in 0..20 {
            state.push_history(Message::assistant(&format!("turn {i} {}", "x".repeat(100))));
        }
        let full = state.truncated_history(usize::MAX);
        assert_eq!(full.len(), 20);

        let truncated = state.truncated_history(100);
        assert!(truncated.len() < 20);
        assert_eq!(truncated.last(), state.history.last());
        assert!(truncated[0].content.contains(&format!(
            "turn {}",
            20 - truncated.len()
        )));
    }

    #[test]
    /// The truncation window never starts on an orphaned tool result.
    fn test_truncation_skips_orphan_tool_results() {
        let mut state = ExecutionState::new("run-1", "n", FxHashMap::default());
        state.push_history(Message::assistant(&"x".repeat(400)));
        state.push_history(Message::tool("call_1", "result"));
        state.push_history(Message::assistant("done"));

        // Budget fits the tool result and the final message, but not the
        // assistant message that initiated the call.
        let truncated = state.truncated_history(40);
        assert!(!truncated.is_empty());
        assert!(!truncated[0].has_role(Message::TOOL));
    }
}
