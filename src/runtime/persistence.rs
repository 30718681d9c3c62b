/*!
Persistence primitives for serializing/deserializing run state (used by the
file-backed [`Runtime`](crate::runtime::Runtime) and any future durable
backends).

Design goals:
- Provide explicit serde-friendly structs decoupled from internal in-memory
  representations.
- Keep conversion logic localized (From / TryFrom impls) so the runtime
  code is lean and declarative.
- Allow forward compatibility (unknown status encodings are an explicit
  error rather than silent data loss).

This module intentionally does NOT perform I/O. It is pure data
transformation and (de)serialization glue.
*/

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;
use crate::state::{ExecutionState, RunStatus};

/// Complete persisted shape of the in-memory [`ExecutionState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedRun {
    pub run_id: String,
    pub current_node: String,
    #[serde(default)]
    pub context: FxHashMap<String, Value>,
    #[serde(default)]
    pub staged_outputs: FxHashMap<String, Value>,
    #[serde(default)]
    pub history: Vec<Message>,
    pub iterations: u32,
    #[serde(default)]
    pub tool_calls_this_turn: u32,
    /// Status encoded as a string; see [`encode_status`]/[`decode_status`].
    pub status: String,
    /// Failure description for failed runs.
    #[serde(default)]
    pub error: Option<String>,
    /// RFC3339 save time (keeps chrono::DateTime out of the serialized
    /// shape).
    pub saved_at: String,
}

/// Bidirectional conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("unknown run status encoding: '{0}'")]
    #[diagnostic(
        code(hiveflow::persistence::unknown_status),
        help("The stored run was written by an incompatible version.")
    )]
    UnknownStatus(String),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(hiveflow::persistence::serde),
        help("Ensure the stored JSON matches the PersistedRun shape.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Encode a run status into its persisted string form.
#[must_use]
pub fn encode_status(status: &RunStatus) -> String {
    match status {
        RunStatus::Running => "running",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
    .to_string()
}

/// Decode a persisted string form back into a run status.
pub fn decode_status(s: &str) -> Result<RunStatus> {
    match s {
        "running" => Ok(RunStatus::Running),
        "paused" => Ok(RunStatus::Paused),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        other => Err(PersistenceError::UnknownStatus(other.to_string())),
    }
}

impl From<&ExecutionState> for PersistedRun {
    fn from(state: &ExecutionState) -> Self {
        PersistedRun {
            run_id: state.run_id.clone(),
            current_node: state.current_node.clone(),
            context: state.context.clone(),
            staged_outputs: state.staged_outputs.clone(),
            history: state.history.clone(),
            iterations: state.iterations,
            tool_calls_this_turn: state.tool_calls_this_turn,
            status: encode_status(&state.status),
            error: state.error.clone(),
            saved_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedRun> for ExecutionState {
    type Error = PersistenceError;

    fn try_from(p: PersistedRun) -> Result<Self> {
        let status = decode_status(&p.status)?;
        Ok(ExecutionState {
            run_id: p.run_id,
            current_node: p.current_node,
            context: p.context,
            staged_outputs: p.staged_outputs,
            history: p.history,
            iterations: p.iterations,
            tool_calls_this_turn: p.tool_calls_this_turn,
            status,
            error: p.error,
        })
    }
}

/// Serialize a run to its durable JSON form.
pub fn to_json(state: &ExecutionState) -> Result<String> {
    serde_json::to_string_pretty(&PersistedRun::from(state))
        .map_err(|e| PersistenceError::Serde { source: e })
}

/// Deserialize a run from its durable JSON form.
pub fn from_json(json: &str) -> Result<ExecutionState> {
    let persisted: PersistedRun =
        serde_json::from_str(json).map_err(|e| PersistenceError::Serde { source: e })?;
    ExecutionState::try_from(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    /// Run state survives a JSON round trip unchanged.
    fn test_round_trip() {
        let mut input = FxHashMap::default();
        input.insert("business_category".to_string(), json!("law firms"));
        let mut state = ExecutionState::new("run-1", "discovery", input);
        state.iterations = 4;
        state.status = RunStatus::Paused;
        state.stage_output("business_list", json!(["acme"]));
        state.push_history(Message::assistant("searching"));

        let restored = from_json(&to_json(&state).unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    /// Every status encodes and decodes symmetrically; unknown encodings
    /// are rejected rather than coerced.
    fn test_status_encoding() {
        for status in [
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(decode_status(&encode_status(&status)).unwrap(), status);
        }
        assert!(matches!(
            decode_status("archived"),
            Err(PersistenceError::UnknownStatus(_))
        ));
    }

    #[test]
    /// Missing optional fields default to empty collections.
    fn test_forward_compatible_defaults() {
        let json = r#"{
            "run_id": "run-1",
            "current_node": "discovery",
            "iterations": 0,
            "status": "running",
            "saved_at": "2026-01-01T00:00:00Z"
        }"#;
        let state = from_json(json).unwrap();
        assert!(state.context.is_empty());
        assert!(state.history.is_empty());
        assert_eq!(state.tool_calls_this_turn, 0);
    }
}
