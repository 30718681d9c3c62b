use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle payload of a run event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        graph_id: String,
    },
    NodeEntered {
        run_id: String,
        node_id: String,
        iteration: u32,
    },
    ToolInvoked {
        run_id: String,
        node_id: String,
        tool: String,
        call_id: String,
    },
    ToolCompleted {
        run_id: String,
        node_id: String,
        tool: String,
        call_id: String,
        ok: bool,
    },
    NodeOutputSet {
        run_id: String,
        node_id: String,
        key: String,
    },
    NodeTransition {
        run_id: String,
        from: String,
        to: String,
        edge_id: String,
    },
    RunPaused {
        run_id: String,
        node_id: String,
    },
    RunCompleted {
        run_id: String,
        /// Advisory weighted goal score, when a goal was evaluated.
        score: Option<f64>,
    },
    RunFailed {
        run_id: String,
        reason: String,
    },
}

/// A timestamped lifecycle event published to the bus.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: RunEvent,
}

impl Event {
    #[must_use]
    pub fn new(payload: RunEvent) -> Self {
        Self {
            at: Utc::now(),
            payload,
        }
    }

    /// Run id this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        match &self.payload {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::NodeEntered { run_id, .. }
            | RunEvent::ToolInvoked { run_id, .. }
            | RunEvent::ToolCompleted { run_id, .. }
            | RunEvent::NodeOutputSet { run_id, .. }
            | RunEvent::NodeTransition { run_id, .. }
            | RunEvent::RunPaused { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunFailed { run_id, .. } => run_id,
        }
    }

    /// Short label identifying the event kind, stable across versions.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::NodeEntered { .. } => "node_entered",
            RunEvent::ToolInvoked { .. } => "tool_invoked",
            RunEvent::ToolCompleted { .. } => "tool_completed",
            RunEvent::NodeOutputSet { .. } => "node_output_set",
            RunEvent::NodeTransition { .. } => "node_transition",
            RunEvent::RunPaused { .. } => "run_paused",
            RunEvent::RunCompleted { .. } => "run_completed",
            RunEvent::RunFailed { .. } => "run_failed",
        }
    }

    /// Compact JSON form for structured sinks.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            RunEvent::RunStarted { run_id, graph_id } => {
                write!(f, "[{run_id}] run started (graph {graph_id})")
            }
            RunEvent::NodeEntered {
                run_id,
                node_id,
                iteration,
            } => write!(f, "[{run_id}@{node_id}] entered (iteration {iteration})"),
            RunEvent::ToolInvoked {
                run_id,
                node_id,
                tool,
                call_id,
            } => write!(f, "[{run_id}@{node_id}] tool {tool} invoked ({call_id})"),
            RunEvent::ToolCompleted {
                run_id,
                node_id,
                tool,
                ok,
                ..
            } => {
                let status = if *ok { "ok" } else { "error" };
                write!(f, "[{run_id}@{node_id}] tool {tool} completed ({status})")
            }
            RunEvent::NodeOutputSet {
                run_id,
                node_id,
                key,
            } => write!(f, "[{run_id}@{node_id}] output '{key}' set"),
            RunEvent::NodeTransition {
                run_id,
                from,
                to,
                edge_id,
            } => write!(f, "[{run_id}] {from} -> {to} (edge {edge_id})"),
            RunEvent::RunPaused { run_id, node_id } => {
                write!(f, "[{run_id}] paused at {node_id}")
            }
            RunEvent::RunCompleted { run_id, score } => match score {
                Some(score) => write!(f, "[{run_id}] run completed (score {score:.2})"),
                None => write!(f, "[{run_id}] run completed"),
            },
            RunEvent::RunFailed { run_id, reason } => {
                write!(f, "[{run_id}] run failed: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Every payload variant reports its run id and a stable kind label.
    fn test_run_id_and_kind() {
        let event = Event::new(RunEvent::NodeTransition {
            run_id: "run-1".to_string(),
            from: "discovery".to_string(),
            to: "audit".to_string(),
            edge_id: "discovery-to-audit".to_string(),
        });
        assert_eq!(event.run_id(), "run-1");
        assert_eq!(event.kind(), "node_transition");
    }

    #[test]
    /// JSON serialization flattens the payload with an "event" tag.
    fn test_json_shape() {
        let event = Event::new(RunEvent::RunFailed {
            run_id: "run-1".to_string(),
            reason: "budget exceeded".to_string(),
        });
        let json = event.to_json_string().expect("serialize");
        assert!(json.contains("\"event\":\"run_failed\""));
        assert!(json.contains("budget exceeded"));
    }

    #[test]
    /// Display renders a single human-readable line per event.
    fn test_display() {
        let event = Event::new(RunEvent::RunPaused {
            run_id: "run-1".to_string(),
            node_id: "review".to_string(),
        });
        assert_eq!(event.to_string(), "[run-1] paused at review");
    }
}
