//! Conditioned transitions between workflow nodes.
//!
//! Edges are tagged data: the executor interprets the [`EdgeCondition`] tag
//! against a node's [`NodeOutcome`] through [`select_edge`], a pure function
//! of the edge list, the source node, and the outcome. Given the same graph
//! and outcome it always returns the same edge.

use serde::{Deserialize, Serialize};

/// Guard on an edge, matched against the source node's outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Fires when the node completed its outputs without a fatal error.
    OnSuccess,
    /// Fires when the node's turn loop ended in an unrecoverable error.
    OnFailure,
    /// Unconditional fallback; matches either outcome.
    Always,
}

/// How a node's turn loop ended.
///
/// A node's outcome is [`Success`](NodeOutcome::Success) unless the loop
/// terminated via an unrecoverable tool or model error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    Success,
    Failure,
}

impl EdgeCondition {
    /// Returns true if this condition matches the given outcome.
    #[must_use]
    pub fn matches(self, outcome: NodeOutcome) -> bool {
        match self {
            EdgeCondition::OnSuccess => outcome == NodeOutcome::Success,
            EdgeCondition::OnFailure => outcome == NodeOutcome::Failure,
            EdgeCondition::Always => true,
        }
    }
}

/// A directed, conditioned transition between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Unique id within the graph.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Guard matched against the source node's outcome.
    pub condition: EdgeCondition,
    /// Precedence among edges sharing a source; lower fires first.
    pub priority: i32,
}

impl EdgeSpec {
    #[must_use]
    pub fn new(
        id: &str,
        source: &str,
        target: &str,
        condition: EdgeCondition,
        priority: i32,
    ) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            condition,
            priority,
        }
    }
}

/// Selects the transition to take out of `source` for the given outcome.
///
/// Filters `edges` to those whose source matches and whose condition matches
/// the outcome (with [`EdgeCondition::Always`] as a catch-all), then picks
/// the minimum priority value. Equal priorities resolve by declaration order
/// in `edges`, so repeated evaluation over the same graph yields the same
/// edge. Returns `None` when no edge matches ("no viable transition").
#[must_use]
pub fn select_edge<'a>(
    edges: &'a [EdgeSpec],
    source: &str,
    outcome: NodeOutcome,
) -> Option<&'a EdgeSpec> {
    let mut best: Option<&EdgeSpec> = None;
    for edge in edges {
        if edge.source != source || !edge.condition.matches(outcome) {
            continue;
        }
        // Strict comparison keeps the earliest-declared edge on ties.
        if best.map_or(true, |b| edge.priority < b.priority) {
            best = Some(edge);
        }
    }
    best
}
