//! Declarative workflow graphs: nodes, conditioned edges, and budgets.
//!
//! A workflow is tagged data, not code: [`NodeSpec`] describes one step,
//! [`EdgeSpec`] a conditioned transition, and [`GraphSpec`] the whole graph
//! with its entry/terminal/pause sets and [`LoopConfig`] budgets. The
//! executor interprets these tags; see [`crate::executor`].

pub mod edges;
pub mod spec;

pub use edges::{select_edge, EdgeCondition, EdgeSpec, NodeOutcome};
pub use spec::{GraphError, GraphSpec, LoopConfig, NodeSpec, NodeType};
