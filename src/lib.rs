//! # Hiveflow: Goal-driven Agent Graph Execution
//!
//! Hiveflow interprets a static workflow graph — nodes bound to model
//! instructions and tools, edges guarded by outcome conditions — and drives
//! it to completion through repeated language-model turns and tool calls,
//! while enforcing budgets, persisting run state, and emitting lifecycle
//! events.
//!
//! ## Core Concepts
//!
//! - **Nodes**: declarative steps ([`graph::NodeSpec`]) with declared input
//!   and output context keys and permitted tools
//! - **Edges**: conditioned transitions ([`graph::EdgeSpec`]) selected
//!   deterministically by priority
//! - **Goal**: a weighted success rubric ([`goal::Goal`]) evaluated when a
//!   run reaches a terminal node
//! - **Runtime**: durable, path-keyed run state ([`runtime::Runtime`]) that
//!   survives process restarts
//! - **Executor**: the turn loop ([`executor::GraphExecutor`]) walking the
//!   graph under iteration/tool/history budgets
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hiveflow::event_bus::EventBus;
//! use hiveflow::executor::GraphExecutor;
//! use hiveflow::goal::{Goal, SuccessCriterion};
//! use hiveflow::graph::{GraphSpec, LoopConfig, NodeSpec};
//! use hiveflow::llm::OpenAiProvider;
//! use hiveflow::runtime::Runtime;
//! use hiveflow::tools::ToolRegistry;
//! use rustc_hash::FxHashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let goal = Goal {
//!     id: "answer".into(),
//!     name: "Answer".into(),
//!     description: "Answer the question".into(),
//!     success_criteria: vec![SuccessCriterion {
//!         id: "answered".into(),
//!         description: "An answer was produced".into(),
//!         metric: "answer".into(),
//!         target: "non-empty".into(),
//!         weight: 1.0,
//!     }],
//!     constraints: vec![],
//! };
//!
//! let graph = GraphSpec {
//!     id: "answer-graph".into(),
//!     goal_id: goal.id.clone(),
//!     version: "0.1.0".into(),
//!     entry_node: "answer".into(),
//!     entry_points: FxHashMap::default(),
//!     terminal_nodes: vec!["answer".into()],
//!     pause_nodes: vec![],
//!     nodes: vec![NodeSpec::new("answer", "Answer")
//!         .with_system_prompt("Answer the user's question.")
//!         .with_output_keys(&["answer"])],
//!     edges: vec![],
//!     default_model: None,
//!     max_tokens: 4096,
//!     loop_config: LoopConfig::default(),
//! };
//!
//! let event_bus = EventBus::default();
//! event_bus.listen_for_events();
//!
//! let executor = GraphExecutor::new(
//!     Arc::new(Runtime::new("/tmp/hiveflow")),
//!     Arc::new(OpenAiProvider::from_env("gpt-4o-mini")),
//!     Arc::new(ToolRegistry::new()),
//!     &event_bus,
//! );
//!
//! let mut input = FxHashMap::default();
//! input.insert("question".to_string(), serde_json::json!("What is Rust?"));
//! let result = executor.execute(&graph, &goal, "run-1", input).await?;
//! assert!(result.success || result.error.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`message`] - Conversation message primitives
//! - [`goal`] - Success rubrics and terminal evaluation
//! - [`graph`] - Workflow definition and build-time validation
//! - [`state`] - Mutable run state and output staging
//! - [`runtime`] - Durable run state persistence
//! - [`event_bus`] - Lifecycle event fan-out with pluggable sinks
//! - [`llm`] - Language model boundary and HTTP provider
//! - [`tools`] - Tool registration, schemas, and dispatch
//! - [`executor`] - The orchestration core

pub mod event_bus;
pub mod executor;
pub mod goal;
pub mod graph;
pub mod llm;
pub mod message;
pub mod runtime;
pub mod state;
pub mod tools;
pub mod utils;
