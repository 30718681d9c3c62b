//! The orchestration core: walks a graph turn-by-turn to completion.
//!
//! [`GraphExecutor`] drives one run at a time through its
//! [`execute`](GraphExecutor::execute) method: it loads or seeds run state,
//! runs the current node's turn loop (model calls plus tool dispatches)
//! until the node's declared outputs are set, selects the outgoing edge for
//! the node's outcome, and advances — persisting state before every
//! published event, so an observer never sees a transition that failed to
//! persist.
//!
//! Executors are plain values produced by [`GraphExecutor::new`]; there is
//! no process-wide default instance. Collaborators (runtime, model
//! provider, tool registry, event bus) are injected at construction so test
//! doubles slot in without any global state. Multiple executors may share
//! one registry and one bus across concurrent runs.
//!
//! Suspension points are exactly two: the model call and the tool call.
//! Cancellation is honored at those points only, after the last-committed
//! state has been persisted, leaving the run resumable.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use crate::event_bus::{BusEmitter, Event, EventBus, EventEmitter, RunEvent};
use crate::goal::{Goal, GoalAssessment, GoalError};
use crate::graph::{
    select_edge, EdgeSpec, GraphError, GraphSpec, NodeOutcome, NodeSpec, NodeType,
};
use crate::llm::{CompletionRequest, LLMProvider};
use crate::message::{Message, ToolCall};
use crate::runtime::{Runtime, RuntimeError};
use crate::state::{ExecutionState, RunStatus};
use crate::tools::{ToolExecutor, ToolRegistry, ToolSchema};

/// Name of the built-in output-setting tool injected into every node that
/// declares output keys. Calls to it are intercepted by the executor and
/// never reach the registry.
pub const SET_OUTPUT_TOOL: &str = "set_output";

/// Why a run failed, kept distinct so callers can tell "ran out of budget"
/// from a logic or infrastructure defect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The global iteration budget ran out before a terminal or pause node
    /// was reached.
    BudgetExceeded { iterations: u32 },
    /// The node's outcome had no matching outgoing edge. A configuration
    /// defect surfaced at run time; edge coverage cannot always be verified
    /// statically.
    NoViableTransition { node: String },
    /// The model call itself failed and no `ON_FAILURE` edge absorbed it.
    Model { node: String, message: String },
    /// A tool failure classified as fatal, with no `ON_FAILURE` edge.
    Tool {
        node: String,
        tool: String,
        message: String,
    },
    /// A failure recorded by an earlier execution of this run.
    Persisted { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::BudgetExceeded { iterations } => {
                write!(f, "iteration budget exceeded after {iterations} turns")
            }
            FailureReason::NoViableTransition { node } => {
                write!(f, "no viable transition out of node '{node}'")
            }
            FailureReason::Model { node, message } => {
                write!(f, "model error in node '{node}': {message}")
            }
            FailureReason::Tool {
                node,
                tool,
                message,
            } => write!(f, "fatal tool error in node '{node}' ({tool}): {message}"),
            FailureReason::Persisted { message } => write!(f, "{message}"),
        }
    }
}

/// How a run ended, distinguishing "paused, resumable" from "finished".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// A terminal node completed.
    Completed,
    /// Execution suspended at a pause node (or at a cancellation point);
    /// calling `execute` again with the same run id resumes it.
    Paused { node: String },
    /// The run failed; see the reason.
    Failed(FailureReason),
}

/// Outcome of a run, as seen by the top-level caller.
///
/// Detailed diagnostics flow through the event bus, not this value.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    pub run_id: String,
    /// True only if the run reached a terminal node without fatal error.
    pub success: bool,
    pub error: Option<String>,
    pub status: ExecutionStatus,
    /// Final shared-context snapshot.
    pub context: FxHashMap<String, Value>,
    /// Advisory goal evaluation, present when a terminal node was reached.
    pub goal: Option<GoalAssessment>,
    /// Model turns consumed.
    pub iterations: u32,
}

/// Cooperative cancellation flag, checked at every suspension point.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation at the next suspension point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Errors that prevent or abort a run outside the workflow itself.
///
/// Workflow-level failures (budget, routing, model, tool) come back inside
/// [`ExecutionResult`]; this type covers configuration defects caught
/// before the run starts and infrastructure failures that abort it.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Goal(#[from] GoalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Runtime(#[from] RuntimeError),
}

/// How one node's turn loop ended.
enum TurnOutcome {
    /// All declared outputs staged (or none declared and the model
    /// responded).
    Success,
    /// Unrecoverable model or tool error; `ON_FAILURE` edges apply.
    Failure(FailureReason),
    /// The global iteration budget ran out mid-node.
    BudgetExhausted,
    /// Cancellation was observed at a suspension point.
    Cancelled,
}

/// The orchestration core.
pub struct GraphExecutor {
    runtime: Arc<Runtime>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    emitter: BusEmitter,
    cancel: CancelHandle,
}

impl GraphExecutor {
    /// Builds an executor from its collaborators.
    ///
    /// Each call returns a fresh, independently configurable instance; runs
    /// share nothing through the executor besides the injected registry and
    /// bus, both of which are safe for concurrent use.
    #[must_use]
    pub fn new(
        runtime: Arc<Runtime>,
        llm: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        event_bus: &EventBus,
    ) -> Self {
        Self {
            runtime,
            llm,
            tools,
            emitter: event_bus.emitter(),
            cancel: CancelHandle::default(),
        }
    }

    /// Handle callers can use to request cancellation from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Executes (or resumes) the run identified by `run_id`.
    ///
    /// Configuration defects (malformed graph or goal, unregistered tools)
    /// are returned as `Err` before the run starts; infrastructure failures
    /// abort with `Err` at any point. Everything else — completion, pause,
    /// budget exhaustion, routing and model failures — comes back as an
    /// `Ok(ExecutionResult)`.
    #[instrument(skip(self, graph, goal, input), fields(graph_id = %graph.id), err)]
    pub async fn execute(
        &self,
        graph: &GraphSpec,
        goal: &Goal,
        run_id: &str,
        input: FxHashMap<String, Value>,
    ) -> Result<ExecutionResult, ExecutorError> {
        goal.validate()?;
        graph.validate(&self.tools.names())?;
        let tool_executor = self.tools.executor();

        let (mut state, mut resuming_pause) = match self.runtime.load(run_id).await? {
            Some(state) if state.status == RunStatus::Completed => {
                let assessment = goal.evaluate(&state.context);
                return Ok(ExecutionResult {
                    run_id: run_id.to_string(),
                    success: true,
                    error: None,
                    status: ExecutionStatus::Completed,
                    context: state.context,
                    goal: Some(assessment),
                    iterations: state.iterations,
                });
            }
            Some(state) if state.status == RunStatus::Failed => {
                let message = state
                    .error
                    .clone()
                    .unwrap_or_else(|| "run previously failed".to_string());
                return Ok(ExecutionResult {
                    run_id: run_id.to_string(),
                    success: false,
                    error: Some(message.clone()),
                    status: ExecutionStatus::Failed(FailureReason::Persisted { message }),
                    context: state.context,
                    goal: None,
                    iterations: state.iterations,
                });
            }
            Some(mut state) => {
                let resuming = state.status == RunStatus::Paused;
                state.status = RunStatus::Running;
                (state, resuming)
            }
            None => (
                ExecutionState::new(run_id, &graph.entry_node, input),
                false,
            ),
        };

        self.emit(RunEvent::RunStarted {
            run_id: run_id.to_string(),
            graph_id: graph.id.clone(),
        });

        loop {
            let node =
                graph
                    .node(&state.current_node)
                    .ok_or_else(|| GraphError::UnknownNode {
                        role: "current",
                        node: state.current_node.clone(),
                    })?;

            if graph.is_pause(&node.id) && !resuming_pause {
                return self.pause(&mut state).await;
            }
            resuming_pause = false;

            self.emit(RunEvent::NodeEntered {
                run_id: state.run_id.clone(),
                node_id: node.id.clone(),
                iteration: state.iterations,
            });

            let outcome = self
                .run_node_turns(graph, goal, node, &mut state, &tool_executor)
                .await?;

            match outcome {
                TurnOutcome::Cancelled => {
                    tracing::info!(node = %node.id, "run cancelled at suspension point");
                    return self.pause(&mut state).await;
                }
                TurnOutcome::BudgetExhausted => {
                    let reason = FailureReason::BudgetExceeded {
                        iterations: state.iterations,
                    };
                    return self.fail(&mut state, reason).await;
                }
                TurnOutcome::Success => {
                    state.commit_outputs();

                    if graph.is_terminal(&node.id) {
                        return self.complete(&mut state, goal).await;
                    }

                    match select_edge(&graph.edges, &node.id, NodeOutcome::Success) {
                        Some(edge) => self.advance(&mut state, edge).await?,
                        None => {
                            let reason = FailureReason::NoViableTransition {
                                node: node.id.clone(),
                            };
                            return self.fail(&mut state, reason).await;
                        }
                    }
                }
                TurnOutcome::Failure(reason) => {
                    match select_edge(&graph.edges, &node.id, NodeOutcome::Failure) {
                        Some(edge) => {
                            tracing::warn!(
                                node = %node.id,
                                reason = %reason,
                                "node failed, taking failure edge"
                            );
                            state.staged_outputs.clear();
                            self.advance(&mut state, edge).await?;
                        }
                        None => return self.fail(&mut state, reason).await,
                    }
                }
            }
        }
    }

    /// Runs the current node until its outputs are set, it fails, or a
    /// budget/cancellation ends the loop. One iteration of this loop is one
    /// model turn.
    async fn run_node_turns(
        &self,
        graph: &GraphSpec,
        goal: &Goal,
        node: &NodeSpec,
        state: &mut ExecutionState,
        tool_executor: &ToolExecutor,
    ) -> Result<TurnOutcome, ExecutorError> {
        // Nodes are tagged data; dispatch on the tag.
        match node.node_type {
            NodeType::EventLoop => {}
        }

        let budgets = graph.loop_config;
        let mut force_no_tools = false;

        loop {
            if self.cancel.is_cancelled() {
                self.runtime.save(&state.run_id, state).await?;
                return Ok(TurnOutcome::Cancelled);
            }
            if state.iterations >= budgets.max_iterations {
                return Ok(TurnOutcome::BudgetExhausted);
            }
            state.iterations += 1;
            state.tool_calls_this_turn = 0;

            let tools = if force_no_tools {
                Vec::new()
            } else {
                let mut tools = tool_executor.schemas_for(&node.tools);
                if !node.output_keys.is_empty() {
                    tools.push(set_output_schema(node));
                }
                tools
            };
            force_no_tools = false;

            let request = CompletionRequest {
                messages: self.build_prompt(graph, goal, node, state),
                tools,
                max_tokens: graph.max_tokens,
            };

            tracing::debug!(
                node = %node.id,
                iteration = state.iterations,
                "model turn"
            );
            let response = match self.llm.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    return Ok(TurnOutcome::Failure(FailureReason::Model {
                        node: node.id.clone(),
                        message: e.to_string(),
                    }))
                }
            };

            let mut assistant = Message::assistant(response.content.as_deref().unwrap_or(""));
            if response.has_tool_calls() {
                assistant.tool_calls = Some(response.tool_calls.clone());
            }
            state.push_history(assistant);

            if response.has_tool_calls() {
                for call in &response.tool_calls {
                    if state.tool_calls_this_turn >= budgets.max_tool_calls_per_turn {
                        state.push_history(Message::tool(
                            &call.id,
                            "tool budget for this turn exhausted; respond without further tool use",
                        ));
                        force_no_tools = true;
                        continue;
                    }
                    state.tool_calls_this_turn += 1;

                    if call.name == SET_OUTPUT_TOOL {
                        self.handle_set_output(node, state, call);
                        continue;
                    }

                    self.emit(RunEvent::ToolInvoked {
                        run_id: state.run_id.clone(),
                        node_id: node.id.clone(),
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                    });
                    match tool_executor.execute(&call.name, call.arguments.clone()).await {
                        Ok(result) => {
                            self.emit(RunEvent::ToolCompleted {
                                run_id: state.run_id.clone(),
                                node_id: node.id.clone(),
                                tool: call.name.clone(),
                                call_id: call.id.clone(),
                                ok: true,
                            });
                            state.push_history(Message::tool(&call.id, &result.to_string()));
                        }
                        Err(e) => {
                            self.emit(RunEvent::ToolCompleted {
                                run_id: state.run_id.clone(),
                                node_id: node.id.clone(),
                                tool: call.name.clone(),
                                call_id: call.id.clone(),
                                ok: false,
                            });
                            if e.is_fatal() {
                                return Ok(TurnOutcome::Failure(FailureReason::Tool {
                                    node: node.id.clone(),
                                    tool: call.name.clone(),
                                    message: e.to_string(),
                                }));
                            }
                            // Recoverable: report back into the model's
                            // context; it may retry or change approach.
                            state.push_history(Message::tool(
                                &call.id,
                                &json!({"error": e.to_string()}).to_string(),
                            ));
                        }
                    }
                }
            }

            self.runtime.save(&state.run_id, state).await?;

            if state.outputs_complete(&node.output_keys) {
                if node.output_keys.is_empty() {
                    // Output-less nodes complete on a plain response.
                    if !response.has_tool_calls() {
                        return Ok(TurnOutcome::Success);
                    }
                } else {
                    return Ok(TurnOutcome::Success);
                }
            } else if !response.has_tool_calls() {
                // The model stopped without finishing its outputs; remind it
                // what is still missing and run another turn.
                let missing: Vec<&str> = node
                    .output_keys
                    .iter()
                    .filter(|k| !state.staged_outputs.contains_key(*k))
                    .map(String::as_str)
                    .collect();
                state.push_history(Message::user(&format!(
                    "Required outputs not yet set: {}. Record each with the {SET_OUTPUT_TOOL} tool.",
                    missing.join(", ")
                )));
            }
        }
    }

    /// Intercepts a `set_output` call: validates the key against the node's
    /// declared outputs, stages the value, and answers the model.
    fn handle_set_output(&self, node: &NodeSpec, state: &mut ExecutionState, call: &ToolCall) {
        let key = call.arguments.get("key").and_then(Value::as_str);
        let value = call.arguments.get("value");
        let (key, value) = match (key, value) {
            (Some(key), Some(value)) => (key, value.clone()),
            _ => {
                state.push_history(Message::tool(
                    &call.id,
                    &json!({"error": "set_output requires {\"key\": string, \"value\": any}"})
                        .to_string(),
                ));
                return;
            }
        };

        if !node.output_keys.iter().any(|k| k == key) {
            state.push_history(Message::tool(
                &call.id,
                &json!({
                    "error": format!(
                        "'{key}' is not an output of this step; declared outputs: {}",
                        node.output_keys.join(", ")
                    )
                })
                .to_string(),
            ));
            return;
        }

        state.stage_output(key, value);
        self.emit(RunEvent::NodeOutputSet {
            run_id: state.run_id.clone(),
            node_id: node.id.clone(),
            key: key.to_string(),
        });
        state.push_history(Message::tool(&call.id, &json!({"ok": true}).to_string()));
    }

    /// Builds the prompt for one turn: the node's instruction (plus goal
    /// constraints and output directions), the context restricted to the
    /// node's input keys, and the truncated running history.
    fn build_prompt(
        &self,
        graph: &GraphSpec,
        goal: &Goal,
        node: &NodeSpec,
        state: &ExecutionState,
    ) -> Vec<Message> {
        let mut system = node.system_prompt.clone();
        if let Some(preamble) = goal.constraint_preamble() {
            system.push_str("\n\n");
            system.push_str(&preamble);
        }
        if !node.output_keys.is_empty() {
            system.push_str(&format!(
                "\n\nBefore finishing this step, record each required output ({}) with the {SET_OUTPUT_TOOL} tool.",
                node.output_keys.join(", ")
            ));
        }

        let mut messages = vec![Message::system(&system)];

        let view = state.input_view(&node.input_keys);
        if !view.is_empty() {
            let mut keys: Vec<&String> = view.keys().collect();
            keys.sort();
            let mut block = String::from("Context for this step:\n");
            for key in keys {
                block.push_str(&format!("{key}: {}\n", view[key]));
            }
            messages.push(Message::user(&block));
        }

        messages.extend(state.truncated_history(graph.loop_config.max_history_tokens));
        messages
    }

    /// Advances to the edge's target: persist first, then publish.
    async fn advance(
        &self,
        state: &mut ExecutionState,
        edge: &EdgeSpec,
    ) -> Result<(), ExecutorError> {
        let from = state.current_node.clone();
        state.current_node = edge.target.clone();
        state.tool_calls_this_turn = 0;
        self.runtime.save(&state.run_id, state).await?;
        self.emit(RunEvent::NodeTransition {
            run_id: state.run_id.clone(),
            from,
            to: edge.target.clone(),
            edge_id: edge.id.clone(),
        });
        Ok(())
    }

    /// Suspends the run at the current node, resumable later.
    async fn pause(
        &self,
        state: &mut ExecutionState,
    ) -> Result<ExecutionResult, ExecutorError> {
        state.status = RunStatus::Paused;
        self.runtime.save(&state.run_id, state).await?;
        self.emit(RunEvent::RunPaused {
            run_id: state.run_id.clone(),
            node_id: state.current_node.clone(),
        });
        Ok(ExecutionResult {
            run_id: state.run_id.clone(),
            success: false,
            error: None,
            status: ExecutionStatus::Paused {
                node: state.current_node.clone(),
            },
            context: state.context.clone(),
            goal: None,
            iterations: state.iterations,
        })
    }

    /// Finishes the run at a terminal node, evaluating the goal rubric.
    async fn complete(
        &self,
        state: &mut ExecutionState,
        goal: &Goal,
    ) -> Result<ExecutionResult, ExecutorError> {
        let assessment = goal.evaluate(&state.context);
        state.status = RunStatus::Completed;
        self.runtime.save(&state.run_id, state).await?;
        self.emit(RunEvent::RunCompleted {
            run_id: state.run_id.clone(),
            score: Some(assessment.score),
        });
        tracing::info!(
            run_id = %state.run_id,
            score = assessment.score,
            iterations = state.iterations,
            "run completed"
        );
        Ok(ExecutionResult {
            run_id: state.run_id.clone(),
            success: true,
            error: None,
            status: ExecutionStatus::Completed,
            context: state.context.clone(),
            goal: Some(assessment),
            iterations: state.iterations,
        })
    }

    /// Fails the run with a workflow-level reason.
    async fn fail(
        &self,
        state: &mut ExecutionState,
        reason: FailureReason,
    ) -> Result<ExecutionResult, ExecutorError> {
        let message = reason.to_string();
        state.status = RunStatus::Failed;
        state.error = Some(message.clone());
        state.staged_outputs.clear();
        self.runtime.save(&state.run_id, state).await?;
        self.emit(RunEvent::RunFailed {
            run_id: state.run_id.clone(),
            reason: message.clone(),
        });
        tracing::warn!(run_id = %state.run_id, reason = %message, "run failed");
        Ok(ExecutionResult {
            run_id: state.run_id.clone(),
            success: false,
            error: Some(message),
            status: ExecutionStatus::Failed(reason),
            context: state.context.clone(),
            goal: None,
            iterations: state.iterations,
        })
    }

    /// Event emission never fails a run; a dead bus is logged and ignored.
    fn emit(&self, payload: RunEvent) {
        if let Err(e) = self.emitter.emit(Event::new(payload)) {
            tracing::debug!(error = %e, "event emission failed");
        }
    }
}

fn set_output_schema(node: &NodeSpec) -> ToolSchema {
    ToolSchema {
        name: SET_OUTPUT_TOOL.to_string(),
        description: format!(
            "Record one of this step's required outputs ({}).",
            node.output_keys.join(", ")
        ),
        parameters: json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "enum": node.output_keys},
                "value": {}
            },
            "required": ["key", "value"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Failure reasons render distinct, stable descriptions.
    fn test_failure_reason_display() {
        let budget = FailureReason::BudgetExceeded { iterations: 30 };
        assert_eq!(
            budget.to_string(),
            "iteration budget exceeded after 30 turns"
        );
        let routing = FailureReason::NoViableTransition {
            node: "audit".to_string(),
        };
        assert!(routing.to_string().contains("audit"));
    }

    #[test]
    /// The cancel handle trips exactly once and is observable from clones.
    fn test_cancel_handle() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    /// The injected set_output schema names every declared output key.
    fn test_set_output_schema() {
        let node = NodeSpec::new("discovery", "Discovery")
            .with_output_keys(&["business_list", "notes"]);
        let schema = set_output_schema(&node);
        assert_eq!(schema.name, SET_OUTPUT_TOOL);
        assert_eq!(
            schema.parameters["properties"]["key"]["enum"],
            json!(["business_list", "notes"])
        );
    }
}
