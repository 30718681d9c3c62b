//! Language model boundary.
//!
//! The engine is an orchestrator, not an LLM client library: it talks to
//! models through the [`LLMProvider`] trait and nothing else, so any
//! backend (or a scripted test double) can be injected at construction
//! time. One call to [`LLMProvider::complete`] is one turn: the model
//! answers with natural-language content, tool-call requests, or both.

pub mod openai;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::message::{Message, ToolCall};
use crate::tools::ToolSchema;

pub use openai::OpenAiProvider;

/// One model invocation's inputs.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Full prompt: system instruction, context preamble, history.
    pub messages: Vec<Message>,
    /// Schemas of the tools the model may call this turn. Empty forbids
    /// tool use.
    pub tools: Vec<ToolSchema>,
    /// Completion token budget for this turn.
    pub max_tokens: u32,
}

/// One model invocation's result: content, tool calls, or both.
#[derive(Clone, Debug, Default)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionResponse {
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Model invocation failures.
///
/// These surface as node-level failures in the executor and trigger
/// `ON_FAILURE` edge evaluation where one exists.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("model request failed: {source}")]
    #[diagnostic(
        code(hiveflow::llm::http),
        help("Check network reachability and the configured base URL.")
    )]
    Http {
        #[source]
        source: reqwest::Error,
    },

    #[error("model API returned {status}: {message}")]
    #[diagnostic(
        code(hiveflow::llm::api),
        help("Verify the credential and model identifier.")
    )]
    Api { status: u16, message: String },

    #[error("malformed model response: {0}")]
    #[diagnostic(code(hiveflow::llm::malformed))]
    Malformed(String),
}

/// Invokes a language model with a prompt, tool schemas, and a token
/// budget.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run one model turn.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// The model identifier this provider targets.
    fn model(&self) -> &str;
}
