use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a run's conversation history.
///
/// Messages carry the dialogue between the engine, the language model, and
/// dispatched tools. Each message has a role (one of the constants on
/// [`Message`]) and text content; assistant messages may additionally carry
/// the tool calls the model requested, and tool messages carry the id of the
/// call they answer.
///
/// # Examples
///
/// ```
/// use hiveflow::message::Message;
///
/// let user_msg = Message::user("Scout hardware stores in Lusaka");
/// let assistant_msg = Message::assistant("Searching now.");
/// let system_msg = Message::system("You are a local business researcher.");
///
/// assert!(user_msg.has_role(Message::USER));
/// assert!(!user_msg.has_role(Message::ASSISTANT));
/// ```
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: String,
    /// The text content of the message.
    pub content: String,
    /// Tool calls requested by an assistant message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool messages, the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A single tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool result message.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Arguments as parsed JSON.
    pub arguments: Value,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// Model response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";
    /// Tool result message role.
    pub const TOOL: &'static str = "tool";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates an assistant message carrying tool-call requests.
    #[must_use]
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Self::ASSISTANT.to_string(),
            content: String::new(),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Creates a tool result message answering the given call id.
    #[must_use]
    pub fn tool(call_id: &str, content: &str) -> Self {
        Self {
            role: Self::TOOL.to_string(),
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Approximate token footprint of this message (4 chars per token).
    ///
    /// Used by the history truncation policy; a rough estimate is enough
    /// because the budget itself is a soft cap on prompt size.
    #[must_use]
    pub fn approx_tokens(&self) -> usize {
        let call_chars: usize = self
            .tool_calls
            .iter()
            .flatten()
            .map(|c| c.name.len() + c.arguments.to_string().len())
            .sum();
        (self.content.len() + call_chars) / 4 + 1
    }
}
