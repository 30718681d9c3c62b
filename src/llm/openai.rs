//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` wire protocol with function-calling
//! tools, which most hosted and local model servers expose. Configuration
//! is model id + optional credential + optional base-url override; the
//! credential falls back to `OPENAI_API_KEY` in the environment.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, ToolCall};
use crate::tools::ToolSchema;

use super::{CompletionRequest, CompletionResponse, LLMProvider, LlmError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP provider for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Reads the credential from `OPENAI_API_KEY` if present.
    #[must_use]
    pub fn from_env(model: &str) -> Self {
        let mut provider = Self::new(model);
        provider.api_key = std::env::var("OPENAI_API_KEY").ok();
        provider
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn convert_message(message: &Message) -> WireMessage {
        WireMessage {
            role: message.role.clone(),
            content: if message.content.is_empty() && message.tool_calls.is_some() {
                None
            } else {
                Some(message.content.clone())
            },
            tool_calls: message.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: c.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunction {
                            name: c.name.clone(),
                            arguments: c.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: message.tool_call_id.clone(),
        }
    }

    fn convert_tool(schema: &ToolSchema) -> WireTool {
        WireTool {
            kind: "function".to_string(),
            function: WireToolFunction {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.parameters.clone(),
            },
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = WireRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(request.tools.iter().map(Self::convert_tool).collect())
            },
        };

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| LlmError::Http { source: e })?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("response contained no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| {
                // Providers serialize arguments as a JSON string; a bare
                // string that fails to parse is kept verbatim.
                let arguments = serde_json::from_str(&c.function.arguments)
                    .unwrap_or(Value::String(c.function.arguments));
                ToolCall {
                    id: c.id,
                    name: c.function.name,
                    arguments,
                }
            })
            .collect();

        Ok(CompletionResponse {
            content: choice.message.content.filter(|c| !c.is_empty()),
            tool_calls,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Wire shapes for the chat-completions protocol.

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireToolFunction,
}

#[derive(Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn request(messages: Vec<Message>, tools: Vec<ToolSchema>) -> CompletionRequest {
        CompletionRequest {
            messages,
            tools,
            max_tokens: 512,
        }
    }

    #[tokio::test]
    /// A plain content response parses into content with no tool calls.
    async fn test_content_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer key-1")
                .json_body_partial(r#"{"model": "gpt-4o-mini"}"#);
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}}]
            }));
        });

        let provider = OpenAiProvider::new("gpt-4o-mini")
            .with_api_key("key-1")
            .with_base_url(&server.url("/v1"));
        let response = provider
            .complete(request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("Hello!"));
        assert!(!response.has_tool_calls());
    }

    #[tokio::test]
    /// Tool-call responses parse their JSON-string arguments.
    async fn test_tool_call_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "web_search",
                            "arguments": "{\"query\": \"law firms in Lusaka\"}"
                        }
                    }]
                }}]
            }));
        });

        let provider = OpenAiProvider::new("gpt-4o-mini").with_base_url(&server.url("/v1"));
        let schema = ToolSchema {
            name: "web_search".to_string(),
            description: "Search".to_string(),
            parameters: json!({"type": "object"}),
        };
        let response = provider
            .complete(request(vec![Message::user("scout")], vec![schema]))
            .await
            .unwrap();
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "web_search");
        assert_eq!(
            response.tool_calls[0].arguments,
            json!({"query": "law firms in Lusaka"})
        );
    }

    #[tokio::test]
    /// Non-2xx statuses become Api errors carrying the body.
    async fn test_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).body("invalid api key");
        });

        let provider = OpenAiProvider::new("gpt-4o-mini").with_base_url(&server.url("/v1"));
        let err = provider
            .complete(request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 401, .. }));
    }

    #[tokio::test]
    /// An empty choices array is a malformed response.
    async fn test_malformed_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        });

        let provider = OpenAiProvider::new("gpt-4o-mini").with_base_url(&server.url("/v1"));
        let err = provider
            .complete(request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }
}
