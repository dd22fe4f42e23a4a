//! AnthropicCompletionService - direct REST adapter for the messages API.
//!
//! Calls the Anthropic-style messages endpoint with tool definitions and
//! maps content blocks to the engine's neutral chat types.
//! Configuration comes from environment variables.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::completion::{
    ChatMessage, ChatRole, CompletionError, CompletionResponse, CompletionService, ToolCallRequest,
    ToolSpec,
};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Completion adapter that talks to the Anthropic HTTP API.
#[derive(Clone)]
pub struct AnthropicCompletionService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicCompletionService {
    /// Creates a new adapter with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 4096,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// `ANTHROPIC_API_KEY` is required; `TERN_COMPLETION_MODEL` overrides
    /// the default model name.
    pub fn try_from_env() -> Result<Self, CompletionError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| {
            CompletionError::Auth("ANTHROPIC_API_KEY not found in environment".into())
        })?;
        let model = env::var("TERN_COMPLETION_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Ok(Self::new(api_key, model))
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Overrides the endpoint URL (for proxies and tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn send_request(
        &self,
        body: &CreateMessageRequest<'_>,
    ) -> Result<CreateMessageResponse, CompletionError> {
        let response = self
            .client
            .post(&self.base_url)
            .timeout(REQUEST_TIMEOUT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CompletionError::Auth(format!(
                "completion service rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<CreateMessageResponse>()
            .await
            .map_err(|err| CompletionError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl CompletionService for AnthropicCompletionService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<CompletionResponse, CompletionError> {
        let (system, api_messages) = build_messages(messages)?;
        let body = CreateMessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: api_messages,
            tools: tools.iter().map(ApiTool::from).collect(),
        };

        tracing::debug!(
            target: "tern::completion",
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending completion request"
        );

        let response = self.send_request(&body).await?;
        Ok(parse_response(response))
    }
}

/// Splits system messages off and maps the rest to API message shapes.
fn build_messages(
    messages: &[ChatMessage],
) -> Result<(Option<String>, Vec<ApiMessage>), CompletionError> {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut api_messages: Vec<ApiMessage> = Vec::new();

    for message in messages {
        match message.role {
            ChatRole::System => system_parts.push(&message.content),
            ChatRole::User => api_messages.push(ApiMessage {
                role: "user",
                content: vec![ContentBlock::Text {
                    text: message.content.clone(),
                }],
            }),
            ChatRole::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.trim().is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: message.content.clone(),
                    });
                }
                for call in &message.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                if blocks.is_empty() {
                    return Err(CompletionError::InvalidResponse(
                        "assistant message had neither text nor tool calls".into(),
                    ));
                }
                api_messages.push(ApiMessage {
                    role: "assistant",
                    content: blocks,
                });
            }
            ChatRole::Tool => {
                let tool_use_id = message.tool_call_id.clone().ok_or_else(|| {
                    CompletionError::InvalidResponse(
                        "tool message missing its tool_call_id".into(),
                    )
                })?;
                api_messages.push(ApiMessage {
                    role: "user",
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id,
                        content: message.content.clone(),
                    }],
                });
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    Ok((system, api_messages))
}

/// Collects text and tool-use blocks from a response body.
fn parse_response(response: CreateMessageResponse) -> CompletionResponse {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCallRequest {
                id,
                name,
                arguments: input,
            }),
            // Tool results never appear in responses; tolerate them anyway.
            ContentBlock::ToolResult { .. } => {}
        }
    }

    CompletionResponse {
        text: text_parts.join(""),
        tool_calls,
    }
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

impl<'a> From<&'a ToolSpec> for ApiTool<'a> {
    fn from(spec: &'a ToolSpec) -> Self {
        Self {
            name: &spec.name,
            description: &spec.description,
            input_schema: &spec.parameters,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}
