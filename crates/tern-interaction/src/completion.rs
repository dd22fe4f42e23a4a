//! Completion service seam.
//!
//! The reasoning loop talks to the language-model completion service
//! through `CompletionService`: a message sequence plus a tool schema
//! in, text and/or tool-invocation requests out. Concrete adapters live
//! next to this trait; tests script their own implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role of a message in the sequence sent to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Adapter-assigned call identifier, echoed back with the result.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as parsed JSON.
    pub arguments: Value,
}

/// One message in the sequence passed to the completion service.
///
/// Order matters: system prompt, prior history, new user message, then
/// interleaved tool/assistant turns generated during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool invocations attached to an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For tool-role messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tools(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Declared capability exposed to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: Value,
}

/// Response from one completion call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResponse {
    /// Textual content, possibly empty when only tools were requested.
    pub text: String,
    /// Requested tool invocations, in request order.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl CompletionResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Errors surfaced by completion adapters.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion authentication failed: {0}")]
    Auth(String),
    #[error("completion service returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion response could not be interpreted: {0}")]
    InvalidResponse(String),
}

/// Adapter seam to the language-model completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends the full message sequence and current tool schema, returning
    /// text and/or requested tool invocations.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<CompletionResponse, CompletionError>;
}
