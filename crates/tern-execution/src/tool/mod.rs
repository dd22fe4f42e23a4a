//! Tool registry and dispatch.
//!
//! Every tool declares a name, description, and a strictly-typed JSON
//! argument schema. Dispatch validates arguments against the compiled
//! schema before invoking the tool; validation failures and execution
//! failures are returned as error-text tool results so the run never
//! aborts on a misbehaving tool.
//!
//! # Module Structure
//!
//! - `sandbox_tools`: environment-bound file and command tools
//! - `reference`: cached documentation lookup
//! - `memory_tools`: session-keyed memory get/save/search

mod memory_tools;
mod reference;
mod sandbox_tools;

pub use memory_tools::{MemoryGetTool, MemorySaveTool, MemorySearchTool};
pub use reference::{BuiltinReferenceSource, ReferenceLookupTool, ReferenceSource};
pub use sandbox_tools::{
    DeletePathTool, EditFileTool, ListDirectoryTool, ReadFileTool, RunCommandTool, WriteFileTool,
};

use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

use tern_interaction::{ToolCallRequest, ToolSpec};

/// Errors produced while invoking a tool.
///
/// These never escape the registry as failures; `dispatch` folds them
/// into error-text outcomes.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

/// A named, schema-validated capability invocable during a run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declared name, description, and argument schema.
    fn spec(&self) -> &ToolSpec;

    /// Executes the tool. Arguments have already passed schema validation.
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

/// Result of dispatching one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Text appended to the conversation as the tool-role message.
    pub content: String,
    /// Whether the content describes a failure.
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(value: Value) -> Self {
        let content = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            content,
            is_error: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            content: format!("Error: {}", message.into()),
            is_error: true,
        }
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    validator: Validator,
}

/// The capability set exposed to one run's reasoning loop.
///
/// Registration order is preserved; it is the order tools are declared
/// to the completion service.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, compiling its argument schema.
    ///
    /// A schema that fails to compile is a programming error in the tool
    /// definition, not a runtime condition.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let validator = jsonschema::validator_for(&tool.spec().parameters).map_err(|err| {
            ToolError::InvalidArguments(format!(
                "schema for tool '{}' does not compile: {err}",
                tool.spec().name
            ))
        })?;
        self.tools.push(RegisteredTool { tool, validator });
        Ok(())
    }

    /// Declared specs, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.tool.spec().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatches one requested call.
    ///
    /// Unknown tools, schema violations, and execution failures all come
    /// back as error outcomes; this method never fails.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolOutcome {
        let Some(registered) = self.tools.iter().find(|t| t.tool.spec().name == call.name)
        else {
            tracing::warn!(target: "tern::tools", tool = %call.name, "unknown tool requested");
            return ToolOutcome::error(format!("unknown tool '{}'", call.name));
        };

        let violations: Vec<String> = registered
            .validator
            .iter_errors(&call.arguments)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            tracing::debug!(
                target: "tern::tools",
                tool = %call.name,
                "arguments failed schema validation"
            );
            return ToolOutcome::error(format!(
                "invalid arguments for '{}': {}",
                call.name,
                violations.join("; ")
            ));
        }

        match registered.tool.invoke(call.arguments.clone()).await {
            Ok(value) => ToolOutcome::ok(value),
            Err(err) => {
                tracing::debug!(target: "tern::tools", tool = %call.name, error = %err, "tool failed");
                ToolOutcome::error(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        spec: ToolSpec,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                spec: ToolSpec {
                    name: "echo".into(),
                    description: "Echoes the given text".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": {"text": {"type": "string"}},
                        "required": ["text"],
                        "additionalProperties": false
                    }),
                },
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
            Ok(args["text"].clone())
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "call-1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_dispatch_valid_call() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new())).unwrap();

        let outcome = registry.dispatch(&call("echo", json!({"text": "hi"}))).await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.content, "hi");
    }

    #[tokio::test]
    async fn test_schema_violation_becomes_tool_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new())).unwrap();

        let outcome = registry.dispatch(&call("echo", json!({"text": 7}))).await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_tool_result() {
        let registry = ToolRegistry::new();
        let outcome = registry.dispatch(&call("nope", json!({}))).await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("unknown tool"));
    }
}
