//! Session-keyed memory tools.
//!
//! Each tool is bound to one session id at construction; the model
//! never addresses another session's memory.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use tern_core::memory::{MemoryCategory, MemoryEntry, MemoryStore};
use tern_interaction::ToolSpec;

use super::{Tool, ToolError};

const DEFAULT_SEARCH_LIMIT: usize = 5;

fn category_arg(args: &Value) -> Result<MemoryCategory, ToolError> {
    let raw = args["category"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments("'category' must be a string".into()))?;
    MemoryCategory::from_str(raw).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

fn render_entries(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return "No memory entries found.".to_string();
    }
    entries
        .iter()
        .map(|e| format!("[{}] {}", e.category.as_str(), e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lists remembered entries in one category.
pub struct MemoryGetTool {
    store: Arc<dyn MemoryStore>,
    session_id: String,
    spec: ToolSpec,
}

impl MemoryGetTool {
    pub fn new(store: Arc<dyn MemoryStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            spec: ToolSpec {
                name: "memory_get".into(),
                description: "List remembered entries in a category \
                              (preferences, context, or tasks)."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": ["preferences", "context", "tasks"]
                        }
                    },
                    "required": ["category"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for MemoryGetTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let category = category_arg(&args)?;
        let entries = self
            .store
            .get(&self.session_id, category)
            .await
            .map_err(|err| ToolError::Execution(err.to_string()))?;
        Ok(Value::String(render_entries(&entries)))
    }
}

/// Saves one new entry.
pub struct MemorySaveTool {
    store: Arc<dyn MemoryStore>,
    session_id: String,
    spec: ToolSpec,
}

impl MemorySaveTool {
    pub fn new(store: Arc<dyn MemoryStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            spec: ToolSpec {
                name: "memory_save".into(),
                description: "Remember a fact for this session under a category \
                              (preferences, context, or tasks)."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": ["preferences", "context", "tasks"]
                        },
                        "content": {"type": "string", "description": "The fact to remember"}
                    },
                    "required": ["category", "content"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for MemorySaveTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let category = category_arg(&args)?;
        let content = args["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'content' must be a string".into()))?;
        let entry = self
            .store
            .save(&self.session_id, category, content)
            .await
            .map_err(|err| ToolError::Execution(err.to_string()))?;
        Ok(json!(format!(
            "Saved to {}: {}",
            entry.category.as_str(),
            entry.content
        )))
    }
}

/// Searches this session's entries across all categories.
pub struct MemorySearchTool {
    store: Arc<dyn MemoryStore>,
    session_id: String,
    spec: ToolSpec,
}

impl MemorySearchTool {
    pub fn new(store: Arc<dyn MemoryStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            spec: ToolSpec {
                name: "memory_search".into(),
                description: "Search remembered entries across all categories.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "limit": {"type": "integer", "minimum": 1, "maximum": 20}
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'query' must be a string".into()))?;
        let limit = args["limit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_SEARCH_LIMIT);
        let entries = self
            .store
            .search(&self.session_id, query, limit)
            .await
            .map_err(|err| ToolError::Execution(err.to_string()))?;
        Ok(Value::String(render_entries(&entries)))
    }
}
