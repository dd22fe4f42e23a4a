//! Environment-bound tools.
//!
//! These tools exist only while a run holds a live sandbox handle; each
//! one is a thin, schema-fronted wrapper over the `SandboxService`
//! adapter, scoped to a single environment id.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use tern_interaction::{SandboxError, SandboxService, ToolSpec};

use super::{Tool, ToolError};

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        ToolError::Execution(err.to_string())
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments(err.to_string()))
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

/// Creates or fully overwrites a file. Parent directories are created by
/// the environment service.
pub struct WriteFileTool {
    service: Arc<dyn SandboxService>,
    sandbox_id: String,
    spec: ToolSpec,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

impl WriteFileTool {
    pub fn new(service: Arc<dyn SandboxService>, sandbox_id: impl Into<String>) -> Self {
        Self {
            service,
            sandbox_id: sandbox_id.into(),
            spec: ToolSpec {
                name: "write_file".into(),
                description: "Create a file or fully overwrite an existing one. \
                              Parent directories are created automatically."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path inside the environment"},
                        "content": {"type": "string", "description": "Full file content"}
                    },
                    "required": ["path", "content"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: WriteFileArgs = parse_args(args)?;
        self.service
            .write_file(&self.sandbox_id, &args.path, &args.content)
            .await?;
        Ok(json!(format!(
            "Wrote {} bytes to {}",
            args.content.len(),
            args.path
        )))
    }
}

// ---------------------------------------------------------------------------
// edit_file
// ---------------------------------------------------------------------------

/// Applies a targeted edit to an existing file.
///
/// Every sub-operation is validated against the current content before
/// anything is written back.
pub struct EditFileTool {
    service: Arc<dyn SandboxService>,
    sandbox_id: String,
    spec: ToolSpec,
}

#[derive(Deserialize)]
struct EditFileArgs {
    path: String,
    operation: EditOperation,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    line: Option<usize>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    replace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EditOperation {
    Append,
    Prepend,
    InsertAtLine,
    ReplaceText,
    ReplaceLine,
}

impl EditFileTool {
    pub fn new(service: Arc<dyn SandboxService>, sandbox_id: impl Into<String>) -> Self {
        Self {
            service,
            sandbox_id: sandbox_id.into(),
            spec: ToolSpec {
                name: "edit_file".into(),
                description: "Edit an existing file: append, prepend, insert_at_line, \
                              replace_text, or replace_line."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "operation": {
                            "type": "string",
                            "enum": ["append", "prepend", "insert_at_line", "replace_text", "replace_line"]
                        },
                        "content": {"type": "string", "description": "Text for append/prepend/insert_at_line/replace_line"},
                        "line": {"type": "integer", "minimum": 1, "description": "1-based line number"},
                        "search": {"type": "string", "description": "Text to find for replace_text"},
                        "replace": {"type": "string", "description": "Replacement for replace_text"}
                    },
                    "required": ["path", "operation"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

/// Applies one edit operation to the current content.
///
/// Returns the new content, or an error when the operation does not fit
/// the content (line out of range, search text absent, missing fields).
fn apply_edit(current: &str, args: &EditFileArgs) -> Result<String, ToolError> {
    let need = |field: &str, value: &Option<String>| -> Result<String, ToolError> {
        value.clone().ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "'{field}' is required for operation {:?}",
                args.operation
            ))
        })
    };

    match args.operation {
        EditOperation::Append => {
            let content = need("content", &args.content)?;
            Ok(format!("{current}{content}"))
        }
        EditOperation::Prepend => {
            let content = need("content", &args.content)?;
            Ok(format!("{content}{current}"))
        }
        EditOperation::InsertAtLine => {
            let content = need("content", &args.content)?;
            let line = args.line.ok_or_else(|| {
                ToolError::InvalidArguments("'line' is required for insert_at_line".into())
            })?;
            let mut segments: Vec<&str> = current.split('\n').collect();
            if line < 1 || line > segments.len() + 1 {
                return Err(ToolError::Execution(format!(
                    "line {line} out of range (file has {} lines)",
                    segments.len()
                )));
            }
            segments.insert(line - 1, &content);
            Ok(segments.join("\n"))
        }
        EditOperation::ReplaceLine => {
            let content = need("content", &args.content)?;
            let line = args.line.ok_or_else(|| {
                ToolError::InvalidArguments("'line' is required for replace_line".into())
            })?;
            let mut segments: Vec<&str> = current.split('\n').collect();
            if line < 1 || line > segments.len() {
                return Err(ToolError::Execution(format!(
                    "line {line} out of range (file has {} lines)",
                    segments.len()
                )));
            }
            segments[line - 1] = &content;
            Ok(segments.join("\n"))
        }
        EditOperation::ReplaceText => {
            let search = need("search", &args.search)?;
            let replace = need("replace", &args.replace)?;
            if !current.contains(&search) {
                return Err(ToolError::Execution(format!(
                    "search text not found in {}",
                    args.path
                )));
            }
            Ok(current.replacen(&search, &replace, 1))
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: EditFileArgs = parse_args(args)?;
        let current = self.service.read_file(&self.sandbox_id, &args.path).await?;
        let updated = apply_edit(&current, &args)?;
        self.service
            .write_file(&self.sandbox_id, &args.path, &updated)
            .await?;
        Ok(json!(format!("Edited {}", args.path)))
    }
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

pub struct ReadFileTool {
    service: Arc<dyn SandboxService>,
    sandbox_id: String,
    spec: ToolSpec,
}

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

impl ReadFileTool {
    pub fn new(service: Arc<dyn SandboxService>, sandbox_id: impl Into<String>) -> Self {
        Self {
            service,
            sandbox_id: sandbox_id.into(),
            spec: ToolSpec {
                name: "read_file".into(),
                description: "Read a file's full content.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: PathArgs = parse_args(args)?;
        let content = self.service.read_file(&self.sandbox_id, &args.path).await?;
        Ok(Value::String(content))
    }
}

// ---------------------------------------------------------------------------
// list_directory
// ---------------------------------------------------------------------------

pub struct ListDirectoryTool {
    service: Arc<dyn SandboxService>,
    sandbox_id: String,
    spec: ToolSpec,
}

impl ListDirectoryTool {
    pub fn new(service: Arc<dyn SandboxService>, sandbox_id: impl Into<String>) -> Self {
        Self {
            service,
            sandbox_id: sandbox_id.into(),
            spec: ToolSpec {
                name: "list_directory".into(),
                description: "List a directory: directories first, then files, \
                              each group sorted by name."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: PathArgs = parse_args(args)?;
        let mut entries = self
            .service
            .list_directory(&self.sandbox_id, &args.path)
            .await?;
        entries.sort_by(|a, b| {
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.cmp(&b.name))
        });
        let listing: Vec<String> = entries
            .iter()
            .map(|e| {
                if e.is_directory {
                    format!("{}/", e.name)
                } else {
                    e.name.clone()
                }
            })
            .collect();
        Ok(Value::String(listing.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// delete_path
// ---------------------------------------------------------------------------

pub struct DeletePathTool {
    service: Arc<dyn SandboxService>,
    sandbox_id: String,
    spec: ToolSpec,
}

impl DeletePathTool {
    pub fn new(service: Arc<dyn SandboxService>, sandbox_id: impl Into<String>) -> Self {
        Self {
            service,
            sandbox_id: sandbox_id.into(),
            spec: ToolSpec {
                name: "delete_path".into(),
                description: "Delete a file or directory.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for DeletePathTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: PathArgs = parse_args(args)?;
        self.service
            .delete_path(&self.sandbox_id, &args.path)
            .await?;
        Ok(json!(format!("Deleted {}", args.path)))
    }
}

// ---------------------------------------------------------------------------
// run_command
// ---------------------------------------------------------------------------

/// Runs a shell command inside the environment. A non-zero exit raises a
/// tool error carrying both output streams.
pub struct RunCommandTool {
    service: Arc<dyn SandboxService>,
    sandbox_id: String,
    spec: ToolSpec,
}

#[derive(Deserialize)]
struct RunCommandArgs {
    command: String,
}

impl RunCommandTool {
    pub fn new(service: Arc<dyn SandboxService>, sandbox_id: impl Into<String>) -> Self {
        Self {
            service,
            sandbox_id: sandbox_id.into(),
            spec: ToolSpec {
                name: "run_command".into(),
                description: "Run a shell command in the environment and capture \
                              stdout and stderr."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"command": {"type": "string"}},
                    "required": ["command"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let args: RunCommandArgs = parse_args(args)?;
        let output = self
            .service
            .run_command(&self.sandbox_id, &args.command)
            .await?;
        if !output.success() {
            return Err(ToolError::Execution(format!(
                "command exited with code {}\nstdout:\n{}\nstderr:\n{}",
                output.exit_code, output.stdout, output.stderr
            )));
        }
        let mut rendered = output.stdout;
        if !output.stderr.is_empty() {
            rendered.push_str("\nstderr:\n");
            rendered.push_str(&output.stderr);
        }
        Ok(Value::String(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit_args(operation: EditOperation) -> EditFileArgs {
        EditFileArgs {
            path: "f.txt".into(),
            operation,
            content: None,
            line: None,
            search: None,
            replace: None,
        }
    }

    #[test]
    fn test_append_and_prepend() {
        let mut args = edit_args(EditOperation::Append);
        args.content = Some(" tail".into());
        assert_eq!(apply_edit("head", &args).unwrap(), "head tail");

        let mut args = edit_args(EditOperation::Prepend);
        args.content = Some("head ".into());
        assert_eq!(apply_edit("tail", &args).unwrap(), "head tail");
    }

    #[test]
    fn test_insert_at_line_bounds() {
        let mut args = edit_args(EditOperation::InsertAtLine);
        args.content = Some("middle".into());
        args.line = Some(2);
        assert_eq!(apply_edit("one\ntwo", &args).unwrap(), "one\nmiddle\ntwo");

        args.line = Some(9);
        assert!(apply_edit("one\ntwo", &args).is_err());
    }

    #[test]
    fn test_replace_line() {
        let mut args = edit_args(EditOperation::ReplaceLine);
        args.content = Some("TWO".into());
        args.line = Some(2);
        assert_eq!(apply_edit("one\ntwo\nthree", &args).unwrap(), "one\nTWO\nthree");
    }

    #[test]
    fn test_replace_text_single_match_is_byte_exact() {
        let mut args = edit_args(EditOperation::ReplaceText);
        args.search = Some("blue".into());
        args.replace = Some("green".into());
        let before = "the sky is blue, the sea too";
        let after = apply_edit(before, &args).unwrap();
        assert_eq!(after, "the sky is green, the sea too");
    }

    #[test]
    fn test_replace_text_requires_match() {
        let mut args = edit_args(EditOperation::ReplaceText);
        args.search = Some("absent".into());
        args.replace = Some("x".into());
        assert!(apply_edit("nothing here", &args).is_err());
    }

    #[test]
    fn test_missing_field_is_invalid_arguments() {
        let args = edit_args(EditOperation::Append);
        let err = apply_edit("x", &args).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
