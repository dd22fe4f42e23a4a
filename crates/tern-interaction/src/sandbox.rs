//! Execution environment (sandbox) service seam.
//!
//! The sandbox service provisions isolated code-execution environments
//! and exposes file operations and command execution behind an opaque
//! identifier. Expiry is enforced by the provider; the engine only
//! surfaces the creation time so outer layers can react before the
//! horizon.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An opaque environment reference plus its reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    /// Provider-assigned identifier.
    pub id: String,
    /// Reachable URL of the environment.
    pub url: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
}

/// Captured output of a command executed inside an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Errors surfaced by sandbox adapters.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox provisioning failed: {0}")]
    Provision(String),
    #[error("sandbox '{0}' not found")]
    NotFound(String),
    #[error("sandbox path error: {0}")]
    Path(String),
    #[error("sandbox transport error: {0}")]
    Transport(String),
}

/// Adapter seam to the execution environment provider.
///
/// `resolve` distinguishes "alive" (`Ok(Some)`) from "expired or unknown"
/// (`Ok(None)`); transport errors are treated by callers as a failed
/// verification.
#[async_trait]
pub trait SandboxService: Send + Sync {
    /// Provisions a fresh environment.
    async fn create(&self) -> Result<SandboxHandle, SandboxError>;

    /// Resolves an environment id to a live handle, or `None` when the
    /// environment is expired or unknown.
    async fn resolve(&self, sandbox_id: &str) -> Result<Option<SandboxHandle>, SandboxError>;

    /// Creates or fully overwrites a file, auto-creating parent directories.
    async fn write_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError>;

    /// Reads a file's full content.
    async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<String, SandboxError>;

    /// Lists a directory without any ordering guarantee.
    async fn list_directory(
        &self,
        sandbox_id: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, SandboxError>;

    /// Deletes a file or directory.
    async fn delete_path(&self, sandbox_id: &str, path: &str) -> Result<(), SandboxError>;

    /// Runs a shell command, capturing stdout, stderr, and the exit code.
    /// A non-zero exit is reported through `CommandOutput`, not as an error.
    async fn run_command(
        &self,
        sandbox_id: &str,
        command: &str,
    ) -> Result<CommandOutput, SandboxError>;

    /// Liveness check for a previously issued handle.
    async fn verify(&self, handle: &SandboxHandle) -> bool {
        matches!(self.resolve(&handle.id).await, Ok(Some(_)))
    }
}
