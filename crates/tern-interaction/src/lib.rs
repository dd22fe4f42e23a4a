//! Capability adapters for the Tern engine.
//!
//! Thin seams to the two external collaborators: the language-model
//! completion service and the sandboxed execution environment provider.
//! Traits live next to their HTTP adapters; tests script their own
//! implementations of the same traits.

pub mod anthropic;
pub mod completion;
pub mod sandbox;
pub mod sandbox_api;

pub use anthropic::AnthropicCompletionService;
pub use completion::{
    ChatMessage, ChatRole, CompletionError, CompletionResponse, CompletionService,
    ToolCallRequest, ToolSpec,
};
pub use sandbox::{CommandOutput, DirEntry, SandboxError, SandboxHandle, SandboxService};
pub use sandbox_api::HttpSandboxService;
