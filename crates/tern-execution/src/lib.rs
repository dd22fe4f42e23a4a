//! Run execution: intent-driven environment lifecycle, the tool
//! registry, and the bounded reasoning loop.

pub mod lifecycle;
pub mod prompts;
pub mod reasoning;
pub mod tool;

pub use lifecycle::{Acquisition, EnvironmentChange, EnvironmentManager};
pub use reasoning::{ReasoningLoop, RunOutcome};
pub use tool::{Tool, ToolError, ToolOutcome, ToolRegistry};
