//! Event streaming module.
//!
//! - `frame`: streamed frame envelope and payload families
//! - `bus`: process-scoped publish/subscribe registry

mod bus;
mod frame;

pub use bus::{EventBus, EventStream};
pub use frame::{EventFrame, EventPayload, ToolCallStatus};
