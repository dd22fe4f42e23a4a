//! Engine entry point: the session execution coordinator.

pub mod coordinator;

pub use coordinator::{RunAck, RunRequest, SessionExecutionCoordinator};
