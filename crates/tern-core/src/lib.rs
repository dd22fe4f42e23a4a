//! Core domain types for the Tern session execution engine.
//!
//! This crate carries the shared vocabulary of the engine: the error
//! taxonomy, the session model and its repository seam, the streamed
//! event frames and the publish/subscribe bus, the intent classifier,
//! the memory store seam, and engine configuration.

pub mod config;
pub mod error;
pub mod event;
pub mod intent;
pub mod memory;
pub mod session;

// Re-export common error type
pub use error::TernError;
