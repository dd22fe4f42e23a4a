//! Session domain module.
//!
//! This module contains all session-related domain models and the
//! repository interface.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`)
//! - `message`: Conversation message types (`MessageRole`, `ConversationMessage`)
//! - `repository`: Repository trait for session persistence

mod message;
mod model;
mod repository;

// Re-export public API
pub use message::{ConversationMessage, MessageRole};
pub use model::Session;
pub use repository::SessionRepository;
