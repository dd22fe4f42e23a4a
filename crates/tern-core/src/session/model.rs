//! Session domain model.
//!
//! This module contains the core Session entity that represents a
//! conversation bound to at most one execution environment.

use super::message::{ConversationMessage, MessageRole};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept when deriving a title from a prompt.
const TITLE_MAX_CHARS: usize = 60;

/// Represents a user session in the engine's domain layer.
///
/// A session contains:
/// - The ordered conversation history (user and assistant turns)
/// - An optional bound execution environment (id, URL, creation time)
/// - An optional summary of the last completed run
/// - Sharing metadata maintained by outer layers
///
/// A session owns at most one active environment reference at a time;
/// the reference is replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Human-readable session title, derived from the first prompt
    pub title: String,
    /// Timestamp when the session was created (ISO 8601 format)
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format)
    pub updated_at: String,
    /// Bound execution environment id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    /// Reachable URL of the bound environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_url: Option<String>,
    /// Environment creation time (epoch milliseconds), surfaced so outer
    /// layers can react before the provider's expiry horizon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_created_at: Option<i64>,
    /// Summary of the work produced by the last completed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_summary: Option<String>,
    /// Whether this session is publicly shared
    #[serde(default)]
    pub is_public: bool,
    /// Share token when the session is public
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    /// Ordered conversation history
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
}

impl Session {
    /// Creates a new session with a title derived from the first prompt.
    pub fn new(id: impl Into<String>, first_prompt: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            title: derive_title(first_prompt),
            created_at: now.clone(),
            updated_at: now,
            environment_id: None,
            environment_url: None,
            environment_created_at: None,
            work_summary: None,
            is_public: false,
            share_token: None,
            conversation_history: Vec::new(),
        }
    }

    /// Binds a (replacement) environment reference to this session.
    ///
    /// The previous reference, if any, is discarded wholesale.
    pub fn bind_environment(&mut self, id: impl Into<String>, url: impl Into<String>, created_at: i64) {
        self.environment_id = Some(id.into());
        self.environment_url = Some(url.into());
        self.environment_created_at = Some(created_at);
    }

    /// Appends a turn to the conversation history and refreshes `updated_at`.
    pub fn append_turn(&mut self, role: MessageRole, content: impl Into<String>) {
        self.conversation_history
            .push(ConversationMessage::now(role, content));
        self.touch();
    }

    /// Refreshes the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Derives a display title from the first prompt of a session.
fn derive_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    if title.is_empty() {
        title = "New session".to_string();
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_derives_title() {
        let session = Session::new("s-1", "Build me a todo app");
        assert_eq!(session.title, "Build me a todo app");
        assert!(session.conversation_history.is_empty());
        assert!(session.environment_id.is_none());
    }

    #[test]
    fn test_long_prompt_is_truncated() {
        let prompt = "x".repeat(200);
        let session = Session::new("s-2", &prompt);
        assert_eq!(session.title.chars().count(), 61); // 60 + ellipsis
    }

    #[test]
    fn test_bind_environment_replaces_wholesale() {
        let mut session = Session::new("s-3", "Create a service");
        session.bind_environment("env-1", "https://one.example", 1);
        session.bind_environment("env-2", "https://two.example", 2);
        assert_eq!(session.environment_id.as_deref(), Some("env-2"));
        assert_eq!(session.environment_url.as_deref(), Some("https://two.example"));
        assert_eq!(session.environment_created_at, Some(2));
    }

    #[test]
    fn test_append_turn_updates_timestamp() {
        let mut session = Session::new("s-4", "Hello");
        let before = session.updated_at.clone();
        session.append_turn(MessageRole::User, "Hello");
        assert_eq!(session.conversation_history.len(), 1);
        assert!(session.updated_at >= before);
    }
}
