//! Session-scoped memory storage.
//!
//! This module provides the trait and default in-memory implementation
//! backing the environment-independent memory tools. An external vector
//! or RAG backend can replace the default by implementing `MemoryStore`.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, TernError};

/// Category a memory entry is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Preferences,
    Context,
    Tasks,
}

impl MemoryCategory {
    /// Stable lowercase name (matches the serialized form).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferences => "preferences",
            Self::Context => "context",
            Self::Tasks => "tasks",
        }
    }

    /// All known categories.
    pub const ALL: &'static [MemoryCategory] =
        &[Self::Preferences, Self::Context, Self::Tasks];
}

impl FromStr for MemoryCategory {
    type Err = TernError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "preferences" => Ok(Self::Preferences),
            "context" => Ok(Self::Context),
            "tasks" => Ok(Self::Tasks),
            other => Err(TernError::invalid_input(format!(
                "unknown memory category '{other}' (expected preferences, context, or tasks)"
            ))),
        }
    }
}

/// A single remembered fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique entry identifier
    pub id: String,
    /// Category this entry is filed under
    pub category: MemoryCategory,
    /// The remembered content
    pub content: String,
    /// Timestamp when the entry was created (ISO 8601 format)
    pub created_at: String,
}

/// Trait for session-keyed memory storage.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Returns all entries for a session and category, oldest first.
    async fn get(&self, session_id: &str, category: MemoryCategory) -> Result<Vec<MemoryEntry>>;

    /// Saves a new entry and returns it.
    async fn save(
        &self,
        session_id: &str,
        category: MemoryCategory,
        content: &str,
    ) -> Result<MemoryEntry>;

    /// Searches a session's entries across all categories.
    ///
    /// Results are ordered by relevance; at most `limit` are returned.
    async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>>;
}

/// Default in-memory implementation of `MemoryStore`.
///
/// Search is a naive case-insensitive relevance score: entries containing
/// the whole query rank before entries matching individual words.
pub struct InMemoryMemoryStore {
    entries: RwLock<HashMap<String, Vec<MemoryEntry>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(&self, session_id: &str, category: MemoryCategory) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(session_id)
            .map(|list| {
                list.iter()
                    .filter(|e| e.category == category)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save(
        &self,
        session_id: &str,
        category: MemoryCategory,
        content: &str,
    ) -> Result<MemoryEntry> {
        let entry = MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            content: content.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut entries = self.entries.write().await;
        entries
            .entry(session_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let entries = self.entries.read().await;

        let mut scored: Vec<(usize, MemoryEntry)> = entries
            .get(session_id)
            .map(|list| {
                list.iter()
                    .filter_map(|entry| {
                        let content = entry.content.to_lowercase();
                        let mut score = 0;
                        if content.contains(&lowered) {
                            score += 10;
                        }
                        score += words.iter().filter(|w| content.contains(**w)).count();
                        (score > 0).then(|| (score, entry.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }
}
