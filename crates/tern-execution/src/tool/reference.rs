//! Documentation lookup with a short-lived cache.
//!
//! Lookups are keyed by the resolved topic, so "Next.js" and "nextjs"
//! share one cache entry. Entries expire after the configured
//! time-to-live (ten minutes by default).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mini_moka::sync::Cache;
use once_cell::sync::Lazy;
use serde_json::{Value, json};

use tern_interaction::ToolSpec;

use super::{Tool, ToolError};

/// Supplies documentation text for a canonical topic key.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Canonicalizes a raw topic into a cache key.
    fn resolve(&self, topic: &str) -> String {
        topic.trim().to_lowercase()
    }

    /// Fetches documentation for a resolved topic. `Ok(None)` means the
    /// source has nothing for this topic.
    async fn fetch(&self, topic: &str) -> Result<Option<String>, ToolError>;
}

static TOPICS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (
            "nextjs",
            "Next.js: file-system routing under app/ or pages/. A page is a \
             default-exported component; `app/about/page.tsx` serves /about. \
             Server components are the default in the app router; add \
             'use client' for interactive components. Data fetching happens \
             in async server components or route handlers.",
        ),
        (
            "react",
            "React: components are functions returning JSX. State lives in \
             hooks (useState, useReducer); side effects in useEffect with an \
             explicit dependency array. Lift shared state to the nearest \
             common ancestor; pass data down through props.",
        ),
        (
            "typescript",
            "TypeScript: prefer interfaces for object shapes and type aliases \
             for unions. Enable strict mode. Narrow unions with discriminant \
             fields. `unknown` over `any` at boundaries; validate before use.",
        ),
        (
            "rust",
            "Rust: ownership moves by default, borrow with & and &mut. Errors \
             propagate with Result and the ? operator. Model alternatives as \
             enums and match exhaustively. Prefer iterators over index loops.",
        ),
        (
            "tokio",
            "Tokio: async runtime for Rust. Spawn concurrent work with \
             tokio::spawn; communicate over mpsc/broadcast/oneshot channels. \
             Never block the executor; use spawn_blocking for CPU-heavy or \
             blocking calls.",
        ),
        (
            "docker",
            "Docker: one process per container. Build images from a \
             Dockerfile with layered, cache-friendly steps (dependencies \
             before source). Pass configuration through environment \
             variables; persist data in volumes, not the container layer.",
        ),
        (
            "git",
            "Git: commit small and often with imperative-mood messages. \
             Branch per change, rebase local work before sharing, never \
             rewrite published history. `git bisect` finds regressions.",
        ),
    ])
});

static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("next.js", "nextjs"),
        ("next", "nextjs"),
        ("reactjs", "react"),
        ("react.js", "react"),
        ("ts", "typescript"),
        ("rustlang", "rust"),
        ("tokio-rs", "tokio"),
    ])
});

/// Curated, in-process documentation source.
pub struct BuiltinReferenceSource;

#[async_trait]
impl ReferenceSource for BuiltinReferenceSource {
    fn resolve(&self, topic: &str) -> String {
        let normalized = topic.trim().to_lowercase();
        ALIASES
            .get(normalized.as_str())
            .map(|canonical| canonical.to_string())
            .unwrap_or(normalized)
    }

    async fn fetch(&self, topic: &str) -> Result<Option<String>, ToolError> {
        Ok(TOPICS.get(topic).map(|text| text.to_string()))
    }
}

/// Environment-independent documentation lookup tool.
pub struct ReferenceLookupTool {
    source: Arc<dyn ReferenceSource>,
    cache: Cache<String, String>,
    spec: ToolSpec,
}

impl ReferenceLookupTool {
    pub fn new(source: Arc<dyn ReferenceSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Cache::builder().time_to_live(ttl).build(),
            spec: ToolSpec {
                name: "reference_lookup".into(),
                description: "Look up reference documentation for a topic \
                              (framework, language, or tool name)."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "topic": {"type": "string", "description": "Topic to look up"}
                    },
                    "required": ["topic"],
                    "additionalProperties": false
                }),
            },
        }
    }
}

#[async_trait]
impl Tool for ReferenceLookupTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        let topic = args["topic"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'topic' must be a string".into()))?;
        let key = self.source.resolve(topic);

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(target: "tern::tools", topic = %key, "reference cache hit");
            return Ok(Value::String(cached));
        }

        match self.source.fetch(&key).await? {
            Some(text) => {
                self.cache.insert(key, text.clone());
                Ok(Value::String(text))
            }
            None => Err(ToolError::Execution(format!(
                "no reference material for topic '{topic}'"
            ))),
        }
    }
}
