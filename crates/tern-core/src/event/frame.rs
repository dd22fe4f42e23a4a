//! Streamed event frame types.
//!
//! Every run emits an append-only sequence of frames; observers receive
//! them in per-session emission order. The envelope carries a
//! per-session monotonic sequence number and a wall-clock capture time
//! used for diagnostics and playback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery status of a tool invocation as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Complete,
    Error,
}

/// Typed event payload families.
///
/// Serializes with a `type` tag and a `payload` body so frontends can
/// switch on `type` without inspecting the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum EventPayload {
    /// Coarse run progress updates, including audit verdicts.
    Status {
        status: String,
        message: String,
        has_environment: bool,
    },
    /// Incremental assistant output. `cumulative` always contains the
    /// full text produced so far; fragments are never retracted.
    Partial { fragment: String, cumulative: String },
    /// Tool invocation progress.
    Tool {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        status: ToolCallStatus,
    },
    /// Execution environment creation or replacement.
    Sandbox {
        id: String,
        url: String,
        is_new: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        replaced_old: Option<String>,
    },
    /// Terminal success. Exactly one of `complete` or `error` ends a run.
    Complete {
        response: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        environment_url: Option<String>,
        has_environment: bool,
    },
    /// Terminal failure.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        environment_url: Option<String>,
    },
    /// Keepalive for idle connections; carries no ordering-relevant payload.
    Heartbeat {},
}

impl EventPayload {
    /// Stable name of the payload family (matches the serialized tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Partial { .. } => "partial",
            Self::Tool { .. } => "tool",
            Self::Sandbox { .. } => "sandbox",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Heartbeat {} => "heartbeat",
        }
    }

    /// Whether this payload terminates a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Monotonic envelope for streamed events.
///
/// `sequence` is assigned by the session's event channel and starts at 1;
/// `timestamp` is epoch milliseconds at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    pub sequence: u64,
    pub session_id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventFrame {
    /// Builds a new frame stamped with the current wall-clock time.
    pub fn new(sequence: u64, session_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            sequence,
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload,
        }
    }
}
