//! Engine configuration.
//!
//! Defaults are compiled in; an optional `~/.config/tern/config.toml`
//! overrides individual fields. A missing or empty file means defaults.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunable engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Completion model identifier passed to the adapter.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum completion tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Maximum number of audit verdicts asked from the completion
    /// service per run; the next auditor entry is forced to pass.
    #[serde(default = "default_max_audit_attempts")]
    pub max_audit_attempts: usize,
    /// Global step cap guarding against loops that never settle.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Keepalive interval for idle event subscribers, in seconds.
    /// Zero disables heartbeats.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Per-session broadcast buffer size.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Bounded run channel between the reasoning loop and the fan-out task.
    #[serde(default = "default_run_channel_capacity")]
    pub run_channel_capacity: usize,
    /// Time-to-live of the reference lookup cache, in seconds.
    #[serde(default = "default_reference_cache_ttl_secs")]
    pub reference_cache_ttl_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_audit_attempts() -> usize {
    3
}

fn default_max_steps() -> usize {
    24
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    1024
}

fn default_run_channel_capacity() -> usize {
    64
}

fn default_reference_cache_ttl_secs() -> u64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_audit_attempts: default_max_audit_attempts(),
            max_steps: default_max_steps(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            event_capacity: default_event_capacity(),
            run_channel_capacity: default_run_channel_capacity(),
            reference_cache_ttl_secs: default_reference_cache_ttl_secs(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `~/.config/tern/config.toml`.
    ///
    /// A missing config directory, missing file, or empty file yields the
    /// defaults. A present but malformed file is an error.
    pub fn load() -> Result<Self> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(Self::default());
        };
        Self::load_from(&config_dir.join("tern").join("config.toml"))
    }

    /// Loads configuration from an explicit path (for tests and tooling).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(&content)?)
    }
}
