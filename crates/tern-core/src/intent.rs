//! Intent classification for incoming prompts.
//!
//! Decides whether a task needs an isolated code-execution environment.
//! The keyword sets are plain data consumed by one pure function, so they
//! can be tuned without touching the reasoning state machine. A false
//! negative is harmless: environment-bound tools simply stay unregistered
//! for that run.

use serde::{Deserialize, Serialize};

/// Phrases that indicate the user wants something built or changed.
pub const ACTION_KEYWORDS: &[&str] = &[
    "create",
    "build",
    "make me",
    "generate code",
    "write code",
    "write a script",
    "implement",
    "install",
    "deploy",
    "scaffold",
    "set up",
    "fix",
    "debug",
    "refactor",
    "add a",
    "run the",
];

/// Phrases that indicate the user is asking for information.
pub const INFORMATIONAL_KEYWORDS: &[&str] = &[
    "how to",
    "how do i",
    "how does",
    "what is",
    "what are",
    "why does",
    "why is",
    "explain",
    "difference between",
    "tell me about",
    "describe",
    "when should",
];

/// Result of classifying one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the run should bind an execution environment.
    pub needs_environment: bool,
    /// Whether a caller-supplied reference is being reused.
    pub reuse_provided: bool,
    /// The reference to reuse, when one was provided.
    pub environment_ref: Option<String>,
}

/// Classifies a prompt, optionally honoring a caller-supplied
/// environment reference.
///
/// A provided reference is always reused. Otherwise the prompt is
/// matched case-insensitively against the two keyword sets:
/// informational phrasing ("how do I create...") means no environment,
/// action phrasing ("create a todo app") means one is required, and a
/// prompt matching neither defaults to no environment.
///
/// Pure function of its inputs.
pub fn classify(prompt: &str, provided_ref: Option<&str>) -> Classification {
    if let Some(reference) = provided_ref {
        return Classification {
            needs_environment: true,
            reuse_provided: true,
            environment_ref: Some(reference.to_string()),
        };
    }

    let lowered = prompt.to_lowercase();
    let informational = INFORMATIONAL_KEYWORDS.iter().any(|k| lowered.contains(k));
    let action = ACTION_KEYWORDS.iter().any(|k| lowered.contains(k));

    // Informational phrasing wins: "how do I create a page?" is a
    // question about creating, not a request to create.
    let needs_environment = !informational && action;

    Classification {
        needs_environment,
        reuse_provided: false,
        environment_ref: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_informational_prompt_needs_no_environment() {
        let result = classify("How do I create a Next.js page?", None);
        assert!(!result.needs_environment);
        assert!(!result.reuse_provided);
        assert!(result.environment_ref.is_none());
    }

    #[test]
    fn test_action_prompt_needs_environment() {
        let result = classify("Create a todo app", None);
        assert!(result.needs_environment);
    }

    #[test]
    fn test_no_keyword_defaults_to_false() {
        let result = classify("The weather is nice today", None);
        assert!(!result.needs_environment);
    }

    #[test]
    fn test_provided_ref_is_always_reused() {
        let result = classify("What is Rust?", Some("env-42"));
        assert!(result.needs_environment);
        assert!(result.reuse_provided);
        assert_eq!(result.environment_ref.as_deref(), Some("env-42"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(classify("BUILD me a website", None).needs_environment);
        assert!(!classify("EXPLAIN monads", None).needs_environment);
    }

    #[test]
    fn test_classification_is_pure() {
        let a = classify("Fix the login bug", None);
        let b = classify("Fix the login bug", None);
        assert_eq!(a, b);
    }
}
