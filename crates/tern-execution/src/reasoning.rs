//! Reasoning loop: the Agent / Tools / Auditor state machine.
//!
//! One loop drives one run. The agent phase calls the completion
//! service with the full message sequence and current tool schema; tool
//! requests are dispatched in order through the registry; an audit
//! phase gates completion, bounded by the configured attempt cap
//! (fail-open). An independent global step cap guards against loops
//! that never converge; hitting it yields a degraded response rather
//! than a failure.
//!
//! Progress is reported as event payloads on an outbound channel; the
//! caller owns the envelope (sequencing, session id, timestamps).

use std::sync::Arc;

use tokio::sync::mpsc;

use tern_core::event::{EventPayload, ToolCallStatus};
use tern_interaction::{ChatMessage, CompletionService};

use crate::prompts;
use crate::tool::ToolRegistry;

/// Target size of one `partial` fragment, in characters. Splits happen
/// on whitespace, so fragments can run slightly long.
const PARTIAL_CHUNK_CHARS: usize = 120;

const DEGRADED_RESPONSE: &str =
    "The run ended before a complete answer was produced. Partial progress \
     may be visible in the event stream.";

/// Outcome of one completed reasoning loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// The last assistant message with textual content.
    pub response: String,
    /// True when the loop hit the global step cap or finished without
    /// producing text.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuditVerdict {
    Pass,
    Retry,
}

impl AuditVerdict {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Retry => "RETRY",
        }
    }
}

/// Anything that is not an explicit RETRY passes. Audits fail open.
fn parse_verdict(text: &str) -> AuditVerdict {
    if text.trim().to_uppercase().contains("RETRY") {
        AuditVerdict::Retry
    } else {
        AuditVerdict::Pass
    }
}

enum LoopState {
    Agent,
    Tools(Vec<tern_interaction::ToolCallRequest>),
    Auditor,
    Done,
}

/// Drives one run's state machine against the completion service.
pub struct ReasoningLoop {
    completion: Arc<dyn CompletionService>,
    max_audit_attempts: usize,
    max_steps: usize,
}

impl ReasoningLoop {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        max_audit_attempts: usize,
        max_steps: usize,
    ) -> Self {
        Self {
            completion,
            max_audit_attempts,
            max_steps,
        }
    }

    /// Runs the loop to a terminal state. Always produces an outcome.
    ///
    /// `messages` already carries the system prompt, prior history, and
    /// the new user turn. Progress payloads go out on `events`; a
    /// closed receiver never aborts the run. Completion failures in any
    /// phase degrade rather than fail: the agent phase falls back to
    /// the text produced so far, the audit phase passes implicitly.
    pub async fn run(
        &self,
        user_prompt: &str,
        mut messages: Vec<ChatMessage>,
        registry: &ToolRegistry,
        has_environment: bool,
        events: mpsc::Sender<EventPayload>,
    ) -> RunOutcome {
        let mut state = LoopState::Agent;
        let mut steps = 0usize;
        let mut verdicts: Vec<AuditVerdict> = Vec::new();
        let mut cumulative = String::new();
        let mut last_response: Option<String> = None;

        loop {
            if let LoopState::Done = state {
                return match last_response {
                    Some(response) => RunOutcome {
                        response,
                        degraded: false,
                    },
                    None => RunOutcome {
                        response: DEGRADED_RESPONSE.to_string(),
                        degraded: true,
                    },
                };
            }

            steps += 1;
            if steps > self.max_steps {
                tracing::warn!(
                    target: "tern::reasoning",
                    steps,
                    "step cap reached, returning degraded response"
                );
                return RunOutcome {
                    response: last_response.unwrap_or_else(|| DEGRADED_RESPONSE.to_string()),
                    degraded: true,
                };
            }

            state = match state {
                LoopState::Agent => {
                    let response = match self
                        .completion
                        .complete(&messages, &registry.specs())
                        .await
                    {
                        Ok(response) => response,
                        Err(err) => {
                            tracing::error!(
                                target: "tern::reasoning",
                                error = %err,
                                "completion failed, returning degraded response"
                            );
                            return RunOutcome {
                                response: last_response
                                    .unwrap_or_else(|| DEGRADED_RESPONSE.to_string()),
                                degraded: true,
                            };
                        }
                    };
                    if !response.text.is_empty() {
                        self.emit_text(&response.text, &mut cumulative, &events).await;
                        last_response = Some(response.text.clone());
                    }
                    if response.has_tool_calls() {
                        let calls = response.tool_calls.clone();
                        messages.push(ChatMessage::assistant_with_tools(
                            response.text,
                            response.tool_calls,
                        ));
                        LoopState::Tools(calls)
                    } else {
                        messages.push(ChatMessage::assistant(response.text));
                        LoopState::Auditor
                    }
                }
                LoopState::Tools(calls) => {
                    for call in &calls {
                        self.emit(
                            &events,
                            EventPayload::Tool {
                                name: call.name.clone(),
                                args: Some(call.arguments.clone()),
                                result: None,
                                status: ToolCallStatus::Running,
                            },
                        )
                        .await;

                        let outcome = registry.dispatch(call).await;

                        self.emit(
                            &events,
                            EventPayload::Tool {
                                name: call.name.clone(),
                                args: None,
                                result: Some(serde_json::Value::String(outcome.content.clone())),
                                status: if outcome.is_error {
                                    ToolCallStatus::Error
                                } else {
                                    ToolCallStatus::Complete
                                },
                            },
                        )
                        .await;

                        messages.push(ChatMessage::tool_result(&call.id, outcome.content));
                    }
                    LoopState::Agent
                }
                LoopState::Auditor => {
                    if verdicts.len() >= self.max_audit_attempts {
                        self.emit_verdict(&events, "PASS (attempt limit)", has_environment)
                            .await;
                        LoopState::Done
                    } else {
                        let verdict = self.audit(user_prompt, last_response.as_deref()).await;
                        verdicts.push(verdict);
                        self.emit_verdict(&events, verdict.as_str(), has_environment)
                            .await;
                        match verdict {
                            AuditVerdict::Pass => LoopState::Done,
                            AuditVerdict::Retry => {
                                messages.push(ChatMessage::user(prompts::retry_feedback()));
                                LoopState::Agent
                            }
                        }
                    }
                }
                LoopState::Done => unreachable!("handled at loop top"),
            };
        }
    }

    /// One audit call. Any adapter error is an implicit PASS.
    async fn audit(&self, user_prompt: &str, last_response: Option<&str>) -> AuditVerdict {
        let answer = match last_response {
            Some(text) => text,
            None => return AuditVerdict::Pass,
        };
        let audit_messages = vec![
            ChatMessage::system(prompts::auditor_system_prompt()),
            ChatMessage::user(prompts::auditor_review_request(user_prompt, answer)),
        ];
        match self.completion.complete(&audit_messages, &[]).await {
            Ok(response) => parse_verdict(&response.text),
            Err(err) => {
                tracing::warn!(target: "tern::reasoning", error = %err, "audit failed, passing");
                AuditVerdict::Pass
            }
        }
    }

    /// Re-chunks one assistant message into partial events.
    async fn emit_text(
        &self,
        text: &str,
        cumulative: &mut String,
        events: &mpsc::Sender<EventPayload>,
    ) {
        for (index, chunk) in chunk_text(text, PARTIAL_CHUNK_CHARS).into_iter().enumerate() {
            let fragment = if index == 0 && !cumulative.is_empty() {
                format!("\n\n{chunk}")
            } else {
                chunk
            };
            cumulative.push_str(&fragment);
            self.emit(
                events,
                EventPayload::Partial {
                    fragment,
                    cumulative: cumulative.clone(),
                },
            )
            .await;
        }
    }

    async fn emit_verdict(
        &self,
        events: &mpsc::Sender<EventPayload>,
        verdict: &str,
        has_environment: bool,
    ) {
        self.emit(
            events,
            EventPayload::Status {
                status: "audit".to_string(),
                message: verdict.to_string(),
                has_environment,
            },
        )
        .await;
    }

    async fn emit(&self, events: &mpsc::Sender<EventPayload>, payload: EventPayload) {
        // A dropped receiver means nobody is forwarding events anymore;
        // the run itself still proceeds to its terminal state.
        let _ = events.send(payload).await;
    }
}

/// Splits text into chunks of roughly `max_chars`, breaking on
/// whitespace. A single token longer than the limit becomes its own
/// chunk.
fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for token in text.split_inclusive(char::is_whitespace) {
        if !current.is_empty() && current.len() + token.len() > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(token);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
