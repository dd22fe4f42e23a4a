//! Session execution coordinator.
//!
//! The coordinator is the engine's single entry point. `start` validates
//! the request, acknowledges the caller immediately, and drives the run
//! on a background task: classify intent, acquire an environment when
//! one is needed, assemble the tool registry, run the reasoning loop,
//! and persist the completed turn. Progress is observable only through
//! the event bus; every run ends with exactly one `complete` or `error`
//! frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tern_core::config::EngineConfig;
use tern_core::error::{Result, TernError};
use tern_core::event::{EventBus, EventPayload, EventStream};
use tern_core::intent;
use tern_core::memory::MemoryStore;
use tern_core::session::{MessageRole, Session, SessionRepository};
use tern_execution::lifecycle::EnvironmentManager;
use tern_execution::reasoning::ReasoningLoop;
use tern_execution::tool::{
    BuiltinReferenceSource, DeletePathTool, EditFileTool, ListDirectoryTool, MemoryGetTool,
    MemorySaveTool, MemorySearchTool, ReadFileTool, ReferenceLookupTool, RunCommandTool,
    ToolRegistry, WriteFileTool,
};
use tern_execution::{prompts, tool::ToolError};
use tern_interaction::{ChatMessage, CompletionService, SandboxHandle, SandboxService};

/// One invocation of the engine.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The user's prompt. Must be non-empty.
    pub prompt: String,
    /// Session to continue; a fresh one is created when absent.
    pub session_id: Option<String>,
    /// Caller-supplied environment reference to reuse.
    pub environment_ref: Option<String>,
}

/// Immediate acknowledgment returned by `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAck {
    pub accepted: bool,
    pub session_id: String,
}

/// Drives runs for sessions. One instance per engine process.
pub struct SessionExecutionCoordinator {
    config: EngineConfig,
    bus: Arc<EventBus>,
    sessions: Arc<dyn SessionRepository>,
    completion: Arc<dyn CompletionService>,
    sandbox: Arc<dyn SandboxService>,
    memory: Arc<dyn MemoryStore>,
}

impl SessionExecutionCoordinator {
    pub fn new(
        config: EngineConfig,
        sessions: Arc<dyn SessionRepository>,
        completion: Arc<dyn CompletionService>,
        sandbox: Arc<dyn SandboxService>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let bus = Arc::new(EventBus::with_options(
            config.event_capacity,
            Duration::from_secs(config.heartbeat_interval_secs),
        ));
        Self {
            config,
            bus,
            sessions,
            completion,
            sandbox,
            memory,
        }
    }

    /// Subscribes to a session's live event stream.
    pub fn subscribe(&self, session_id: &str) -> EventStream {
        self.bus.subscribe(session_id)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Tears down event channels. Intended for engine shutdown.
    pub fn shutdown(&self) {
        self.bus.shutdown();
    }

    /// Validates the request and starts the run on a background task.
    ///
    /// The caller is acknowledged as soon as the input is accepted;
    /// everything after that is reported through the event bus.
    pub fn start(self: &Arc<Self>, request: RunRequest) -> Result<RunAck> {
        if request.prompt.trim().is_empty() {
            return Err(TernError::invalid_input("prompt must not be empty"));
        }
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let coordinator = Arc::clone(self);
        let run_session_id = session_id.clone();
        tokio::spawn(async move {
            coordinator
                .execute_run(run_session_id, request.prompt, request.environment_ref)
                .await;
        });

        Ok(RunAck {
            accepted: true,
            session_id,
        })
    }

    async fn execute_run(
        self: Arc<Self>,
        session_id: String,
        prompt: String,
        provided_ref: Option<String>,
    ) {
        let mut session = match self.sessions.find_by_id(&session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::new(&session_id, &prompt),
            Err(err) => {
                tracing::error!(target: "tern::run", session_id = %session_id, error = %err, "session load failed");
                self.bus.publish(
                    &session_id,
                    EventPayload::Error {
                        message: format!("failed to load session: {err}"),
                        environment_url: None,
                    },
                );
                return;
            }
        };

        // A reference supplied by the caller wins over the session's
        // stored binding.
        let effective_ref = provided_ref.or_else(|| session.environment_id.clone());
        let classification = intent::classify(&prompt, effective_ref.as_deref());

        let mut environment: Option<SandboxHandle> = None;
        if classification.needs_environment {
            let manager = EnvironmentManager::new(Arc::clone(&self.sandbox));
            match manager
                .acquire(classification.environment_ref.as_deref())
                .await
            {
                Ok(acquisition) => {
                    if let Some(change) = &acquisition.change {
                        self.bus.publish(
                            &session_id,
                            EventPayload::Sandbox {
                                id: acquisition.handle.id.clone(),
                                url: acquisition.handle.url.clone(),
                                is_new: change.is_new,
                                replaced_old: change.replaced_old.clone(),
                            },
                        );
                    }
                    session.bind_environment(
                        &acquisition.handle.id,
                        &acquisition.handle.url,
                        acquisition.handle.created_at,
                    );
                    // Persist a replacement immediately so the binding
                    // survives even a run that later fails.
                    if acquisition.change.is_some() {
                        if let Err(err) = self.sessions.save(&session).await {
                            tracing::warn!(target: "tern::run", session_id = %session_id, error = %err, "failed to persist environment binding");
                        }
                    }
                    environment = Some(acquisition.handle);
                }
                Err(err) => {
                    session.append_turn(MessageRole::User, &prompt);
                    let _ = self.sessions.save(&session).await;
                    self.bus.publish(
                        &session_id,
                        EventPayload::Error {
                            message: format!("environment provisioning failed: {err}"),
                            environment_url: None,
                        },
                    );
                    return;
                }
            }
        }

        let has_environment = environment.is_some();
        let environment_url = environment.as_ref().map(|h| h.url.clone());

        self.bus.publish(
            &session_id,
            EventPayload::Status {
                status: "started".to_string(),
                message: "run started".to_string(),
                has_environment,
            },
        );

        let registry = match self.build_registry(&session_id, environment.as_ref()) {
            Ok(registry) => registry,
            Err(err) => {
                self.bus.publish(
                    &session_id,
                    EventPayload::Error {
                        message: format!("tool registry setup failed: {err}"),
                        environment_url,
                    },
                );
                return;
            }
        };

        let messages = build_messages(&session, &prompt, environment_url.as_deref());

        let (tx, mut rx) = mpsc::channel(self.config.run_channel_capacity);
        let forwarder_bus = Arc::clone(&self.bus);
        let forwarder_session = session_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                forwarder_bus.publish(&forwarder_session, payload);
            }
        });

        let looper = ReasoningLoop::new(
            Arc::clone(&self.completion),
            self.config.max_audit_attempts,
            self.config.max_steps,
        );
        let outcome = looper
            .run(&prompt, messages, &registry, has_environment, tx)
            .await;

        // The loop's sender is dropped; wait for the forwarder so every
        // progress frame precedes the terminal frame.
        let _ = forwarder.await;

        session.append_turn(MessageRole::User, &prompt);
        session.append_turn(MessageRole::Assistant, &outcome.response);
        if let Err(err) = self.sessions.save(&session).await {
            tracing::error!(target: "tern::run", session_id = %session_id, error = %err, "failed to persist session");
        }
        if outcome.degraded {
            tracing::warn!(target: "tern::run", session_id = %session_id, "run completed degraded");
        }
        self.bus.publish(
            &session_id,
            EventPayload::Complete {
                response: outcome.response,
                environment_url,
                has_environment,
            },
        );
    }

    /// Assembles the run's capability set: reference and memory tools
    /// always, environment-bound tools only with an active handle.
    fn build_registry(
        &self,
        session_id: &str,
        environment: Option<&SandboxHandle>,
    ) -> std::result::Result<ToolRegistry, ToolError> {
        let mut registry = ToolRegistry::new();

        registry.register(Arc::new(ReferenceLookupTool::new(
            Arc::new(BuiltinReferenceSource),
            Duration::from_secs(self.config.reference_cache_ttl_secs),
        )))?;
        registry.register(Arc::new(MemoryGetTool::new(
            Arc::clone(&self.memory),
            session_id,
        )))?;
        registry.register(Arc::new(MemorySaveTool::new(
            Arc::clone(&self.memory),
            session_id,
        )))?;
        registry.register(Arc::new(MemorySearchTool::new(
            Arc::clone(&self.memory),
            session_id,
        )))?;

        if let Some(handle) = environment {
            let service = Arc::clone(&self.sandbox);
            registry.register(Arc::new(WriteFileTool::new(service.clone(), &handle.id)))?;
            registry.register(Arc::new(EditFileTool::new(service.clone(), &handle.id)))?;
            registry.register(Arc::new(ReadFileTool::new(service.clone(), &handle.id)))?;
            registry.register(Arc::new(ListDirectoryTool::new(
                service.clone(),
                &handle.id,
            )))?;
            registry.register(Arc::new(DeletePathTool::new(service.clone(), &handle.id)))?;
            registry.register(Arc::new(RunCommandTool::new(service, &handle.id)))?;
        }

        Ok(registry)
    }
}

/// Builds the completion message sequence: system prompt, persisted
/// history, then the new user turn.
fn build_messages(
    session: &Session,
    prompt: &str,
    environment_url: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(session.conversation_history.len() + 2);
    messages.push(ChatMessage::system(prompts::agent_system_prompt(
        environment_url,
    )));
    for turn in &session.conversation_history {
        let message = match turn.role {
            MessageRole::User => ChatMessage::user(&turn.content),
            MessageRole::Assistant => ChatMessage::assistant(&turn.content),
        };
        messages.push(message);
    }
    messages.push(ChatMessage::user(prompt));
    messages
}
