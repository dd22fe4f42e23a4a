//! End-to-end coordinator tests with a scripted completion service and
//! an in-memory sandbox provider, persisting sessions to a temp dir.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use tern_application::{RunRequest, SessionExecutionCoordinator};
use tern_core::config::EngineConfig;
use tern_core::event::{EventFrame, EventPayload, EventStream};
use tern_core::memory::InMemoryMemoryStore;
use tern_core::session::{Session, SessionRepository};
use tern_infrastructure::TomlSessionRepository;
use tern_interaction::{
    ChatMessage, CommandOutput, CompletionError, CompletionResponse, CompletionService, DirEntry,
    SandboxError, SandboxHandle, SandboxService, ToolCallRequest, ToolSpec,
};

struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<CompletionResponse, CompletionError>>>,
}

impl ScriptedCompletion {
    fn new(script: Vec<Result<CompletionResponse, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<CompletionResponse, CompletionError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("completion script exhausted")
    }
}

#[derive(Default)]
struct FakeSandbox {
    live: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, String>>,
    created: AtomicUsize,
}

impl FakeSandbox {
    fn file_key(sandbox_id: &str, path: &str) -> String {
        format!("{sandbox_id}:{path}")
    }

    fn file_content(&self, sandbox_id: &str, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(&Self::file_key(sandbox_id, path))
            .cloned()
    }
}

#[async_trait]
impl SandboxService for FakeSandbox {
    async fn create(&self) -> Result<SandboxHandle, SandboxError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("env-new-{n}");
        self.live.lock().unwrap().insert(id.clone());
        Ok(SandboxHandle {
            url: format!("https://{id}.example"),
            id,
            created_at: 1_700_000_000_000,
        })
    }

    async fn resolve(&self, sandbox_id: &str) -> Result<Option<SandboxHandle>, SandboxError> {
        Ok(self
            .live
            .lock()
            .unwrap()
            .contains(sandbox_id)
            .then(|| SandboxHandle {
                id: sandbox_id.to_string(),
                url: format!("https://{sandbox_id}.example"),
                created_at: 1_700_000_000_000,
            }))
    }

    async fn write_file(
        &self,
        sandbox_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        self.files
            .lock()
            .unwrap()
            .insert(Self::file_key(sandbox_id, path), content.to_string());
        Ok(())
    }

    async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<String, SandboxError> {
        self.file_content(sandbox_id, path)
            .ok_or_else(|| SandboxError::Path(format!("'{path}' not found")))
    }

    async fn list_directory(
        &self,
        sandbox_id: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, SandboxError> {
        let prefix = Self::file_key(sandbox_id, path);
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .map(|key| DirEntry {
                name: key.rsplit('/').next().unwrap_or(key).to_string(),
                is_directory: false,
            })
            .collect())
    }

    async fn delete_path(&self, sandbox_id: &str, path: &str) -> Result<(), SandboxError> {
        self.files
            .lock()
            .unwrap()
            .remove(&Self::file_key(sandbox_id, path));
        Ok(())
    }

    async fn run_command(
        &self,
        _sandbox_id: &str,
        command: &str,
    ) -> Result<CommandOutput, SandboxError> {
        Ok(CommandOutput {
            stdout: format!("ran: {command}"),
            stderr: String::new(),
            exit_code: 0,
        })
    }
}

struct Harness {
    coordinator: Arc<SessionExecutionCoordinator>,
    sandbox: Arc<FakeSandbox>,
    sessions: Arc<TomlSessionRepository>,
    _dir: TempDir,
}

async fn harness(script: Vec<Result<CompletionResponse, CompletionError>>) -> Harness {
    let dir = TempDir::new().unwrap();
    let sessions = Arc::new(
        TomlSessionRepository::new(dir.path().join("sessions"))
            .await
            .unwrap(),
    );
    let sandbox = Arc::new(FakeSandbox::default());
    let config = EngineConfig {
        heartbeat_interval_secs: 0,
        ..EngineConfig::default()
    };
    let coordinator = Arc::new(SessionExecutionCoordinator::new(
        config,
        sessions.clone(),
        Arc::new(ScriptedCompletion::new(script)),
        sandbox.clone(),
        Arc::new(InMemoryMemoryStore::new()),
    ));
    Harness {
        coordinator,
        sandbox,
        sessions,
        _dir: dir,
    }
}

fn text(content: &str) -> Result<CompletionResponse, CompletionError> {
    Ok(CompletionResponse::text_only(content))
}

fn tool_call(id: &str, name: &str, args: Value) -> Result<CompletionResponse, CompletionError> {
    Ok(CompletionResponse {
        text: String::new(),
        tool_calls: vec![ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }],
    })
}

/// Drains the stream until the run's terminal frame, inclusive.
async fn collect_run(stream: &mut EventStream) -> Vec<EventFrame> {
    let mut frames = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("run did not reach a terminal event in time")
            .expect("stream closed before a terminal event");
        let terminal = frame.payload.is_terminal();
        frames.push(frame);
        if terminal {
            return frames;
        }
    }
}

fn kinds(frames: &[EventFrame]) -> Vec<&'static str> {
    frames.iter().map(|f| f.payload.kind()).collect()
}

#[tokio::test]
async fn test_action_run_emits_ordered_events_with_one_terminal() {
    let h = harness(vec![text("Scaffolded the app."), text("PASS")]).await;

    let mut stream = h.coordinator.subscribe("s-1");
    let ack = h
        .coordinator
        .start(RunRequest {
            prompt: "Create a todo app".into(),
            session_id: Some("s-1".into()),
            environment_ref: None,
        })
        .unwrap();
    assert!(ack.accepted);
    assert_eq!(ack.session_id, "s-1");

    let frames = collect_run(&mut stream).await;

    for (index, frame) in frames.iter().enumerate() {
        assert_eq!(frame.sequence, index as u64 + 1);
        assert_eq!(frame.session_id, "s-1");
    }
    let kinds = kinds(&frames);
    assert_eq!(kinds.iter().filter(|k| **k == "complete").count(), 1);
    assert!(!kinds.contains(&"error"));

    // A fresh environment is announced before the first partial.
    let sandbox_at = kinds.iter().position(|k| *k == "sandbox").unwrap();
    let partial_at = kinds.iter().position(|k| *k == "partial").unwrap();
    assert!(sandbox_at < partial_at);
    match &frames[sandbox_at].payload {
        EventPayload::Sandbox {
            is_new,
            replaced_old,
            ..
        } => {
            assert!(*is_new);
            assert!(replaced_old.is_none());
        }
        other => panic!("expected sandbox payload, got {other:?}"),
    }

    match &frames.last().unwrap().payload {
        EventPayload::Complete {
            response,
            has_environment,
            environment_url,
        } => {
            assert_eq!(response, "Scaffolded the app.");
            assert!(*has_environment);
            assert!(environment_url.is_some());
        }
        other => panic!("expected complete payload, got {other:?}"),
    }
}

#[tokio::test]
async fn test_informational_run_binds_no_environment() {
    let h = harness(vec![
        text("You add a file under app/ and export a component."),
        text("PASS"),
    ])
    .await;

    let mut stream = h.coordinator.subscribe("s-info");
    h.coordinator
        .start(RunRequest {
            prompt: "How do I create a Next.js page?".into(),
            session_id: Some("s-info".into()),
            environment_ref: None,
        })
        .unwrap();

    let frames = collect_run(&mut stream).await;
    let kinds = kinds(&frames);
    assert!(!kinds.contains(&"sandbox"));
    match &frames.last().unwrap().payload {
        EventPayload::Complete {
            has_environment,
            environment_url,
            ..
        } => {
            assert!(!has_environment);
            assert!(environment_url.is_none());
        }
        other => panic!("expected complete payload, got {other:?}"),
    }
    assert_eq!(h.sandbox.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_reference_is_replaced_once_and_persisted() {
    let h = harness(vec![text("Continued the work."), text("PASS")]).await;

    // A previously persisted session bound to an environment the
    // provider no longer knows.
    let mut session = Session::new("s-stale", "Create a service");
    session.bind_environment("env-stale", "https://env-stale.example", 1);
    h.sessions.save(&session).await.unwrap();

    let mut stream = h.coordinator.subscribe("s-stale");
    h.coordinator
        .start(RunRequest {
            prompt: "Continue building the service".into(),
            session_id: Some("s-stale".into()),
            environment_ref: None,
        })
        .unwrap();

    let frames = collect_run(&mut stream).await;
    let replacements: Vec<_> = frames
        .iter()
        .filter_map(|f| match &f.payload {
            EventPayload::Sandbox {
                id, replaced_old, ..
            } => Some((id.clone(), replaced_old.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(replacements.len(), 1);
    assert_eq!(replacements[0].1.as_deref(), Some("env-stale"));

    let stored = h.sessions.find_by_id("s-stale").await.unwrap().unwrap();
    assert_eq!(stored.environment_id.as_deref(), Some(replacements[0].0.as_str()));
    assert_ne!(stored.environment_id.as_deref(), Some("env-stale"));
}

#[tokio::test]
async fn test_live_reference_is_reused_without_sandbox_event() {
    let h = harness(vec![text("Reused it."), text("PASS")]).await;
    let handle = h.sandbox.create().await.unwrap();

    let mut stream = h.coordinator.subscribe("s-live");
    h.coordinator
        .start(RunRequest {
            prompt: "Add a login form".into(),
            session_id: Some("s-live".into()),
            environment_ref: Some(handle.id.clone()),
        })
        .unwrap();

    let frames = collect_run(&mut stream).await;
    assert!(!kinds(&frames).contains(&"sandbox"));
    assert_eq!(h.sandbox.created.load(Ordering::SeqCst), 1);

    let stored = h.sessions.find_by_id("s-live").await.unwrap().unwrap();
    assert_eq!(stored.environment_id.as_deref(), Some(handle.id.as_str()));
}

#[tokio::test]
async fn test_file_tools_write_edit_and_read() {
    let h = harness(vec![
        tool_call(
            "c1",
            "write_file",
            json!({"path": "app.txt", "content": "hello blue world"}),
        ),
        tool_call(
            "c2",
            "edit_file",
            json!({
                "path": "app.txt",
                "operation": "replace_text",
                "search": "blue",
                "replace": "green"
            }),
        ),
        tool_call("c3", "read_file", json!({"path": "app.txt"})),
        text("The file now reads: hello green world"),
        text("PASS"),
    ])
    .await;

    let mut stream = h.coordinator.subscribe("s-files");
    h.coordinator
        .start(RunRequest {
            prompt: "Create app.txt and fix its color".into(),
            session_id: Some("s-files".into()),
            environment_ref: None,
        })
        .unwrap();

    let frames = collect_run(&mut stream).await;

    let sandbox_id = frames
        .iter()
        .find_map(|f| match &f.payload {
            EventPayload::Sandbox { id, .. } => Some(id.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        h.sandbox.file_content(&sandbox_id, "app.txt").as_deref(),
        Some("hello green world")
    );

    // Each tool call produced a running and then a completed frame.
    let tool_statuses: Vec<_> = frames
        .iter()
        .filter_map(|f| match &f.payload {
            EventPayload::Tool { name, status, .. } => Some((name.clone(), *status)),
            _ => None,
        })
        .collect();
    assert_eq!(tool_statuses.len(), 6);

    let read_result = frames
        .iter()
        .rev()
        .find_map(|f| match &f.payload {
            EventPayload::Tool {
                name,
                result: Some(result),
                ..
            } if name == "read_file" => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(read_result, Value::String("hello green world".into()));
}

#[tokio::test]
async fn test_audit_retries_are_capped() {
    let h = harness(vec![
        text("draft 1"),
        text("RETRY"),
        text("draft 2"),
        text("RETRY"),
        text("draft 3"),
        text("RETRY"),
        text("draft 4"),
        // No further audit call: the attempt cap forces a pass.
    ])
    .await;

    let mut stream = h.coordinator.subscribe("s-audit");
    h.coordinator
        .start(RunRequest {
            prompt: "Explain the tradeoffs of server components".into(),
            session_id: Some("s-audit".into()),
            environment_ref: None,
        })
        .unwrap();

    let frames = collect_run(&mut stream).await;
    match &frames.last().unwrap().payload {
        EventPayload::Complete { response, .. } => assert_eq!(response, "draft 4"),
        other => panic!("expected complete payload, got {other:?}"),
    }

    let stored = h.sessions.find_by_id("s-audit").await.unwrap().unwrap();
    assert_eq!(stored.conversation_history.len(), 2);
    assert_eq!(stored.conversation_history[1].content, "draft 4");
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let h = harness(vec![]).await;
    let result = h.coordinator.start(RunRequest {
        prompt: "   ".into(),
        session_id: None,
        environment_ref: None,
    });
    assert!(result.unwrap_err().is_invalid_input());
}

#[tokio::test]
async fn test_generated_session_id_is_returned() {
    let h = harness(vec![text("Hi there."), text("PASS")]).await;
    let ack = h
        .coordinator
        .start(RunRequest {
            prompt: "Tell me about Rust".into(),
            session_id: None,
            environment_ref: None,
        })
        .unwrap();
    assert!(ack.accepted);
    assert!(!ack.session_id.is_empty());

    let stream = h.coordinator.subscribe(&ack.session_id);
    // Subscribe may race the first frames; wait for persistence instead.
    for _ in 0..50 {
        if h.sessions
            .find_by_id(&ack.session_id)
            .await
            .unwrap()
            .is_some()
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let stored = h.sessions.find_by_id(&ack.session_id).await.unwrap();
    assert!(stored.is_some());
    drop(stream);
}
