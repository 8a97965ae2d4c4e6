//! End-to-end prompt cycles against a scripted provider and an in-memory
//! tool server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use spotlight_host::agent_core::{
    Engine, EngineConfig, EngineHandle, PromptEvent, ToolFailurePolicy, ToolResultEvent,
};
use spotlight_host::history::{Message, Role};
use spotlight_host::inference::{InferenceError, Provider, ProviderMessage, Tool, ToolCall};
use spotlight_host::mcp_client::{CallToolResult, McpClient, McpError, McpTool, ToolServer, ToolInputSchema};

// ─── Fakes ──────────────────────────────────────────────────────────────────

type Reply = Result<ProviderMessage, InferenceError>;

/// Plays back canned replies, then answers "done".
struct ScriptedProvider {
    script: Mutex<VecDeque<Reply>>,
    repeat_overload: bool,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            repeat_overload: false,
            calls: AtomicU32::new(0),
        })
    }

    fn always_overloaded() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat_overload: true,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    async fn create_message(
        &self,
        _latest_prompt: &str,
        _history: &[Message],
        _tools: &[Tool],
    ) -> Result<ProviderMessage, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.repeat_overload {
            return Err(InferenceError::HttpError {
                status: 529,
                body: r#"{"type":"error","error":{"type":"overloaded_error"}}"#.into(),
            });
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(text("done")))
    }
}

/// A file-system-like server with `list_files` and `delete_file`.
#[derive(Default)]
struct FsServer {
    deletes: AtomicU32,
}

#[async_trait]
impl ToolServer for FsServer {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        Ok(["list_files", "delete_file"]
            .into_iter()
            .map(|name| McpTool {
                name: name.into(),
                description: format!("{name} in the sandbox"),
                input_schema: ToolInputSchema::default(),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        tool: &str,
        _arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CallToolResult, McpError> {
        let text = match tool {
            "list_files" => "notes.txt\ntemp.txt".to_string(),
            "delete_file" => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                "deleted".to_string()
            }
            other => return Err(McpError::ServerError {
                code: -32601,
                message: format!("unknown tool {other}"),
                data: None,
            }),
        };
        Ok(CallToolResult {
            content: vec![json!({"type": "text", "text": text})],
            is_error: false,
        })
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn text(t: &str) -> ProviderMessage {
    ProviderMessage {
        text: t.into(),
        tool_calls: vec![],
    }
}

fn calls(names: &[(&str, serde_json::Value)]) -> ProviderMessage {
    ProviderMessage {
        text: String::new(),
        tool_calls: names
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                id: format!("call_{i}"),
                name: (*name).into(),
                arguments: args.as_object().cloned().unwrap_or_default(),
            })
            .collect(),
    }
}

struct Running {
    handle: EngineHandle,
    events: mpsc::Receiver<PromptEvent>,
    task: JoinHandle<Engine>,
    sink: spotlight_host::agent_core::EventSink,
}

impl Running {
    /// Next event; generous timeout so paused-clock tests are not cut short.
    async fn next(&mut self) -> PromptEvent {
        tokio::time::timeout(Duration::from_secs(3600), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event stream closed")
    }

    /// Drop the caller side and hand back the stopped engine.
    async fn stop(self) -> Engine {
        drop(self.handle);
        drop(self.events);
        self.task.await.unwrap()
    }
}

async fn start(provider: Arc<dyn Provider>, fs: Arc<FsServer>, config: EngineConfig) -> Running {
    let mut mcp = McpClient::new();
    mcp.add_server("fs", fs).await;

    let (mut engine, handle) = Engine::new(provider, Arc::new(mcp), config);
    let events = handle.events().unwrap();
    let sink = engine.event_sink();
    let task = tokio::spawn(async move {
        engine.run(CancellationToken::new()).await;
        engine
    });
    Running {
        handle,
        events,
        task,
        sink,
    }
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_files_runs_without_confirmation() {
    let provider = ScriptedProvider::new(vec![
        Ok(calls(&[("fs__list_files", json!({"path": "."}))])),
        Ok(text("You have notes.txt and temp.txt.")),
    ]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider.clone(), fs, EngineConfig::default()).await;

    run.handle.search("List files").await.unwrap();

    assert_eq!(run.next().await.kind(), "tool_use");
    match run.next().await {
        PromptEvent::ToolResult(result) => {
            assert_eq!(result.tool, "list_files");
            assert_eq!(result.text, "notes.txt\ntemp.txt");
        }
        other => panic!("expected tool_result, got {other:?}"),
    }
    match run.next().await {
        PromptEvent::FinalResult(message) => {
            assert_eq!(message.text(), "You have notes.txt and temp.txt.")
        }
        other => panic!("expected final_result, got {other:?}"),
    }

    // Exactly one final_result: nothing else follows.
    assert!(tokio::time::timeout(Duration::from_millis(200), run.events.recv())
        .await
        .is_err());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    let engine = run.stop().await;
    let roles: Vec<Role> = engine.history().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
}

#[tokio::test]
async fn rejected_delete_aborts_cycle() {
    let provider = ScriptedProvider::new(vec![Ok(calls(&[(
        "fs__delete_file",
        json!({"path": "temp.txt"}),
    )]))]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider.clone(), fs.clone(), EngineConfig::default()).await;

    run.handle.search("Delete temp.txt").await.unwrap();

    let PromptEvent::ConfirmationRequired(request) = run.next().await else {
        panic!("expected confirmation_required");
    };
    assert_eq!(request.server, "fs");
    assert_eq!(request.tool, "delete_file");
    assert!(request.args.contains("temp.txt"));

    run.handle.confirm(&request.token, false).await.unwrap();
    assert_eq!(run.next().await, PromptEvent::Error("operation aborted by user".into()));

    assert_eq!(fs.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let engine = run.stop().await;
    assert!(engine.history().iter().all(|m| m.tool_results().next().is_none()));
}

#[tokio::test]
async fn approved_delete_runs_and_engine_takes_next_prompt() {
    let provider = ScriptedProvider::new(vec![
        Ok(calls(&[("fs__delete_file", json!({"path": "temp.txt"}))])),
        Ok(text("Deleted temp.txt.")),
        Ok(text("Hello again.")),
    ]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider, fs.clone(), EngineConfig::default()).await;

    run.handle.search("Delete temp.txt").await.unwrap();
    let PromptEvent::ConfirmationRequired(request) = run.next().await else {
        panic!("expected confirmation_required");
    };
    run.handle.confirm(&request.token, true).await.unwrap();

    assert_eq!(run.next().await.kind(), "tool_use");
    assert_eq!(run.next().await.kind(), "tool_result");
    assert_eq!(run.next().await.kind(), "final_result");
    assert_eq!(fs.deletes.load(Ordering::SeqCst), 1);

    run.handle.search("hi").await.unwrap();
    match run.next().await {
        PromptEvent::FinalResult(message) => assert_eq!(message.text(), "Hello again."),
        other => panic!("expected final_result, got {other:?}"),
    }
}

#[tokio::test]
async fn queued_queries_do_not_block_a_confirmation() {
    let provider = ScriptedProvider::new(vec![
        Ok(calls(&[("fs__delete_file", json!({"path": "temp.txt"}))])),
        Ok(text("Deleted temp.txt.")),
        Ok(text("second answer")),
        Ok(text("third answer")),
    ]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider, fs.clone(), EngineConfig::default()).await;

    // All three are queued up front; the engine is busy with the first.
    let queries = run.handle.spawn_submitter();
    for query in ["Delete temp.txt", "second", "third"] {
        queries.send(query.to_string()).unwrap();
    }

    let PromptEvent::ConfirmationRequired(request) = run.next().await else {
        panic!("expected confirmation_required");
    };
    tokio::time::timeout(Duration::from_secs(1), run.handle.confirm(&request.token, true))
        .await
        .expect("confirmation reply blocked")
        .unwrap();

    assert_eq!(run.next().await.kind(), "tool_use");
    assert_eq!(run.next().await.kind(), "tool_result");
    let mut answers = Vec::new();
    for _ in 0..3 {
        match run.next().await {
            PromptEvent::FinalResult(message) => answers.push(message.text()),
            other => panic!("expected final_result, got {other:?}"),
        }
    }
    assert_eq!(answers, vec!["Deleted temp.txt.", "second answer", "third answer"]);
    assert_eq!(fs.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn persistent_overload_gives_up_at_retry_limit() {
    let provider = ScriptedProvider::always_overloaded();
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider.clone(), fs, EngineConfig::default()).await;

    let started = tokio::time::Instant::now();
    run.handle.search("List files").await.unwrap();

    match run.next().await {
        PromptEvent::Error(reason) => {
            assert!(reason.starts_with("provider overloaded after 5 retries"), "{reason}")
        }
        other => panic!("expected error, got {other:?}"),
    }
    // One initial attempt plus five retries, sleeping 1+2+4+8+16 seconds.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    assert!(started.elapsed() >= Duration::from_secs(31));

    // The loop survives a failed cycle.
    run.handle.search("again").await.unwrap();
    assert_eq!(run.next().await.kind(), "error");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn events_are_suppressed_while_confirmation_outstanding() {
    let provider = ScriptedProvider::new(vec![
        Ok(calls(&[("fs__delete_file", json!({"path": "temp.txt"}))])),
        Ok(text("Deleted.")),
    ]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider, fs, EngineConfig::default()).await;

    run.handle.search("Delete temp.txt").await.unwrap();
    let PromptEvent::ConfirmationRequired(request) = run.next().await else {
        panic!("expected confirmation_required");
    };

    // Another call path publishes while the approval is pending.
    run.sink
        .emit(PromptEvent::ToolResult(ToolResultEvent {
            tool_use_id: "other".into(),
            server: "fs".into(),
            tool: "phantom".into(),
            text: "should not be seen".into(),
            is_error: false,
            duration_ms: 1,
            timestamp: Utc::now(),
        }))
        .await;

    run.handle.confirm(&request.token, true).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let event = run.next().await;
        let done = event.kind() == "final_result";
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(seen
        .iter()
        .all(|e| !matches!(e, PromptEvent::ToolResult(r) if r.tool == "phantom")));
    assert_eq!(
        seen.iter().map(PromptEvent::kind).collect::<Vec<_>>(),
        vec!["tool_use", "tool_result", "final_result"]
    );
}

#[tokio::test(start_paused = true)]
async fn mismatched_token_does_not_unblock() {
    let provider = ScriptedProvider::new(vec![Ok(calls(&[(
        "fs__delete_file",
        json!({"path": "temp.txt"}),
    )]))]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider, fs.clone(), EngineConfig::default()).await;

    run.handle.search("Delete temp.txt").await.unwrap();
    let PromptEvent::ConfirmationRequired(request) = run.next().await else {
        panic!("expected confirmation_required");
    };
    run.handle.confirm("not-the-token", true).await.unwrap();

    let started = tokio::time::Instant::now();
    assert_eq!(run.next().await, PromptEvent::Error("confirmation timeout".into()));
    assert!(started.elapsed() >= Duration::from_secs(100));
    assert_eq!(fs.deletes.load(Ordering::SeqCst), 0);
    assert!(!request.token.is_empty());
}

#[tokio::test]
async fn failing_tool_is_skipped_by_default() {
    let provider = ScriptedProvider::new(vec![
        Ok(calls(&[
            ("db__list_tables", json!({})),
            ("fs__list_files", json!({})),
        ])),
        Ok(text("Only the file listing worked.")),
    ]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider, fs, EngineConfig::default()).await;

    run.handle.search("Show everything").await.unwrap();

    assert_eq!(run.next().await.kind(), "tool_use");
    match run.next().await {
        PromptEvent::Error(reason) => assert!(reason.contains("db__list_tables"), "{reason}"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(run.next().await.kind(), "tool_use");
    assert_eq!(run.next().await.kind(), "tool_result");
    assert_eq!(run.next().await.kind(), "final_result");
}

#[tokio::test]
async fn only_tool_failing_still_gets_an_answer() {
    let provider = ScriptedProvider::new(vec![
        Ok(calls(&[("fs__explode", json!({}))])),
        Ok(text("Sorry, the tool failed.")),
    ]);
    let fs = Arc::new(FsServer::default());
    let mut run = start(provider.clone(), fs, EngineConfig::default()).await;

    run.handle.search("Blow it up").await.unwrap();

    assert_eq!(run.next().await.kind(), "tool_use");
    match run.next().await {
        PromptEvent::Error(reason) => assert!(reason.contains("fs__explode"), "{reason}"),
        other => panic!("expected error, got {other:?}"),
    }
    match run.next().await {
        PromptEvent::FinalResult(message) => {
            assert_eq!(message.role, Role::Assistant);
            assert_eq!(message.text(), "Sorry, the tool failed.");
        }
        other => panic!("expected final_result, got {other:?}"),
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

    let engine = run.stop().await;
    let roles: Vec<Role> = engine.history().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    let (id, reason) = engine.history()[2].tool_results().next().unwrap();
    assert_eq!(id, "call_0");
    assert!(reason.contains("unknown tool explode"), "{reason}");
}

#[tokio::test]
async fn failing_tool_aborts_under_abort_policy() {
    let provider = ScriptedProvider::new(vec![Ok(calls(&[
        ("db__list_tables", json!({})),
        ("fs__list_files", json!({})),
    ]))]);
    let fs = Arc::new(FsServer::default());
    let config = EngineConfig {
        tool_failure_policy: ToolFailurePolicy::AbortCycle,
        ..EngineConfig::default()
    };
    let mut run = start(provider.clone(), fs, config).await;

    run.handle.search("Show everything").await.unwrap();
    assert_eq!(run.next().await.kind(), "tool_use");
    match run.next().await {
        PromptEvent::Error(reason) => assert!(reason.contains("db__list_tables"), "{reason}"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let engine = run.stop().await;
    assert!(engine.history().iter().all(|m| m.role != Role::Tool));
}

#[tokio::test]
async fn history_respects_message_window() {
    let provider = ScriptedProvider::new(vec![]);
    let fs = Arc::new(FsServer::default());
    let config = EngineConfig {
        message_window: 3,
        ..EngineConfig::default()
    };
    let mut run = start(provider, fs, config).await;

    for query in ["one", "two", "three", "four"] {
        run.handle.search(query).await.unwrap();
        assert_eq!(run.next().await.kind(), "final_result");
    }

    let engine = run.stop().await;
    // Pruned to the window before the last provider call, then one reply appended.
    assert!(engine.history().len() <= 4);
    assert_eq!(engine.history().last().map(Message::text), Some("done".to_string()));
}
