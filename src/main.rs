//! `spotlight-host [settings.yaml]` — terminal front end for the engine.
//!
//! Each stdin line is a query. While a tool call waits for approval, the
//! next line is read as the `y/N` answer instead. EOF, `exit` or Ctrl-C
//! shut the tool servers down.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use spotlight_host::agent_core::{Engine, PromptEvent};
use spotlight_host::config::{default_settings_path, load_settings};
use spotlight_host::inference::create_provider;
use spotlight_host::mcp_client::{load_servers_config, McpClient};

/// Token of the confirmation the next input line answers.
type PendingToken = Arc<Mutex<Option<String>>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path)
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;

    spotlight_host::init_tracing(settings.debug_mode, settings.log_json);

    let provider = create_provider(&settings.provider, &settings.system_prompt)
        .context("invalid provider configuration")?;

    let servers = load_servers_config(&settings.servers_path()).context("loading tool servers")?;
    let mut mcp = McpClient::new().with_call_timeout(settings.tool_timeout());
    for (name, error) in mcp.start_all(&servers).await {
        eprintln!("warning: tool server '{name}' unavailable: {error}");
    }
    let mcp = Arc::new(mcp);

    let (mut engine, handle) = Engine::new(provider, Arc::clone(&mcp), settings.engine_config());
    let events = handle.events().context("event stream already taken")?;
    let mut servers = mcp.server_names();
    servers.sort_unstable();
    println!(
        "{} tools available from [{}]. Type a query, or 'exit' to quit.",
        engine.tools().len(),
        servers.join(", ")
    );

    let cancel = CancellationToken::new();
    let engine_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { engine.run(cancel).await }
    });

    let pending: PendingToken = Arc::new(Mutex::new(None));
    let render_task = tokio::spawn(render_events(events, Arc::clone(&pending)));
    let queries = handle.spawn_submitter();

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => line,
                None => break,
            },
        };
        let line = line.trim();

        let token = pending.lock().ok().and_then(|mut slot| slot.take());
        if let Some(token) = token {
            let approved = matches!(line.to_ascii_lowercase().as_str(), "y" | "yes");
            handle.confirm(&token, approved).await?;
            continue;
        }

        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }
        if queries.send(line.to_string()).is_err() {
            break;
        }
    }

    cancel.cancel();
    drop(queries);
    drop(handle);
    if let Err(e) = engine_task.await {
        tracing::warn!(error = %e, "engine task ended abnormally");
    }
    render_task.abort();
    mcp.shutdown_all().await;
    Ok(())
}

async fn render_events(mut events: mpsc::Receiver<PromptEvent>, pending: PendingToken) {
    while let Some(event) = events.recv().await {
        match event {
            PromptEvent::ToolUse(e) => println!("→ {}/{} {}", e.server, e.tool, serde_json::Value::Object(e.args)),
            PromptEvent::ToolResult(e) => {
                let marker = if e.is_error { "✗" } else { "✓" };
                println!("{marker} {}/{} ({} ms)", e.server, e.tool, e.duration_ms);
            }
            PromptEvent::AuthorizationRequired(e) => {
                println!("! {} requires authorization: {}", e.server, e.reason)
            }
            PromptEvent::ConfirmationRequired(req) => {
                println!("? {}/{} wants to run with:\n{}", req.server, req.tool, req.args);
                println!("Allow? [y/N]");
                if let Ok(mut slot) = pending.lock() {
                    *slot = Some(req.token);
                }
            }
            PromptEvent::FinalResult(message) => println!("\n{}\n", message.text()),
            PromptEvent::Error(reason) => println!("error: {reason}"),
            PromptEvent::Prompt(_) => {}
        }
    }
}
