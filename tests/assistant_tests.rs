//! End-to-end tests: host, supervisor, handshake and relay together.
//!
//! The backend is a shell script that announces the port of an in-process
//! axum server standing in for the Python service.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Json, Router};
use common::wait_until;
use devassist::app::{Assistant, repl};
use devassist::backend::{BackendError, BackendState, KillOutcome};
use devassist::config::Config;
use devassist::output::{OutputSource, RecordingNotifier, RingOutput};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn fake_service() -> SocketAddr {
    let router = Router::new().route(
        "/query",
        post(|Json(body): Json<Value>| async move {
            let question = body["question"].as_str().unwrap_or_default().to_string();
            Json(json!({ "answer": format!("echo: {}", question) }))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Writes `fake.sh` into `dir` and returns a config that runs it.
fn fake_backend_config(dir: &Path, script: &str) -> Config {
    std::fs::write(dir.join("fake.sh"), script).unwrap();
    let mut config = Config::from_content(&format!(
        "backend_dir = {}\npython = sh\nentry = fake.sh\nhost = 127.0.0.1\nport_timeout_ms = 5000\n",
        dir.display()
    ));
    config.api_key = Some("k123".to_string());
    config
}

fn announcing(addr: SocketAddr) -> String {
    format!(
        "echo \"WS=$WORKSPACE_PATH KEY=$HF_API_KEY\"\necho PORT::{}\nsleep 30\n",
        addr.port()
    )
}

#[tokio::test]
async fn test_ask_round_trip() {
    let addr = fake_service().await;
    let backend = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let output = Arc::new(RingOutput::default());
    let notifier = Arc::new(RecordingNotifier::new());

    let assistant = Assistant::activate(
        fake_backend_config(backend.path(), &announcing(addr)),
        output.clone(),
        notifier.clone(),
        Some(workspace.path().to_path_buf()),
    );

    let answer = assistant.ask("where is main?").await.unwrap();
    assert_eq!(answer.as_deref(), Some("echo: where is main?"));
    assert_eq!(
        assistant.backend_state(),
        BackendState::Ready(addr.port().to_string())
    );

    let stdout = output.texts_from(OutputSource::Backend);
    assert!(stdout.contains(&format!("WS={} KEY=k123", workspace.path().display())));
    assert!(output.contains("Activating AI Code Assistant"));
    assert!(output.contains("Initial workspace"));
    assert_eq!(notifier.error_count(), 0);

    assert!(matches!(assistant.deactivate(), Some(Ok(KillOutcome::Killed))));
}

#[tokio::test]
async fn test_ask_times_out_without_handshake() {
    let backend = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let mut config = fake_backend_config(backend.path(), "echo still loading\nsleep 30\n");
    config.port_timeout = Duration::from_millis(200);
    let output = Arc::new(RingOutput::default());
    let notifier = Arc::new(RecordingNotifier::new());

    let assistant = Assistant::activate(
        config,
        output.clone(),
        notifier.clone(),
        Some(workspace.path().to_path_buf()),
    );

    let result = assistant.ask("hello").await;
    assert!(matches!(result, Err(BackendError::HandshakeTimeout(_))));
    assert_eq!(notifier.notices()[0].message, "Backend didn't start in time");
    assert_eq!(assistant.backend_state(), BackendState::Starting);

    assistant.deactivate();
}

#[tokio::test]
async fn test_repl_session_with_workspace_change() {
    let addr = fake_service().await;
    let backend = TempDir::new().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let output = Arc::new(RingOutput::default());
    let notifier = Arc::new(RecordingNotifier::new());

    let mut assistant = Assistant::activate(
        fake_backend_config(backend.path(), &announcing(addr)),
        output.clone(),
        notifier.clone(),
        Some(first.path().to_path_buf()),
    );

    let input = format!(
        "what is this?\n/workspace {}\n/status\nand now?\n/quit\n",
        second.path().display()
    );
    let mut out = Vec::new();
    repl::run(&mut assistant, &output, input.as_bytes(), &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("echo: what is this?"));
    assert!(text.contains("echo: and now?"));
    assert!(text.contains(&format!("workspace: {}", second.path().display())));
    assert_eq!(assistant.workspace(), Some(second.path()));
    assert_eq!(assistant.supervisor().generation(), 2);
    assert!(output.contains("Workspace changed"));
    assert!(output.contains("Killing backend PID"));

    // Only the superseded process exits; it must not be reported as a crash.
    assert!(wait_until(Duration::from_secs(5), || output.contains("terminated by signal")).await);
    assert_eq!(notifier.error_count(), 0);

    assistant.deactivate();
}
