//! Shared helpers for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use devassist::backend::{BackendCommand, KillMode, Supervisor};
use devassist::output::{RecordingNotifier, RingOutput};

/// Supervisor plus the sinks it writes to.
pub struct Harness {
    pub supervisor: Supervisor,
    pub output: Arc<RingOutput>,
    pub notifier: Arc<RecordingNotifier>,
}

/// A backend command that runs `script` with `sh -c` inside `dir`.
pub fn sh_backend(dir: &Path, script: &str) -> BackendCommand {
    BackendCommand::python(dir, "main.py")
        .with_program("sh", vec!["-c".to_string(), script.to_string()])
}

/// Builds a supervisor around `sh -c <script>`.
pub fn harness(dir: &Path, script: &str) -> Harness {
    let output = Arc::new(RingOutput::default());
    let notifier = Arc::new(RecordingNotifier::new());
    let supervisor = Supervisor::new(
        sh_backend(dir, script),
        KillMode::Tree,
        output.clone(),
        notifier.clone(),
    );
    Harness {
        supervisor,
        output,
        notifier,
    }
}

/// No extra environment.
pub fn no_env() -> BTreeMap<String, String> {
    BTreeMap::new()
}

/// Polls `check` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Returns true while a process with `pid` exists and is not a zombie.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            // State is the first field after the parenthesised command name.
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next());
            !matches!(state, Some("Z") | Some("X") | None)
        }
        Err(_) => false,
    }
}
