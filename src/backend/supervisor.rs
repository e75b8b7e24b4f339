//! Backend process supervisor.
//!
//! Owns at most one "current" backend process. Each `start` bumps a
//! generation counter; output and exit events carry the generation they were
//! spawned under, so a superseded process can still log but never touches the
//! current state.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::{debug, info, warn};

use super::framer::LineFramer;
use super::handshake::{PortReady, PortSignal, ScanEvent, StdoutScanner, port_channel};
use super::kill::{KillMode, KillOutcome, kill_process};
use super::launch::BackendCommand;
use super::{BackendError, BackendState, ExitCode};
use crate::output::{Notice, Notifier, OutputChannel, OutputLine};

/// Read buffer size for backend pipes.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// The live process, as far as the supervisor knows.
#[derive(Debug, Clone, Copy)]
struct CurrentProcess {
    pid: u32,
    generation: u64,
}

/// State shared with the per-process tasks.
struct Shared {
    generation: u64,
    current: Option<CurrentProcess>,
    state: BackendState,
    port: Option<String>,
    ready: PortReady,
    disposed: bool,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.current.is_some_and(|c| c.generation == generation)
    }
}

/// Supervises the backend process for the active workspace.
pub struct Supervisor {
    command: BackendCommand,
    kill_mode: KillMode,
    output: Arc<dyn OutputChannel>,
    notifier: Arc<dyn Notifier>,
    shared: Arc<Mutex<Shared>>,
}

impl Supervisor {
    /// Creates an idle supervisor.
    #[must_use]
    pub fn new(
        command: BackendCommand,
        kill_mode: KillMode,
        output: Arc<dyn OutputChannel>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        // Nothing ever resolves the initial awaitable.
        let (_, ready) = port_channel();
        Self {
            command,
            kill_mode,
            output,
            notifier,
            shared: Arc::new(Mutex::new(Shared {
                generation: 0,
                current: None,
                state: BackendState::Idle,
                port: None,
                ready,
                disposed: false,
            })),
        }
    }

    /// Starts (or restarts) the backend for `workspace`.
    ///
    /// Any current process is tree-killed first without waiting for it to
    /// die. The returned awaitable resolves with the handshake port and has
    /// no timeout of its own; if spawning fails it never resolves.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, workspace: &Path, env_overrides: &BTreeMap<String, String>) -> PortReady {
        // Kills run with the lock released; loop until no process is current.
        let mut previous: Option<CurrentProcess> = None;
        let mut shared = loop {
            if let Some(previous) = previous.take() {
                // Failure is already logged; the new backend starts regardless.
                let _ = self.kill_logged(previous.pid);
            }

            let mut shared = lock(&self.shared);
            if shared.disposed {
                self.log(format!("\u{26a0}\u{fe0f} {}", BackendError::Disposed));
                let (_, never) = port_channel();
                return never;
            }
            match shared.current.take() {
                Some(current) => previous = Some(current),
                None => break shared,
            }
        };

        shared.generation += 1;
        let generation = shared.generation;
        let (signal, ready) = port_channel();
        shared.ready = ready.clone();
        shared.port = None;
        shared.state = BackendState::Starting;

        self.log(format!(
            "\u{1f40d} Using Python: {}",
            self.command.resolve_program().display()
        ));
        self.log(format!(
            "\u{1f680} Starting backend for: {}",
            workspace.display()
        ));
        debug!("Backend command line: {}", self.command.command_line());

        let mut child = match self.command.build(workspace, env_overrides).spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = BackendError::SpawnFailure(e);
                shared.state = BackendState::SpawnFailed(err.to_string());
                self.log(format!("\u{274c} {}", err));
                self.notifier.notify(Notice::error(err.to_string()));
                return ready;
            }
        };

        let Some(pid) = child.id() else {
            // Already reaped; the exit watcher reports the status.
            warn!("Backend exited before its pid could be read");
            drop(shared);
            self.spawn_tasks(child, generation, signal);
            return ready;
        };

        shared.current = Some(CurrentProcess { pid, generation });
        info!("Backend started with PID {} (generation {})", pid, generation);
        drop(shared);

        self.spawn_tasks(child, generation, signal);
        ready
    }

    /// Waits up to `timeout` for the current backend's port.
    ///
    /// # Errors
    /// Returns `HandshakeTimeout` when no handshake arrives in time.
    pub async fn await_port(&self, timeout: Duration) -> Result<String, BackendError> {
        let ready = self.port_ready();
        tokio::time::timeout(timeout, ready.wait())
            .await
            .map_err(|_| BackendError::HandshakeTimeout(timeout))
    }

    /// Best-effort kill of the current process tree.
    ///
    /// Returns `None` when nothing was running. Does not wait for the process
    /// to die; its exit is logged but no longer affects supervisor state.
    pub fn stop(&self) -> Option<Result<KillOutcome, BackendError>> {
        let mut shared = lock(&self.shared);
        let current = shared.current.take()?;
        shared.port = None;
        shared.state = BackendState::Idle;
        drop(shared);

        Some(self.kill_logged(current.pid))
    }

    /// Stops the backend and refuses further starts.
    pub fn dispose(&self) -> Option<Result<KillOutcome, BackendError>> {
        let result = self.stop();
        lock(&self.shared).disposed = true;
        result
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BackendState {
        lock(&self.shared).state.clone()
    }

    /// Port of the current backend, if it announced one and is still alive.
    #[must_use]
    pub fn current_port(&self) -> Option<String> {
        lock(&self.shared).port.clone()
    }

    /// PID of the current backend, if one is alive.
    #[must_use]
    pub fn current_pid(&self) -> Option<u32> {
        lock(&self.shared).current.map(|c| c.pid)
    }

    /// Number of `start` calls that got past the disposed check.
    #[must_use]
    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Awaitable for the most recent start.
    #[must_use]
    pub fn port_ready(&self) -> PortReady {
        lock(&self.shared).ready.clone()
    }

    /// Returns true once `dispose` has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared).disposed
    }

    fn kill_logged(&self, pid: u32) -> Result<KillOutcome, BackendError> {
        self.log(format!("\u{1f6d1} Killing backend PID {}\u{2026}", pid));
        match kill_process(pid, self.kill_mode) {
            Ok(KillOutcome::Killed) => {
                self.log(format!("\u{2705} Killed {}", pid));
                Ok(KillOutcome::Killed)
            }
            Ok(KillOutcome::NotRunning) => {
                self.log(format!("Backend PID {} was not running", pid));
                Ok(KillOutcome::NotRunning)
            }
            Ok(KillOutcome::Requested) => {
                self.log(format!("Termination of PID {} requested", pid));
                Ok(KillOutcome::Requested)
            }
            Err(source) => {
                let err = BackendError::KillFailure { pid, source };
                self.log(format!("\u{274c} {}", err));
                Err(err)
            }
        }
    }

    fn spawn_tasks(&self, mut child: Child, generation: u64, signal: PortSignal) {
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_stdout(
                stdout,
                generation,
                signal,
                Arc::clone(&self.shared),
                Arc::clone(&self.output),
            ));
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_stderr(stderr, Arc::clone(&self.output)));
        }

        tokio::spawn(watch_exit(
            child,
            generation,
            Arc::clone(&self.shared),
            Arc::clone(&self.output),
            Arc::clone(&self.notifier),
        ));
    }

    fn log(&self, text: String) {
        self.output.append_line(OutputLine::host(text));
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let current = lock(&self.shared).current.take();
        if let Some(current) = current {
            if let Err(e) = kill_process(current.pid, self.kill_mode) {
                warn!("Failed to kill backend PID {} on drop: {}", current.pid, e);
            }
        }
    }
}

/// Locks shared state, recovering from a poisoned mutex.
fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads stdout, logs every line and resolves the handshake.
async fn pump_stdout(
    stdout: ChildStdout,
    generation: u64,
    signal: PortSignal,
    shared: Arc<Mutex<Shared>>,
    output: Arc<dyn OutputChannel>,
) {
    let mut scanner = StdoutScanner::new();
    let handle = |events: Vec<ScanEvent>| {
        for event in events {
            match event {
                ScanEvent::Line(text) => output.append_line(OutputLine::backend(text)),
                ScanEvent::Handshake(port) => {
                    if port.parse::<u16>().is_err() {
                        warn!("Backend announced a non-numeric port: {}", port);
                    }
                    {
                        let mut shared = lock(&shared);
                        if shared.is_current(generation) {
                            shared.port = Some(port.clone());
                            shared.state = BackendState::Ready(port.clone());
                        }
                    }
                    output.append_line(OutputLine::host(format!(
                        "\u{2705} Backend listening on port {}",
                        port
                    )));
                    signal.resolve(&port);
                }
                ScanEvent::RepeatedHandshake(port) => {
                    debug!("Ignoring repeated handshake for port {}", port);
                }
            }
        }
    };

    read_chunks(stdout, |chunk| handle(scanner.feed(chunk))).await;
    handle(scanner.finish());
}

/// Reads stderr and logs every line with the error tag.
async fn pump_stderr(stderr: ChildStderr, output: Arc<dyn OutputChannel>) {
    let mut framer = LineFramer::new();
    read_chunks(stderr, |chunk| {
        for line in framer.push(chunk) {
            output.append_line(OutputLine::backend_error(line));
        }
    })
    .await;
    if let Some(line) = framer.finish() {
        output.append_line(OutputLine::backend_error(line));
    }
}

/// Feeds raw chunks to `on_chunk` until EOF or a read error.
async fn read_chunks<R, F>(mut reader: R, mut on_chunk: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => on_chunk(&buf[..n]),
            Err(e) => {
                debug!("Backend pipe read failed: {}", e);
                break;
            }
        }
    }
}

/// Waits for the process to exit and resets state if it was current.
async fn watch_exit(
    mut child: Child,
    generation: u64,
    shared: Arc<Mutex<Shared>>,
    output: Arc<dyn OutputChannel>,
    notifier: Arc<dyn Notifier>,
) {
    let code = match child.wait().await {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!("Failed to wait for backend: {}", e);
            ExitCode(None)
        }
    };

    output.append_line(OutputLine::host(format!(
        "\u{26a0}\u{fe0f} Backend exited with {}",
        code
    )));

    let was_current = {
        let mut shared = lock(&shared);
        if shared.is_current(generation) {
            shared.current = None;
            shared.port = None;
            shared.state = BackendState::Exited(code);
            true
        } else {
            false
        }
    };

    if was_current && !code.success() {
        notifier.notify(Notice::error(BackendError::BackendCrash(code).to_string()));
    } else if !was_current {
        debug!("Superseded backend (generation {}) exited", generation);
    }
}

fn exit_code(status: ExitStatus) -> ExitCode {
    ExitCode(status.code())
}
