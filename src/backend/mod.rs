//! Backend process supervision.
//!
//! Launches the Python backend for a workspace, learns its port from the
//! `PORT::<port>` stdout handshake, mirrors its output, and tears it down
//! (process tree included) when it is replaced or no longer needed.

pub mod framer;
pub mod handshake;
pub mod kill;
pub mod launch;
mod supervisor;

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

pub use framer::LineFramer;
pub use handshake::{HANDSHAKE_PREFIX, PortReady, ScanEvent, StdoutScanner, parse_handshake};
pub use kill::{KillMode, KillOutcome, kill_process};
pub use launch::{BackendCommand, DEFAULT_ENTRY, WORKSPACE_PATH_VAR, backend_env};
pub use supervisor::Supervisor;

/// Backend supervision errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to start backend: {0}")]
    SpawnFailure(#[source] io::Error),

    #[error("Backend didn't start in time ({}ms)", .0.as_millis())]
    HandshakeTimeout(Duration),

    #[error("Backend exited with {0}")]
    BackendCrash(ExitCode),

    #[error("Failed to kill backend PID {pid}: {source}")]
    KillFailure {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Backend supervisor has been disposed")]
    Disposed,

    #[error("Missing API key: set hf_api_key in the config file or HF_API_KEY")]
    MissingCredential,
}

/// Exit code of a backend process; `None` when it was ended by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub Option<i32>);

impl ExitCode {
    /// Returns true for a clean exit (code 0).
    #[must_use]
    pub fn success(self) -> bool {
        self.0 == Some(0)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "code {}", code),
            None => f.write_str("no code (terminated by signal)"),
        }
    }
}

/// Lifecycle state of the current backend process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendState {
    /// No backend has been started (or it was stopped).
    Idle,
    /// Spawned, waiting for the handshake.
    Starting,
    /// Handshake seen; listening on the port.
    Ready(String),
    /// The process terminated.
    Exited(ExitCode),
    /// The OS refused to create the process.
    SpawnFailed(String),
}

impl BackendState {
    /// Returns true while a process is believed alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Ready(_))
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Starting => f.write_str("starting"),
            Self::Ready(port) => write!(f, "ready on port {}", port),
            Self::Exited(code) => write!(f, "exited with {}", code),
            Self::SpawnFailed(reason) => write!(f, "failed to start: {}", reason),
        }
    }
}
