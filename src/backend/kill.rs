//! Best-effort process termination.
//!
//! Backends spawn their own workers (file watchers, uvicorn reloaders), so
//! killing only the direct child leaves orphans holding the port. On Unix the
//! backend is started as the leader of its own process group and the whole
//! group is signalled. On Windows `taskkill /T` walks the tree.

use std::io;

/// What to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KillMode {
    /// The process and all of its descendants.
    #[default]
    Tree,
    /// Only the process itself.
    Single,
}

impl KillMode {
    /// Maps the `kill_tree` config flag to a mode.
    #[must_use]
    pub fn from_tree_flag(kill_tree: bool) -> Self {
        if kill_tree { Self::Tree } else { Self::Single }
    }
}

/// Result of a delivered termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The signal was delivered.
    Killed,
    /// Nothing was running under that id.
    NotRunning,
    /// Handed to an external tool; its result is logged when it arrives.
    Requested,
}

/// Sends a SIGKILL-equivalent to `pid` (and its tree, per `mode`).
///
/// Does not wait for the process to die.
///
/// # Errors
/// Returns the OS error when the signal could not be delivered.
#[cfg(unix)]
pub fn kill_process(pid: u32, mode: KillMode) -> io::Result<KillOutcome> {
    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if pid <= 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"));
    }

    // SAFETY: plain signal delivery; pid is a positive id we spawned.
    let result = unsafe {
        match mode {
            KillMode::Tree => libc::killpg(pid, libc::SIGKILL),
            KillMode::Single => libc::kill(pid, libc::SIGKILL),
        }
    };

    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(KillOutcome::NotRunning);
        }
        return Err(err);
    }
    Ok(KillOutcome::Killed)
}

/// Hands a forced termination of `pid` (and its tree, per `mode`) to
/// `taskkill` without waiting for it.
///
/// Inside a tokio runtime the `taskkill` child is reaped by a spawned task
/// that logs its result; outside one it is left to finish on its own.
///
/// # Errors
/// Returns an error when `taskkill` cannot be launched.
#[cfg(windows)]
pub fn kill_process(pid: u32, mode: KillMode) -> io::Result<KillOutcome> {
    use std::process::Stdio;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let mut args = vec!["/F".to_string()];
    if mode == KillMode::Tree {
        args.push("/T".to_string());
    }
    args.push("/PID".to_string());
    args.push(pid.to_string());

    if tokio::runtime::Handle::try_current().is_err() {
        use std::os::windows::process::CommandExt;

        let mut cmd = std::process::Command::new("taskkill");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(CREATE_NO_WINDOW);
        cmd.spawn()?;
        return Ok(KillOutcome::Requested);
    }

    let mut cmd = tokio::process::Command::new("taskkill");
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .creation_flags(CREATE_NO_WINDOW);
    let child = cmd.spawn()?;

    tokio::spawn(async move {
        match child.wait_with_output().await {
            Ok(output) => log_taskkill(pid, &output),
            Err(e) => tracing::warn!("taskkill for PID {} did not finish: {}", pid, e),
        }
    });
    Ok(KillOutcome::Requested)
}

#[cfg(windows)]
fn log_taskkill(pid: u32, output: &std::process::Output) {
    // taskkill exit code when the pid does not exist.
    const TASKKILL_NOT_FOUND: i32 = 128;

    match output.status.code() {
        Some(0) => tracing::debug!("taskkill terminated PID {}", pid),
        Some(TASKKILL_NOT_FOUND) => tracing::debug!("PID {} was not running", pid),
        _ => tracing::warn!(
            "taskkill failed for PID {}: {}",
            pid,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    }
}
