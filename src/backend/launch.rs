//! Backend command construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::platform::resolve_python;

/// Entry script run by the interpreter.
pub const DEFAULT_ENTRY: &str = "main.py";

/// Variable carrying the active workspace path.
pub const WORKSPACE_PATH_VAR: &str = "WORKSPACE_PATH";

/// How to launch the backend process.
#[derive(Debug, Clone)]
pub struct BackendCommand {
    /// Directory holding the backend; also the working directory.
    pub backend_dir: PathBuf,
    /// Explicit program. `None` resolves the Python interpreter.
    pub program: Option<PathBuf>,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Run the command line through the platform shell.
    pub use_shell: bool,
}

impl BackendCommand {
    /// Runs `<python> <entry>` inside `backend_dir`.
    #[must_use]
    pub fn python(backend_dir: impl Into<PathBuf>, entry: &str) -> Self {
        Self {
            backend_dir: backend_dir.into(),
            program: None,
            args: vec![entry.to_string()],
            use_shell: false,
        }
    }

    /// Replaces the program (skips interpreter resolution).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = Some(program.into());
        self.args = args;
        self
    }

    /// Enables or disables shell spawning.
    #[must_use]
    pub fn with_shell(mut self, use_shell: bool) -> Self {
        self.use_shell = use_shell;
        self
    }

    /// Program that will be executed.
    #[must_use]
    pub fn resolve_program(&self) -> PathBuf {
        self.program
            .clone()
            .unwrap_or_else(|| resolve_python(&self.backend_dir))
    }

    /// Human-readable command line, as passed to the shell in shell mode.
    #[must_use]
    pub fn command_line(&self) -> String {
        let program = self.resolve_program();
        std::iter::once(quote(&program.to_string_lossy()))
            .chain(self.args.iter().map(|a| quote(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Builds the spawnable command.
    ///
    /// The child inherits the current environment, then gets the backend
    /// variables for `workspace`, then `overrides` (which win). stdin is
    /// closed; stdout and stderr are piped.
    #[must_use]
    pub fn build(&self, workspace: &Path, overrides: &BTreeMap<String, String>) -> Command {
        let mut cmd = if self.use_shell {
            shell_command(&self.command_line())
        } else {
            let mut cmd = Command::new(self.resolve_program());
            cmd.args(&self.args);
            cmd
        };

        cmd.current_dir(&self.backend_dir);
        cmd.envs(backend_env(workspace));
        cmd.envs(overrides);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // Own process group so the whole tree can be signalled.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }
}

/// Variables every backend receives.
#[must_use]
pub fn backend_env(workspace: &Path) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        WORKSPACE_PATH_VAR.to_string(),
        workspace.to_string_lossy().into_owned(),
    );
    env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
    env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
    env
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", line]);
    cmd
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", line]);
    cmd
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }
    if cfg!(windows) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
