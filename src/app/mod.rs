//! Host application.
//!
//! Holds exactly one backend supervisor for the lifetime of the program,
//! restarts the backend when the workspace changes, and opens chat sessions
//! once the backend has announced its port.

mod chat;
pub mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use chat::{ChatMessage, ChatSession, Speaker};

use crate::backend::{BackendError, BackendState, KillOutcome, PortReady, Supervisor};
use crate::config::Config;
use crate::output::{Notice, Notifier, OutputChannel, OutputLine};
use crate::relay::QueryClient;

/// The assistant host.
pub struct Assistant {
    config: Config,
    supervisor: Supervisor,
    output: Arc<dyn OutputChannel>,
    notifier: Arc<dyn Notifier>,
    workspace: Option<PathBuf>,
}

impl Assistant {
    /// Creates the host without starting a backend.
    #[must_use]
    pub fn new(config: Config, output: Arc<dyn OutputChannel>, notifier: Arc<dyn Notifier>) -> Self {
        let supervisor = Supervisor::new(
            config.backend_command(),
            config.kill_mode(),
            Arc::clone(&output),
            Arc::clone(&notifier),
        );
        Self {
            config,
            supervisor,
            output,
            notifier,
            workspace: None,
        }
    }

    /// Creates the host and starts the backend for `workspace`, if any.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn activate(
        config: Config,
        output: Arc<dyn OutputChannel>,
        notifier: Arc<dyn Notifier>,
        workspace: Option<PathBuf>,
    ) -> Self {
        let mut assistant = Self::new(config, output, notifier);
        assistant.log("\u{1f680} Activating AI Code Assistant\u{2026}".to_string());

        match workspace {
            Some(workspace) => {
                assistant.log(format!("\u{1f4c2} Initial workspace: {}", workspace.display()));
                assistant.start_backend(workspace);
            }
            None => {
                assistant.log("\u{26a0}\u{fe0f} No folder open, backend not started".to_string());
            }
        }
        assistant
    }

    /// Switches to a new workspace and restarts the backend for it.
    pub fn change_workspace(&mut self, workspace: PathBuf) -> Option<PortReady> {
        self.log(format!(
            "\u{1f504} Workspace changed, now: {}",
            workspace.display()
        ));
        self.start_backend(workspace)
    }

    /// Waits for the backend port, then opens a chat against it.
    ///
    /// # Errors
    /// Returns `HandshakeTimeout` if the port is not known within the
    /// configured timeout; the failure is also logged and notified.
    pub async fn open_chat(&self) -> Result<ChatSession, BackendError> {
        match self.supervisor.await_port(self.config.port_timeout).await {
            Ok(port) => {
                let client = QueryClient::new(&self.config.host, &port, self.config.request_timeout);
                Ok(ChatSession::new(client, Arc::clone(&self.output)))
            }
            Err(e) => {
                self.log(format!("\u{274c} {}", e));
                self.notifier.notify(Notice::error("Backend didn't start in time"));
                Err(e)
            }
        }
    }

    /// One-shot question: opens a chat, sends `question`, returns the reply.
    ///
    /// # Errors
    /// Returns `HandshakeTimeout` if the backend never became ready.
    pub async fn ask(&self, question: &str) -> Result<Option<String>, BackendError> {
        let mut chat = self.open_chat().await?;
        Ok(chat.send(question).await.map(|reply| reply.text.clone()))
    }

    /// Tears the backend down; the host cannot start another one afterwards.
    pub fn deactivate(self) -> Option<Result<KillOutcome, BackendError>> {
        self.log("\u{1f44b} Deactivating AI Code Assistant".to_string());
        self.supervisor.dispose()
    }

    /// Active workspace, if any.
    #[must_use]
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Backend state.
    #[must_use]
    pub fn backend_state(&self) -> BackendState {
        self.supervisor.state()
    }

    /// The backend supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn start_backend(&mut self, workspace: PathBuf) -> Option<PortReady> {
        if self.config.require_api_key && self.config.api_key.is_none() {
            let err = BackendError::MissingCredential;
            self.log(format!("\u{274c} {}", err));
            self.notifier.notify(Notice::error(err.to_string()));
            return None;
        }

        let ready = self
            .supervisor
            .start(&workspace, &self.config.backend_env_overrides());
        self.workspace = Some(workspace);
        Some(ready)
    }

    fn log(&self, text: String) {
        self.output.append_line(OutputLine::host(text));
    }
}
