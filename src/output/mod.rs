//! Log sink and user notification boundary.
//!
//! The supervisor never prints. It appends lines to an [`OutputChannel`] and
//! raises [`Notice`]s through a [`Notifier`]; the host decides where they go.

mod ring;

use std::fmt;
use std::sync::Mutex;

pub use ring::{DEFAULT_CAPACITY, RingOutput};

/// Origin of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    /// Backend standard output.
    Backend,
    /// Backend standard error.
    BackendError,
    /// The supervisor or host itself.
    Host,
}

/// A single line for the output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: OutputSource,
    pub text: String,
}

impl OutputLine {
    #[must_use]
    pub fn backend(text: impl Into<String>) -> Self {
        Self {
            source: OutputSource::Backend,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn backend_error(text: impl Into<String>) -> Self {
        Self {
            source: OutputSource::BackendError,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn host(text: impl Into<String>) -> Self {
        Self {
            source: OutputSource::Host,
            text: text.into(),
        }
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            OutputSource::Backend => write!(f, "[Backend] {}", self.text),
            OutputSource::BackendError => write!(f, "[Backend ERROR] {}", self.text),
            OutputSource::Host => f.write_str(&self.text),
        }
    }
}

/// Append-only, order-preserving, non-blocking log sink.
pub trait OutputChannel: Send + Sync {
    /// Appends a line.
    fn append_line(&self, line: OutputLine);
}

/// A transient user-visible error notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Surfaces notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Prints notices to stderr.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        tracing::error!("{}", notice.message);
        eprintln!("\u{274c} {}", notice.message);
    }
}

/// Keeps every notice in memory. Used by tests and headless hosts.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every notice so far.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    /// Number of notices raised so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.notices.lock().map(|notices| notices.len()).unwrap_or(0)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}
