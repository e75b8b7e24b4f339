//! Bounded in-memory output channel.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{OutputChannel, OutputLine, OutputSource};

/// Default number of retained lines.
pub const DEFAULT_CAPACITY: usize = 2_000;

/// Output channel that keeps the most recent lines and mirrors them to
/// `tracing` under the `devassist::backend` target.
#[derive(Debug)]
pub struct RingOutput {
    lines: Mutex<VecDeque<OutputLine>>,
    capacity: usize,
}

impl RingOutput {
    /// Creates a channel retaining at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// All retained lines, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<OutputLine> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Texts of retained lines from `source`, oldest first.
    #[must_use]
    pub fn texts_from(&self, source: OutputSource) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|line| line.source == source)
            .map(|line| line.text)
            .collect()
    }

    /// Returns true if any retained line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.snapshot().iter().any(|line| line.text.contains(needle))
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RingOutput {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OutputChannel for RingOutput {
    fn append_line(&self, line: OutputLine) {
        match line.source {
            OutputSource::BackendError => {
                tracing::warn!(target: "devassist::backend", "{}", line.text);
            }
            OutputSource::Backend => {
                tracing::info!(target: "devassist::backend", "{}", line.text);
            }
            OutputSource::Host => tracing::info!("{}", line.text),
        }

        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }
}
