//! Port handshake over the backend's standard output.
//!
//! After binding its listening socket the backend prints a single line
//! `PORT::<port>`. Everything before that line is ordinary log output.

use tokio::sync::watch;

use super::framer::LineFramer;

/// Sentinel prefix announcing the bound port.
pub const HANDSHAKE_PREFIX: &str = "PORT::";

/// Extracts the port value from a handshake line.
///
/// The line is trimmed before the (case-sensitive) prefix match and the value
/// is trimmed after it. An empty value is not a handshake.
#[must_use]
pub fn parse_handshake(line: &str) -> Option<&str> {
    let value = line.trim().strip_prefix(HANDSHAKE_PREFIX)?.trim();
    if value.is_empty() { None } else { Some(value) }
}

/// Something observed on the backend's standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A complete output line, trailing newline removed.
    Line(String),
    /// The first handshake line; carries the port.
    Handshake(String),
    /// A handshake line after the port was already known.
    RepeatedHandshake(String),
}

/// Frames stdout chunks into lines and watches for the handshake.
///
/// Each handshake line produces a `Line` event first, then the handshake
/// event, so log order matches stream order.
#[derive(Debug, Default)]
pub struct StdoutScanner {
    framer: LineFramer,
    port: Option<String>,
}

impl StdoutScanner {
    /// Creates a scanner that has not seen a handshake yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a raw chunk and returns the events it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ScanEvent> {
        let lines = self.framer.push(chunk);
        let mut events = Vec::with_capacity(lines.len());
        for line in lines {
            self.scan_line(line, &mut events);
        }
        events
    }

    /// Flushes a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        if let Some(line) = self.framer.finish() {
            self.scan_line(line, &mut events);
        }
        events
    }

    /// Port from the first handshake, if seen.
    #[must_use]
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    fn scan_line(&mut self, line: String, events: &mut Vec<ScanEvent>) {
        let handshake = parse_handshake(&line).map(str::to_string);
        events.push(ScanEvent::Line(line));

        if let Some(port) = handshake {
            if self.port.is_some() {
                events.push(ScanEvent::RepeatedHandshake(port));
            } else {
                self.port = Some(port.clone());
                events.push(ScanEvent::Handshake(port));
            }
        }
    }
}

/// Creates a linked port signal and its awaitable.
#[must_use]
pub fn port_channel() -> (PortSignal, PortReady) {
    let (tx, rx) = watch::channel(None);
    (PortSignal { tx }, PortReady { rx })
}

/// Producer half of the port-ready awaitable. Resolves at most once.
#[derive(Debug)]
pub struct PortSignal {
    tx: watch::Sender<Option<String>>,
}

impl PortSignal {
    /// Publishes the port. Returns false if a port was already published.
    pub fn resolve(&self, port: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(port.to_string());
            true
        })
    }

    /// Returns true once a port has been published.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// One-shot awaitable resolving with the discovered port.
///
/// It carries no timeout: if the backend never announces a port, `wait`
/// never completes. Clones observe the same resolution.
#[derive(Debug, Clone)]
pub struct PortReady {
    rx: watch::Receiver<Option<String>>,
}

impl PortReady {
    /// Waits for the handshake port.
    pub async fn wait(mut self) -> String {
        let port = match self.rx.wait_for(Option::is_some).await {
            Ok(port) => port.clone(),
            Err(_) => None,
        };
        match port {
            Some(port) => port,
            // The producer went away without a handshake.
            None => std::future::pending().await,
        }
    }

    /// Returns the port without waiting, if already resolved.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.rx.borrow().clone()
    }
}
