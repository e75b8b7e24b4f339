//! Chat session against a ready backend.

use std::fmt;
use std::sync::Arc;

use crate::output::{OutputChannel, OutputLine};
use crate::relay::{QueryClient, reply_text};

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.speaker {
            Speaker::User => "\u{1f9d1}\u{200d}\u{1f4bb}",
            Speaker::Assistant => "\u{1f916}",
        };
        write!(f, "{} {}", icon, self.text)
    }
}

/// A conversation bound to one backend port.
pub struct ChatSession {
    client: QueryClient,
    transcript: Vec<ChatMessage>,
    output: Arc<dyn OutputChannel>,
}

impl ChatSession {
    #[must_use]
    pub fn new(client: QueryClient, output: Arc<dyn OutputChannel>) -> Self {
        Self {
            client,
            transcript: Vec::new(),
            output,
        }
    }

    /// Relays `text` to the backend and records both sides.
    ///
    /// Blank input is ignored and returns `None`. Relay failures become an
    /// error-marked reply rather than an error.
    pub async fn send(&mut self, text: &str) -> Option<&ChatMessage> {
        let question = text.trim();
        if question.is_empty() {
            return None;
        }

        self.transcript.push(ChatMessage {
            speaker: Speaker::User,
            text: question.to_string(),
        });

        self.output.append_line(OutputLine::host(format!(
            "\u{1f4dd} querying {}",
            self.client.endpoint()
        )));
        let result = self.client.ask(question).await;
        if let Err(e) = &result {
            tracing::warn!("Query failed: {}", e);
        }

        self.transcript.push(ChatMessage {
            speaker: Speaker::Assistant,
            text: reply_text(&result),
        });
        self.transcript.last()
    }

    /// Messages so far, oldest first.
    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Endpoint this session talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::output::RingOutput;
    use crate::relay::ERROR_MARKER;

    fn session(port: &str) -> ChatSession {
        let client = QueryClient::new("127.0.0.1", port, Duration::from_millis(500));
        ChatSession::new(client, Arc::new(RingOutput::default()))
    }

    #[test]
    fn test_message_display() {
        let msg = ChatMessage {
            speaker: Speaker::Assistant,
            text: "hi".into(),
        };
        assert_eq!(msg.to_string(), "\u{1f916} hi");
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let mut chat = session("9");
        assert!(chat.send("   ").await.is_none());
        assert!(chat.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_failure_becomes_marked_reply() {
        let mut chat = session("9");
        let reply = chat.send(" why? ").await.cloned().unwrap();

        assert_eq!(reply.speaker, Speaker::Assistant);
        assert!(reply.text.starts_with(ERROR_MARKER));
        assert_eq!(chat.transcript()[0].text, "why?");
        assert_eq!(chat.transcript().len(), 2);
    }
}
