//! HTTP relay to the backend's query endpoint.
//!
//! `POST http://<host>:<port>/query` with `{"question": ...}`; the backend
//! answers with `{"answer": ...}`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Path of the query endpoint.
pub const QUERY_PATH: &str = "/query";

/// Host the backend listens on.
pub const DEFAULT_HOST: &str = "localhost";

/// Prefix for failed replies shown in the chat.
pub const ERROR_MARKER: &str = "\u{274c}";

/// Reply shown when the backend answers without an `answer` field.
pub const NO_ANSWER: &str = "\u{26a0}\u{fe0f} No answer";

/// Relay errors. Shown inline in the chat, never as notifications.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    answer: Option<String>,
}

/// Client for one backend instance.
#[derive(Debug, Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    endpoint: String,
}

impl QueryClient {
    /// Creates a client for the backend on `host:port`.
    #[must_use]
    pub fn new(host: &str, port: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client ({}), using defaults without a timeout", e);
                reqwest::Client::new()
            });
        Self {
            http,
            endpoint: format!("http://{}:{}{}", host, port, QUERY_PATH),
        }
    }

    /// Full URL of the query endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends a question. `Ok(None)` means the response had no answer.
    ///
    /// # Errors
    /// Returns `RelayError` on transport failure, non-success status, or a
    /// body that is not the expected JSON.
    pub async fn ask(&self, question: &str) -> Result<Option<String>, RelayError> {
        debug!("Querying {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&QueryRequest { question })
            .send()
            .await
            .map_err(RelayError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(RelayError::Transport)?;

        if !status.is_success() {
            return Err(RelayError::Status { status, body });
        }

        let parsed: QueryResponse = serde_json::from_str(&body).map_err(RelayError::Decode)?;
        Ok(parsed.answer)
    }
}

/// Renders a relay result as chat text.
#[must_use]
pub fn reply_text(result: &Result<Option<String>, RelayError>) -> String {
    match result {
        Ok(Some(answer)) => answer.clone(),
        Ok(None) => NO_ANSWER.to_string(),
        Err(e) => format!("{} {}", ERROR_MARKER, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_format() {
        let client = QueryClient::new(DEFAULT_HOST, "54321", Duration::from_secs(1));
        assert_eq!(client.endpoint(), "http://localhost:54321/query");
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_string(&QueryRequest { question: "why?" }).unwrap();
        assert_eq!(body, r#"{"question":"why?"}"#);
    }

    #[test]
    fn test_response_without_answer() {
        let parsed: QueryResponse = serde_json::from_str(r#"{"other": 1}"#).unwrap();
        assert!(parsed.answer.is_none());
        let parsed: QueryResponse = serde_json::from_str(r#"{"answer": null}"#).unwrap();
        assert!(parsed.answer.is_none());
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(reply_text(&Ok(Some("42".into()))), "42");
        assert_eq!(reply_text(&Ok(None)), NO_ANSWER);

        let err = serde_json::from_str::<QueryResponse>("not json").unwrap_err();
        let text = reply_text(&Err(RelayError::Decode(err)));
        assert!(text.starts_with(ERROR_MARKER));
        assert!(text.contains("Invalid response"));
    }

    #[tokio::test]
    async fn test_ask_unreachable_backend() {
        // Port 9 (discard) is not expected to accept HTTP.
        let client = QueryClient::new("127.0.0.1", "9", Duration::from_millis(500));
        let result = client.ask("hello").await;
        assert!(matches!(result, Err(RelayError::Transport(_))));
    }
}
