//! devassist
//!
//! A workspace AI assistant host. It launches a local Python backend for the
//! active workspace, learns the backend's port from a `PORT::<port>` line on
//! its standard output, and relays chat questions to it over HTTP.
//!
//! # Architecture
//!
//! - **Backend Module**: process supervisor, line framer, port handshake,
//!   process-tree kill
//! - **Relay Module**: `POST /query` client
//! - **App Module**: host lifecycle, chat session, interactive loop
//! - **Output Module**: log sink and notification boundary
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devassist::app::Assistant;
//! use devassist::config::Config;
//! use devassist::output::{ConsoleNotifier, RingOutput};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let output = Arc::new(RingOutput::default());
//! let assistant = Assistant::activate(
//!     Config::load()?,
//!     output,
//!     Arc::new(ConsoleNotifier),
//!     Some(std::env::current_dir()?),
//! );
//! let answer = assistant.ask("Where is the entry point?").await?;
//! println!("{}", answer.unwrap_or_default());
//! assistant.deactivate();
//! # Ok(())
//! # }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod app;
pub mod backend;
pub mod config;
pub mod logging;
pub mod output;
pub mod relay;

// Re-export main types
pub use app::Assistant;
pub use backend::{BackendError, BackendState, Supervisor};
pub use config::Config;
pub use relay::{QueryClient, RelayError};
