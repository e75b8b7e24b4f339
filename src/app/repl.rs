//! Interactive chat loop.
//!
//! Each input line is a question unless it starts with `/`.

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::{Assistant, ChatSession};
use crate::output::RingOutput;

/// Help text for the loop.
pub const HELP: &str = "\
Type a question and press Enter.
  /workspace <path>  restart the backend for another workspace
  /status            show backend state
  /logs              show backend and assistant logs
  /help              show this help
  /quit              exit";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Workspace(PathBuf),
    Status,
    Logs,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parses one input line.
#[must_use]
pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Ask(line.to_string());
    };

    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, arg)| (name, arg.trim()));

    match name {
        "workspace" | "ws" if !arg.is_empty() => ReplCommand::Workspace(PathBuf::from(arg)),
        "status" => ReplCommand::Status,
        "logs" => ReplCommand::Logs,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

/// Runs the loop until `/quit` or end of input.
///
/// The chat session is opened lazily on the first question and dropped when
/// the workspace changes, since the new backend listens on a new port.
///
/// # Errors
/// Returns error if reading input or writing output fails.
pub async fn run<R, W>(
    assistant: &mut Assistant,
    logs: &RingOutput,
    input: R,
    mut out: W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut session: Option<ChatSession> = None;

    write_line(&mut out, HELP).await?;

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => write_line(&mut out, HELP).await?,
            ReplCommand::Status => {
                let workspace = assistant
                    .workspace()
                    .map_or_else(|| "none".to_string(), |w| w.display().to_string());
                let status = format!(
                    "workspace: {}\nbackend: {}\nconfig: {}",
                    workspace,
                    assistant.backend_state(),
                    assistant.config().config_path.display()
                );
                write_line(&mut out, &status).await?;
            }
            ReplCommand::Logs => {
                for entry in logs.snapshot() {
                    write_line(&mut out, &entry.to_string()).await?;
                }
            }
            ReplCommand::Workspace(path) => {
                session = None;
                if assistant.change_workspace(path).is_none() {
                    write_line(&mut out, "Backend not started, see /logs").await?;
                }
            }
            ReplCommand::Unknown(text) => {
                write_line(&mut out, &format!("Unknown command: {} (try /help)", text)).await?;
            }
            ReplCommand::Ask(question) => {
                if session.is_none() {
                    match assistant.open_chat().await {
                        Ok(chat) => session = Some(chat),
                        Err(e) => {
                            write_line(&mut out, &format!("\u{274c} {}", e)).await?;
                            continue;
                        }
                    }
                }
                let Some(chat) = session.as_mut() else {
                    continue;
                };
                if let Some(reply) = chat.send(&question).await {
                    write_line(&mut out, &reply.to_string()).await?;
                }
            }
        }
    }

    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
