//! devassist - Main entry point.
//!
//! Starts the backend for a workspace and chats with it.
//!
//! Usage: devassist [OPTIONS] [COMMAND]
//!
//! Commands:
//!   chat             Interactive chat (default)
//!   ask <QUESTION>   Ask a single question and print the answer
//!
//! Options:
//!   -w, --workspace  Workspace directory (default: current directory)
//!   -c, --config     Config file (default: ~/.devassistrc)
//!   -v, --verbose    Mirror debug logs to stderr

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use devassist::app::{Assistant, repl};
use devassist::config::Config;
use devassist::logging;
use devassist::output::{ConsoleNotifier, RingOutput};

/// Exit code for a backend that never became ready.
const EXIT_BACKEND_UNAVAILABLE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "devassist", version, about = "Chat with a local workspace AI backend")]
struct Cli {
    /// Workspace directory passed to the backend
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, global = true, env = "DEVASSIST_CONFIG")]
    config: Option<PathBuf>,

    /// Mirror debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive chat
    Chat,
    /// Ask a single question and print the answer
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.log_config, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    // The supervisor is driven from a single-threaded event loop.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            process::exit(1);
        }
    };

    let code = rt.block_on(run(cli, config));
    process::exit(code);
}

async fn run(cli: Cli, config: Config) -> i32 {
    let workspace = cli.workspace.or_else(|| std::env::current_dir().ok());
    let output = Arc::new(RingOutput::default());
    let mut assistant = Assistant::activate(
        config,
        output.clone(),
        Arc::new(ConsoleNotifier),
        workspace,
    );

    let code = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            match repl::run(&mut assistant, &output, stdin, tokio::io::stdout()).await {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Commands::Ask { question } => match assistant.ask(&question.join(" ")).await {
            Ok(Some(answer)) => {
                println!("{}", answer);
                0
            }
            Ok(None) => 0,
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_BACKEND_UNAVAILABLE
            }
        },
    };

    if let Some(Err(e)) = assistant.deactivate() {
        tracing::warn!("{}", e);
    }
    code
}
