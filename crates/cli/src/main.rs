//! GemCode CLI: the main entry point.
//!
//! Commands:
//! - `chat`          : Interactive session, or one message with `-m` (default)
//! - `init`          : Write the default config and create the data directories
//! - `history clear` : Forget the conversation recorded for this directory

use clap::{Parser, Subcommand};
use gemcode_config::AppConfig;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "gemcode",
    about = "GemCode: a coding assistant that works inside your project",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Log at debug level to stderr instead of the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the configured model
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant in the current directory
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Write the default configuration
    Init,

    /// Manage the recorded conversation
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Delete the conversation recorded for the current directory
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(model) = cli.model {
        config.model = model;
    }

    init_logging(cli.verbose, &config.log_file())?;
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        None => commands::chat::run(config, cli.message).await?,
        Some(Commands::Chat { message }) => commands::chat::run(config, message.or(cli.message)).await?,
        Some(Commands::Init) => commands::init::run().await?,
        Some(Commands::History { action: HistoryAction::Clear }) => commands::history::clear(&config).await?,
    }

    Ok(())
}

/// Logs go to the log file so they never interleave with the console;
/// `--verbose` sends them to stderr at debug level. `RUST_LOG` wins over both.
fn init_logging(verbose: bool, log_file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    }

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
