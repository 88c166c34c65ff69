//! Promptloom CLI — the main entry point.
//!
//! Commands:
//! - `chat`  — Interactive chat or single-message mode
//! - `stats` — Show engine and index stats
//! - `check` — Validate config and backend readiness

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "promptloom",
    about = "Promptloom — context assembly and backend brokering for conversational agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the configured backend
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Reference documents to index into the session knowledge base
        #[arg(short, long)]
        knowledge: Vec<String>,

        /// Use the administrative persona
        #[arg(long)]
        admin: bool,

        /// Print the prompt-assembly debug trace
        #[arg(long)]
        debug: bool,
    },

    /// Show engine and index stats
    Stats,

    /// Validate configuration and backend readiness
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            knowledge,
            admin,
            debug,
        } => commands::chat::run(message, knowledge, admin, debug).await?,
        Commands::Stats => commands::stats::run().await?,
        Commands::Check => commands::check::run().await?,
    }

    Ok(())
}
