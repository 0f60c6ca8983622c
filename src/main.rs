//! # CampusChat server binary
//!
//! ```bash
//! campuschat --config ./config/campuschat.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `campuschat init` | Create the SQLite database and run schema migrations |
//! | `campuschat serve` | Start the HTTP backend |
//!
//! The Gemini API key is read from the `GEMINI_API_KEY` environment
//! variable; without it the server starts in a degraded mode that still
//! serves the direct-chat relay and canned replies.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use campuschat::{config, db, migrate, server};

/// CampusChat — a student-support chatbot backend with document-grounded
/// answers and live admin handoff.
#[derive(Parser)]
#[command(
    name = "campuschat",
    about = "Student-support chatbot backend with document-grounded answers and live admin handoff",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/campuschat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent;
    /// running it multiple times is safe. `serve` also migrates on startup,
    /// so this mainly exists for provisioning scripts.
    Init,

    /// Start the HTTP backend.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// chat, document, and relay endpoints until terminated.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
    }

    Ok(())
}
