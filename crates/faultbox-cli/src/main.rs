//! Faultbox CLI.
//!
//! A chaos sandbox: serves user records through a cache-aside store while
//! CPU, network and cache faults are switched on and off.
//!
//! # Quick Start
//!
//! ```bash
//! # Run without MySQL, Redis or root
//! faultbox serve --in-memory --bind 3500
//!
//! # Inject 300ms of cache latency on the next request
//! curl 'localhost:3500/api/users?chaos=redis_latency&duration=300'
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Faultbox - a sandbox service with switchable failure modes.
#[derive(Parser)]
#[command(name = "faultbox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run the HTTP service.
    Serve {
        /// Directory holding faultbox.toml (defaults to the current directory).
        #[arg(short, long)]
        config_dir: Option<PathBuf>,

        /// Address to bind to (port only: 3500, or full: 0.0.0.0:3500).
        #[arg(short, long)]
        bind: Option<String>,

        /// Use in-process stores and skip real traffic control.
        #[arg(long)]
        in_memory: bool,
    },

    /// Print the resolved configuration.
    Config {
        /// Directory holding faultbox.toml (defaults to the current directory).
        #[arg(short, long)]
        config_dir: Option<PathBuf>,

        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Serve {
            config_dir,
            bind,
            in_memory,
        } => commands::serve::run(config_dir.as_deref(), bind.as_deref(), in_memory),
        Commands::Config { config_dir, format } => {
            commands::config::show(config_dir.as_deref(), &format)
        }
    }
}
