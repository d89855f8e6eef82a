//! UAT CLI - Command-line interface for the UAT server
//!
//! Runs a variable-sync server, optionally fed from a watched state file.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "uat")]
#[command(author = "UAT Contributors")]
#[command(version)]
#[command(about = "Variable-sync server for auto-trackers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and an example state file
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Start the UAT server
    Serve {
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Port to try if the first one is taken
        #[arg(long, conflicts_with = "no_fallback")]
        fallback_port: Option<u16>,

        /// Fail instead of trying a fallback port
        #[arg(long)]
        no_fallback: bool,

        /// Headless mode: bind to 0.0.0.0 for remote access
        #[arg(long)]
        headless: bool,

        /// Server name announced to clients
        #[arg(long)]
        name: Option<String>,

        /// Version string announced to clients
        #[arg(long)]
        server_version: Option<String>,

        /// Slot to declare (repeatable)
        #[arg(short, long = "slot")]
        slots: Vec<String>,

        /// State file to feed variables from
        #[arg(short, long)]
        watch: Option<PathBuf>,

        /// Debounce for state file changes
        #[arg(long, default_value = "150")]
        debounce_ms: u64,
    },

    /// Parse a state file and summarize it
    Check {
        /// State file to check
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Serve {
            config,
            port,
            fallback_port,
            no_fallback,
            headless,
            name,
            server_version,
            slots,
            watch,
            debounce_ms,
        } => {
            commands::serve(commands::ServeOptions {
                config,
                port,
                fallback_port,
                no_fallback,
                headless,
                name,
                version: server_version,
                slots,
                watch,
                debounce_ms,
            })
            .await
        }
        Commands::Check { path } => commands::check(&path),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
