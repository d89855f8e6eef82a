//! CLI command implementations.

use colored::Colorize;
use std::collections::BTreeSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use uat_server::{ServerConfig, ServerHandle, UatServer};
use uat_watcher::{watch_state_file, StateFile};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const CONFIG_FILE: &str = "uat.json";
const STATE_FILE: &str = "state.json";

/// Options of the `serve` command.
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub fallback_port: Option<u16>,
    pub no_fallback: bool,
    pub headless: bool,
    pub name: Option<String>,
    pub version: Option<String>,
    pub slots: Vec<String>,
    pub watch: Option<PathBuf>,
    pub debounce_ms: u64,
}

/// Write a default config and an example state file.
pub fn init(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;

    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() {
        println!("{} {} already exists", "✓".green(), config_path.display());
    } else {
        let config = serde_json::to_string_pretty(&ServerConfig::default())?;
        fs::write(&config_path, config)?;
        println!("{} Wrote {}", "✓".green(), config_path.display());
    }

    let state_path = path.join(STATE_FILE);
    if state_path.exists() {
        println!("{} {} already exists", "✓".green(), state_path.display());
    } else {
        fs::write(&state_path, StateFile::example().to_json_pretty()?)?;
        println!("{} Wrote {}", "✓".green(), state_path.display());
    }

    println!(
        "  Run {} to start serving",
        format!(
            "uat serve --config {} --watch {}",
            config_path.display(),
            state_path.display()
        )
        .cyan()
    );

    Ok(())
}

/// Builds the server config from the config file and flag overrides.
pub fn resolve_config(options: &ServeOptions) -> Result<ServerConfig> {
    let mut config = match &options.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            serde_json::from_str(&text)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?
        }
        None => ServerConfig::default(),
    };

    if options.headless {
        config.host = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    }
    if let Some(port) = options.port {
        config.port = port;
    }
    if options.no_fallback {
        config.fallback_port = None;
    } else if let Some(port) = options.fallback_port {
        config.fallback_port = Some(port);
    }
    if let Some(name) = &options.name {
        config.name = name.clone();
    }
    if let Some(version) = &options.version {
        config.version = version.clone();
    }

    Ok(config)
}

/// Start the UAT server and run until Ctrl+C.
pub async fn serve(options: ServeOptions) -> Result<()> {
    let config = resolve_config(&options)?;
    let headless = config.host.is_unspecified();

    if headless {
        println!("{}", "Starting UAT server in headless mode...".cyan());
    } else {
        println!("{}", "Starting UAT server...".cyan());
    }

    let mut server = UatServer::new(config);
    let handle = server.handle();
    if !options.slots.is_empty() {
        handle.set_slots(options.slots.iter().cloned()).await;
    }

    let addr = server.start().await?;
    println!("{} Listening on ws://{}", "✓".green(), addr);
    if headless {
        println!("  Headless mode: accepting connections from any host");
    }

    if let Some(path) = options.watch.clone() {
        let (tx, rx) = mpsc::channel(16);
        let debounce = Duration::from_millis(options.debounce_ms);
        println!("{} Feeding variables from {}", "✓".green(), path.display());

        tokio::spawn(async move {
            if let Err(e) = watch_state_file(path, debounce, tx).await {
                error!("State file watcher error: {}", e);
            }
        });
        tokio::spawn(run_feed(handle.clone(), rx, options.slots.clone()));
    }

    println!("  Press {} to stop", "Ctrl+C".cyan());
    tokio::signal::ctrl_c().await?;

    println!("{}", "Stopping...".cyan());
    server.stop().await;

    Ok(())
}

/// Applies every state file snapshot to the server.
///
/// The declared slots are the file's slots plus the ones given on the
/// command line.
async fn run_feed(handle: ServerHandle, mut rx: mpsc::Receiver<StateFile>, extra_slots: Vec<String>) {
    while let Some(state) = rx.recv().await {
        let slots: BTreeSet<String> = state
            .slot_names()
            .map(str::to_string)
            .chain(extra_slots.iter().cloned())
            .collect();

        handle.set_slots(slots).await;
        let changed = handle.set_vars(state.vars()).await;
        info!(
            "Applied state file: {} variables, {} changed",
            state.variable_count(),
            changed
        );
    }
}

/// Parse a state file and print a summary.
pub fn check(path: &Path) -> Result<()> {
    let state = StateFile::load(path)?;

    println!(
        "{} {} ({} variables)",
        "✓".green(),
        path.display(),
        state.variable_count().to_string().cyan()
    );
    for (slot, count) in state.slot_sizes() {
        let label = if slot.is_empty() {
            "(no slot)".dimmed().to_string()
        } else {
            slot.yellow().to_string()
        };
        println!("  {} {}", label, count);
    }

    Ok(())
}
