mod api;
mod client;
mod commands;
mod config;
mod domain;
mod error;
mod registry;
mod server;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "netsync",
    version,
    about = "Reconcile a device inventory into a managed network registry"
)]
struct Cli {
    /// Path to config file (default: ~/.config/netsync/config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the inventory source and report its version
    Check,

    /// Create or update registry entries from the inventory
    Build {
        /// Actually write to the registry; without this the intended
        /// entries are only described
        #[arg(long)]
        commit: bool,
    },

    /// Fetch host keys and test connectivity for every managed device
    Connect {
        /// Pull device state into the registry after a successful connect
        #[arg(long)]
        sync_from: bool,
    },

    /// Compare registry entries against the inventory, reporting drift
    Verify,

    /// Run the netsync daemon (REST API)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Check => commands::check::run(config_path),
        Commands::Build { commit } => commands::build::run(config_path, commit),
        Commands::Connect { sync_from } => commands::connect::run(config_path, sync_from),
        Commands::Verify => commands::verify::run(config_path),
        Commands::Daemon {
            http_addr,
            log_level,
        } => commands::daemon::run(http_addr, log_level, config_path),
    }
}
