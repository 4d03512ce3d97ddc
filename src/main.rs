//! precache - offline asset cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use precache::cli::{Cli, Commands};
use precache::config::{Config, ConfigManager};
use precache::error::{PrecacheError, PrecacheResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> PrecacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| PrecacheError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(ref path) = local_config_path {
        debug!("Merged local config: {}", path.display());
    }

    // Config commands must work even when the state directory is unusable
    if let Commands::Config(args) = cli.command {
        return precache::cli::commands::config(args, &config, &config_manager).await;
    }

    ConfigManager::ensure_state_dirs(&config).await?;

    match cli.command {
        Commands::Config(_) => unreachable!("Config handled above"),
        Commands::Install(args) => precache::cli::commands::install(args, &config).await,
        Commands::Activate(args) => precache::cli::commands::activate(args, &config).await,
        Commands::Fetch(args) => precache::cli::commands::fetch(args, &config).await,
        Commands::Status(args) => precache::cli::commands::status(args, &config).await,
        Commands::Cache(args) => precache::cli::commands::cache(args, &config).await,
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("precache=warn"),
        1 => EnvFilter::new("precache=info"),
        _ => EnvFilter::new("precache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
