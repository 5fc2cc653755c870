//! Basin - watershed context builder
//!
//! CLI entry point that dispatches to subcommands.

use basin::cli::{Cli, Commands};
use basin::config::{Config, ConfigManager};
use basin::error::BasinResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
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

async fn run() -> BasinResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Config: {}", config_manager.path().display());

    if console::user_attended() {
        basin::ui::init_theme();
    }

    match cli.command {
        Commands::Build(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after the current step");
                    on_signal.cancel();
                }
            });
            basin::cli::commands::build(args, &config, cancel).await
        }
        Commands::Datasets(args) => basin::cli::commands::datasets(args, &config).await,
        Commands::Cache(args) => basin::cli::commands::cache(args, &config).await,
        Commands::Config(args) => basin::cli::commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn (progress output only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("basin=warn"),
        1 => EnvFilter::new("basin=info"),
        _ => EnvFilter::new("basin=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).without_time().init();
    }
}
