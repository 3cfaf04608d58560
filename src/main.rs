//! Layer - fetch and publish ML artifacts through a local cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use layer_sdk::cli::{commands, Cli, Commands};
use layer_sdk::config::ConfigManager;
use layer_sdk::error::LayerResult;
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

async fn run() -> LayerResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config.general.log_format);
    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Fetch(args) => commands::fetch(args, &config).await,
        Commands::Dataset(args) => commands::dataset(args, &config).await,
        Commands::Push(args) => commands::push(args, &config).await,
        Commands::Cache(args) => commands::cache(args, &config).await,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug. Logs go to stderr so stdout stays parseable.
fn init_logging(verbose: u8, format: &str) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("layer_sdk={level},layer={level}"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
