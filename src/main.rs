//! changeward CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use changeward::cli::commands::{self, AppContext};
use changeward::cli::{Cli, Commands};
use changeward::infrastructure::config::ConfigLoader;
use changeward::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    if let Err(err) = run(cli).await {
        changeward::cli::handle_error(err, json_mode);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))
        .context("Failed to initialize logging")?;

    let ctx = AppContext::open(config).await;

    match cli.command {
        Commands::Run { dry_run } => commands::run::execute(&ctx, dry_run, cli.json).await,
        Commands::Propose {
            session,
            force,
            dry_run,
        } => commands::propose::execute(&ctx, &session, force, dry_run, cli.json).await,
        Commands::Cleanup { max_age_minutes } => {
            commands::cleanup::execute(&ctx, max_age_minutes, cli.json).await
        }
        Commands::Sessions { all } => commands::sessions::execute(&ctx, all, cli.json).await,
    }
}
