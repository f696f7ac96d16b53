//! ClipTrail - Clipboard history service
//!
//! This is the main entry point for the ClipTrail monitor and history tools.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cliptrail::cli::{Cli, CliHandler};
use cliptrail::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(cli.config.as_deref()).context("Failed to load config")?;

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cliptrail={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("ClipTrail v{}", cliptrail::VERSION);

    let mut handler = CliHandler::new(config, cli.config);
    handler.handle_command(cli.command).await?;

    Ok(())
}
