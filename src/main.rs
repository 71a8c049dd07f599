mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use crawlbot_core::config::AppConfig;
use tracing::warn;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(32)
        .thread_stack_size(8 * 1024 * 1024)
        .max_blocking_threads(512)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig = toml::from_str(&config_str)?;

    match cli.command {
        Commands::Crawl { url, depth, politeness } => {
            commands::crawl::run(config, url, depth, politeness).await?;
        }
        Commands::Search { keywords, mode, size } => {
            commands::search::run(config, keywords, mode, size).await?;
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
        Commands::Monitor => {
            commands::monitor::run(config).await?;
        }
        Commands::Worker => {
            commands::worker::run(config).await?;
        }
        Commands::Serve { bind } => {
            commands::serve::run(config, bind).await?;
        }
    }

    Ok(())
}
