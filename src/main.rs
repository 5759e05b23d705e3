mod bot;
mod commands;
mod config;
mod error;
mod formatter;
mod llm;
mod places;
mod platform;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Bot;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nearbybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing .env is fine; the variables may come from the environment
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env loaded: {}", e);
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!(
        "  Default location: {},{}",
        config.location.latitude, config.location.longitude
    );
    info!("  Search radius: {} m", config.places.radius);
    info!("  Delegated replies: {}", config.delegated_replies());

    let bot = Arc::new(Bot::from_config(&config));
    for command in bot.commands().list() {
        info!("  Command {} -> {}", command.command, command.keyword);
    }

    info!("Bot is starting...");
    server::serve(bot, &config.bind_addr()).await?;

    Ok(())
}
