mod config;
mod greeting;
mod platform;
mod store;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,greetbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A missing .env file is fine; real environment variables still apply.
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from: {}", path.display());
    }

    // Load configuration from a TOML file if one is given, else from the environment
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(config_path) => {
            info!("Loading configuration from: {}", config_path.display());
            Config::load(&config_path).with_context(|| {
                format!("Failed to load config from {}", config_path.display())
            })?
        }
        None => Config::from_env().context("Failed to read configuration from environment")?,
    };
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("  Store backend: {}", config.storage.backend);
    match config.storage.backend {
        config::StoreBackend::Postgres => info!(
            "  Database: {}@{}:{}/{}",
            config.database.user, config.database.host, config.database.port, config.database.name
        ),
        config::StoreBackend::Sqlite => {
            info!("  Database: {}", config.storage.sqlite_path.display())
        }
    }

    let store = store::open(&config.storage, &config.database)?;
    if let Err(e) = store.ensure_schema().await {
        warn!("Could not verify users table: {}", e);
    }

    let bot = teloxide::Bot::new(&config.telegram.bot_token);

    info!("Bot is starting...");
    platform::telegram::run(bot, store).await?;

    Ok(())
}
