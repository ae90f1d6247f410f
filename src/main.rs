#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod db;
mod discord;
mod media;
mod pin;
mod utils;

use cli::Args;
use config::Config;
use pin::{EventRouter, PinEngine, PinQueue};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    utils::logging::init_tracing(&config.logging);
    let config = Arc::new(config);
    info!("pinrelay starting up config={}", args.config.display());

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    info!("database ready backend={:?}", db_manager.db_type());
    let stores = db_manager.stores();

    let discord_client = Arc::new(discord::DiscordClient::new(config.clone()));
    let engine = Arc::new(PinEngine::new(
        discord_client.clone(),
        stores,
        config.pins.clone(),
        config.guild_defaults.clone(),
    ));

    let (queue, worker) = PinQueue::new();
    let router = Arc::new(EventRouter::new(
        discord_client.clone(),
        engine.clone(),
        queue,
        config.pins.clone(),
    ));
    discord_client.set_router(router).await;

    let worker_handle = tokio::spawn(worker.run(engine));

    let gateway_client = discord_client.clone();
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway_client.start().await {
            error!("discord client error: {}", e);
            return;
        }
        gateway_client.wait().await;
    });

    tokio::select! {
        _ = worker_handle => error!("pin worker exited"),
        _ = gateway_handle => error!("discord gateway exited"),
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    discord_client.stop().await?;
    info!("pinrelay shutting down");
    Ok(())
}
