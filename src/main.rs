use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blog_backend::api;
use blog_backend::config::Config;
use blog_backend::db::init_database;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,blog_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::get();
    info!(
        "Initialized configuration, serving on {}:{}",
        config.server.host, config.server.port
    );

    // Initialize database and run migrations
    let db = Arc::new(init_database().await?);
    info!("Connected to database");

    // Start API server
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(db).await {
            error!("API server error: {}", e);
        }
    });

    // Wait for shutdown signal or server exit
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping");
        }
        _ = api_handle => {
            error!("API server stopped unexpectedly");
        }
    }

    info!("Blog backend shutdown complete");
    Ok(())
}
