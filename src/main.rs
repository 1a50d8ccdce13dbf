// main.rs
// Loads `.env`, builds the ledger over the configured store and serves the JSON API.
// See routes/mod.rs for the endpoint list.

use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use billing_ledger::{config::AppConfig, init_ledger, routes};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("billing_ledger=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let ledger = Arc::new(
        init_ledger(&config)
            .await
            .context("failed to initialize ledger")?,
    );

    let app = routes::router(ledger);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
