use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use intervaiew::{ChatService, Config, handlers};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load());
    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}' (expected host:port)", config.server.bind))?;

    let service = ChatService::new(config.clone())?;

    // Failure here is not fatal; queries retry the connection on demand
    tracing::info!("Creating Snowflake connection...");
    if !service.gateway().warm_up().await {
        tracing::warn!("Starting without a warehouse connection");
    }

    let router = handlers::router(service);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(
        %bind,
        chats_dir = %config.archive.dir,
        auth = %config.server.bearer_token.as_deref().map(|_| "bearer").unwrap_or("none"),
        "Starting IntervAIew"
    );

    axum::serve(listener, router).await?;
    Ok(())
}
