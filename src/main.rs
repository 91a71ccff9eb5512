//! Quiver server binary

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quiver::api::{create_router, AppState};
use quiver::config::{AppConfig, LogFormat};
use quiver::index::IndexManager;
use quiver::namespace::RefreshManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config)?;

    let refresh = RefreshManager::new(config.refresh_config());
    let manager = Arc::new(
        IndexManager::open(config.storage.data_dir.clone(), refresh)
            .await
            .context("failed to open index catalog")?,
    );
    tracing::info!(
        data_dir = %config.storage.data_dir,
        indexes = manager.list_indexes().len(),
        "Index catalog ready"
    );

    let router = create_router(
        AppState::new(manager),
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, "Listening for HTTP traffic");

    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("quiver=info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    Ok(())
}
