//! hikconnect-alarm - Hik-Connect alarm status bridge
//!
//! Polls the Hik-Connect cloud API or a local Hikvision device for alarm
//! state and exposes it as binary sensor entities, configured through a
//! guided setup flow.

mod api;
mod config;
mod coordinator;
mod entry;
mod error;
mod flow;
mod hikconnect;
mod models;
mod sensor;
mod state;

use std::net::SocketAddr;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hikconnect_alarm=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting hikconnect-alarm...");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!(
        "Configuration loaded (scan interval {}s, entries at {})",
        config.hikconnect.scan_interval_secs,
        config.storage.entries_path
    );

    let app_state = AppState::new(&config).await?;

    // Set up stored entries; failures stay visible per entry
    let loaded = app_state.entries.setup_all().await;
    tracing::info!("{} entries loaded", loaded);

    let app = api::routes()
        .with_state(app_state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.entries.unload_all().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
