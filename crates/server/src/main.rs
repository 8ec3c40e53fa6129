mod auth;
mod bootstrap;
mod error;
mod events;
mod health;
mod inventory;
mod notify;
mod reports;
mod requests;
mod state;

use std::time::Duration;

use anyhow::Result;
use stockroom_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use stockroom_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router = bootstrap::api_router(app.state.clone());

    info!(
        event_name = "system.server.started",
        bind_address = %address,
        "stockroom-server listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    info!(
        event_name = "system.server.stopping",
        "shutdown signal received, draining connections"
    );
    let _ = shutdown_tx.send(());

    // Give in-flight requests a bounded window; if it elapses, exit anyway.
    let drain_window = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(drain_window, server).await {
        Ok(joined) => joined??,
        Err(_) => {
            warn!(
                event_name = "system.server.drain_timeout",
                timeout_secs = app.config.server.graceful_shutdown_secs,
                "graceful drain window elapsed with connections still open"
            );
        }
    }

    info!(event_name = "system.server.stopped", "stockroom-server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
