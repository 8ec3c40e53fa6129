use axum::Router;
use stockroom_core::config::{AppConfig, ConfigError, LoadOptions};
use stockroom_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;
use crate::{auth, events, inventory, notify, reports, requests};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let state = AppState::new(db_pool.clone(), &config);
    Ok(Application { config, db_pool, state })
}

/// The full API surface on one router. The health endpoint is not here; it
/// runs on its own port.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(inventory::router())
        .merge(requests::router())
        .merge(notify::router())
        .merge(reports::router())
        .merge(events::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
