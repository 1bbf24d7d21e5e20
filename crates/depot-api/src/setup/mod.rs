//! Application setup and initialization
//!
//! Builds the database pool, storage handlers, gateway and router from an
//! explicit [`Config`], in that order.

pub mod database;
pub mod routes;
pub mod server;
pub mod storage;

use crate::services::FileGateway;
use crate::state::AppState;
use anyhow::{Context, Result};
use depot_core::Config;
use depot_db::MetadataIndex;
use depot_storage::{CustomHandlerRegistry, HandlerRegistry};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Initialize the entire application
///
/// Custom handler factories may be registered on `custom` before or after this
/// call; the configured one is looked up whenever a custom record is served.
pub async fn initialize_app(
    config: Config,
    custom: CustomHandlerRegistry,
) -> Result<(Arc<AppState>, axum::Router)> {
    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry();

    tracing::info!("Configuration loaded and validated successfully");

    let pool = database::setup_database(&config).await?;
    let handlers = storage::setup_storage(&config, custom).await?;

    let state = build_state(config, pool, handlers);
    let router = routes::setup_routes(&state.config, state.clone());

    Ok((state, router))
}

/// Wire the gateway over an already migrated pool.
pub fn build_state(config: Config, pool: SqlitePool, handlers: HandlerRegistry) -> Arc<AppState> {
    let gateway = FileGateway::new(MetadataIndex::new(pool), handlers, config.storage_backend);
    Arc::new(AppState::new(config, gateway))
}
