//! Storage handler setup

use anyhow::{Context, Result};
use depot_core::{Config, StorageBackend};
use depot_storage::{create_handlers, CustomHandlerRegistry, HandlerRegistry};

pub async fn setup_storage(
    config: &Config,
    custom: CustomHandlerRegistry,
) -> Result<HandlerRegistry> {
    let handlers = create_handlers(config, custom)
        .await
        .context("Failed to initialize storage handlers")?;

    match config.storage_backend {
        StorageBackend::Local => tracing::info!(
            path = %config.local.storage_directory.display(),
            max_file_size = config.local.max_file_size,
            max_storage_size = config.local.max_storage_size,
            "Local storage ready"
        ),
        StorageBackend::Proxy => tracing::info!(
            endpoint = config.proxy.endpoint.as_deref().unwrap_or_default(),
            max_file_size = config.proxy.max_file_size,
            timeout_secs = config.proxy.timeout.as_secs(),
            "Proxy storage ready"
        ),
        StorageBackend::Custom => tracing::info!(
            handler = config.custom.handler.as_deref().unwrap_or_default(),
            "Custom storage selected"
        ),
    }

    Ok(handlers)
}
