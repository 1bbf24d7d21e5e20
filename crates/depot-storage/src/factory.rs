use crate::custom::CustomHandlerRegistry;
use crate::{LocalHandler, ProxyHandler, StorageError, StorageHandler, StorageResult};
use depot_core::{Config, StorageBackend};
use std::sync::Arc;

/// Handlers keyed by backend type.
///
/// Local and proxy handlers are built once at startup. The custom handler is
/// resolved through the [`CustomHandlerRegistry`] each time it is needed.
#[derive(Clone)]
pub struct HandlerRegistry {
    local: Option<Arc<dyn StorageHandler>>,
    proxy: Option<Arc<dyn StorageHandler>>,
    custom: CustomHandlerRegistry,
    custom_name: Option<String>,
    custom_config: Option<serde_json::Value>,
}

impl HandlerRegistry {
    pub fn new(custom: CustomHandlerRegistry) -> Self {
        Self {
            local: None,
            proxy: None,
            custom,
            custom_name: None,
            custom_config: None,
        }
    }

    pub fn with_local(mut self, handler: Arc<dyn StorageHandler>) -> Self {
        self.local = Some(handler);
        self
    }

    pub fn with_proxy(mut self, handler: Arc<dyn StorageHandler>) -> Self {
        self.proxy = Some(handler);
        self
    }

    /// Name the custom factory to use, with its opaque settings.
    pub fn with_custom(mut self, name: impl Into<String>, config: Option<serde_json::Value>) -> Self {
        self.custom_name = Some(name.into());
        self.custom_config = config;
        self
    }

    /// Handler serving records of `backend`
    pub async fn resolve(&self, backend: StorageBackend) -> StorageResult<Arc<dyn StorageHandler>> {
        match backend {
            StorageBackend::Local => self.local.clone().ok_or_else(|| {
                StorageError::ConfigError("Local storage handler not configured".to_string())
            }),
            StorageBackend::Proxy => self.proxy.clone().ok_or_else(|| {
                StorageError::ConfigError("Proxy storage handler not configured".to_string())
            }),
            StorageBackend::Custom => {
                let name = self.custom_name.as_deref().ok_or_else(|| {
                    StorageError::ConfigError("CUSTOM_STORAGE_HANDLER not configured".to_string())
                })?;
                let factory = self
                    .custom
                    .get(name)
                    .await
                    .map_err(|e| StorageError::ConfigError(e.to_string()))?;
                factory.build(self.custom_config.as_ref())
            }
        }
    }
}

/// Build the handler registry from configuration.
///
/// The local handler is built when local storage is the selected backend, the
/// proxy handler whenever an endpoint is configured, so records written through
/// the proxy stay readable after switching the selected backend.
pub async fn create_handlers(
    config: &Config,
    custom: CustomHandlerRegistry,
) -> StorageResult<HandlerRegistry> {
    let mut registry = HandlerRegistry::new(custom);

    if config.storage_backend == StorageBackend::Local {
        let handler = LocalHandler::new(config.local.clone()).await?;
        registry = registry.with_local(Arc::new(handler));
    }

    if config.proxy.endpoint.is_some() {
        let handler = ProxyHandler::new(config.proxy.clone())?;
        registry = registry.with_proxy(Arc::new(handler));
    } else if config.storage_backend == StorageBackend::Proxy {
        return Err(StorageError::ConfigError(
            "PROXY_ENDPOINT not configured".to_string(),
        ));
    }

    if let Some(name) = &config.custom.handler {
        registry = registry.with_custom(name.clone(), config.custom.config.clone());
    }

    tracing::info!(backend = %config.storage_backend, "Storage handlers initialized");

    Ok(registry)
}
