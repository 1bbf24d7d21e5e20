//! Registry for externally supplied storage handlers
//!
//! Records with backend type `CUSTOM` are served by a handler built from a
//! factory registered here under a name. The configured name is looked up each
//! time a custom handler is needed, so factories may be registered after the
//! gateway is constructed.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::{StorageHandler, StorageResult};

/// Builds a custom storage handler from its opaque configuration.
///
/// The built handler must honour the same contract and failure classes as the
/// local and proxy handlers.
pub trait CustomHandlerFactory: Send + Sync {
    /// Name the factory is registered and configured under
    fn name(&self) -> &str;

    fn build(&self, config: Option<&serde_json::Value>) -> StorageResult<Arc<dyn StorageHandler>>;
}

/// Registry for custom handler factories.
///
/// Thread-safe; lookups share a read lock, registration takes the write lock.
#[derive(Clone)]
pub struct CustomHandlerRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn CustomHandlerFactory>>>>,
}

impl CustomHandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a factory under its own name, replacing any previous one.
    pub async fn register(&self, factory: Arc<dyn CustomHandlerFactory>) {
        let name = factory.name().to_string();
        let mut factories = self.factories.write().await;
        if factories.insert(name.clone(), factory).is_some() {
            tracing::warn!(handler = %name, "Replaced custom storage handler factory");
        } else {
            tracing::info!(handler = %name, "Registered custom storage handler factory");
        }
    }

    /// Get a factory by name
    pub async fn get(&self, name: &str) -> Result<Arc<dyn CustomHandlerFactory>> {
        let factories = self.factories.read().await;

        factories
            .get(name)
            .cloned()
            .with_context(|| format!("Custom storage handler '{}' not found", name))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.factories.read().await.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CustomHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
