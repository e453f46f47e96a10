// src/core/store/registry.rs

//! Selects backing store implementations by configured kind.

use super::{BackingStore, FileStore, MemoryStore, StoreConfig};
use crate::core::TriadError;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a store from its configuration.
pub type StoreFactory = Box<
    dyn Fn(StoreConfig) -> BoxFuture<'static, Result<Arc<dyn BackingStore>, TriadError>>
        + Send
        + Sync,
>;

/// A table of store factories keyed by kind.
///
/// `with_defaults` registers `memory` and `file`. Opening a store of an
/// unregistered kind fails with `StoreNotConfigured`.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "memory",
            Box::new(|config: StoreConfig| {
                async move {
                    Ok::<_, TriadError>(Arc::new(MemoryStore::new(config.id)) as Arc<dyn BackingStore>)
                }
                .boxed()
            }),
        );
        registry.register(
            "file",
            Box::new(|config: StoreConfig| {
                async move {
                    let path = config.path.ok_or_else(|| {
                        TriadError::StoreNotConfigured(format!(
                            "file store '{}' has no path",
                            config.id
                        ))
                    })?;
                    let store = FileStore::open(config.id, path, config.value_cache_bytes).await?;
                    Ok::<_, TriadError>(Arc::new(store) as Arc<dyn BackingStore>)
                }
                .boxed()
            }),
        );
        registry
    }

    /// Registers (or replaces) the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: StoreFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the store described by `config`.
    pub async fn open(&self, config: &StoreConfig) -> Result<Arc<dyn BackingStore>, TriadError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| TriadError::StoreNotConfigured(config.kind.clone()))?;
        let store = factory(config.clone()).await?;
        info!("Opened '{}' store '{}'", config.kind, config.id);
        Ok(store)
    }

    /// Opens every configured store, keyed by store id.
    pub async fn open_all(
        &self,
        configs: &[StoreConfig],
    ) -> Result<HashMap<String, Arc<dyn BackingStore>>, TriadError> {
        let mut stores = HashMap::with_capacity(configs.len());
        for config in configs {
            stores.insert(config.id.clone(), self.open(config).await?);
        }
        Ok(stores)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
