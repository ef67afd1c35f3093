/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    error::CredResult,
    manager::Manager,
    store::{MemoryStore, ProviderRegistry, SqliteStore},
};
use std::sync::Arc;
use std::time::Instant;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub manager: Arc<Manager>,
    pub started: Instant,
}

impl AppContext {
    /// Validate `config`, bind the configured provider and connect it
    pub async fn new(config: ServerConfig, registry: Arc<ProviderRegistry>) -> CredResult<Self> {
        config.validate()?;

        let manager = Manager::new(registry, config.store_config(), &config.store.provider)?;
        manager.init().await?;

        Ok(Self::from_parts(config, manager))
    }

    pub fn from_parts(config: ServerConfig, manager: Manager) -> Self {
        Self {
            config: Arc::new(config),
            manager: Arc::new(manager),
            started: Instant::now(),
        }
    }
}

/// Registry with the built-in providers
pub fn default_registry() -> CredResult<Arc<ProviderRegistry>> {
    let registry = ProviderRegistry::new();
    registry.register("memory", Some(Arc::new(MemoryStore::new())))?;
    registry.register("sqlite", Some(Arc::new(SqliteStore::new())))?;
    Ok(Arc::new(registry))
}
