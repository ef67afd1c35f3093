/// Credential manager
///
/// Facade over one named store provider. Account, key and token operations
/// delegate to the store; failures are logged and returned unchanged. Multi
/// step flows (account, then key, then token) are separate store calls and
/// are not rolled back when a later step fails.

mod account;
mod keys;
mod token;

use crate::error::{CredError, CredResult};
use crate::store::{CredentialStore, ProviderRegistry, StoreConfig, StoreStatus};
use std::sync::Arc;

pub struct Manager {
    registry: Arc<ProviderRegistry>,
    provider: String,
    config: StoreConfig,
    store: Arc<dyn CredentialStore>,
}

impl Manager {
    /// Bind to the provider registered as `name`. Does not connect.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: StoreConfig,
        name: &str,
    ) -> CredResult<Self> {
        let store = registry.get(name).map_err(|e| {
            tracing::error!(provider = %name, "store provider not registered");
            e
        })?;

        Ok(Self {
            registry,
            provider: name.to_string(),
            config,
            store,
        })
    }

    /// Dial the store. Must succeed before any data operation.
    pub async fn init(&self) -> CredResult<()> {
        self.store
            .dial(&self.config)
            .await
            .map_err(|e| failed("init", e))?;
        tracing::info!(provider = %self.provider, "credential store connected");
        Ok(())
    }

    /// Release the store. Safe to call more than once.
    pub async fn close(&self) -> CredResult<()> {
        self.store.close().await.map_err(|e| failed("close", e))?;
        tracing::info!(provider = %self.provider, "credential store closed");
        Ok(())
    }

    pub fn status(&self) -> StoreStatus {
        self.store.status()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// Drop a provider from the registry this manager was built from.
    /// A manager already bound to it keeps its store.
    pub fn unregister(&self, name: &str) -> CredResult<()> {
        self.registry.unregister(name).map_err(|e| failed("unregister", e))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}

/// Log a failed operation and hand the error back
fn failed(op: &'static str, err: CredError) -> CredError {
    match &err {
        CredError::InvalidName
        | CredError::InvalidEmail
        | CredError::InvalidPassword
        | CredError::NilArgument(_) => {
            tracing::debug!(op, error = %err, "rejected");
        }
        e if e.is_not_found() || e.is_conflict() || e.is_security() => {
            tracing::warn!(op, error = %err, "failed");
        }
        _ => {
            tracing::error!(op, error = %err, "failed");
        }
    }
    err
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};

    /// Manager over a fresh, dialed memory store
    pub async fn memory_manager() -> Manager {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register("memory", Some(Arc::new(MemoryStore::new())))
            .unwrap();
        let manager = Manager::new(registry, StoreConfig::default(), "memory").unwrap();
        manager.init().await.unwrap();
        manager
    }

    #[test]
    fn test_unknown_provider() {
        let registry = Arc::new(ProviderRegistry::new());
        assert!(matches!(
            Manager::new(registry, StoreConfig::default(), "bolt"),
            Err(CredError::NotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_require_init() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register("memory", Some(Arc::new(MemoryStore::new())))
            .unwrap();
        let manager = Manager::new(registry, StoreConfig::default(), "memory").unwrap();

        assert_eq!(manager.status(), StoreStatus::Disconnected);
        assert!(matches!(
            manager.load_all_accounts().await,
            Err(CredError::NotConnected)
        ));

        manager.init().await.unwrap();
        assert_eq!(manager.status(), StoreStatus::Connected);
        assert_eq!(manager.provider_name(), "memory");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = memory_manager().await;
        manager.close().await.unwrap();
        manager.close().await.unwrap();
        assert_eq!(manager.status(), StoreStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_unregister_keeps_bound_store() {
        let manager = memory_manager().await;
        manager.unregister("memory").unwrap();
        assert!(matches!(
            manager.unregister("memory"),
            Err(CredError::NotRegistered(_))
        ));
        assert!(manager.registry().names().is_empty());
        assert!(manager.load_all_accounts().await.is_ok());
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let manager = memory_manager().await;
        end_to_end(&manager).await;
    }

    #[tokio::test]
    async fn test_end_to_end_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register("sqlite", Some(Arc::new(SqliteStore::new())))
            .unwrap();
        let config = StoreConfig {
            path: Some(dir.path().join("keystead.sqlite")),
            ..Default::default()
        };
        let manager = Manager::new(registry, config, "sqlite").unwrap();
        manager.init().await.unwrap();

        end_to_end(&manager).await;
        manager.close().await.unwrap();
    }

    // create account -> key -> token -> validate -> delete key -> validate fails
    async fn end_to_end(manager: &Manager) {
        let uid = manager
            .create_account("a@b.com", "A", "password1")
            .await
            .unwrap();

        let key = manager.create_key(&uid).await.unwrap();
        assert_eq!(key.kid.as_deref(), Some(uid.as_str()));

        let token = manager.create_token(&uid).await.unwrap();
        let claims = manager.validate_token(&token).await.unwrap();
        assert_eq!(claims.sub, uid);
        assert_eq!(manager.get_token_by_account_id(&uid).await.unwrap(), token);

        manager.delete_key(&uid).await.unwrap();
        assert!(matches!(
            manager.validate_token(&token).await,
            Err(CredError::KeyNotFound)
        ));
    }
}
