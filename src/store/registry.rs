/// Named store providers
///
/// Built once at startup and shared by `Arc`; managers look their backend up
/// here by name.
use super::CredentialStore;
use crate::error::{CredError, CredResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn CredentialStore>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `name`
    pub fn register(
        &self,
        name: &str,
        store: Option<Arc<dyn CredentialStore>>,
    ) -> CredResult<()> {
        let store = store.ok_or(CredError::NilStore)?;
        if name.is_empty() {
            return Err(CredError::NilArgument("provider name"));
        }

        let mut providers = self.providers.write();
        if providers.contains_key(name) {
            return Err(CredError::AlreadyRegistered(name.to_string()));
        }
        providers.insert(name.to_string(), store);

        tracing::debug!(provider = %name, "store provider registered");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> CredResult<()> {
        match self.providers.write().remove(name) {
            Some(_) => {
                tracing::debug!(provider = %name, "store provider unregistered");
                Ok(())
            }
            None => Err(CredError::NotRegistered(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> CredResult<Arc<dyn CredentialStore>> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CredError::NotRegistered(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn memory() -> Option<Arc<dyn CredentialStore>> {
        Some(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        registry.register("memory", memory()).unwrap();
        assert!(registry.get("memory").is_ok());
        assert_eq!(registry.names(), vec!["memory".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = ProviderRegistry::new();
        registry.register("memory", memory()).unwrap();
        assert!(matches!(
            registry.register("memory", memory()),
            Err(CredError::AlreadyRegistered(name)) if name == "memory"
        ));
    }

    #[test]
    fn test_nil_store_and_empty_name() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.register("memory", None),
            Err(CredError::NilStore)
        ));
        assert!(matches!(
            registry.register("", memory()),
            Err(CredError::NilArgument(_))
        ));
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get("bolt"),
            Err(CredError::NotRegistered(_))
        ));
        assert!(matches!(
            registry.unregister("bolt"),
            Err(CredError::NotRegistered(_))
        ));

        registry.register("memory", memory()).unwrap();
        registry.unregister("memory").unwrap();
        assert!(registry.get("memory").is_err());
    }
}
