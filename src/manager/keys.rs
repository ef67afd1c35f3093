use super::{failed, Manager};
use crate::error::{CredError, CredResult};
use crate::keys::KeyPair;

impl Manager {
    /// Generate and store the key pair for account `uid`
    ///
    /// Fails with `KeyAlreadyExists` if the account owns one. The store
    /// repeats that check atomically on insert.
    pub async fn create_key(&self, uid: &str) -> CredResult<KeyPair> {
        if uid.is_empty() {
            return Err(failed("create_key", CredError::NilArgument("uid")));
        }
        self.load_account(uid).await?;

        match self.store.get_key_by_account_id(uid).await {
            Ok(_) => return Err(failed("create_key", CredError::KeyAlreadyExists)),
            Err(CredError::KeyNotFound) => {}
            Err(e) => return Err(failed("create_key", e)),
        }

        let owner = uid.to_string();
        let mut key = tokio::task::spawn_blocking(move || KeyPair::generate(&owner))
            .await
            .map_err(|e| failed("create_key", CredError::Internal(e.to_string())))?
            .map_err(|e| failed("create_key", e))?;

        self.save_key(&mut key).await?;
        tracing::info!(uid = %uid, "key pair created");
        Ok(key)
    }

    pub async fn save_key(&self, key: &mut KeyPair) -> CredResult<()> {
        self.store
            .save_key(key)
            .await
            .map_err(|e| failed("save_key", e))
    }

    pub async fn load_key(&self, kid: &str) -> CredResult<KeyPair> {
        self.store.load_key(kid).await.map_err(|e| failed("load_key", e))
    }

    pub async fn load_all_keys(&self) -> CredResult<Vec<KeyPair>> {
        self.store
            .load_all_keys()
            .await
            .map_err(|e| failed("load_all_keys", e))
    }

    pub async fn delete_key(&self, kid: &str) -> CredResult<()> {
        self.store
            .delete_key(kid)
            .await
            .map_err(|e| failed("delete_key", e))?;
        tracing::info!(kid = %kid, "key pair deleted");
        Ok(())
    }

    pub async fn get_key_by_account_id(&self, uid: &str) -> CredResult<KeyPair> {
        self.store
            .get_key_by_account_id(uid)
            .await
            .map_err(|e| failed("get_key_by_account_id", e))
    }

    /// Key pair of the live account owning `email`
    pub async fn get_key_by_email(&self, email: &str) -> CredResult<KeyPair> {
        let account = self.get_account_by_email(email).await?;
        let uid = account
            .uid
            .ok_or_else(|| failed("get_key_by_email", CredError::AccountNotFound))?;
        self.get_key_by_account_id(&uid).await
    }

    pub async fn get_key_by_pub(&self, pub_key: &[u8]) -> CredResult<KeyPair> {
        self.store
            .get_key_by_pub(pub_key)
            .await
            .map_err(|e| failed("get_key_by_pub", e))
    }

    pub async fn exist_key(&self, kid: &str) -> CredResult<bool> {
        self.store
            .exist_key(kid)
            .await
            .map_err(|e| failed("exist_key", e))
    }
}
