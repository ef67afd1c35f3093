use super::{failed, Manager};
use crate::account::{Account, AccountPatch};
use crate::error::{CredError, CredResult};
use crate::keys::KeyPair;
use chrono::Utc;

impl Manager {
    /// Build, validate and insert a new account; returns its uid
    pub async fn create_account(&self, email: &str, name: &str, password: &str) -> CredResult<String> {
        let mut account = Account::new(email, name, password).map_err(|e| failed("create_account", e))?;
        self.save_account(&mut account).await?;
        account
            .uid
            .ok_or_else(|| failed("create_account", CredError::Internal("store assigned no uid".into())))
    }

    /// Account plus its key pair, the `POST /accounts` flow
    ///
    /// The account stays if key generation fails; callers retry with
    /// `create_key`.
    pub async fn create_account_with_key(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> CredResult<(Account, KeyPair)> {
        let uid = self.create_account(email, name, password).await?;
        let key = self.create_key(&uid).await?;
        let account = self.load_account(&uid).await?;
        Ok((account.without_password(), key))
    }

    /// Validated upsert
    ///
    /// Inserts check the full record. Updates check the record as it will be
    /// stored, after unset fields are filled from the current one.
    pub async fn save_account(&self, account: &mut Account) -> CredResult<()> {
        let checked = match account.uid.as_deref() {
            None => account.validate_fields(),
            Some(uid) => {
                let stored = self.load_account(uid).await?;
                let mut merged = account.clone();
                merged.prepare_update(&stored, Utc::now());
                merged.validate_fields()
            }
        };
        checked.map_err(|e| failed("save_account", e))?;

        self.store
            .save_account(account)
            .await
            .map_err(|e| failed("save_account", e))?;

        tracing::debug!(uid = ?account.uid, "account saved");
        Ok(())
    }

    /// Apply a partial update to the account `uid`
    ///
    /// A password in the patch is validated and hashed like on creation.
    pub async fn update_account(&self, uid: &str, patch: AccountPatch) -> CredResult<Account> {
        if uid.is_empty() {
            return Err(failed("update_account", CredError::NilArgument("uid")));
        }
        let mut account = patch.into_account().map_err(|e| failed("update_account", e))?;
        account.uid = Some(uid.to_string());
        self.save_account(&mut account).await?;
        Ok(account.without_password())
    }

    pub async fn delete_account(&self, uid: &str) -> CredResult<()> {
        self.store
            .delete_account(uid)
            .await
            .map_err(|e| failed("delete_account", e))?;
        tracing::info!(uid = %uid, "account deleted");
        Ok(())
    }

    pub async fn load_account(&self, uid: &str) -> CredResult<Account> {
        self.store
            .load_account(uid)
            .await
            .map_err(|e| failed("load_account", e))
    }

    pub async fn load_all_accounts(&self) -> CredResult<Vec<Account>> {
        self.store
            .load_all_accounts()
            .await
            .map_err(|e| failed("load_all_accounts", e))
    }

    pub async fn get_account_by_email(&self, email: &str) -> CredResult<Account> {
        self.store
            .get_account_by_email(email)
            .await
            .map_err(|e| failed("get_account_by_email", e))
    }

    /// Whether a live account matches `query` as uid, email or name
    pub async fn exist_account(&self, query: &str) -> CredResult<bool> {
        if query.is_empty() {
            return Ok(false);
        }
        self.store
            .exist_account(query)
            .await
            .map_err(|e| failed("exist_account", e))
    }

    /// Check credentials; the returned account carries no password hash
    ///
    /// Issues no token.
    pub async fn authenticate(&self, email: &str, password: &str) -> CredResult<Account> {
        let account = self.get_account_by_email(email).await?;
        account
            .match_password(password)
            .map_err(|e| failed("authenticate", e))?;

        tracing::debug!(uid = ?account.uid, "authenticated");
        Ok(account.without_password())
    }
}

#[cfg(test)]
mod tests {
    use crate::account::{AccountPatch, Field};
    use crate::error::CredError;
    use crate::manager::tests::memory_manager;

    #[tokio::test]
    async fn test_create_and_load() {
        let manager = memory_manager().await;
        let uid = manager
            .create_account("a@b.com", "A", "password1")
            .await
            .unwrap();

        let account = manager.load_account(&uid).await.unwrap();
        assert_eq!(account.email(), Some("a@b.com"));
        assert_eq!(account.active, Field::Value(true));
        assert!(account.created.is_some());
        assert_eq!(manager.load_all_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let manager = memory_manager().await;
        assert!(matches!(
            manager.create_account("a@b", "A", "password1").await,
            Err(CredError::InvalidEmail)
        ));
        assert!(matches!(
            manager.create_account("a@b.com", "", "password1").await,
            Err(CredError::InvalidName)
        ));
        assert!(matches!(
            manager.create_account("a@b.com", "A", "short").await,
            Err(CredError::InvalidPassword)
        ));
        assert!(manager.load_all_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let manager = memory_manager().await;
        manager
            .create_account("a@b.com", "A", "password1")
            .await
            .unwrap();
        assert!(matches!(
            manager.create_account("a@b.com", "B", "password2").await,
            Err(CredError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn test_update_account() {
        let manager = memory_manager().await;
        let uid = manager
            .create_account("a@b.com", "A", "password1")
            .await
            .unwrap();

        let patch: AccountPatch = serde_json::from_str(r#"{"name": "Ann"}"#).unwrap();
        let updated = manager.update_account(&uid, patch).await.unwrap();
        assert_eq!(updated.name, Field::Value("Ann".to_string()));
        assert_eq!(updated.email(), Some("a@b.com"));

        // password survives an update that does not mention it
        assert!(manager.authenticate("a@b.com", "password1").await.is_ok());

        let clear_email: AccountPatch = serde_json::from_str(r#"{"email": null}"#).unwrap();
        assert!(matches!(
            manager.update_account(&uid, clear_email).await,
            Err(CredError::InvalidEmail)
        ));

        assert!(matches!(
            manager.update_account("missing", AccountPatch::default()).await,
            Err(CredError::AccountNotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_password_is_hashed() {
        let manager = memory_manager().await;
        let uid = manager
            .create_account("a@b.com", "A", "password1")
            .await
            .unwrap();

        let patch: AccountPatch = serde_json::from_str(r#"{"password": "hunter22"}"#).unwrap();
        manager.update_account(&uid, patch).await.unwrap();

        let stored = manager.load_account(&uid).await.unwrap();
        assert_ne!(stored.password.value().map(String::as_str), Some("hunter22"));
        assert!(manager.authenticate("a@b.com", "hunter22").await.is_ok());
        assert!(matches!(
            manager.authenticate("a@b.com", "password1").await,
            Err(CredError::PasswordMismatch)
        ));

        let short: AccountPatch = serde_json::from_str(r#"{"password": "short"}"#).unwrap();
        assert!(matches!(
            manager.update_account(&uid, short).await,
            Err(CredError::InvalidPassword)
        ));
        assert!(manager.authenticate("a@b.com", "hunter22").await.is_ok());
    }

    #[tokio::test]
    async fn test_exist_account() {
        let manager = memory_manager().await;
        let uid = manager
            .create_account("a@b.com", "Ann", "password1")
            .await
            .unwrap();

        assert!(manager.exist_account(&uid).await.unwrap());
        assert!(manager.exist_account("a@b.com").await.unwrap());
        assert!(manager.exist_account("Ann").await.unwrap());
        assert!(!manager.exist_account("Bob").await.unwrap());
        assert!(!manager.exist_account("").await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let manager = memory_manager().await;
        manager
            .create_account("a@b.com", "A", "password1")
            .await
            .unwrap();

        let account = manager.authenticate("a@b.com", "password1").await.unwrap();
        assert_eq!(account.password, Field::Null);
        assert_eq!(account.email(), Some("a@b.com"));

        assert!(matches!(
            manager.authenticate("a@b.com", "wrong-password").await,
            Err(CredError::PasswordMismatch)
        ));
        assert!(matches!(
            manager.authenticate("x@b.com", "password1").await,
            Err(CredError::EmailNotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_account_leaves_key() {
        let manager = memory_manager().await;
        let (account, _key) = manager
            .create_account_with_key("a@b.com", "A", "password1")
            .await
            .unwrap();
        assert_eq!(account.password, Field::Null);
        let uid = account.uid.unwrap();

        manager.delete_account(&uid).await.unwrap();
        assert!(matches!(
            manager.load_account(&uid).await,
            Err(CredError::AccountNotFound)
        ));
        // no cascade
        assert!(manager.exist_key(&uid).await.unwrap());
    }
}
