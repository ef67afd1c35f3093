use super::{failed, Manager};
use crate::error::{CredError, CredResult};
use crate::jwt::{self, Claims};

impl Manager {
    /// Issue a token for `uid` and record it
    ///
    /// A token that cannot be recorded is not handed out.
    pub async fn create_token(&self, uid: &str) -> CredResult<String> {
        let key = self.get_key_by_account_id(uid).await?;
        if key.active == Some(false) {
            return Err(failed("create_token", CredError::Unauthorized));
        }

        let token = jwt::generate_token(uid, &key.priv_key).map_err(|e| failed("create_token", e))?;
        self.save_token(uid, &token).await?;

        tracing::debug!(uid = %uid, "token issued");
        Ok(token)
    }

    /// Verify `token` against the public key named by its `kid`
    ///
    /// Validity comes from the signature and time claims only; the recorded
    /// copy is not consulted.
    pub async fn validate_token(&self, token: &str) -> CredResult<Claims> {
        let kid = jwt::signing_kid(token).map_err(|e| failed("validate_token", e))?;
        let key = self.get_key_by_account_id(&kid).await?;
        if key.active == Some(false) {
            return Err(failed("validate_token", CredError::Unauthorized));
        }

        jwt::verify(token, &kid, &key.pub_key).map_err(|e| failed("validate_token", e))
    }

    pub async fn load_token(&self, kid: &str) -> CredResult<String> {
        self.store
            .load_token(kid)
            .await
            .map_err(|e| failed("load_token", e))
    }

    pub async fn get_token_by_account_id(&self, uid: &str) -> CredResult<String> {
        self.load_token(uid).await
    }

    pub async fn get_token_by_email(&self, email: &str) -> CredResult<String> {
        let account = self.get_account_by_email(email).await?;
        let uid = account
            .uid
            .ok_or_else(|| failed("get_token_by_email", CredError::AccountNotFound))?;
        self.load_token(&uid).await
    }

    pub async fn save_token(&self, uid: &str, token: &str) -> CredResult<()> {
        self.store
            .save_token(uid, token)
            .await
            .map_err(|e| failed("save_token", e))
    }

    pub async fn delete_token(&self, uid: &str) -> CredResult<()> {
        self.store
            .delete_token(uid)
            .await
            .map_err(|e| failed("delete_token", e))
    }

    pub async fn exist_token(&self, uid: &str) -> CredResult<bool> {
        self.store
            .exist_token(uid)
            .await
            .map_err(|e| failed("exist_token", e))
    }
}
