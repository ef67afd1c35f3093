/// RSA key pairs bound to accounts
///
/// Each account owns at most one 2048-bit key pair. The private key is kept as
/// PKCS#1 PEM ("RSA PRIVATE KEY"), the public key as PKIX PEM ("PUBLIC KEY").
use crate::error::{CredError, CredResult};
use chrono::{DateTime, Utc};
use rsa::{
    pkcs1::EncodeRsaPrivateKey,
    pkcs8::{EncodePublicKey, LineEnding},
    RsaPrivateKey,
};
use serde::{Deserialize, Serialize};

/// Modulus size of generated keys
pub const KEY_BITS: usize = 2048;

/// Key pair record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Assigned by the store on first save; equals `account_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub pub_key: String,
    /// Never serialized
    #[serde(default, skip_serializing)]
    pub priv_key: String,
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl KeyPair {
    /// Generate a fresh key pair for `account_uid`
    ///
    /// Pure apart from randomness; persisting it is up to the caller.
    pub fn generate(account_uid: &str) -> CredResult<Self> {
        if account_uid.is_empty() {
            return Err(CredError::NilArgument("account uid"));
        }

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS).map_err(|e| {
            tracing::error!(error = %e, "failed to generate private key");
            CredError::KeyGeneration(e.to_string())
        })?;

        let priv_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CredError::Encoding(format!("private key: {}", e)))?;
        let pub_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CredError::Encoding(format!("public key: {}", e)))?;

        Ok(KeyPair {
            kid: None,
            pub_key: pub_pem,
            priv_key: priv_pem.to_string(),
            account_id: account_uid.to_string(),
            active: None,
            created: None,
            updated: None,
        })
    }

    /// Defaults applied on the insert path of a store
    pub fn prepare_insert(&mut self, now: DateTime<Utc>) {
        self.kid = Some(self.account_id.clone());
        self.created = Some(now);
        self.updated = Some(now);
        if self.active.is_none() {
            self.active = Some(true);
        }
    }

    /// Merge with the stored record on the update path of a store
    ///
    /// Key material left empty keeps the stored PEM.
    pub fn prepare_update(&mut self, stored: &KeyPair, now: DateTime<Utc>) {
        self.kid = stored.kid.clone();
        self.created = stored.created;
        self.updated = Some(now);
        self.account_id = stored.account_id.clone();
        if self.pub_key.is_empty() {
            self.pub_key = stored.pub_key.clone();
        }
        if self.priv_key.is_empty() {
            self.priv_key = stored.priv_key.clone();
        }
        if self.active.is_none() {
            self.active = Some(stored.active.unwrap_or(true));
        }
    }
}
