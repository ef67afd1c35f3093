/// Credential storage
///
/// Persistence contract for accounts, key pairs and tokens, plus the registry
/// that maps provider names to backend instances. Backends handle their own
/// locking; each call is atomic on its own, nothing spans entities.

pub mod memory;
pub mod registry;
pub mod sqlite;

pub use memory::MemoryStore;
pub use registry::ProviderRegistry;
pub use sqlite::SqliteStore;

use crate::account::Account;
use crate::error::CredResult;
use crate::keys::KeyPair;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Connection status of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Disconnected,
    Connected,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Disconnected => write!(f, "Disconnected"),
            StoreStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Dial parameters handed to a store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file, for backends that have one
    pub path: Option<PathBuf>,

    /// Busy and acquire timeout
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Storage backend trait
///
/// Lookups that miss return the matching `*NotFound` error rather than an
/// `Option`. Every operation before `dial` or after `close` returns
/// `NotConnected`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Open the backend
    async fn dial(&self, config: &StoreConfig) -> CredResult<()>;

    fn status(&self) -> StoreStatus;

    /// Release resources. Closing a closed store is a no-op.
    async fn close(&self) -> CredResult<()>;

    // Accounts

    async fn load_all_accounts(&self) -> CredResult<Vec<Account>>;

    async fn load_account(&self, uid: &str) -> CredResult<Account>;

    /// Live (not soft-deleted) account owning `email`
    async fn get_account_by_email(&self, email: &str) -> CredResult<Account>;

    /// Insert when `uid` is unset, otherwise update
    ///
    /// On insert the store assigns `uid` and timestamps; on update the stored
    /// `uid`/`created` are re-applied and unset fields keep their stored
    /// value. Fails with `DuplicateEmail` if another live account owns the
    /// email.
    async fn save_account(&self, account: &mut Account) -> CredResult<()>;

    async fn delete_account(&self, uid: &str) -> CredResult<()>;

    /// Whether a live account matches `query` by uid, email or name
    async fn exist_account(&self, query: &str) -> CredResult<bool>;

    // Key pairs

    async fn load_all_keys(&self) -> CredResult<Vec<KeyPair>>;

    async fn load_key(&self, kid: &str) -> CredResult<KeyPair>;

    async fn get_key_by_account_id(&self, account_id: &str) -> CredResult<KeyPair>;

    /// Key pair whose public PEM equals `pub_key` byte for byte
    async fn get_key_by_pub(&self, pub_key: &[u8]) -> CredResult<KeyPair>;

    /// Insert when `kid` is unset, otherwise update
    ///
    /// The insert path requires an existing account and fails with
    /// `KeyAlreadyExists` if that account already owns a key pair.
    async fn save_key(&self, key: &mut KeyPair) -> CredResult<()>;

    async fn delete_key(&self, kid: &str) -> CredResult<()>;

    async fn exist_key(&self, kid: &str) -> CredResult<bool>;

    // Tokens, keyed by account uid

    async fn load_token(&self, uid: &str) -> CredResult<String>;

    /// Overwrites any token stored for `uid`
    async fn save_token(&self, uid: &str, token: &str) -> CredResult<()>;

    async fn delete_token(&self, uid: &str) -> CredResult<()>;

    async fn exist_token(&self, uid: &str) -> CredResult<bool>;
}

/// Required-field checks shared by the backends
pub(crate) fn require(value: &str, what: &'static str) -> CredResult<()> {
    if value.is_empty() {
        Err(crate::error::CredError::NilArgument(what))
    } else {
        Ok(())
    }
}
