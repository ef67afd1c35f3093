/// In-memory store
///
/// All state sits behind one lock, so check-then-insert sequences (email
/// uniqueness, one key per account) happen under a single write guard.
use super::{require, CredentialStore, StoreConfig, StoreStatus};
use crate::account::Account;
use crate::error::{CredError, CredResult};
use crate::keys::KeyPair;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    keys: HashMap<String, KeyPair>,
    tokens: HashMap<String, String>,
}

impl Tables {
    fn email_taken(&self, email: &str, except_uid: Option<&str>) -> bool {
        self.accounts.values().any(|a| {
            !a.is_deleted() && a.email() == Some(email) && a.uid.as_deref() != except_uid
        })
    }
}

/// Store backed by process memory; contents are lost on close
#[derive(Default)]
pub struct MemoryStore {
    // None until dialed
    inner: RwLock<Option<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> CredResult<T>) -> CredResult<T> {
        let guard = self.inner.read();
        let tables = guard.as_ref().ok_or(CredError::NotConnected)?;
        f(tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> CredResult<T>) -> CredResult<T> {
        let mut guard = self.inner.write();
        let tables = guard.as_mut().ok_or(CredError::NotConnected)?;
        f(tables)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn dial(&self, _config: &StoreConfig) -> CredResult<()> {
        let mut guard = self.inner.write();
        if guard.is_none() {
            *guard = Some(Tables::default());
        }
        Ok(())
    }

    fn status(&self) -> StoreStatus {
        if self.inner.read().is_some() {
            StoreStatus::Connected
        } else {
            StoreStatus::Disconnected
        }
    }

    async fn close(&self) -> CredResult<()> {
        self.inner.write().take();
        Ok(())
    }

    async fn load_all_accounts(&self) -> CredResult<Vec<Account>> {
        self.read(|t| {
            let mut accounts: Vec<Account> = t.accounts.values().cloned().collect();
            accounts.sort_by(|a, b| a.created.cmp(&b.created));
            Ok(accounts)
        })
    }

    async fn load_account(&self, uid: &str) -> CredResult<Account> {
        self.read(|t| t.accounts.get(uid).cloned().ok_or(CredError::AccountNotFound))
    }

    async fn get_account_by_email(&self, email: &str) -> CredResult<Account> {
        self.read(|t| {
            t.accounts
                .values()
                .find(|a| !a.is_deleted() && a.email() == Some(email))
                .cloned()
                .ok_or(CredError::EmailNotFound)
        })
    }

    async fn save_account(&self, account: &mut Account) -> CredResult<()> {
        self.write(|t| {
            let now = Utc::now();
            let mut record = account.clone();
            match account.uid.as_deref() {
                None => {
                    let email = record.email().ok_or(CredError::NilArgument("email"))?;
                    if t.email_taken(email, None) {
                        return Err(CredError::DuplicateEmail);
                    }
                    record.prepare_insert(Uuid::new_v4().to_string(), now);
                }
                Some(uid) => {
                    let stored = t.accounts.get(uid).ok_or(CredError::AccountNotFound)?;
                    record.prepare_update(stored, now);
                    if let (false, Some(email)) = (record.is_deleted(), record.email()) {
                        if t.email_taken(email, Some(uid)) {
                            return Err(CredError::DuplicateEmail);
                        }
                    }
                }
            }

            let uid = record.uid.clone().ok_or(CredError::NilArgument("uid"))?;
            t.accounts.insert(uid, record.clone());
            *account = record;
            Ok(())
        })
    }

    async fn delete_account(&self, uid: &str) -> CredResult<()> {
        self.write(|t| {
            t.accounts
                .remove(uid)
                .map(|_| ())
                .ok_or(CredError::AccountNotFound)
        })
    }

    async fn exist_account(&self, query: &str) -> CredResult<bool> {
        self.read(|t| {
            Ok(t.accounts.values().any(|a| {
                !a.is_deleted()
                    && (a.uid.as_deref() == Some(query)
                        || a.email() == Some(query)
                        || a.name.value().map(String::as_str) == Some(query))
            }))
        })
    }

    async fn load_all_keys(&self) -> CredResult<Vec<KeyPair>> {
        self.read(|t| {
            let mut keys: Vec<KeyPair> = t.keys.values().cloned().collect();
            keys.sort_by(|a, b| a.created.cmp(&b.created));
            Ok(keys)
        })
    }

    async fn load_key(&self, kid: &str) -> CredResult<KeyPair> {
        self.read(|t| t.keys.get(kid).cloned().ok_or(CredError::KeyNotFound))
    }

    async fn get_key_by_account_id(&self, account_id: &str) -> CredResult<KeyPair> {
        self.read(|t| {
            t.keys
                .values()
                .find(|k| k.account_id == account_id)
                .cloned()
                .ok_or(CredError::KeyNotFound)
        })
    }

    async fn get_key_by_pub(&self, pub_key: &[u8]) -> CredResult<KeyPair> {
        self.read(|t| {
            t.keys
                .values()
                .find(|k| k.pub_key.as_bytes() == pub_key)
                .cloned()
                .ok_or(CredError::KeyNotFound)
        })
    }

    async fn save_key(&self, key: &mut KeyPair) -> CredResult<()> {
        self.write(|t| {
            let now = Utc::now();
            let mut record = key.clone();
            match key.kid.as_deref() {
                None => {
                    require(&record.account_id, "account id")?;
                    require(&record.pub_key, "public key")?;
                    require(&record.priv_key, "private key")?;
                    if !t.accounts.contains_key(&record.account_id) {
                        return Err(CredError::AccountNotFound);
                    }
                    if t.keys.values().any(|k| k.account_id == record.account_id) {
                        return Err(CredError::KeyAlreadyExists);
                    }
                    record.prepare_insert(now);
                }
                Some(kid) => {
                    let stored = t.keys.get(kid).ok_or(CredError::KeyNotFound)?;
                    record.prepare_update(stored, now);
                }
            }

            let kid = record.kid.clone().ok_or(CredError::NilArgument("kid"))?;
            t.keys.insert(kid, record.clone());
            *key = record;
            Ok(())
        })
    }

    async fn delete_key(&self, kid: &str) -> CredResult<()> {
        self.write(|t| t.keys.remove(kid).map(|_| ()).ok_or(CredError::KeyNotFound))
    }

    async fn exist_key(&self, kid: &str) -> CredResult<bool> {
        self.read(|t| Ok(t.keys.contains_key(kid)))
    }

    async fn load_token(&self, uid: &str) -> CredResult<String> {
        self.read(|t| t.tokens.get(uid).cloned().ok_or(CredError::TokenNotFound))
    }

    async fn save_token(&self, uid: &str, token: &str) -> CredResult<()> {
        require(uid, "uid")?;
        require(token, "token")?;
        self.write(|t| {
            t.tokens.insert(uid.to_string(), token.to_string());
            Ok(())
        })
    }

    async fn delete_token(&self, uid: &str) -> CredResult<()> {
        self.write(|t| {
            t.tokens
                .remove(uid)
                .map(|_| ())
                .ok_or(CredError::TokenNotFound)
        })
    }

    async fn exist_token(&self, uid: &str) -> CredResult<bool> {
        self.read(|t| Ok(t.tokens.contains_key(uid)))
    }
}
