/// Account entity
///
/// Identity records with an Argon2id password hash, field validation and the
/// presence rules the stores apply on insert and update.

mod field;

pub use field::Field;

use crate::error::{CredError, CredResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 256;
pub const MAX_FIELD_LEN: usize = 256;

lazy_static! {
    /// One or more non-`@`, `@`, a dot-free domain label, `.`, a dot-free suffix
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@]+@[^@.]+\.[^@.]+").unwrap();
}

/// Account record
///
/// `uid` and the timestamps are assigned by the store. The remaining fields
/// are [`Field`]s so an update can tell "not supplied" from "cleared".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub email: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    /// Argon2id hash, only ever written by `set_password`. Never serialized
    /// and never read from caller input.
    #[serde(skip)]
    pub password: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub active: Field<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub deleted: Field<bool>,
}

impl Account {
    /// Build a new, not yet persisted account
    ///
    /// Email uniqueness is only checked when the account is saved.
    pub fn new(email: &str, name: &str, password: &str) -> CredResult<Self> {
        let mut account = Account {
            email: Field::Value(email.to_string()),
            name: Field::Value(name.to_string()),
            ..Default::default()
        };
        account.set_password(password)?;
        Ok(account)
    }

    /// Validate and hash `password`, replacing the stored hash
    ///
    /// On error the previous hash is left untouched.
    pub fn set_password(&mut self, password: &str) -> CredResult<()> {
        let len = password.chars().count();
        if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
            return Err(CredError::InvalidPassword);
        }
        self.password = Field::Value(hash_password(password)?);
        Ok(())
    }

    pub fn update_password(&mut self, password: &str) -> CredResult<()> {
        self.set_password(password)
    }

    /// Check `candidate` against the stored hash
    pub fn match_password(&self, candidate: &str) -> CredResult<()> {
        let hash = self.password.value().ok_or(CredError::PasswordMismatch)?;
        let parsed = PasswordHash::new(hash).map_err(|e| {
            tracing::warn!(uid = ?self.uid, error = %e, "stored password hash is unreadable");
            CredError::PasswordMismatch
        })?;
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .map_err(|_| CredError::PasswordMismatch)
    }

    /// Erase the hash. The account can no longer authenticate.
    pub fn delete_password(&mut self) {
        self.password = Field::Null;
    }

    /// Mark as deleted without touching any other field
    pub fn soft_delete(&mut self) {
        self.deleted = Field::Value(true);
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.deleted, Field::Value(true))
    }

    pub fn email(&self) -> Option<&str> {
        self.email.value().map(String::as_str)
    }

    /// Copy of the account with the password hash stripped
    pub fn without_password(&self) -> Self {
        Account {
            password: Field::Null,
            ..self.clone()
        }
    }

    /// Check name and email
    ///
    /// - name: present, 1 to 256 characters
    /// - email: present, 1 to 256 characters, matching `^[^@]+@[^@.]+\.[^@.]+`
    pub fn validate_fields(&self) -> CredResult<()> {
        let name = self.name.value().ok_or(CredError::InvalidName)?;
        let email = self.email.value().ok_or(CredError::InvalidEmail)?;

        let name_len = name.chars().count();
        if name_len == 0 || name_len > MAX_FIELD_LEN {
            return Err(CredError::InvalidName);
        }

        let email_len = email.chars().count();
        if email_len == 0 || email_len > MAX_FIELD_LEN || !EMAIL_RE.is_match(email) {
            return Err(CredError::InvalidEmail);
        }

        Ok(())
    }

    /// Defaults applied on the insert path of a store
    pub fn prepare_insert(&mut self, uid: String, now: DateTime<Utc>) {
        self.uid = Some(uid);
        self.created = Some(now);
        self.updated = Some(now);
        if !matches!(self.active, Field::Value(_)) {
            self.active = Field::Value(true);
        }
        if !matches!(self.deleted, Field::Value(_)) {
            self.deleted = Field::Value(false);
        }
    }

    /// Merge with the stored record on the update path of a store
    ///
    /// Unset fields take the stored value; `uid` and `created` always do.
    pub fn prepare_update(&mut self, stored: &Account, now: DateTime<Utc>) {
        self.uid = stored.uid.clone();
        self.created = stored.created;
        self.updated = Some(now);
        self.email = std::mem::take(&mut self.email).or_stored(stored.email.clone());
        self.name = std::mem::take(&mut self.name).or_stored(stored.name.clone());
        self.password = std::mem::take(&mut self.password).or_stored(stored.password.clone());
        self.deleted = std::mem::take(&mut self.deleted).or_stored(stored.deleted.clone());
        self.active = match std::mem::take(&mut self.active).or_stored(stored.active.clone()) {
            Field::Value(active) => Field::Value(active),
            _ => Field::Value(true),
        };
    }
}

fn hash_password(password: &str) -> CredResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredError::PasswordHash(e.to_string()))
}

/// Account creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Partial account update from a caller
///
/// Omitted fields keep their stored value. A new password arrives in
/// plaintext and is hashed before it reaches the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    #[serde(default)]
    pub email: Field<String>,
    #[serde(default)]
    pub name: Field<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub active: Field<bool>,
    #[serde(default)]
    pub deleted: Field<bool>,
}

impl AccountPatch {
    /// The update as an account record, password hashed
    pub fn into_account(self) -> CredResult<Account> {
        let mut account = Account {
            email: self.email,
            name: self.name,
            active: self.active,
            deleted: self.deleted,
            ..Default::default()
        };
        if let Some(password) = self.password {
            account.set_password(&password)?;
        }
        Ok(account)
    }
}

/// Authentication form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}
