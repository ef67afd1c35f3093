/// SQLite store
///
/// Embedded file database through an `sqlx` pool. Tables are created on dial.
/// Email uniqueness among live accounts and the one-key-per-account rule are
/// enforced by unique indexes, so concurrent writers cannot both win.
use super::{require, CredentialStore, StoreConfig, StoreStatus};
use crate::account::Account;
use crate::error::{CredError, CredResult};
use crate::keys::KeyPair;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS account (
        uid TEXT PRIMARY KEY NOT NULL,
        email TEXT,
        name TEXT,
        password TEXT,
        active INTEGER,
        created TEXT NOT NULL,
        updated TEXT NOT NULL,
        deleted INTEGER
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS account_live_email ON account(email) WHERE deleted IS NOT 1",
    "CREATE TABLE IF NOT EXISTS key_pair (
        kid TEXT PRIMARY KEY NOT NULL,
        account_id TEXT NOT NULL,
        pub_key TEXT NOT NULL,
        priv_key TEXT NOT NULL,
        active INTEGER,
        created TEXT NOT NULL,
        updated TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS key_pair_account ON key_pair(account_id)",
    "CREATE INDEX IF NOT EXISTS key_pair_pub ON key_pair(pub_key)",
    "CREATE TABLE IF NOT EXISTS token (
        uid TEXT PRIMARY KEY NOT NULL,
        token TEXT NOT NULL,
        updated TEXT NOT NULL
    )",
];

const ACCOUNT_COLUMNS: &str = "uid, email, name, password, active, created, updated, deleted";
const KEY_COLUMNS: &str = "kid, account_id, pub_key, priv_key, active, created, updated";

#[derive(Default)]
pub struct SqliteStore {
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Pools are reference counted; clone out so no guard is held across await
    fn pool(&self) -> CredResult<SqlitePool> {
        self.pool.read().clone().ok_or(CredError::NotConnected)
    }

    async fn fetch_account(&self, sql: &str, arg: &str) -> CredResult<Option<Account>> {
        let row = sqlx::query(sql)
            .bind(arg)
            .fetch_optional(&self.pool()?)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn fetch_key(&self, sql: &str, arg: &str) -> CredResult<Option<KeyPair>> {
        let row = sqlx::query(sql)
            .bind(arg)
            .fetch_optional(&self.pool()?)
            .await?;
        row.as_ref().map(key_from_row).transpose()
    }
}

fn account_from_row(row: &SqliteRow) -> CredResult<Account> {
    Ok(Account {
        uid: Some(row.try_get("uid")?),
        email: row.try_get::<Option<String>, _>("email")?.into(),
        name: row.try_get::<Option<String>, _>("name")?.into(),
        password: row.try_get::<Option<String>, _>("password")?.into(),
        active: row.try_get::<Option<bool>, _>("active")?.into(),
        created: Some(row.try_get("created")?),
        updated: Some(row.try_get("updated")?),
        deleted: row.try_get::<Option<bool>, _>("deleted")?.into(),
    })
}

fn key_from_row(row: &SqliteRow) -> CredResult<KeyPair> {
    Ok(KeyPair {
        kid: Some(row.try_get("kid")?),
        account_id: row.try_get("account_id")?,
        pub_key: row.try_get("pub_key")?,
        priv_key: row.try_get("priv_key")?,
        active: row.try_get("active")?,
        created: Some(row.try_get("created")?),
        updated: Some(row.try_get("updated")?),
    })
}

/// Map a unique-index violation to the domain conflict it stands for
fn on_conflict(err: sqlx::Error, conflict: CredError) -> CredError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict,
        _ => CredError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn dial(&self, config: &StoreConfig) -> CredResult<()> {
        if self.pool.read().is_some() {
            return Ok(());
        }

        let path = config.path.as_ref().ok_or(CredError::NilArgument("store path"))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(config.timeout)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        tracing::info!(path = %path.display(), "sqlite store opened");
        *self.pool.write() = Some(pool);
        Ok(())
    }

    fn status(&self) -> StoreStatus {
        if self.pool.read().is_some() {
            StoreStatus::Connected
        } else {
            StoreStatus::Disconnected
        }
    }

    async fn close(&self) -> CredResult<()> {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!("sqlite store closed");
        }
        Ok(())
    }

    async fn load_all_accounts(&self) -> CredResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM account ORDER BY created",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool()?)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn load_account(&self, uid: &str) -> CredResult<Account> {
        let sql = format!("SELECT {} FROM account WHERE uid = ?1", ACCOUNT_COLUMNS);
        self.fetch_account(&sql, uid)
            .await?
            .ok_or(CredError::AccountNotFound)
    }

    async fn get_account_by_email(&self, email: &str) -> CredResult<Account> {
        let sql = format!(
            "SELECT {} FROM account WHERE email = ?1 AND deleted IS NOT 1",
            ACCOUNT_COLUMNS
        );
        self.fetch_account(&sql, email)
            .await?
            .ok_or(CredError::EmailNotFound)
    }

    async fn save_account(&self, account: &mut Account) -> CredResult<()> {
        let pool = self.pool()?;
        let now = Utc::now();
        let mut record = account.clone();

        match account.uid.as_deref() {
            None => {
                record.email().ok_or(CredError::NilArgument("email"))?;
                record.prepare_insert(Uuid::new_v4().to_string(), now);

                sqlx::query(&format!(
                    "INSERT INTO account ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    ACCOUNT_COLUMNS
                ))
                .bind(record.uid.as_deref())
                .bind(record.email.value().map(String::as_str))
                .bind(record.name.value().map(String::as_str))
                .bind(record.password.value().map(String::as_str))
                .bind(record.active.value().copied())
                .bind(record.created)
                .bind(record.updated)
                .bind(record.deleted.value().copied())
                .execute(&pool)
                .await
                .map_err(|e| on_conflict(e, CredError::DuplicateEmail))?;
            }
            Some(uid) => {
                let mut tx = pool.begin().await?;

                // Write first: the transaction holds the write lock before the
                // read, so the merge below sees the latest row
                let touched = sqlx::query("UPDATE account SET updated = ?1 WHERE uid = ?2")
                    .bind(now)
                    .bind(uid)
                    .execute(&mut *tx)
                    .await?;
                if touched.rows_affected() == 0 {
                    return Err(CredError::AccountNotFound);
                }

                let row = sqlx::query(&format!("SELECT {} FROM account WHERE uid = ?1", ACCOUNT_COLUMNS))
                    .bind(uid)
                    .fetch_one(&mut *tx)
                    .await?;
                let stored = account_from_row(&row)?;
                record.prepare_update(&stored, now);

                sqlx::query(
                    "UPDATE account
                     SET email = ?1, name = ?2, password = ?3, active = ?4, updated = ?5, deleted = ?6
                     WHERE uid = ?7",
                )
                .bind(record.email.value().map(String::as_str))
                .bind(record.name.value().map(String::as_str))
                .bind(record.password.value().map(String::as_str))
                .bind(record.active.value().copied())
                .bind(record.updated)
                .bind(record.deleted.value().copied())
                .bind(uid)
                .execute(&mut *tx)
                .await
                .map_err(|e| on_conflict(e, CredError::DuplicateEmail))?;

                tx.commit().await?;
            }
        }

        *account = record;
        Ok(())
    }

    async fn delete_account(&self, uid: &str) -> CredResult<()> {
        let result = sqlx::query("DELETE FROM account WHERE uid = ?1")
            .bind(uid)
            .execute(&self.pool()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CredError::AccountNotFound);
        }
        Ok(())
    }

    async fn exist_account(&self, query: &str) -> CredResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM account
             WHERE (uid = ?1 OR email = ?1 OR name = ?1) AND deleted IS NOT 1",
        )
        .bind(query)
        .fetch_one(&self.pool()?)
        .await?;

        Ok(count > 0)
    }

    async fn load_all_keys(&self) -> CredResult<Vec<KeyPair>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM key_pair ORDER BY created",
            KEY_COLUMNS
        ))
        .fetch_all(&self.pool()?)
        .await?;

        rows.iter().map(key_from_row).collect()
    }

    async fn load_key(&self, kid: &str) -> CredResult<KeyPair> {
        let sql = format!("SELECT {} FROM key_pair WHERE kid = ?1", KEY_COLUMNS);
        self.fetch_key(&sql, kid).await?.ok_or(CredError::KeyNotFound)
    }

    async fn get_key_by_account_id(&self, account_id: &str) -> CredResult<KeyPair> {
        let sql = format!("SELECT {} FROM key_pair WHERE account_id = ?1", KEY_COLUMNS);
        self.fetch_key(&sql, account_id)
            .await?
            .ok_or(CredError::KeyNotFound)
    }

    async fn get_key_by_pub(&self, pub_key: &[u8]) -> CredResult<KeyPair> {
        // PEM is ASCII; anything else cannot match a stored key
        let pem = std::str::from_utf8(pub_key).map_err(|_| CredError::KeyNotFound)?;
        let sql = format!("SELECT {} FROM key_pair WHERE pub_key = ?1", KEY_COLUMNS);
        self.fetch_key(&sql, pem).await?.ok_or(CredError::KeyNotFound)
    }

    async fn save_key(&self, key: &mut KeyPair) -> CredResult<()> {
        let pool = self.pool()?;
        let now = Utc::now();
        let mut record = key.clone();

        match key.kid.as_deref() {
            None => {
                require(&record.account_id, "account id")?;
                require(&record.pub_key, "public key")?;
                require(&record.priv_key, "private key")?;

                record.prepare_insert(now);

                // The owner check and the insert are one statement
                let inserted = sqlx::query(&format!(
                    "INSERT INTO key_pair ({})
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                     WHERE EXISTS (SELECT 1 FROM account WHERE uid = ?2)",
                    KEY_COLUMNS
                ))
                .bind(record.kid.as_deref())
                .bind(&record.account_id)
                .bind(&record.pub_key)
                .bind(&record.priv_key)
                .bind(record.active)
                .bind(record.created)
                .bind(record.updated)
                .execute(&pool)
                .await
                .map_err(|e| on_conflict(e, CredError::KeyAlreadyExists))?;

                if inserted.rows_affected() == 0 {
                    return Err(CredError::AccountNotFound);
                }
            }
            Some(kid) => {
                let mut tx = pool.begin().await?;

                let touched = sqlx::query("UPDATE key_pair SET updated = ?1 WHERE kid = ?2")
                    .bind(now)
                    .bind(kid)
                    .execute(&mut *tx)
                    .await?;
                if touched.rows_affected() == 0 {
                    return Err(CredError::KeyNotFound);
                }

                let row = sqlx::query(&format!("SELECT {} FROM key_pair WHERE kid = ?1", KEY_COLUMNS))
                    .bind(kid)
                    .fetch_one(&mut *tx)
                    .await?;
                let stored = key_from_row(&row)?;
                record.prepare_update(&stored, now);

                sqlx::query(
                    "UPDATE key_pair
                     SET pub_key = ?1, priv_key = ?2, active = ?3, updated = ?4
                     WHERE kid = ?5",
                )
                .bind(&record.pub_key)
                .bind(&record.priv_key)
                .bind(record.active)
                .bind(record.updated)
                .bind(kid)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
            }
        }

        *key = record;
        Ok(())
    }

    async fn delete_key(&self, kid: &str) -> CredResult<()> {
        let result = sqlx::query("DELETE FROM key_pair WHERE kid = ?1")
            .bind(kid)
            .execute(&self.pool()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CredError::KeyNotFound);
        }
        Ok(())
    }

    async fn exist_key(&self, kid: &str) -> CredResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM key_pair WHERE kid = ?1")
            .bind(kid)
            .fetch_one(&self.pool()?)
            .await?;
        Ok(count > 0)
    }

    async fn load_token(&self, uid: &str) -> CredResult<String> {
        sqlx::query_scalar("SELECT token FROM token WHERE uid = ?1")
            .bind(uid)
            .fetch_optional(&self.pool()?)
            .await?
            .ok_or(CredError::TokenNotFound)
    }

    async fn save_token(&self, uid: &str, token: &str) -> CredResult<()> {
        require(uid, "uid")?;
        require(token, "token")?;

        sqlx::query(
            "INSERT INTO token (uid, token, updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(uid) DO UPDATE SET token = excluded.token, updated = excluded.updated",
        )
        .bind(uid)
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool()?)
        .await?;
        Ok(())
    }

    async fn delete_token(&self, uid: &str) -> CredResult<()> {
        let result = sqlx::query("DELETE FROM token WHERE uid = ?1")
            .bind(uid)
            .execute(&self.pool()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CredError::TokenNotFound);
        }
        Ok(())
    }

    async fn exist_token(&self, uid: &str) -> CredResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token WHERE uid = ?1")
            .bind(uid)
            .fetch_one(&self.pool()?)
            .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Field;
    use crate::store::tests as shared;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn dialed() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new();
        store.dial(&config(&dir)).await.unwrap();
        (dir, store)
    }

    fn config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: Some(dir.path().join("nested").join("keystead.sqlite")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dial_requires_path() {
        let store = SqliteStore::new();
        assert!(matches!(
            store.dial(&StoreConfig::default()).await,
            Err(CredError::NilArgument(_))
        ));
        assert_eq!(store.status(), StoreStatus::Disconnected);
        assert!(matches!(
            store.exist_key("k").await,
            Err(CredError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_account_lifecycle() {
        let (_dir, store) = dialed().await;
        shared::account_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (_dir, store) = dialed().await;
        shared::duplicate_email(&store).await;
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let (_dir, store) = dialed().await;
        shared::update_unknown_account(&store).await;
    }

    #[tokio::test]
    async fn test_key_lifecycle() {
        let (_dir, store) = dialed().await;
        shared::key_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn test_key_requires_account() {
        let (_dir, store) = dialed().await;
        shared::key_requires_account(&store).await;
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let (_dir, store) = dialed().await;
        shared::token_lifecycle(&store).await;
    }

    #[tokio::test]
    async fn test_close() {
        let (_dir, store) = dialed().await;
        assert_eq!(store.status(), StoreStatus::Connected);
        shared::closed_store_rejects_calls(&store).await;
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new();
        store.dial(&config(&dir)).await.unwrap();

        let mut account = shared::account("persist@b.com");
        store.save_account(&mut account).await.unwrap();
        store.save_token(account.uid.as_deref().unwrap(), "tok").await.unwrap();
        store.close().await.unwrap();

        store.dial(&config(&dir)).await.unwrap();
        let loaded = store.get_account_by_email("persist@b.com").await.unwrap();
        assert_eq!(loaded.uid, account.uid);
        assert_eq!(loaded.password, account.password);
        assert_eq!(store.load_token(loaded.uid.as_deref().unwrap()).await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_concurrent_key_inserts_store_one() {
        let (_dir, store) = dialed().await;
        let store = Arc::new(store);

        let mut account = shared::account("race@b.com");
        store.save_account(&mut account).await.unwrap();
        let uid = account.uid.clone().unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            let mut key = shared::key_for(&uid, &format!("k{}", i));
            handles.push(tokio::spawn(async move { store.save_key(&mut key).await }));
        }

        let mut stored = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => stored += 1,
                Err(CredError::KeyAlreadyExists) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(stored, 1);
        assert_eq!(store.load_all_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_partial_updates_both_land() {
        let (_dir, store) = dialed().await;
        let store = Arc::new(store);

        let mut account = shared::account("merge@b.com");
        store.save_account(&mut account).await.unwrap();
        let uid = account.uid.clone().unwrap();

        for round in 0..10 {
            let name = format!("name-{}", round);
            let email = format!("merge{}@b.com", round);

            let rename = {
                let store = store.clone();
                let mut patch = Account {
                    uid: Some(uid.clone()),
                    name: Field::Value(name.clone()),
                    ..Default::default()
                };
                tokio::spawn(async move { store.save_account(&mut patch).await })
            };
            let move_email = {
                let store = store.clone();
                let mut patch = Account {
                    uid: Some(uid.clone()),
                    email: Field::Value(email.clone()),
                    ..Default::default()
                };
                tokio::spawn(async move { store.save_account(&mut patch).await })
            };
            rename.await.unwrap().unwrap();
            move_email.await.unwrap().unwrap();

            let stored = store.load_account(&uid).await.unwrap();
            assert_eq!(stored.name, Field::Value(name));
            assert_eq!(stored.email(), Some(email.as_str()));
            assert_eq!(stored.password, account.password);
        }
    }

    #[tokio::test]
    async fn test_key_update_of_unknown_kid() {
        let (_dir, store) = dialed().await;
        let mut key = shared::key_for("nobody", "k");
        key.kid = Some("nobody".to_string());
        assert!(matches!(
            store.save_key(&mut key).await,
            Err(CredError::KeyNotFound)
        ));
    }
}
