//! SQLite-backed key-value store of JSON blobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::envelope::{self, Envelope};
use crate::error::StoreError;

/// Durable key-value store for the console's persisted state.
///
/// Cheap to clone; safe to share across tasks. The underlying pool is
/// initialized lazily on first use, mirroring how the console only touched
/// storage once a page actually needed it.
#[derive(Debug, Clone)]
pub struct KvStore {
    pool: Arc<Mutex<Option<SqlitePool>>>,
    path: PathBuf,
}

impl KvStore {
    /// Open the store at the default location:
    /// `{BOTTEGA_DATA_DIR | app data dir}/bottega/console.db`.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::at_path(default_db_path()?))
    }

    /// Open the store at an explicit path (tests, alternate profiles).
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            pool: Arc::new(Mutex::new(None)),
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialize the database connection (called lazily on first use).
    async fn ensure_initialized(&self) -> Result<(), StoreError> {
        let mut pool_guard = self.pool.lock().await;
        if pool_guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::unavailable(format!(
                    "failed to create store directory at {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);

        // A single connection serializes writers; the store is tiny and the
        // console mutates one key at a time.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY,
                data       TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_backups (
                snapshot_at TEXT NOT NULL,
                key         TEXT NOT NULL,
                data        TEXT NOT NULL,
                PRIMARY KEY (snapshot_at, key)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        *pool_guard = Some(pool);
        Ok(())
    }

    /// Get the pool, initializing if necessary.
    pub(crate) async fn get_pool(&self) -> Result<SqlitePool, StoreError> {
        self.ensure_initialized().await?;
        let pool_guard = self.pool.lock().await;
        pool_guard
            .as_ref()
            .cloned()
            .ok_or_else(|| StoreError::unavailable("pool initialization raced"))
    }

    /// Read a key as raw JSON, migrating legacy values forward.
    ///
    /// Returns `Ok(None)` for a missing key. A stored value that is not
    /// valid JSON is reported as `None` too (and logged): the adapter
    /// contract is "parsed JSON or default", never a panic.
    pub async fn get_json(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let pool = self.get_pool().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM kv_store WHERE key = ?1")
                .bind(key)
                .fetch_optional(&pool)
                .await?;

        let Some((raw,)) = row else {
            return Ok(None);
        };

        let Some(parsed) = envelope::parse(&raw) else {
            tracing::warn!(key, "corrupt stored value; falling back to default");
            return Ok(None);
        };

        if parsed.version < envelope::CURRENT_VERSION {
            let migrated = envelope::migrate(key, parsed);
            // Persist the migrated form so the migration runs once per key.
            self.write_envelope(&pool, key, &migrated).await?;
            return Ok(Some(migrated.payload));
        }

        Ok(Some(parsed.payload))
    }

    /// Read and deserialize a key, falling back to `T::default()` on a
    /// missing key, a corrupt value, or a shape mismatch.
    pub async fn get_or_default<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.get_json(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(key, %err, "stored value has unexpected shape; using default");
                    T::default()
                }
            },
            Ok(None) => T::default(),
            Err(err) => {
                tracing::error!(key, %err, "failed to read stored value; using default");
                T::default()
            }
        }
    }

    /// Serialize and store a value under a key.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        let payload = serde_json::to_value(value)?;
        self.write_envelope(&pool, key, &Envelope::current(payload))
            .await
    }

    /// Remove a key. Removing a missing key is not an error.
    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await?;
        Ok(())
    }

    /// Apply several writes/removals in a single transaction.
    ///
    /// `None` removes the key. Used where the caller needs all-or-nothing
    /// semantics (session persistence, backup restore).
    pub async fn apply_batch(
        &self,
        entries: Vec<(String, Option<Value>)>,
    ) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = pool.begin().await?;
        for (key, value) in entries {
            match value {
                Some(payload) => {
                    let data = serde_json::to_string(&Envelope::current(payload))?;
                    sqlx::query(
                        r#"
                        INSERT INTO kv_store (key, data, updated_at)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(key) DO UPDATE SET
                            data = excluded.data,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(&key)
                    .bind(&data)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM kv_store WHERE key = ?1")
                        .bind(&key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// List all keys currently present.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let pool = self.get_pool().await?;
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&pool)
            .await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn write_envelope(
        &self,
        pool: &SqlitePool,
        key: &str,
        envelope: &Envelope,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(envelope)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&data)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Store raw text under a key, bypassing the envelope. Test hook for
    /// simulating corrupt or legacy values.
    #[doc(hidden)]
    pub async fn set_raw(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(&now)
        .execute(&pool)
        .await?;
        Ok(())
    }
}

/// Resolve the default database path:
/// `{BOTTEGA_DATA_DIR | app data dir}/bottega/console.db`.
fn default_db_path() -> Result<PathBuf, StoreError> {
    if let Ok(dir) = std::env::var("BOTTEGA_DATA_DIR") {
        let mut path = PathBuf::from(dir);
        path.push("console.db");
        return Ok(path);
    }

    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .ok_or_else(|| {
            StoreError::unavailable(
                "failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share",
            )
        })?;

    let mut dir = base;
    dir.push("bottega");
    dir.push("console.db");
    Ok(dir)
}
