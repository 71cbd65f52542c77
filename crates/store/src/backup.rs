//! Full-snapshot backups of the key-value store.
//!
//! A backup copies every key's stored text under a single timestamp label.
//! Restore replaces the live keys with the snapshot in one transaction, so a
//! half-applied restore is never observable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::kv::KvStore;

/// Descriptor of one backup snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub snapshot_at: DateTime<Utc>,
    /// Number of keys captured in the snapshot.
    pub keys: usize,
}

impl KvStore {
    /// Snapshot all current keys under a timestamp label.
    pub async fn backup(&self) -> Result<BackupInfo, StoreError> {
        let pool = self.get_pool().await?;
        let snapshot_at = Utc::now();
        let label = snapshot_at.to_rfc3339();

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, data FROM kv_store ORDER BY key")
                .fetch_all(&pool)
                .await?;
        let keys = rows.len();

        let mut tx = pool.begin().await?;
        for (key, data) in rows {
            sqlx::query(
                r#"
                INSERT INTO kv_backups (snapshot_at, key, data)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(&label)
            .bind(&key)
            .bind(&data)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(snapshot = %label, keys, "backup created");
        Ok(BackupInfo { snapshot_at, keys })
    }

    /// List available backups, newest first.
    pub async fn backups(&self) -> Result<Vec<BackupInfo>, StoreError> {
        let pool = self.get_pool().await?;
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT snapshot_at, COUNT(*)
            FROM kv_backups
            GROUP BY snapshot_at
            ORDER BY snapshot_at DESC
            "#,
        )
        .fetch_all(&pool)
        .await?;

        let mut infos = Vec::with_capacity(rows.len());
        for (label, count) in rows {
            let snapshot_at = DateTime::parse_from_rfc3339(&label)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    StoreError::unavailable(format!("invalid snapshot label {:?}: {}", label, e))
                })?;
            infos.push(BackupInfo {
                snapshot_at,
                keys: count as usize,
            });
        }
        Ok(infos)
    }

    /// Replace the live keys with the contents of a snapshot.
    ///
    /// Keys that did not exist at backup time are removed; the whole swap is
    /// a single transaction.
    pub async fn restore(&self, snapshot_at: DateTime<Utc>) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        let label = snapshot_at.to_rfc3339();

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, data FROM kv_backups WHERE snapshot_at = ?1")
                .bind(&label)
                .fetch_all(&pool)
                .await?;

        if rows.is_empty() {
            return Err(StoreError::BackupNotFound(label));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM kv_store").execute(&mut *tx).await?;
        for (key, data) in &rows {
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, data, updated_at)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(key)
            .bind(data)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!(snapshot = %label, keys = rows.len(), "backup restored");
        Ok(())
    }

    /// Delete all but the most recent `keep` backups.
    pub async fn prune_backups(&self, keep: usize) -> Result<(), StoreError> {
        let pool = self.get_pool().await?;
        sqlx::query(
            r#"
            DELETE FROM kv_backups
            WHERE snapshot_at NOT IN (
                SELECT DISTINCT snapshot_at
                FROM kv_backups
                ORDER BY snapshot_at DESC
                LIMIT ?1
            )
            "#,
        )
        .bind(keep as i64)
        .execute(&pool)
        .await?;
        Ok(())
    }
}
