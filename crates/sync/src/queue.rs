//! Durable queue of unconfirmed local mutations, persisted in SQLite.
//!
//! Changes are replayed against the API in creation order when connectivity
//! allows. The queue is append-mostly: a newer change for the same entity
//! supersedes any earlier unsynced one (last write wins, nothing is merged).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use bottega_state::{ChangeOp, ChangeSink, PendingChange};

use crate::error::SyncError;

/// Lifecycle of a queued change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "Pending",
            ChangeStatus::Syncing => "Syncing",
            ChangeStatus::Synced => "Synced",
            ChangeStatus::Failed => "Failed",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for ChangeStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ChangeStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
        match s {
            "Pending" => Ok(ChangeStatus::Pending),
            "Syncing" => Ok(ChangeStatus::Syncing),
            "Synced" => Ok(ChangeStatus::Synced),
            "Failed" => Ok(ChangeStatus::Failed),
            _ => Err(format!("invalid ChangeStatus: {}", s).into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ChangeStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let s = self.as_str();
        <&str as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&s, buf)
    }
}

/// A change as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedChange {
    pub id: Uuid,
    pub change: PendingChange,
    pub status: ChangeStatus,
    pub created_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// SQLite-backed pending-change queue.
///
/// Cheap to clone; safe to share across tasks. The pool is initialized
/// lazily on first use.
#[derive(Debug, Clone)]
pub struct PendingChangeQueue {
    pool: Arc<tokio::sync::Mutex<Option<SqlitePool>>>,
    path: PathBuf,
}

impl PendingChangeQueue {
    /// Open the queue next to the store:
    /// `{BOTTEGA_DATA_DIR | app data dir}/bottega/queue.db`.
    pub fn open_default() -> Result<Self, SyncError> {
        Ok(Self::at_path(default_queue_path()?))
    }

    /// Open the queue at an explicit path (tests, alternate profiles).
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            pool: Arc::new(tokio::sync::Mutex::new(None)),
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn ensure_initialized(&self) -> Result<(), SyncError> {
        let mut pool_guard = self.pool.lock().await;
        if pool_guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::unavailable(format!(
                    "failed to create queue directory at {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS change_queue (
                id         TEXT PRIMARY KEY,
                entity     TEXT NOT NULL,
                entity_id  TEXT NOT NULL,
                op         TEXT NOT NULL,
                payload    TEXT NOT NULL,
                status     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                synced_at  TEXT NULL,
                error      TEXT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        *pool_guard = Some(pool);
        Ok(())
    }

    async fn get_pool(&self) -> Result<SqlitePool, SyncError> {
        self.ensure_initialized().await?;
        let pool_guard = self.pool.lock().await;
        pool_guard
            .as_ref()
            .cloned()
            .ok_or_else(|| SyncError::unavailable("pool initialization raced"))
    }

    /// Enqueue a change, superseding earlier unsynced changes for the same
    /// entity. A create superseded by an update stays a create: the API has
    /// never seen the entity, so the replay must still POST it.
    pub async fn enqueue(&self, change: PendingChange) -> Result<QueuedChange, SyncError> {
        let pool = self.get_pool().await?;
        let mut tx = pool.begin().await?;

        let earlier_create: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM change_queue
            WHERE entity = ?1 AND entity_id = ?2
              AND status IN ('Pending', 'Failed')
              AND op = 'create'
            LIMIT 1
            "#,
        )
        .bind(&change.entity)
        .bind(&change.entity_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM change_queue
            WHERE entity = ?1 AND entity_id = ?2
              AND status IN ('Pending', 'Failed')
            "#,
        )
        .bind(&change.entity)
        .bind(&change.entity_id)
        .execute(&mut *tx)
        .await?;

        let op = if earlier_create.is_some() {
            ChangeOp::Create
        } else {
            change.op
        };

        let queued = QueuedChange {
            id: Uuid::now_v7(),
            change: PendingChange { op, ..change },
            status: ChangeStatus::Pending,
            created_at: Utc::now(),
            synced_at: None,
            error: None,
        };

        sqlx::query(
            r#"
            INSERT INTO change_queue
                (id, entity, entity_id, op, payload, status, created_at, synced_at, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL)
            "#,
        )
        .bind(queued.id.to_string())
        .bind(&queued.change.entity)
        .bind(&queued.change.entity_id)
        .bind(op_str(queued.change.op))
        .bind(queued.change.payload.to_string())
        .bind(queued.status)
        .bind(queued.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(queued)
    }

    /// All changes still waiting to reach the API (pending or failed-retry),
    /// oldest first.
    pub async fn list_unsynced(&self) -> Result<Vec<QueuedChange>, SyncError> {
        let pool = self.get_pool().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, entity, entity_id, op, payload, status, created_at, synced_at, error
            FROM change_queue
            WHERE status IN ('Pending', 'Failed')
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&pool)
        .await?;

        rows.into_iter().map(row_to_change).collect()
    }

    /// Number of unsynced changes.
    pub async fn pending_count(&self) -> Result<usize, SyncError> {
        let pool = self.get_pool().await?;
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM change_queue WHERE status IN ('Pending', 'Failed')",
        )
        .fetch_one(&pool)
        .await?;
        Ok(count as usize)
    }

    /// Entity ids with unsynced changes for a given entity kind. The pull
    /// side uses this to protect local versions from being overwritten.
    pub async fn unsynced_entity_ids(&self, entity: &str) -> Result<HashSet<String>, SyncError> {
        let pool = self.get_pool().await?;
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT entity_id FROM change_queue
            WHERE entity = ?1 AND status IN ('Pending', 'Syncing', 'Failed')
            "#,
        )
        .bind(entity)
        .fetch_all(&pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn mark_syncing(&self, id: Uuid) -> Result<(), SyncError> {
        self.set_status(id, ChangeStatus::Syncing, None).await
    }

    pub async fn mark_synced(&self, id: Uuid) -> Result<(), SyncError> {
        let pool = self.get_pool().await?;
        sqlx::query(
            "UPDATE change_queue SET status = ?1, synced_at = ?2, error = NULL WHERE id = ?3",
        )
        .bind(ChangeStatus::Synced)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), SyncError> {
        self.set_status(id, ChangeStatus::Failed, Some(error)).await
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ChangeStatus,
        error: Option<&str>,
    ) -> Result<(), SyncError> {
        let pool = self.get_pool().await?;
        sqlx::query("UPDATE change_queue SET status = ?1, error = ?2 WHERE id = ?3")
            .bind(status)
            .bind(error)
            .bind(id.to_string())
            .execute(&pool)
            .await?;
        Ok(())
    }

    /// Drop confirmed changes. Called after a successful sync pass.
    pub async fn clear_synced(&self) -> Result<u64, SyncError> {
        let pool = self.get_pool().await?;
        let result = sqlx::query("DELETE FROM change_queue WHERE status = 'Synced'")
            .execute(&pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ChangeSink for PendingChangeQueue {
    async fn record(&self, change: PendingChange) -> anyhow::Result<()> {
        self.enqueue(change).await?;
        Ok(())
    }
}

fn op_str(op: ChangeOp) -> &'static str {
    match op {
        ChangeOp::Create => "create",
        ChangeOp::Update => "update",
    }
}

fn row_to_change(row: sqlx::sqlite::SqliteRow) -> Result<QueuedChange, SyncError> {
    let id: String = row.get("id");
    let op: String = row.get("op");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");
    let synced_at: Option<String> = row.get("synced_at");

    let op = match op.as_str() {
        "create" => ChangeOp::Create,
        "update" => ChangeOp::Update,
        other => {
            return Err(SyncError::unavailable(format!(
                "invalid change op in queue: {}",
                other
            )));
        }
    };

    Ok(QueuedChange {
        id: id
            .parse()
            .map_err(|e| SyncError::unavailable(format!("invalid queue row id: {}", e)))?,
        change: PendingChange {
            entity: row.get("entity"),
            entity_id: row.get("entity_id"),
            op,
            payload: serde_json::from_str::<Value>(&payload)?,
        },
        status: row.get("status"),
        created_at: created_at
            .parse()
            .map_err(|e| SyncError::unavailable(format!("invalid queue timestamp: {}", e)))?,
        synced_at: synced_at
            .map(|s| s.parse())
            .transpose()
            .map_err(|e| SyncError::unavailable(format!("invalid queue timestamp: {}", e)))?,
        error: row.get("error"),
    })
}

/// `{BOTTEGA_DATA_DIR | app data dir}/bottega/queue.db`.
fn default_queue_path() -> Result<PathBuf, SyncError> {
    if let Ok(dir) = std::env::var("BOTTEGA_DATA_DIR") {
        let mut path = PathBuf::from(dir);
        path.push("queue.db");
        return Ok(path);
    }

    let base = dirs::data_dir()
        .ok_or_else(|| SyncError::unavailable("failed to resolve OS app data directory"))?;
    let mut path = base;
    path.push("bottega");
    path.push("queue.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_queue() -> PendingChangeQueue {
        let path = std::env::temp_dir().join(format!("bottega-queue-{}.db", Uuid::now_v7()));
        PendingChangeQueue::at_path(path)
    }

    fn change(entity_id: &str, op: ChangeOp) -> PendingChange {
        PendingChange::new("ordini", entity_id, op, json!({"id": entity_id}))
    }

    #[tokio::test]
    async fn unsynced_changes_come_back_oldest_first() {
        let queue = temp_queue();
        queue.enqueue(change("a", ChangeOp::Create)).await.unwrap();
        queue.enqueue(change("b", ChangeOp::Create)).await.unwrap();
        queue.enqueue(change("c", ChangeOp::Update)).await.unwrap();

        let unsynced = queue.list_unsynced().await.unwrap();
        let ids: Vec<&str> = unsynced.iter().map(|c| c.change.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn newer_change_supersedes_older_for_same_entity() {
        let queue = temp_queue();
        queue.enqueue(change("a", ChangeOp::Create)).await.unwrap();
        queue
            .enqueue(PendingChange::new(
                "ordini",
                "a",
                ChangeOp::Update,
                json!({"id": "a", "note": "v2"}),
            ))
            .await
            .unwrap();

        let unsynced = queue.list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        // Still a create: the API never saw the entity.
        assert_eq!(unsynced[0].change.op, ChangeOp::Create);
        assert_eq!(unsynced[0].change.payload["note"], json!("v2"));
    }

    #[tokio::test]
    async fn update_after_synced_create_stays_an_update() {
        let queue = temp_queue();
        let created = queue.enqueue(change("a", ChangeOp::Create)).await.unwrap();
        queue.mark_synced(created.id).await.unwrap();

        queue.enqueue(change("a", ChangeOp::Update)).await.unwrap();

        let unsynced = queue.list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].change.op, ChangeOp::Update);
    }

    #[tokio::test]
    async fn status_transitions_round_trip() {
        let queue = temp_queue();
        let queued = queue.enqueue(change("a", ChangeOp::Create)).await.unwrap();

        queue.mark_syncing(queued.id).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);

        queue.mark_failed(queued.id, "network down").await.unwrap();
        let unsynced = queue.list_unsynced().await.unwrap();
        assert_eq!(unsynced[0].status, ChangeStatus::Failed);
        assert_eq!(unsynced[0].error.as_deref(), Some("network down"));

        queue.mark_synced(queued.id).await.unwrap();
        assert!(queue.list_unsynced().await.unwrap().is_empty());

        assert_eq!(queue.clear_synced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unsynced_entity_ids_cover_syncing_rows() {
        let queue = temp_queue();
        let a = queue.enqueue(change("a", ChangeOp::Create)).await.unwrap();
        queue.enqueue(change("b", ChangeOp::Update)).await.unwrap();
        queue
            .enqueue(PendingChange::new("clienti", "x", ChangeOp::Create, json!({})))
            .await
            .unwrap();

        queue.mark_syncing(a.id).await.unwrap();

        let ids = queue.unsynced_entity_ids("ordini").await.unwrap();
        assert!(ids.contains("a"));
        assert!(ids.contains("b"));
        assert!(!ids.contains("x"));
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let path = std::env::temp_dir().join(format!("bottega-queue-{}.db", Uuid::now_v7()));
        {
            let queue = PendingChangeQueue::at_path(&path);
            queue.enqueue(change("a", ChangeOp::Create)).await.unwrap();
        }
        let reopened = PendingChangeQueue::at_path(&path);
        assert_eq!(reopened.pending_count().await.unwrap(), 1);
    }
}
