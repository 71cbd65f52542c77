//! One-shot sync passes and backup management.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use bottega_clients::Client;
use bottega_core::OrderId;
use bottega_orders::Order;
use bottega_remote::{ApiClient, ApiError};
use bottega_state::{ChangeOp, OrderBook};
use bottega_store::{BackupInfo, KvStore, keys};

use crate::error::SyncError;
use crate::queue::{PendingChangeQueue, QueuedChange};

/// Result of a sync pass, in the shape the console surfaces to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
}

/// Observable sync state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Unsynced changes still in the queue.
    pub pending: usize,
}

struct Inner {
    status: SyncStatus,
    last_error: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Push/pull synchronizer over the queue, the API client and the store.
///
/// A pass pushes unsynced changes oldest-first, then pulls remote state,
/// protecting entities whose local changes are still unconfirmed (last write
/// wins, remote authoritative otherwise). A network failure aborts the pass
/// and leaves the remaining changes queued.
pub struct SyncEngine {
    api: Arc<ApiClient>,
    store: KvStore,
    queue: PendingChangeQueue,
    book: Arc<OrderBook>,
    inner: RwLock<Inner>,
    // Serializes passes; a second caller gets a "already running" outcome.
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        api: Arc<ApiClient>,
        store: KvStore,
        queue: PendingChangeQueue,
        book: Arc<OrderBook>,
    ) -> Self {
        Self {
            api,
            store,
            queue,
            book,
            inner: RwLock::new(Inner {
                status: SyncStatus::Idle,
                last_error: None,
                last_synced_at: None,
            }),
            running: Mutex::new(()),
        }
    }

    /// Run one sync pass. Never panics and never returns `Err`: failures are
    /// reported through the outcome and retained in [`SyncState`].
    pub async fn sync_data(&self) -> SyncOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            // Another pass is underway and will report its own outcome; an
            // overlap is not a failure and must not trigger backoff.
            return SyncOutcome {
                success: true,
                message: "sync already in progress".to_string(),
            };
        };

        self.inner.write().await.status = SyncStatus::Syncing;
        let result = self.run_pass().await;
        let mut inner = self.inner.write().await;
        inner.status = SyncStatus::Idle;

        match result {
            Ok(report) => {
                inner.last_synced_at = Some(Utc::now());
                inner.last_error = None;
                SyncOutcome {
                    success: true,
                    message: report,
                }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(%err, "sync pass failed");
                inner.last_error = Some(message.clone());
                SyncOutcome {
                    success: false,
                    message,
                }
            }
        }
    }

    /// Snapshot of the observable state.
    pub async fn state(&self) -> SyncState {
        let pending = match self.queue.pending_count().await {
            Ok(n) => n,
            Err(err) => {
                tracing::error!(%err, "failed to count pending changes");
                0
            }
        };
        let inner = self.inner.read().await;
        SyncState {
            status: inner.status,
            last_error: inner.last_error.clone(),
            last_synced_at: inner.last_synced_at,
            pending,
        }
    }

    async fn run_pass(&self) -> Result<String, SyncError> {
        let mut pushed = 0usize;
        let mut rejected = 0usize;

        for queued in self.queue.list_unsynced().await? {
            self.queue.mark_syncing(queued.id).await?;
            match self.apply_change(&queued).await {
                Ok(()) => {
                    self.queue.mark_synced(queued.id).await?;
                    pushed += 1;
                }
                Err(err) if is_transient(&err) => {
                    // Connectivity went away mid-pass. Abort; everything not
                    // yet confirmed stays queued for the next pass.
                    self.queue.mark_failed(queued.id, &err.to_string()).await?;
                    return Err(err.into());
                }
                Err(err) => {
                    // The API rejected the payload; retrying the same bytes
                    // will not help, but the row stays visible as failed.
                    tracing::warn!(
                        entity = %queued.change.entity,
                        entity_id = %queued.change.entity_id,
                        %err,
                        "queued change rejected by API"
                    );
                    self.queue.mark_failed(queued.id, &err.to_string()).await?;
                    rejected += 1;
                }
            }
        }

        self.pull_orders().await?;
        self.pull_clients().await?;
        self.queue.clear_synced().await?;

        Ok(if rejected == 0 {
            format!("sync completed: {} changes pushed", pushed)
        } else {
            format!(
                "sync completed: {} changes pushed, {} rejected",
                pushed, rejected
            )
        })
    }

    async fn apply_change(&self, queued: &QueuedChange) -> Result<(), ApiError> {
        let change = &queued.change;
        match change.entity.as_str() {
            "ordini" => {
                let order: Order = serde_json::from_value(change.payload.clone())
                    .map_err(|e| ApiError::parse(format!("queued order payload: {}", e)))?;
                match change.op {
                    ChangeOp::Create => self.api.create_order(&order).await?,
                    ChangeOp::Update => self.api.update_order(&order).await?,
                };
            }
            "clienti" => {
                let client: Client = serde_json::from_value(change.payload.clone())
                    .map_err(|e| ApiError::parse(format!("queued client payload: {}", e)))?;
                match change.op {
                    ChangeOp::Create => self.api.create_client(&client).await?,
                    ChangeOp::Update => self.api.update_client(&client).await?,
                };
            }
            other => {
                return Err(ApiError::parse(format!(
                    "unknown entity kind in queue: {}",
                    other
                )));
            }
        }
        Ok(())
    }

    async fn pull_orders(&self) -> Result<(), SyncError> {
        let remote = self.api.list_orders().await?;
        let protected: HashSet<OrderId> = self
            .queue
            .unsynced_entity_ids("ordini")
            .await?
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect();
        self.book
            .reconcile_remote(remote, &protected)
            .await
            .map_err(|e| SyncError::unavailable(e.to_string()))?;
        Ok(())
    }

    async fn pull_clients(&self) -> Result<(), SyncError> {
        // No in-memory container for clients; the list goes straight to the
        // store. Skip the pull while local client changes are unconfirmed.
        if !self.queue.unsynced_entity_ids("clienti").await?.is_empty() {
            tracing::debug!("skipping client pull: local client changes pending");
            return Ok(());
        }
        let remote = self.api.list_clients().await?;
        self.store.set(keys::CLIENTI, &remote).await?;
        Ok(())
    }

    /// Snapshot every stored key under a timestamp label.
    pub async fn backup_data(&self) -> Result<BackupInfo, SyncError> {
        Ok(self.store.backup().await?)
    }

    pub async fn get_backups(&self) -> Result<Vec<BackupInfo>, SyncError> {
        Ok(self.store.backups().await?)
    }

    /// Overwrite current keys from a snapshot, then re-hydrate in-memory
    /// state from the restored store.
    pub async fn restore_backup(&self, snapshot_at: DateTime<Utc>) -> Result<(), SyncError> {
        self.store.restore(snapshot_at).await?;
        self.book.reload().await;
        Ok(())
    }
}

fn is_transient(err: &ApiError) -> bool {
    match err {
        ApiError::Network(_) => true,
        ApiError::Auth(auth) => matches!(auth, bottega_auth::AuthError::Network(_)),
        ApiError::Api(status, _) => *status >= 500,
        ApiError::Parse(_) => false,
    }
}
