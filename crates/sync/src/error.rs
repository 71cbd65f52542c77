use thiserror::Error;

use bottega_remote::ApiError;
use bottega_store::StoreError;

/// Sync-layer error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("queue error: {0}")]
    Queue(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("malformed queued payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

impl SyncError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
