use thiserror::Error;

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened or initialized.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backup not found: {0}")]
    BackupNotFound(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
