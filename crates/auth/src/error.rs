use thiserror::Error;

use bottega_store::StoreError;

/// Authentication-layer error.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No configured credential was accepted by the backend.
    #[error("unauthenticated: no configured credential was accepted")]
    Unauthenticated,

    #[error("network error during login: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AuthError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
}
