use bottega_core::DomainError;
use bottega_store::StoreError;

/// Errors from the state container.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The change sink rejected a recorded mutation.
    #[error("failed to record pending change: {0}")]
    Sink(#[source] anyhow::Error),
}
