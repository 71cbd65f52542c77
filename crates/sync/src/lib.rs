//! `bottega-sync` — push/pull synchronization and backups.
//!
//! Three pieces:
//! - [`PendingChangeQueue`]: durable SQLite queue of local mutations that
//!   have not been confirmed by the API yet.
//! - [`SyncEngine`]: one sync pass (push queued changes, pull remote state)
//!   plus backup/restore over the store's snapshot table.
//! - [`SyncWorker`]: background task running the engine on an interval with
//!   connectivity checks and backoff.

pub mod engine;
pub mod error;
pub mod queue;
pub mod worker;

pub use engine::{SyncEngine, SyncOutcome, SyncState, SyncStatus};
pub use error::SyncError;
pub use queue::{ChangeStatus, PendingChangeQueue, QueuedChange};
pub use worker::{SyncEvent, SyncWorker};
