//! Pending-change recording.
//!
//! Every mutation on the state container is reported to a [`ChangeSink`] so
//! the sync layer can replay it against the API later. The sink is injected;
//! the container does not know whether changes land in a durable queue or a
//! test recorder.

use serde::{Deserialize, Serialize};

/// What a mutation did to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
}

/// One unconfirmed local mutation, in the shape the sync layer pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Entity kind, matching the API path segment ("ordini", "clienti").
    pub entity: String,
    pub entity_id: String,
    pub op: ChangeOp,
    /// Full serialized entity. Last write wins; earlier payloads for the
    /// same entity are superseded, not merged.
    pub payload: serde_json::Value,
}

impl PendingChange {
    pub fn new(
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        op: ChangeOp,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entity: entity.into(),
            entity_id: entity_id.into(),
            op,
            payload,
        }
    }
}

/// Receiver for mutations that still need to reach the API.
#[async_trait::async_trait]
pub trait ChangeSink: Send + Sync {
    async fn record(&self, change: PendingChange) -> anyhow::Result<()>;
}

/// Sink that drops every change. For read-only wiring and tests that do not
/// care about sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait::async_trait]
impl ChangeSink for NullSink {
    async fn record(&self, _change: PendingChange) -> anyhow::Result<()> {
        Ok(())
    }
}
