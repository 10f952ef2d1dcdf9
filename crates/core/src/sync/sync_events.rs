//! Notifications the sync engine emits after confirmed remote writes.

use async_trait::async_trait;
use serde::Serialize;

use super::queue_model::{EntityFamily, OperationKind};

/// A queued operation the remote store accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfirmed {
    pub entity_family: EntityFamily,
    pub kind: OperationKind,
    pub entity_id: Option<String>,
    /// Temporary id the confirmed create replaced.
    pub local_id: Option<String>,
    /// Record as returned by the remote store.
    pub record: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    OperationConfirmed(OperationConfirmed),
}

/// Receiver of sync events.
#[async_trait]
pub trait SyncEventSink: Send + Sync {
    async fn emit(&self, event: SyncEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSyncEventSink;

#[async_trait]
impl SyncEventSink for NoOpSyncEventSink {
    async fn emit(&self, _event: SyncEvent) {}
}
