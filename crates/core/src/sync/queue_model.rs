//! Offline queue and sync pass domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};

/// Failed attempts tolerated before an operation is quarantined.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Periodic sync cadence in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;

/// Durable store key holding the whole ordered queue.
pub const QUEUE_STORE_KEY: &str = "offline_queue";

/// Entity collections that participate in offline sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFamily {
    Transaction,
    Category,
    PaymentMethod,
}

impl EntityFamily {
    pub const ALL: [EntityFamily; 3] = [
        EntityFamily::Transaction,
        EntityFamily::Category,
        EntityFamily::PaymentMethod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityFamily::Transaction => "transaction",
            EntityFamily::Category => "category",
            EntityFamily::PaymentMethod => "payment_method",
        }
    }

    /// Durable store key of the family's cached snapshot.
    pub fn cache_key(&self) -> &'static str {
        match self {
            EntityFamily::Transaction => "cache.transactions",
            EntityFamily::Category => "cache.categories",
            EntityFamily::PaymentMethod => "cache.payment_methods",
        }
    }
}

/// Kinds of deferred writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    BulkRename,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::BulkRename => "bulk_rename",
        }
    }

    pub fn requires_entity_id(&self) -> bool {
        matches!(self, OperationKind::Update | OperationKind::Delete)
    }
}

/// Rename every record whose `field` equals `old_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRename {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// A pending write intent persisted in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOperation {
    pub id: String,
    pub kind: OperationKind,
    pub entity_family: EntityFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Temporary id of the optimistic record a create stands for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    pub payload: serde_json::Value,
    /// Milliseconds since the epoch; strictly increasing within a queue.
    pub enqueued_at: i64,
    pub retry_count: u32,
    pub retry_budget: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueOperation {
    pub fn is_pending(&self) -> bool {
        self.retry_count < self.retry_budget
    }

    pub fn is_quarantined(&self) -> bool {
        self.retry_count >= self.retry_budget
    }

    pub fn enqueued_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.enqueued_at)
    }

    /// Decodes a bulk rename payload.
    pub fn bulk_rename(&self) -> Result<BulkRename> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            ValidationError::InvalidPayload(format!(
                "bulk_rename payload for operation {}: {}",
                self.id, err
            ))
            .into()
        })
    }
}

/// Caller-provided part of a queue operation; the queue assigns the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueOperation {
    pub kind: OperationKind,
    pub entity_family: EntityFamily,
    pub entity_id: Option<String>,
    pub local_id: Option<String>,
    pub payload: serde_json::Value,
}

impl NewQueueOperation {
    pub fn create(
        family: EntityFamily,
        local_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: OperationKind::Create,
            entity_family: family,
            entity_id: None,
            local_id: Some(local_id.into()),
            payload,
        }
    }

    pub fn update(
        family: EntityFamily,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: OperationKind::Update,
            entity_family: family,
            entity_id: Some(entity_id.into()),
            local_id: None,
            payload,
        }
    }

    pub fn delete(family: EntityFamily, entity_id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            entity_family: family,
            entity_id: Some(entity_id.into()),
            local_id: None,
            payload: serde_json::json!({}),
        }
    }

    pub fn bulk_rename(family: EntityFamily, rename: &BulkRename) -> Result<Self> {
        Ok(Self {
            kind: OperationKind::BulkRename,
            entity_family: family,
            entity_id: None,
            local_id: None,
            payload: serde_json::to_value(rename)?,
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.kind.requires_entity_id()
            && self
                .entity_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(ValidationError::MissingEntityId(self.kind.as_str()).into());
        }
        Ok(())
    }
}

/// Outcome classification of one `run_sync_pass` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPassStatus {
    Completed,
    /// Not connected; nothing was attempted.
    Offline,
    /// Another pass was already running; this trigger folded into it.
    Coalesced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPassResult {
    pub status: SyncPassStatus,
    pub success: bool,
    pub processed_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

impl SyncPassResult {
    pub fn offline() -> Self {
        Self {
            status: SyncPassStatus::Offline,
            success: false,
            processed_count: 0,
            failed_count: 0,
            errors: vec!["Device is offline".to_string()],
        }
    }

    pub fn coalesced() -> Self {
        Self {
            status: SyncPassStatus::Coalesced,
            success: true,
            processed_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        }
    }
}

/// Snapshot of queue health for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub total: usize,
    pub pending: usize,
    pub quarantined: usize,
    pub oldest: Option<QueueOperation>,
    pub oldest_age_ms: Option<i64>,
    pub completed_passes: u64,
    pub last_pass_at: Option<String>,
    pub last_pass_status: Option<SyncPassStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_serialization_matches_wire_contract() {
        let actual = EntityFamily::ALL
            .iter()
            .map(|family| serde_json::to_string(family).expect("serialize family"))
            .collect::<Vec<_>>();
        assert_eq!(
            actual,
            vec!["\"transaction\"", "\"category\"", "\"payment_method\""]
        );
        assert_eq!(
            serde_json::to_string(&OperationKind::BulkRename).unwrap(),
            "\"bulk_rename\""
        );
    }

    #[test]
    fn update_and_delete_need_entity_id() {
        let mut op = NewQueueOperation::update(
            EntityFamily::Category,
            "cat-1",
            serde_json::json!({"name": "Food"}),
        );
        assert!(op.validate().is_ok());

        op.entity_id = Some("  ".to_string());
        assert!(op.validate().is_err());

        op.kind = OperationKind::Delete;
        op.entity_id = None;
        assert!(op.validate().is_err());
    }

    #[test]
    fn bulk_rename_payload_round_trips_through_operation() {
        let rename = BulkRename {
            field: "category".to_string(),
            old_value: "Food".to_string(),
            new_value: "Dining".to_string(),
        };
        let new_op =
            NewQueueOperation::bulk_rename(EntityFamily::Transaction, &rename).expect("payload");
        assert_eq!(
            new_op.payload,
            serde_json::json!({"field": "category", "oldValue": "Food", "newValue": "Dining"})
        );

        let op = QueueOperation {
            id: "op-1".to_string(),
            kind: new_op.kind,
            entity_family: new_op.entity_family,
            entity_id: None,
            local_id: None,
            payload: new_op.payload,
            enqueued_at: 1,
            retry_count: 0,
            retry_budget: DEFAULT_RETRY_BUDGET,
            last_error: None,
        };
        assert_eq!(op.bulk_rename().expect("decode"), rename);
    }

    #[test]
    fn retry_state_follows_budget() {
        let mut op = QueueOperation {
            id: "op-1".to_string(),
            kind: OperationKind::Delete,
            entity_family: EntityFamily::Transaction,
            entity_id: Some("tx-1".to_string()),
            local_id: None,
            payload: serde_json::json!({}),
            enqueued_at: 1,
            retry_count: 2,
            retry_budget: 3,
            last_error: None,
        };
        assert!(op.is_pending());
        op.retry_count = 3;
        assert!(op.is_quarantined());
        assert!(!op.is_pending());
    }
}
