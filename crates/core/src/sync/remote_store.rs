//! Remote store contract and the `(family, kind)` dispatch table.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{Error, Result, ValidationError};

use super::queue_model::{BulkRename, EntityFamily, OperationKind, QueueOperation};

/// Authoritative store the offline queue replays against.
///
/// Payloads and records are the camelCase JSON form of the domain records.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Full collection read.
    async fn list(&self, family: EntityFamily) -> Result<Vec<Value>>;

    /// Creates a record and returns it as stored (with its assigned id).
    async fn create(&self, family: EntityFamily, payload: Value) -> Result<Value>;

    /// Applies partial fields and returns the updated record.
    async fn update(&self, family: EntityFamily, id: &str, payload: Value) -> Result<Value>;

    async fn delete(&self, family: EntityFamily, id: &str) -> Result<()>;

    /// Single call renaming every matching record of the family.
    async fn bulk_update(&self, family: EntityFamily, rename: &BulkRename) -> Result<()>;
}

/// Replays one queued operation. Returns the remote record for creates and
/// updates when the remote store sent one back.
pub async fn dispatch_operation(
    remote: &dyn RemoteStore,
    op: &QueueOperation,
) -> Result<Option<Value>> {
    let family = op.entity_family;
    match (family, op.kind) {
        (_, OperationKind::Create) => {
            let mut payload = op.payload.clone();
            strip_local_id(&mut payload, op.local_id.as_deref());
            remote.create(family, payload).await.map(Some)
        }
        (_, OperationKind::Update) => {
            let id = required_entity_id(op)?;
            remote.update(family, id, op.payload.clone()).await.map(Some)
        }
        (_, OperationKind::Delete) => {
            let id = required_entity_id(op)?;
            remote.delete(family, id).await.map(|_| None)
        }
        (EntityFamily::Transaction, OperationKind::BulkRename) => {
            let rename = op.bulk_rename()?;
            remote.bulk_update(family, &rename).await.map(|_| None)
        }
        (other, OperationKind::BulkRename) => Err(Error::remote_rejected(format!(
            "bulk_rename is not supported for {}",
            other.as_str()
        ))),
    }
}

fn required_entity_id(op: &QueueOperation) -> Result<&str> {
    op.entity_id
        .as_deref()
        .ok_or_else(|| ValidationError::MissingEntityId(op.kind.as_str()).into())
}

/// The remote store assigns ids; a temporary id must not leak into a create.
fn strip_local_id(payload: &mut Value, local_id: Option<&str>) {
    if let (Some(local_id), Some(object)) = (local_id, payload.as_object_mut()) {
        if object.get("id").and_then(Value::as_str) == Some(local_id) {
            object.remove("id");
        }
    }
}
