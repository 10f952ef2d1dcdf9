//! Durable FIFO queue of deferred writes with retry bookkeeping.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::Result;

use super::durable_store::DurableStore;
use super::queue_model::{
    EntityFamily, NewQueueOperation, OperationKind, QueueOperation, QUEUE_STORE_KEY,
};

struct QueueState {
    operations: Vec<QueueOperation>,
    last_enqueued_at: i64,
}

/// Offline mutation queue.
///
/// Every mutation rewrites the whole queue under `QUEUE_STORE_KEY` while the
/// state lock is held, so the durable copy always matches a state the queue
/// actually went through. Durable write failures are logged and swallowed:
/// the in-memory queue stays authoritative for the running instance.
pub struct MutationQueue {
    store: Arc<dyn DurableStore>,
    retry_budget: u32,
    state: Mutex<QueueState>,
}

impl MutationQueue {
    pub fn new(store: Arc<dyn DurableStore>, retry_budget: u32) -> Self {
        Self {
            store,
            retry_budget: retry_budget.max(1),
            state: Mutex::new(QueueState {
                operations: Vec::new(),
                last_enqueued_at: 0,
            }),
        }
    }

    /// Hydrates the queue from the durable store. A missing or unreadable
    /// queue starts empty.
    pub async fn load(store: Arc<dyn DurableStore>, retry_budget: u32) -> Self {
        let operations = match store.read(QUEUE_STORE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<QueueOperation>>(&raw) {
                Ok(operations) => operations,
                Err(err) => {
                    warn!("[OfflineSync] Discarding unreadable offline queue: {}", err);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("[OfflineSync] Failed to read offline queue: {}", err);
                Vec::new()
            }
        };
        let last_enqueued_at = operations
            .iter()
            .map(|op| op.enqueued_at)
            .max()
            .unwrap_or(0);
        debug!(
            "[OfflineSync] Loaded offline queue with {} operation(s)",
            operations.len()
        );

        let queue = Self::new(store, retry_budget);
        {
            let mut state = queue.state.lock().await;
            state.operations = operations;
            state.last_enqueued_at = last_enqueued_at;
        }
        queue
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Appends a deferred write. Only validation errors are returned.
    pub async fn append(&self, new_op: NewQueueOperation) -> Result<QueueOperation> {
        new_op.validate()?;

        let mut state = self.state.lock().await;
        let enqueued_at = Utc::now()
            .timestamp_millis()
            .max(state.last_enqueued_at + 1);
        state.last_enqueued_at = enqueued_at;

        let op = QueueOperation {
            id: Uuid::now_v7().to_string(),
            kind: new_op.kind,
            entity_family: new_op.entity_family,
            entity_id: new_op.entity_id,
            local_id: new_op.local_id,
            payload: new_op.payload,
            enqueued_at,
            retry_count: 0,
            retry_budget: self.retry_budget,
            last_error: None,
        };
        state.operations.push(op.clone());
        self.persist(&state).await;

        debug!(
            "[OfflineSync] Queued {} {} (op={})",
            op.entity_family.as_str(),
            op.kind.as_str(),
            op.id
        );
        Ok(op)
    }

    /// All operations in insertion order.
    pub async fn list(&self) -> Vec<QueueOperation> {
        self.state.lock().await.operations.clone()
    }

    /// Operations with retry budget left, oldest first.
    pub async fn pending(&self) -> Vec<QueueOperation> {
        let state = self.state.lock().await;
        let mut pending: Vec<_> = state
            .operations
            .iter()
            .filter(|op| op.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|op| op.enqueued_at);
        pending
    }

    /// Operations that exhausted their retry budget, oldest first.
    pub async fn quarantined(&self) -> Vec<QueueOperation> {
        let state = self.state.lock().await;
        let mut quarantined: Vec<_> = state
            .operations
            .iter()
            .filter(|op| op.is_quarantined())
            .cloned()
            .collect();
        quarantined.sort_by_key(|op| op.enqueued_at);
        quarantined
    }

    pub async fn get(&self, id: &str) -> Option<QueueOperation> {
        let state = self.state.lock().await;
        state.operations.iter().find(|op| op.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.operations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.operations.is_empty()
    }

    pub async fn oldest(&self) -> Option<QueueOperation> {
        let state = self.state.lock().await;
        state
            .operations
            .iter()
            .min_by_key(|op| op.enqueued_at)
            .cloned()
    }

    /// Removes one operation; returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.operations.len();
        state.operations.retain(|op| op.id != id);
        let removed = state.operations.len() != before;
        if removed {
            self.persist(&state).await;
        }
        removed
    }

    /// Records one failed attempt. The count never exceeds the budget.
    pub async fn increment_retry(
        &self,
        id: &str,
        last_error: Option<String>,
    ) -> Option<QueueOperation> {
        let mut state = self.state.lock().await;
        let updated = {
            let op = state.operations.iter_mut().find(|op| op.id == id)?;
            op.retry_count = (op.retry_count + 1).min(op.retry_budget);
            op.last_error = last_error;
            op.clone()
        };
        self.persist(&state).await;

        if updated.is_quarantined() {
            warn!(
                "[OfflineSync] Operation {} ({} {}) quarantined after {} failed attempt(s)",
                updated.id,
                updated.entity_family.as_str(),
                updated.kind.as_str(),
                updated.retry_count
            );
        }
        Some(updated)
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.operations.clear();
        self.persist(&state).await;
    }

    /// Gives every quarantined operation a fresh retry budget.
    pub async fn reset_quarantined(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut reset = 0;
        for op in state.operations.iter_mut().filter(|op| op.is_quarantined()) {
            op.retry_count = 0;
            reset += 1;
        }
        if reset > 0 {
            self.persist(&state).await;
        }
        reset
    }

    /// Drops every quarantined operation, leaving pending ones untouched.
    pub async fn remove_quarantined(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.operations.len();
        state.operations.retain(|op| !op.is_quarantined());
        let removed = before - state.operations.len();
        if removed > 0 {
            self.persist(&state).await;
        }
        removed
    }

    /// Points queued operations that reference a temporary id at the id the
    /// remote store assigned. Returns the number of rewritten operations.
    pub async fn rewrite_entity_id(&self, local_id: &str, remote_id: &str) -> usize {
        if local_id == remote_id {
            return 0;
        }
        let mut state = self.state.lock().await;
        let mut rewritten = 0;
        for op in state.operations.iter_mut() {
            let mut touched = false;
            if op.entity_id.as_deref() == Some(local_id) {
                op.entity_id = Some(remote_id.to_string());
                touched = true;
            }
            if let Some(payload_id) = op.payload.get_mut("id") {
                if payload_id.as_str() == Some(local_id) {
                    *payload_id = serde_json::Value::String(remote_id.to_string());
                    touched = true;
                }
            }
            if touched {
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            self.persist(&state).await;
            debug!(
                "[OfflineSync] Rewrote {} queued operation(s) from {} to {}",
                rewritten, local_id, remote_id
            );
        }
        rewritten
    }

    /// Whether any pending operation belongs to `family`.
    pub async fn has_pending_for(&self, family: EntityFamily) -> bool {
        let state = self.state.lock().await;
        state
            .operations
            .iter()
            .any(|op| op.entity_family == family && op.is_pending())
    }

    /// Whether any queued operation still targets `entity_id`.
    pub async fn has_queued_for(&self, family: EntityFamily, entity_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .operations
            .iter()
            .any(|op| op.entity_family == family && op.entity_id.as_deref() == Some(entity_id))
    }

    /// Whether a create for the optimistic record `local_id` is still queued.
    pub async fn has_queued_create(&self, local_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .operations
            .iter()
            .any(|op| {
                op.kind == OperationKind::Create && op.local_id.as_deref() == Some(local_id)
            })
    }

    #[cfg(test)]
    pub(crate) async fn push_raw(&self, op: QueueOperation) {
        let mut state = self.state.lock().await;
        state.last_enqueued_at = state.last_enqueued_at.max(op.enqueued_at);
        state.operations.push(op);
        self.persist(&state).await;
    }

    async fn persist(&self, state: &QueueState) {
        let serialized = match serde_json::to_string(&state.operations) {
            Ok(value) => value,
            Err(err) => {
                warn!("[OfflineSync] Failed to serialize offline queue: {}", err);
                return;
            }
        };
        if let Err(err) = self.store.write(QUEUE_STORE_KEY, serialized).await {
            warn!("[OfflineSync] Failed to persist offline queue: {}", err);
        }
    }
}
