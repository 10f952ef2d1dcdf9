//! Sync engine: drains the offline queue against the remote store.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use super::connectivity::Connectivity;
use super::entity_facade::is_local_id;
use super::mutation_queue::MutationQueue;
use super::queue_model::{
    OperationKind, QueueOperation, QueueStatus, SyncPassResult, SyncPassStatus,
};
use super::remote_store::{dispatch_operation, RemoteStore};
use super::sync_events::{NoOpSyncEventSink, OperationConfirmed, SyncEvent, SyncEventSink};

#[derive(Debug, Default)]
struct PassStats {
    completed_passes: u64,
    last_pass_at: Option<DateTime<Utc>>,
    last_pass_status: Option<SyncPassStatus>,
}

pub struct SyncEngine {
    queue: Arc<MutationQueue>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Connectivity,
    event_sink: Arc<dyn SyncEventSink>,
    /// Held for the duration of a pass; concurrent triggers coalesce on it.
    pass_guard: Mutex<()>,
    stats: StdMutex<PassStats>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<MutationQueue>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            queue,
            remote,
            connectivity,
            event_sink: Arc::new(NoOpSyncEventSink),
            pass_guard: Mutex::new(()),
            stats: StdMutex::new(PassStats::default()),
        }
    }

    /// Sets the sink notified about confirmed operations.
    pub fn with_event_sink(mut self, event_sink: Arc<dyn SyncEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn queue(&self) -> Arc<MutationQueue> {
        Arc::clone(&self.queue)
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Whether a pass currently holds the guard.
    pub fn is_syncing(&self) -> bool {
        self.pass_guard.try_lock().is_err()
    }

    /// Replays every pending operation once, oldest first.
    ///
    /// A failing operation never aborts the pass; it consumes one unit of its
    /// retry budget and the pass moves on.
    pub async fn run_sync_pass(&self) -> SyncPassResult {
        if !self.connectivity.is_online() {
            debug!("[OfflineSync] Skipping sync pass: offline");
            let result = SyncPassResult::offline();
            self.record_pass(&result);
            return result;
        }

        let Ok(_guard) = self.pass_guard.try_lock() else {
            debug!("[OfflineSync] Sync pass already running; coalescing trigger");
            return SyncPassResult::coalesced();
        };

        let started_at = Instant::now();
        let pending = self.queue.pending().await;
        let mut result = SyncPassResult {
            status: SyncPassStatus::Completed,
            success: true,
            processed_count: 0,
            failed_count: 0,
            errors: Vec::new(),
        };

        for snapshot in pending {
            // Re-read: an earlier create in this pass may have rewritten its id.
            let Some(op) = self.queue.get(&snapshot.id).await else {
                continue;
            };
            if !op.is_pending() {
                continue;
            }
            if self.awaits_create(&op).await {
                debug!(
                    "[OfflineSync] Holding {} {} ({}) until its create is confirmed",
                    op.entity_family.as_str(),
                    op.kind.as_str(),
                    op.id
                );
                continue;
            }

            match dispatch_operation(self.remote.as_ref(), &op).await {
                Ok(record) => {
                    self.queue.remove(&op.id).await;
                    result.processed_count += 1;
                    self.confirm(&op, record).await;
                }
                Err(err) => {
                    let message = format!(
                        "{} {} ({}): {}",
                        op.entity_family.as_str(),
                        op.kind.as_str(),
                        op.id,
                        err
                    );
                    warn!("[OfflineSync] Replay failed: {}", message);
                    self.queue.increment_retry(&op.id, Some(err.to_string())).await;
                    result.failed_count += 1;
                    result.errors.push(message);
                }
            }
        }

        result.success = result.failed_count == 0;
        self.record_pass(&result);
        if result.processed_count > 0 || result.failed_count > 0 {
            info!(
                "[OfflineSync] Sync pass complete processed={} failed={} duration_ms={}",
                result.processed_count,
                result.failed_count,
                started_at.elapsed().as_millis()
            );
        }
        result
    }

    /// Waits until no pass holds the guard.
    pub async fn wait_for_idle(&self) {
        let _guard = self.pass_guard.lock().await;
    }

    /// Gives quarantined operations a fresh budget, then runs a pass.
    pub async fn retry_all_quarantined(&self) -> SyncPassResult {
        let reset = self.queue.reset_quarantined().await;
        if reset > 0 {
            info!("[OfflineSync] Reset {} quarantined operation(s)", reset);
        }
        self.run_sync_pass().await
    }

    /// Deletes quarantined operations; pending ones are untouched.
    pub async fn clear_quarantined(&self) -> usize {
        let removed = self.queue.remove_quarantined().await;
        if removed > 0 {
            info!("[OfflineSync] Cleared {} quarantined operation(s)", removed);
        }
        removed
    }

    pub async fn get_status(&self) -> QueueStatus {
        let operations = self.queue.list().await;
        let pending = operations.iter().filter(|op| op.is_pending()).count();
        let oldest = operations.iter().min_by_key(|op| op.enqueued_at).cloned();
        let oldest_age_ms = oldest
            .as_ref()
            .map(|op| (Utc::now().timestamp_millis() - op.enqueued_at).max(0));
        let stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());

        QueueStatus {
            total: operations.len(),
            pending,
            quarantined: operations.len() - pending,
            oldest,
            oldest_age_ms,
            completed_passes: stats.completed_passes,
            last_pass_at: stats.last_pass_at.map(|at| at.to_rfc3339()),
            last_pass_status: stats.last_pass_status,
        }
    }

    /// Operations on a temporary id wait for the create that assigns the real
    /// one. They keep their retry budget while waiting.
    async fn awaits_create(&self, op: &QueueOperation) -> bool {
        if op.kind == OperationKind::Create {
            return false;
        }
        match op.entity_id.as_deref() {
            Some(id) if is_local_id(id) => self.queue.has_queued_create(id).await,
            _ => false,
        }
    }

    async fn confirm(&self, op: &QueueOperation, record: Option<Value>) {
        let remote_id = record
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if op.kind == OperationKind::Create {
            let ids = (op.local_id.as_deref(), remote_id.as_deref());
            if let (Some(local_id), Some(remote_id)) = ids {
                self.queue.rewrite_entity_id(local_id, remote_id).await;
            }
        }

        self.event_sink
            .emit(SyncEvent::OperationConfirmed(OperationConfirmed {
                entity_family: op.entity_family,
                kind: op.kind,
                entity_id: remote_id.or_else(|| op.entity_id.clone()),
                local_id: op.local_id.clone(),
                record,
            }))
            .await;
    }

    fn record_pass(&self, result: &SyncPassResult) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        if result.status == SyncPassStatus::Completed {
            stats.completed_passes += 1;
        }
        stats.last_pass_at = Some(Utc::now());
        stats.last_pass_status = Some(result.status);
    }
}
