//! Per-family read/write path choosing between the remote store and the
//! optimistic cache plus offline queue.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{Error, Result};

use super::optimistic_cache::{CacheRecord, OptimisticCache};
use super::queue_model::{BulkRename, NewQueueOperation, SyncPassStatus};
use super::remote_store::RemoteStore;
use super::sync_engine::SyncEngine;

/// Prefix of ids assigned to records that only exist locally.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Temporary id for an optimistic create.
pub fn new_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::now_v7())
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Which path a direct write ended up taking.
enum DirectWrite {
    Confirmed(Value),
    Deferred,
}

/// Data access for one entity family.
///
/// Every mutation lands in the cache first. Online calls then go straight to
/// the remote store; offline calls (and transient remote failures) are queued
/// for the sync engine. Rejected writes are surfaced and the optimistic state
/// is left in place until the next authoritative read.
pub struct EntityFacade<T: CacheRecord> {
    cache: Arc<OptimisticCache<T>>,
    engine: Arc<SyncEngine>,
    remote: Arc<dyn RemoteStore>,
}

impl<T: CacheRecord> EntityFacade<T> {
    pub fn new(
        cache: Arc<OptimisticCache<T>>,
        engine: Arc<SyncEngine>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            cache,
            engine,
            remote,
        }
    }

    pub fn cache(&self) -> &Arc<OptimisticCache<T>> {
        &self.cache
    }

    pub fn is_online(&self) -> bool {
        self.engine.connectivity().is_online()
    }

    /// Current optimistic view of the collection.
    pub fn list(&self) -> Vec<T> {
        self.cache.items()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.cache.get(id)
    }

    /// Cold start: the snapshot while offline, a full remote read otherwise.
    pub async fn load(&self) -> Result<Vec<T>> {
        if self.is_online() {
            return self.refresh().await;
        }
        self.hydrate_from_snapshot().await;
        Ok(self.cache.items())
    }

    /// Authoritative read. Pending operations of the family are drained
    /// first; a failing read keeps the snapshot.
    pub async fn refresh(&self) -> Result<Vec<T>> {
        if !self.is_online() {
            return Err(Error::Offline("cannot refresh while offline".to_string()));
        }

        if self.engine.queue().has_pending_for(T::FAMILY).await {
            debug!(
                "[OfflineSync] Draining queue before reading {}",
                T::FAMILY.as_str()
            );
            let pass = self.engine.run_sync_pass().await;
            if pass.status == SyncPassStatus::Coalesced {
                self.engine.wait_for_idle().await;
            }
        }

        match self.remote.list(T::FAMILY).await {
            Ok(records) => {
                let items = records
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<Vec<T>, _>>()?;
                self.cache.replace_all(items.clone()).await;
                Ok(items)
            }
            Err(err) => {
                warn!(
                    "[OfflineSync] Remote read of {} failed, using snapshot: {}",
                    T::FAMILY.as_str(),
                    err
                );
                if self.cache.is_empty() {
                    self.hydrate_from_snapshot().await;
                }
                Ok(self.cache.items())
            }
        }
    }

    /// Inserts `record` (carrying a temporary id) and writes it through.
    pub async fn create(&self, record: T) -> Result<T> {
        let local_id = record.id().to_string();
        let payload = serde_json::to_value(&record)?;
        self.cache.upsert(record.clone());
        self.cache.persist().await;

        let deferred = NewQueueOperation::create(T::FAMILY, local_id.clone(), payload.clone());
        if !self.is_online() {
            self.enqueue(deferred).await?;
            return Ok(record);
        }

        let mut direct_payload = payload;
        if let Some(object) = direct_payload.as_object_mut() {
            object.remove("id");
        }
        match self
            .write_direct(self.remote.create(T::FAMILY, direct_payload).await, deferred)
            .await?
        {
            DirectWrite::Confirmed(remote) => {
                self.cache.adopt_remote(Some(&local_id), &remote).await
            }
            DirectWrite::Deferred => Ok(record),
        }
    }

    /// Merges `patch` into the cached record and writes it through.
    pub async fn update(&self, id: &str, patch: Value) -> Result<T> {
        let optimistic = self.cache.apply_patch(id, &patch)?;
        self.cache.persist().await;

        let deferred = NewQueueOperation::update(T::FAMILY, id, patch.clone());
        if self.must_defer(id).await {
            self.enqueue(deferred).await?;
            return Ok(optimistic);
        }

        match self
            .write_direct(self.remote.update(T::FAMILY, id, patch).await, deferred)
            .await?
        {
            DirectWrite::Confirmed(remote) => self.cache.adopt_remote(None, &remote).await,
            DirectWrite::Deferred => Ok(optimistic),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.cache.remove(id).is_some() {
            self.cache.persist().await;
        }

        let deferred = NewQueueOperation::delete(T::FAMILY, id);
        if self.must_defer(id).await {
            return self.enqueue(deferred).await;
        }

        let outcome = self.remote.delete(T::FAMILY, id).await.map(|_| Value::Null);
        self.write_direct(outcome, deferred).await.map(|_| ())
    }

    /// Sends one bulk rename for records already renamed in the cache. Queued
    /// operations of the family go first, so the rename queues behind them.
    pub async fn bulk_rename(&self, rename: &BulkRename) -> Result<()> {
        let deferred = NewQueueOperation::bulk_rename(T::FAMILY, rename)?;
        if !self.is_online() || self.engine.queue().has_pending_for(T::FAMILY).await {
            return self.enqueue(deferred).await;
        }
        let outcome = self
            .remote
            .bulk_update(T::FAMILY, rename)
            .await
            .map(|_| Value::Null);
        self.write_direct(outcome, deferred).await.map(|_| ())
    }

    /// Writes stay behind anything already queued for the same record.
    async fn must_defer(&self, id: &str) -> bool {
        if !self.is_online() {
            return true;
        }
        let queue = self.engine.queue();
        queue.has_queued_create(id).await || queue.has_queued_for(T::FAMILY, id).await
    }

    async fn enqueue(&self, op: NewQueueOperation) -> Result<()> {
        let queued = self.engine.queue().append(op).await?;
        debug!(
            "[OfflineSync] Queued {} {} ({})",
            queued.entity_family.as_str(),
            queued.kind.as_str(),
            queued.id
        );
        Ok(())
    }

    async fn write_direct(
        &self,
        outcome: Result<Value>,
        deferred: NewQueueOperation,
    ) -> Result<DirectWrite> {
        match outcome {
            Ok(remote) => Ok(DirectWrite::Confirmed(remote)),
            Err(err) if err.is_transient() => {
                warn!(
                    "[OfflineSync] Direct {} {} failed, deferring: {}",
                    T::FAMILY.as_str(),
                    deferred.kind.as_str(),
                    err
                );
                self.enqueue(deferred).await?;
                Ok(DirectWrite::Deferred)
            }
            Err(err) => Err(err),
        }
    }

    async fn hydrate_from_snapshot(&self) {
        if let Err(err) = self.cache.hydrate().await {
            warn!(
                "[OfflineSync] Failed to hydrate {}: {}",
                self.cache.key(),
                err
            );
        }
    }
}
