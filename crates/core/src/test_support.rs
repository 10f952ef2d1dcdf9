//! In-crate fakes for the remote and durable stores.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::errors::{Error, Result};
use crate::sync::{
    BulkRename, DurableStore, EntityFamily, OperationKind, QueueOperation, DEFAULT_RETRY_BUDGET,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RemoteCall {
    List(EntityFamily),
    Create(EntityFamily, Value),
    Update(EntityFamily, String, Value),
    Delete(EntityFamily, String),
    BulkUpdate(EntityFamily, BulkRename),
}

/// Remote store keeping records in memory.
///
/// Writes whose payload `description`/`name` or target id is registered with
/// `fail_on` are rejected, as is everything while `fail_all` is set.
#[derive(Default)]
pub(crate) struct FakeRemote {
    calls: Mutex<Vec<RemoteCall>>,
    records: Mutex<HashMap<EntityFamily, Vec<Value>>>,
    fail_markers: Mutex<HashSet<String>>,
    fail_all: Mutex<Option<fn() -> Error>>,
    next_id: AtomicU64,
    hold_creates: AtomicBool,
    pub(crate) create_entered: Notify,
    pub(crate) release_create: Notify,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, RemoteCall::List(_)))
            .collect()
    }

    pub(crate) fn fail_on(&self, marker: &str) {
        self.fail_markers.lock().unwrap().insert(marker.to_string());
    }

    pub(crate) fn stop_failing(&self, marker: &str) {
        self.fail_markers.lock().unwrap().remove(marker);
    }

    pub(crate) fn fail_all_with(&self, error: Option<fn() -> Error>) {
        *self.fail_all.lock().unwrap() = error;
    }

    pub(crate) fn hold_creates(&self, hold: bool) {
        self.hold_creates.store(hold, Ordering::SeqCst);
    }

    pub(crate) fn seed(&self, family: EntityFamily, records: Vec<Value>) {
        self.records.lock().unwrap().insert(family, records);
    }

    pub(crate) fn records(&self, family: EntityFamily) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(&family)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, payload: Option<&Value>, id: Option<&str>) -> Result<()> {
        if let Some(make_error) = *self.fail_all.lock().unwrap() {
            return Err(make_error());
        }
        let markers = self.fail_markers.lock().unwrap();
        let payload_markers = payload
            .into_iter()
            .flat_map(|p| ["description", "name"].map(|field| p.get(field)))
            .flatten()
            .filter_map(Value::as_str);
        for marker in payload_markers.chain(id) {
            if markers.contains(marker) {
                return Err(Error::remote_rejected(format!("rejected {marker}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl crate::sync::RemoteStore for FakeRemote {
    async fn list(&self, family: EntityFamily) -> Result<Vec<Value>> {
        self.record(RemoteCall::List(family));
        self.check(None, None)?;
        Ok(self.records(family))
    }

    async fn create(&self, family: EntityFamily, payload: Value) -> Result<Value> {
        self.record(RemoteCall::Create(family, payload.clone()));
        if self.hold_creates.load(Ordering::SeqCst) {
            self.create_entered.notify_one();
            self.release_create.notified().await;
        }
        self.check(Some(&payload), None)?;

        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut record = payload;
        if let Some(object) = record.as_object_mut() {
            object.insert("id".to_string(), Value::String(id));
        }
        self.records
            .lock()
            .unwrap()
            .entry(family)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(&self, family: EntityFamily, id: &str, payload: Value) -> Result<Value> {
        self.record(RemoteCall::Update(family, id.to_string(), payload.clone()));
        self.check(Some(&payload), Some(id))?;

        let mut records = self.records.lock().unwrap();
        let existing = records
            .entry(family)
            .or_default()
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            .ok_or_else(|| Error::remote_rejected(format!("{id} not found")))?;
        if let (Some(target), Some(patch)) = (existing.as_object_mut(), payload.as_object()) {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(existing.clone())
    }

    async fn delete(&self, family: EntityFamily, id: &str) -> Result<()> {
        self.record(RemoteCall::Delete(family, id.to_string()));
        self.check(None, Some(id))?;
        if let Some(records) = self.records.lock().unwrap().get_mut(&family) {
            records.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        }
        Ok(())
    }

    async fn bulk_update(&self, family: EntityFamily, rename: &BulkRename) -> Result<()> {
        self.record(RemoteCall::BulkUpdate(family, rename.clone()));
        self.check(None, None)?;
        if let Some(records) = self.records.lock().unwrap().get_mut(&family) {
            for record in records.iter_mut() {
                let current = record.get(&rename.field).and_then(Value::as_str);
                if current == Some(rename.old_value.as_str()) {
                    record[&rename.field] = Value::String(rename.new_value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Durable store whose writes always fail.
pub(crate) struct FailingStore;

#[async_trait]
impl DurableStore for FailingStore {
    async fn read(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn write(&self, key: &str, _value: String) -> Result<()> {
        Err(Error::storage(format!("disk full while writing {key}")))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::storage("disk full"))
    }
}

/// Transaction create with an explicit timestamp and retry count.
pub(crate) fn raw_op(id: &str, enqueued_at: i64, retry_count: u32) -> QueueOperation {
    QueueOperation {
        id: id.to_string(),
        kind: OperationKind::Create,
        entity_family: EntityFamily::Transaction,
        entity_id: Some(format!("tx-{id}")),
        local_id: None,
        payload: serde_json::json!({ "description": id }),
        enqueued_at,
        retry_count,
        retry_budget: DEFAULT_RETRY_BUDGET,
        last_error: None,
    }
}
