//! Whole-collection snapshot cache backing offline reads and optimistic writes.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{Error, Result, ValidationError};

use super::durable_store::DurableStore;
use super::queue_model::EntityFamily;

/// A record mirrored by an [`OptimisticCache`].
pub trait CacheRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const FAMILY: EntityFamily;

    fn id(&self) -> &str;
}

/// Last-known collection of one entity family.
///
/// In-memory mutations are synchronous so callers see optimistic state
/// immediately; `persist` writes the whole collection under the family's
/// cache key.
pub struct OptimisticCache<T: CacheRecord> {
    store: Arc<dyn DurableStore>,
    items: RwLock<Vec<T>>,
}

impl<T: CacheRecord> OptimisticCache<T> {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            items: RwLock::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &'static str {
        T::FAMILY.cache_key()
    }

    pub fn items(&self) -> Vec<T> {
        self.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.read().iter().find(|item| item.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Loads the persisted snapshot verbatim. Returns the number of records.
    pub async fn hydrate(&self) -> Result<usize> {
        let Some(raw) = self.store.read(self.key()).await? else {
            return Ok(0);
        };
        let items: Vec<T> = serde_json::from_str(&raw)?;
        let count = items.len();
        *self.write() = items;
        debug!("[OfflineSync] Hydrated {} from snapshot ({count} records)", self.key());
        Ok(count)
    }

    /// Replaces the whole collection and persists it.
    pub async fn replace_all(&self, items: Vec<T>) {
        *self.write() = items;
        self.persist().await;
    }

    /// Inserts or replaces by id.
    pub fn upsert(&self, item: T) {
        let mut items = self.write();
        match items.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }

    /// Swaps the record stored under `old_id` for `item`, keeping its position.
    pub fn replace(&self, old_id: &str, item: T) {
        let mut items = self.write();
        if let Some(pos) = items.iter().position(|existing| existing.id() == old_id) {
            items[pos] = item;
            let new_id = items[pos].id().to_string();
            let mut seen = false;
            items.retain(|existing| {
                if existing.id() != new_id {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        } else {
            drop(items);
            self.upsert(item);
        }
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        let mut items = self.write();
        let pos = items.iter().position(|item| item.id() == id)?;
        Some(items.remove(pos))
    }

    /// Merges the fields of a JSON object into the cached record.
    pub fn apply_patch(&self, id: &str, patch: &Value) -> Result<T> {
        let patch = patch.as_object().ok_or_else(|| {
            Error::from(ValidationError::InvalidPayload(
                "update payload must be a JSON object".to_string(),
            ))
        })?;
        let mut items = self.write();
        let existing = items
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::FAMILY.as_str(), id)))?;

        let mut merged = serde_json::to_value(&*existing)?;
        if let Some(object) = merged.as_object_mut() {
            for (field, value) in patch {
                if field == "id" {
                    continue;
                }
                object.insert(field.clone(), value.clone());
            }
        }
        let updated: T = serde_json::from_value(merged)?;
        *existing = updated.clone();
        Ok(updated)
    }

    /// Moves the record stored under `old_id` to `new_id`, keeping its fields.
    /// Returns false when no such record is cached.
    pub fn rekey(&self, old_id: &str, new_id: &str) -> Result<bool> {
        let Some(existing) = self.get(old_id) else {
            return Ok(false);
        };
        let mut value = serde_json::to_value(&existing)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("id".to_string(), Value::String(new_id.to_string()));
        }
        let moved: T = serde_json::from_value(value)?;
        self.replace(old_id, moved);
        Ok(true)
    }

    /// Applies `f` to every record; returns how many it changed.
    pub fn update_where(&self, f: impl FnMut(&mut T) -> bool) -> usize {
        let mut items = self.write();
        items.iter_mut().map(f).filter(|changed| *changed).count()
    }

    /// Writes the snapshot; failures are logged, never surfaced.
    pub async fn persist(&self) {
        let serialized = {
            let items = self.read();
            serde_json::to_string(&*items)
        };
        let serialized = match serialized {
            Ok(value) => value,
            Err(err) => {
                warn!("[OfflineSync] Failed to serialize {}: {}", self.key(), err);
                return;
            }
        };
        if let Err(err) = self.store.write(self.key(), serialized).await {
            warn!("[OfflineSync] Failed to persist {}: {}", self.key(), err);
        }
    }

    /// Adopts a remote-confirmed record, replacing `previous_id` if given.
    pub async fn adopt_remote(&self, previous_id: Option<&str>, record: &Value) -> Result<T> {
        let item: T = serde_json::from_value(record.clone())?;
        match previous_id {
            Some(previous_id) => self.replace(previous_id, item.clone()),
            None => self.upsert(item.clone()),
        }
        self.persist().await;
        Ok(item)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
