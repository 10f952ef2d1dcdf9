//! Durable key/value contract used by the queue and the snapshot caches.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{Error, Result};

/// Whole-value key/value persistence.
///
/// Every write replaces the value stored under `key` atomically; readers never
/// observe a partially written value.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn write(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, handy for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("Memory store lock is poisoned"))
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn write(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_replaces_whole_value() {
        let store = MemoryStore::new();
        assert_eq!(store.read("k").await.unwrap(), None);

        store.write("k", "[1,2]".to_string()).await.unwrap();
        store.write("k", "[3]".to_string()).await.unwrap();
        assert_eq!(store.read("k").await.unwrap().as_deref(), Some("[3]"));

        store.remove("k").await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), None);
    }
}
