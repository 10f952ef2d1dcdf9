use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use ledgerline_core::sync::DurableStore;
use ledgerline_core::Result;
use log::debug;

use super::model::KvEntryDB;
use crate::db::{create_pool, get_connection, init, run_migrations, spawn_writer};
use crate::db::{DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::kv_store;

/// `DurableStore` over the `kv_store` table. Every write replaces the whole
/// value under its key in a single statement.
pub struct SqliteDurableStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteDurableStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Opens (creating and migrating if needed) the database in `app_data_dir`.
    pub fn open(app_data_dir: &str) -> Result<Self> {
        let db_path = init(app_data_dir)?;
        run_migrations(&db_path)?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        debug!("[Storage] Opened durable store at {}", db_path);
        Ok(Self::new(pool, writer))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let keys = kv_store::table
            .select(kv_store::key)
            .order(kv_store::key.asc())
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(keys)
    }
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = kv_store::table
            .find(key)
            .select(kv_store::value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: String) -> Result<()> {
        let row = KvEntryDB {
            key: key.to_string(),
            value,
            updated_at: Utc::now().to_rfc3339(),
        };
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(kv_store::table)
                    .values(&row)
                    .on_conflict(kv_store::key)
                    .do_update()
                    .set((
                        kv_store::value.eq(&row.value),
                        kv_store::updated_at.eq(&row.updated_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(kv_store::table.find(key))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
