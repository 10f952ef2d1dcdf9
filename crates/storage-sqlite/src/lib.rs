//! SQLite-backed durable store for the ledgerline offline queue and caches.

pub mod db;
pub mod errors;
pub mod kv;
pub mod schema;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use kv::SqliteDurableStore;
