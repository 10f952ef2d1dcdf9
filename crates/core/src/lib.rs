//! Offline-first data layer of the ledgerline finance tracker.

pub mod catalog;
pub mod config;
pub mod context;
pub mod errors;
pub mod sync;
pub mod transactions;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::SyncConfig;
pub use context::ServiceContext;
pub use errors::{Error, Result};
