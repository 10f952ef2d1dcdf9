mod model;
mod repository;

pub use model::KvEntryDB;
pub use repository::SqliteDurableStore;
