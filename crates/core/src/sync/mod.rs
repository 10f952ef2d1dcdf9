//! Offline-first sync: mutation queue, snapshot caches, engine and scheduler.

mod connectivity;
mod durable_store;
mod entity_facade;
mod mutation_queue;
mod optimistic_cache;
mod queue_model;
mod remote_store;
mod sync_engine;
mod sync_events;
mod sync_scheduler;

pub use connectivity::*;
pub use durable_store::*;
pub use entity_facade::*;
pub use mutation_queue::*;
pub use optimistic_cache::*;
pub use queue_model::*;
pub use remote_store::*;
pub use sync_engine::*;
pub use sync_events::*;
pub use sync_scheduler::*;

#[cfg(test)]
mod tests;
