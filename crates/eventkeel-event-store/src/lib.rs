//! Eventkeel Event Store — in-memory, append-only storage for aggregate
//! change histories.
//!
//! The store keeps one record per aggregate identity plus a global change
//! log used for cross-aggregate search. It is authoritative only for the
//! lifetime of the process.

pub mod config;
mod filters;
pub mod in_memory;

pub use config::{ConcurrencyMode, ConfigError, StoreConfig};
pub use in_memory::InMemoryEventStore;
