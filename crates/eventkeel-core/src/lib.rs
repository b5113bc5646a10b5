//! Eventkeel Core — event-sourced aggregate primitives.
//!
//! This crate defines the aggregate root, the change (domain event) record,
//! history validation and replay, and the repository contract. It contains no
//! storage code; see `eventkeel-event-store` for the in-memory store.

pub mod aggregate;
pub mod change;
pub mod clock;
pub mod error;
pub mod history;
pub mod identity;
pub mod repository;
pub mod root;

pub use aggregate::{Aggregate, ChangeRecorder};
pub use change::{AggregateRef, Change, ChangeBuilder, ChangeParts, Payload};
pub use error::{DomainError, IntegrityViolation, InvalidChange};
pub use identity::{ChangeId, Identity, Version};
pub use repository::{AggregateRepository, SearchCriteria};
pub use root::AggregateRoot;
