//! Aggregate and change identifiers.

use std::fmt::{self, Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of an aggregate in its change history. Zero means "no committed
/// changes"; the first change carries version 1.
pub type Version = u64;

/// Trait for types usable as aggregate identities.
pub trait Identity: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Returns `true` for the type's "unset" value.
    fn is_empty_identity(&self) -> bool;
}

impl Identity for String {
    fn is_empty_identity(&self) -> bool {
        self.is_empty()
    }
}

impl Identity for Uuid {
    fn is_empty_identity(&self) -> bool {
        self.is_nil()
    }
}

/// Unique identifier of a single change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Creates a change id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered change id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChangeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Uuid> for ChangeId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}
