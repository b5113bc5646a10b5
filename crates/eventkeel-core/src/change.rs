//! The change record: an immutable domain event stamped with the aggregate
//! reference and version it belongs to.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, InvalidChange};
use crate::identity::{ChangeId, Version};

/// Denormalized stamp tying a change to its aggregate and history position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRef<Id> {
    /// Aggregate identity.
    pub id: Id,
    /// Aggregate name (its type, in DDD terms).
    pub name: String,
    /// Version this change produces when committed.
    pub version: Version,
}

impl<Id> AggregateRef<Id> {
    /// Creates a new aggregate reference.
    #[must_use]
    pub fn new(id: Id, name: impl Into<String>, version: Version) -> Self {
        Self {
            id,
            name: name.into(),
            version,
        }
    }
}

/// Type-erased change payload.
///
/// Cloning is cheap: the value is shared. Narrow it back with
/// [`Payload::downcast_ref`] or the helpers on [`Change`].
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Erases `value` into a payload.
    pub fn new<P: Any + Send + Sync>(value: P) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<P>(),
        }
    }

    /// Returns the payload as `P` if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<P: Any>(&self) -> Option<&P> {
        (*self.value).downcast_ref::<P>()
    }

    /// Returns `true` if the payload holds a `P`.
    #[must_use]
    pub fn is<P: Any>(&self) -> bool {
        (*self.value).is::<P>()
    }

    /// Rust type name of the erased value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A domain event that changed (or will change) an aggregate's state.
///
/// Changes are immutable once built. Use [`Change::builder`] for new changes
/// and [`Change::from_parts`] to rebuild one received from elsewhere.
#[derive(Debug, Clone)]
pub struct Change<Id> {
    id: ChangeId,
    reason: String,
    payload: Option<Payload>,
    occurred_at: DateTime<Utc>,
    aggregate: Option<AggregateRef<Id>>,
}

/// Raw fields of a [`Change`], for transports and storage adapters.
///
/// No invariant is checked when turning parts into a change; the history
/// validator is responsible for rejecting malformed entries.
#[derive(Debug, Clone)]
pub struct ChangeParts<Id> {
    /// Unique change identifier.
    pub id: ChangeId,
    /// Why the change happened; selects the handlers to run.
    pub reason: String,
    /// The erased payload, if any.
    pub payload: Option<Payload>,
    /// When the change was raised.
    pub occurred_at: DateTime<Utc>,
    /// The aggregate this change belongs to, if any.
    pub aggregate: Option<AggregateRef<Id>>,
}

impl<Id> Change<Id> {
    /// Starts building a change with the given id and reason.
    pub fn builder(id: impl Into<ChangeId>, reason: impl Into<String>) -> ChangeBuilder<Id> {
        ChangeBuilder {
            id: id.into(),
            reason: reason.into(),
            payload: None,
            occurred_at: None,
            aggregate: None,
        }
    }

    /// Rebuilds a change from its raw parts without validation.
    #[must_use]
    pub fn from_parts(parts: ChangeParts<Id>) -> Self {
        Self {
            id: parts.id,
            reason: parts.reason,
            payload: parts.payload,
            occurred_at: parts.occurred_at,
            aggregate: parts.aggregate,
        }
    }

    /// Splits the change into its raw parts.
    #[must_use]
    pub fn into_parts(self) -> ChangeParts<Id> {
        ChangeParts {
            id: self.id,
            reason: self.reason,
            payload: self.payload,
            occurred_at: self.occurred_at,
            aggregate: self.aggregate,
        }
    }

    /// Returns the change identifier.
    #[must_use]
    pub fn id(&self) -> &ChangeId {
        &self.id
    }

    /// Returns the change reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the erased payload.
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Returns when the change was raised.
    #[must_use]
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Returns the aggregate reference, if the change carries one.
    #[must_use]
    pub fn aggregate(&self) -> Option<&AggregateRef<Id>> {
        self.aggregate.as_ref()
    }

    /// Returns the aggregate version stamped on this change.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.aggregate.as_ref().map(|r| r.version)
    }

    /// Narrows the payload to `P`, returning `None` on a type mismatch or a
    /// missing payload.
    #[must_use]
    pub fn payload_as<P: Any>(&self) -> Option<&P> {
        self.payload.as_ref()?.downcast_ref::<P>()
    }

    /// Narrows the payload to `P`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PayloadType` if the payload is missing or holds
    /// a different type.
    pub fn try_payload<P: Any>(&self) -> Result<&P, DomainError> {
        let actual = self.payload.as_ref().map_or("<none>", Payload::type_name);
        self.payload_as::<P>().ok_or(DomainError::PayloadType {
            expected: type_name::<P>(),
            actual,
        })
    }
}

/// Builder for [`Change`].
#[derive(Debug)]
#[must_use]
pub struct ChangeBuilder<Id> {
    id: ChangeId,
    reason: String,
    payload: Option<Payload>,
    occurred_at: Option<DateTime<Utc>>,
    aggregate: Option<AggregateRef<Id>>,
}

impl<Id> ChangeBuilder<Id> {
    /// Sets a typed payload.
    pub fn payload<P: Any + Send + Sync>(mut self, payload: P) -> Self {
        self.payload = Some(Payload::new(payload));
        self
    }

    /// Sets an already erased payload.
    pub fn erased_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the time the change occurred. Defaults to now.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Stamps the change with an aggregate reference.
    pub fn aggregate(mut self, aggregate: AggregateRef<Id>) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    /// Builds the change.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidChange` if the id or reason is empty or
    /// no payload was set.
    pub fn build(self) -> Result<Change<Id>, DomainError> {
        if self.id.is_empty() {
            return Err(InvalidChange::EmptyId.into());
        }
        if self.reason.is_empty() {
            return Err(InvalidChange::EmptyReason.into());
        }
        if self.payload.is_none() {
            return Err(InvalidChange::MissingPayload.into());
        }

        Ok(Change {
            id: self.id,
            reason: self.reason,
            payload: self.payload,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            aggregate: self.aggregate,
        })
    }
}
