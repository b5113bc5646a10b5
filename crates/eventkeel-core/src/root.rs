//! The concrete aggregate root: identity, version, pending changes and a
//! reason-to-handler registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::aggregate::{Aggregate, ChangeRecorder};
use crate::change::{AggregateRef, Change, ChangeBuilder, Payload};
use crate::clock::{Clock, SharedClock, system_clock};
use crate::error::{DomainError, InvalidChange};
use crate::identity::{ChangeId, Identity, Version};

type Handler<Id, S> = Arc<dyn Fn(&mut S, &Change<Id>) -> Result<(), DomainError> + Send + Sync>;

/// Event-sourced aggregate root.
///
/// `S` is the domain state that registered handlers mutate as changes are
/// applied. An `AggregateRoot` is meant to be owned by a single unit of work;
/// it is not designed for concurrent mutation.
#[derive(Clone)]
pub struct AggregateRoot<Id, S = ()> {
    id: Id,
    name: String,
    version: Version,
    pending: Vec<Change<Id>>,
    unsaved: Vec<Change<Id>>,
    handlers: HashMap<String, Vec<Handler<Id, S>>>,
    state: S,
    clock: SharedClock,
}

impl<Id: Identity, S: Default> AggregateRoot<Id, S> {
    /// Creates a new aggregate at version 0 with default state.
    #[must_use]
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self::with_state(id, name, S::default())
    }
}

impl<Id: Identity, S> AggregateRoot<Id, S> {
    /// Creates a new aggregate at version 0 with the given initial state.
    #[must_use]
    pub fn with_state(id: Id, name: impl Into<String>, state: S) -> Self {
        Self {
            id,
            name: name.into(),
            version: 0,
            pending: Vec::new(),
            unsaved: Vec::new(),
            handlers: HashMap::new(),
            state,
            clock: system_clock(),
        }
    }

    /// Replaces the clock used to stamp raised changes.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the domain state.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Consumes the aggregate and returns its domain state.
    #[must_use]
    pub fn into_state(self) -> S {
        self.state
    }

    /// Returns `true` if at least one handler is registered for `reason`.
    #[must_use]
    pub fn handles(&self, reason: &str) -> bool {
        self.handlers.get(reason).is_some_and(|h| !h.is_empty())
    }

    /// Registers a handler to run whenever a change with `reason` is applied,
    /// whether raised or replayed. Handlers for the same reason run in
    /// registration order.
    pub fn when<F>(&mut self, reason: impl Into<String>, handler: F)
    where
        F: Fn(&mut S, &Change<Id>) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.handlers
            .entry(reason.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Registers a handler that receives the payload narrowed to `P`.
    ///
    /// Applying a change for `reason` whose payload is not a `P` fails with
    /// `DomainError::PayloadType`.
    pub fn when_payload<P, F>(&mut self, reason: impl Into<String>, handler: F)
    where
        P: Any,
        F: Fn(&mut S, &P) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.when(reason, move |state, change| {
            let payload = change.try_payload::<P>()?;
            handler(state, payload)
        });
    }

    /// Raises a new change carrying `payload`.
    ///
    /// The change is stamped with this aggregate's reference at
    /// [`Aggregate::next_version`], applied immediately so the state reflects
    /// it before commit, and then queued as pending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidChange` if `id`, `reason` or the
    /// aggregate's own identity is empty, or the first handler error. Nothing is queued on error, though handlers
    /// that ran before a failing one may have mutated the state.
    pub fn raise_change<P: Any + Send + Sync>(
        &mut self,
        id: impl Into<ChangeId>,
        reason: impl Into<String>,
        payload: P,
    ) -> Result<(), DomainError>
    where
        S: Send + Sync,
    {
        self.raise(Change::builder(id, reason).payload(payload))
    }

    /// Raises a change from an already erased payload, as delivered by a
    /// transport.
    ///
    /// # Errors
    ///
    /// As [`AggregateRoot::raise_change`], plus
    /// `InvalidChange::MissingPayload` when `payload` is `None`.
    pub fn raise_erased_change(
        &mut self,
        id: impl Into<ChangeId>,
        reason: impl Into<String>,
        payload: Option<Payload>,
    ) -> Result<(), DomainError>
    where
        S: Send + Sync,
    {
        let builder = Change::builder(id, reason);
        let builder = match payload {
            Some(payload) => builder.erased_payload(payload),
            None => builder,
        };
        self.raise(builder)
    }

    fn raise(&mut self, builder: ChangeBuilder<Id>) -> Result<(), DomainError>
    where
        S: Send + Sync,
    {
        if self.id.is_empty_identity() {
            return Err(InvalidChange::EmptyAggregateId.into());
        }
        let reference = AggregateRef::new(self.id.clone(), self.name.clone(), self.next_version());
        let change = builder
            .occurred_at(self.clock.now())
            .aggregate(reference)
            .build()?;

        self.apply_change(&change)?;
        self.pending.push(change);
        Ok(())
    }
}

impl<Id: Identity, S: Send + Sync> Aggregate for AggregateRoot<Id, S> {
    type Id = Id;

    fn aggregate_id(&self) -> &Id {
        &self.id
    }

    fn aggregate_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Version {
        self.version
    }

    fn pending_changes(&self) -> &[Change<Id>] {
        &self.pending
    }

    fn apply_change(&mut self, change: &Change<Id>) -> Result<(), DomainError> {
        let Some(handlers) = self.handlers.get(change.reason()) else {
            return Ok(());
        };
        for handler in handlers {
            handler(&mut self.state, change)?;
        }
        Ok(())
    }
}

impl<Id: Identity, S: Send + Sync> ChangeRecorder for AggregateRoot<Id, S> {
    fn record_changes(&mut self, changes: &[Change<Id>]) {
        self.pending.extend_from_slice(changes);
    }

    fn commit_changes(&mut self) {
        let Some(last) = self.pending.last() else {
            return;
        };
        if let Some(version) = last.version().filter(|v| *v > self.version) {
            self.version = version;
        }
        self.unsaved.append(&mut self.pending);
    }

    fn clear_changes(&mut self) {
        self.pending.clear();
    }

    fn unsaved_changes(&self) -> &[Change<Id>] {
        &self.unsaved
    }

    fn mark_persisted(&mut self, versions: RangeInclusive<Version>) {
        self.unsaved
            .retain(|c| c.version().is_none_or(|v| !versions.contains(&v)));
    }
}

impl<Id: fmt::Debug, S: fmt::Debug> fmt::Debug for AggregateRoot<Id, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reasons: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        reasons.sort_unstable();
        f.debug_struct("AggregateRoot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("pending", &self.pending)
            .field("unsaved", &self.unsaved)
            .field("handled_reasons", &reasons)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
