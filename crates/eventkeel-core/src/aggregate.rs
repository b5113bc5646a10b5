//! Aggregate root abstraction and version arithmetic.

use std::ops::RangeInclusive;

use crate::change::Change;
use crate::error::DomainError;
use crate::identity::{Identity, Version};

/// Trait for aggregates that reconstitute from a change history.
pub trait Aggregate: Send + Sync {
    /// The identity type of this aggregate.
    type Id: Identity;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> &Self::Id;

    /// Returns the aggregate name.
    fn aggregate_name(&self) -> &str;

    /// Returns the committed version.
    fn version(&self) -> Version;

    /// Returns changes raised or recorded since the last commit.
    fn pending_changes(&self) -> &[Change<Self::Id>];

    /// Dispatches a change to the handlers registered for its reason.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a handler.
    fn apply_change(&mut self, change: &Change<Self::Id>) -> Result<(), DomainError>;

    /// Version of the last pending change, or the committed version when
    /// nothing is pending.
    fn uncommitted_version(&self) -> Version {
        self.pending_changes()
            .last()
            .and_then(Change::version)
            .unwrap_or_else(|| self.version())
    }

    /// Version the next raised change must carry.
    fn next_version(&self) -> Version {
        self.uncommitted_version() + 1
    }
}

/// Aggregates that track pending changes and commit them into their version.
///
/// Committed changes stay in an unsaved buffer until a repository persists
/// them (or a replay marks them as already stored), so a caller may commit
/// before saving without losing history.
pub trait ChangeRecorder: Aggregate {
    /// Appends changes to the pending list without applying them.
    fn record_changes(&mut self, changes: &[Change<Self::Id>]);

    /// Advances the version to the last pending change and moves the pending
    /// changes to the unsaved buffer. Does nothing when no change is pending.
    fn commit_changes(&mut self);

    /// Discards pending changes without advancing the version.
    fn clear_changes(&mut self);

    /// Returns committed changes not yet persisted.
    fn unsaved_changes(&self) -> &[Change<Self::Id>];

    /// Drops unsaved changes whose version falls within `versions`, once
    /// those changes are known to be stored. Unsaved changes outside the
    /// range are kept.
    fn mark_persisted(&mut self, versions: RangeInclusive<Version>);

    /// Version of the aggregate as last persisted or replayed: the committed
    /// version minus whatever is still unsaved.
    fn persisted_version(&self) -> Version {
        self.unsaved_changes()
            .first()
            .and_then(Change::version)
            .map_or_else(|| self.version(), |v| v.saturating_sub(1))
    }
}
