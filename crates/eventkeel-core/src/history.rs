//! History integrity validation and replay.
//!
//! A candidate history is checked as a whole before any handler runs: the
//! first offending change aborts the batch and nothing is applied.

use chrono::{DateTime, Utc};

use crate::aggregate::{Aggregate, ChangeRecorder};
use crate::change::Change;
use crate::error::{DomainError, IntegrityViolation};
use crate::identity::Version;

/// Verifies that `changes` continue `aggregate`'s history: every change must
/// reference the aggregate by id and name and carry consecutive versions
/// starting right after [`Aggregate::uncommitted_version`].
///
/// # Errors
///
/// Returns the first `IntegrityViolation` found.
pub fn verify_history_integrity<A: Aggregate + ?Sized>(
    aggregate: &A,
    changes: &[Change<A::Id>],
) -> Result<(), IntegrityViolation> {
    check(aggregate, changes, false)
}

/// Like [`verify_history_integrity`], but additionally requires every change
/// to carry a payload and a non-zero timestamp. This is the check run before
/// a history is applied.
///
/// # Errors
///
/// Returns the first `IntegrityViolation` found.
pub fn validate_changes<A: Aggregate + ?Sized>(
    aggregate: &A,
    changes: &[Change<A::Id>],
) -> Result<(), IntegrityViolation> {
    check(aggregate, changes, true)
}

fn check<A: Aggregate + ?Sized>(
    aggregate: &A,
    changes: &[Change<A::Id>],
    full: bool,
) -> Result<(), IntegrityViolation> {
    let base = aggregate.uncommitted_version();

    for (index, change) in changes.iter().enumerate() {
        let Some(reference) = change.aggregate() else {
            return Err(IntegrityViolation::MissingAggregateRef { index });
        };

        if &reference.id != aggregate.aggregate_id() {
            return Err(IntegrityViolation::AggregateIdMismatch {
                index,
                expected: aggregate.aggregate_id().to_string(),
                actual: reference.id.to_string(),
            });
        }

        if reference.name != aggregate.aggregate_name() {
            return Err(IntegrityViolation::AggregateNameMismatch {
                index,
                expected: aggregate.aggregate_name().to_owned(),
                actual: reference.name.clone(),
            });
        }

        let expected = base + index as Version + 1;
        if reference.version != expected {
            return Err(IntegrityViolation::UnexpectedVersion {
                index,
                expected,
                actual: reference.version,
            });
        }

        if full {
            if change.payload().is_none() {
                return Err(IntegrityViolation::MissingPayload { index });
            }
            if change.occurred_at() == DateTime::<Utc>::default() {
                return Err(IntegrityViolation::MissingTimestamp { index });
            }
        }
    }

    Ok(())
}

/// Restores `aggregate` from a stored history: validates the whole batch,
/// applies every change in order, records them and commits, so the resulting
/// version is the last change's version and nothing is left pending.
///
/// Only the replayed changes are marked as persisted. Changes the aggregate
/// raised or committed beforehand stay in its unsaved buffer for the next
/// save.
///
/// An empty history is accepted and leaves the aggregate untouched.
///
/// # Errors
///
/// Returns `DomainError::Integrity` before any handler runs if the history is
/// malformed, or the first handler error. After a handler error the aggregate
/// may be partially applied and should be discarded.
pub fn hydrate<A: ChangeRecorder + ?Sized>(
    aggregate: &mut A,
    changes: &[Change<A::Id>],
) -> Result<(), DomainError> {
    let first = aggregate.next_version();
    apply_all(aggregate, changes)?;
    if changes.is_empty() {
        return Ok(());
    }
    let last = first + changes.len() as Version - 1;
    aggregate.record_changes(changes);
    aggregate.commit_changes();
    aggregate.mark_persisted(first..=last);
    Ok(())
}

/// Validates and applies a history without recording or committing it, for
/// aggregates that track their version some other way.
///
/// # Errors
///
/// Same as [`hydrate`].
pub fn replay<A: Aggregate + ?Sized>(
    aggregate: &mut A,
    changes: &[Change<A::Id>],
) -> Result<(), DomainError> {
    apply_all(aggregate, changes)
}

fn apply_all<A: Aggregate + ?Sized>(
    aggregate: &mut A,
    changes: &[Change<A::Id>],
) -> Result<(), DomainError> {
    if let Err(violation) = validate_changes(&*aggregate, changes) {
        tracing::warn!(
            aggregate_id = %aggregate.aggregate_id(),
            %violation,
            "rejecting change history"
        );
        return Err(violation.into());
    }

    for change in changes {
        aggregate.apply_change(change)?;
    }
    Ok(())
}
