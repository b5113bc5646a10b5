//! Predicates over stored changes.

use eventkeel_core::change::Change;
use eventkeel_core::identity::Version;
use eventkeel_core::repository::SearchCriteria;

/// Returns `true` if `change` passes every non-empty filter in `criteria`.
/// Changes without an aggregate reference never match.
pub(crate) fn matches_criteria<Id: PartialEq>(
    criteria: &SearchCriteria<Id>,
    change: &Change<Id>,
) -> bool {
    let Some(reference) = change.aggregate() else {
        return false;
    };

    (criteria.ids.is_empty() || criteria.ids.contains(&reference.id))
        && (criteria.names.is_empty() || criteria.names.contains(&reference.name))
        && (criteria.versions.is_empty() || criteria.versions.contains(&reference.version))
}

/// Returns `true` if `change` belongs to the history up to `version`.
pub(crate) fn at_or_before<Id>(version: Version, change: &Change<Id>) -> bool {
    change.version().is_some_and(|v| v <= version)
}

/// Returns `true` if `change` references the aggregate `id`.
pub(crate) fn belongs_to<Id: PartialEq>(id: &Id, change: &Change<Id>) -> bool {
    change.aggregate().is_some_and(|r| &r.id == id)
}
