//! Aggregate repository abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::identity::{Identity, Version};
use crate::root::AggregateRoot;

/// Optional filters for [`AggregateRepository::search`].
///
/// Filters apply to individual committed changes and are combined with
/// logical AND; an empty list means "no filtering" on that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchCriteria<Id> {
    /// Keep changes belonging to one of these aggregates.
    pub ids: Vec<Id>,
    /// Keep changes whose aggregate name is one of these.
    pub names: Vec<String>,
    /// Keep changes stamped with one of these versions.
    pub versions: Vec<Version>,
}

impl<Id> Default for SearchCriteria<Id> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            names: Vec::new(),
            versions: Vec::new(),
        }
    }
}

impl<Id> SearchCriteria<Id> {
    /// Criteria that match every change.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the search to the given aggregate ids.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.ids = ids.into_iter().collect();
        self
    }

    /// Restricts the search to the given aggregate names.
    #[must_use]
    pub fn with_names<N: Into<String>>(mut self, names: impl IntoIterator<Item = N>) -> Self {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the search to changes at the given versions.
    #[must_use]
    pub fn with_versions(mut self, versions: impl IntoIterator<Item = Version>) -> Self {
        self.versions = versions.into_iter().collect();
        self
    }

    /// Returns `true` if no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty() && self.versions.is_empty()
    }
}

/// Repository trait for persisting and restoring event-sourced aggregates.
///
/// Loading methods take a freshly constructed aggregate (with its handlers
/// registered) and hydrate it from the stored history.
#[async_trait]
pub trait AggregateRepository<Id: Identity, S: Send + Sync>: Send + Sync {
    /// Persists the aggregate's pending changes and commits them on the
    /// aggregate.
    async fn save(&self, aggregate: &mut AggregateRoot<Id, S>) -> Result<(), DomainError>;

    /// Returns `true` if the store holds a record for the aggregate's id.
    async fn exists(&self, aggregate: &AggregateRoot<Id, S>) -> Result<bool, DomainError>;

    /// Returns `true` if the store holds a record for the aggregate's id
    /// whose committed version is at least `version`.
    async fn exists_version(
        &self,
        aggregate: &AggregateRoot<Id, S>,
        version: Version,
    ) -> Result<bool, DomainError>;

    /// Hydrates the aggregate with its full committed history.
    async fn load(&self, aggregate: &mut AggregateRoot<Id, S>) -> Result<(), DomainError>;

    /// Hydrates the aggregate with the changes up to and including `version`.
    async fn load_version(
        &self,
        aggregate: &mut AggregateRoot<Id, S>,
        version: Version,
    ) -> Result<(), DomainError>;

    /// Removes the aggregate's record and its changes.
    async fn delete(&self, aggregate: &AggregateRoot<Id, S>) -> Result<(), DomainError>;

    /// Rebuilds one aggregate per identity from the changes matching
    /// `criteria`.
    async fn search(
        &self,
        criteria: &SearchCriteria<Id>,
    ) -> Result<Vec<AggregateRoot<Id, S>>, DomainError>;
}
