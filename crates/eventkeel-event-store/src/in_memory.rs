//! In-memory implementation of the `AggregateRepository` trait.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use eventkeel_core::aggregate::{Aggregate, ChangeRecorder};
use eventkeel_core::change::Change;
use eventkeel_core::error::DomainError;
use eventkeel_core::history::hydrate;
use eventkeel_core::identity::{Identity, Version};
use eventkeel_core::repository::{AggregateRepository, SearchCriteria};
use eventkeel_core::root::AggregateRoot;

use crate::config::{ConcurrencyMode, StoreConfig};
use crate::filters::{at_or_before, belongs_to, matches_criteria};

type Factory<Id, S> = Arc<dyn Fn(&Id, &str) -> AggregateRoot<Id, S> + Send + Sync>;

/// Stored history of a single aggregate identity.
#[derive(Debug)]
struct EventStoreRecord<Id> {
    name: String,
    committed_version: Version,
    changes: Vec<Change<Id>>,
}

#[derive(Debug)]
struct Inner<Id> {
    index: HashMap<Id, EventStoreRecord<Id>>,
    log: Vec<Change<Id>>,
}

/// Append-only event store held in process memory.
///
/// Reads share a single reader/writer lock; `save` and `delete` take it
/// exclusively. Histories are copied out of the lock before replay, so
/// handlers never run while the store is locked.
pub struct InMemoryEventStore<Id, S = ()> {
    inner: RwLock<Inner<Id>>,
    config: StoreConfig,
    factory: Factory<Id, S>,
}

impl<Id: Identity, S: Default + 'static> InMemoryEventStore<Id, S> {
    /// Creates an empty store with the default configuration. Aggregates
    /// rebuilt by `search` are plain `AggregateRoot::new` instances.
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(|id: &Id, name: &str| AggregateRoot::new(id.clone(), name))
    }
}

impl<Id: Identity, S: Default + 'static> Default for InMemoryEventStore<Id, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Identity, S> InMemoryEventStore<Id, S> {
    /// Creates an empty store whose `search` builds fresh aggregates through
    /// `factory`, so that they carry their handlers before replay.
    #[must_use]
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&Id, &str) -> AggregateRoot<Id, S> + Send + Sync + 'static,
    {
        Self {
            inner: RwLock::new(Inner {
                index: HashMap::new(),
                log: Vec::new(),
            }),
            config: StoreConfig::default(),
            factory: Arc::new(factory),
        }
    }

    /// Returns a copy of the store using `config`.
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Number of changes in the global log.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn total_changes(&self) -> Result<usize, DomainError> {
        Ok(self.read()?.log.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner<Id>>, DomainError> {
        self.inner
            .read()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner<Id>>, DomainError> {
        self.inner
            .write()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".to_owned()))
    }

    /// Copies the committed history of `id`, filtered by `keep`.
    fn history(
        &self,
        id: &Id,
        min_version: Version,
        keep: impl Fn(&Change<Id>) -> bool,
    ) -> Result<Vec<Change<Id>>, DomainError> {
        let inner = self.read()?;
        let record = inner
            .index
            .get(id)
            .ok_or_else(|| DomainError::AggregateNotFound(id.to_string()))?;

        if record.committed_version < min_version {
            return Err(DomainError::VersionNotFound {
                aggregate_id: id.to_string(),
                requested: min_version,
                committed: record.committed_version,
            });
        }

        let changes: Vec<_> = record.changes.iter().filter(|&c| keep(c)).cloned().collect();
        debug!(
            aggregate_name = %record.name,
            committed_version = record.committed_version,
            copied = changes.len(),
            "copied stored history"
        );
        Ok(changes)
    }
}

#[async_trait]
impl<Id: Identity, S: Send + Sync + 'static> AggregateRepository<Id, S>
    for InMemoryEventStore<Id, S>
{
    #[instrument(skip_all, fields(aggregate_id = %aggregate.aggregate_id()))]
    async fn save(&self, aggregate: &mut AggregateRoot<Id, S>) -> Result<(), DomainError> {
        let mut guard = self.write()?;
        let inner = &mut *guard;
        let id = aggregate.aggregate_id().clone();

        let expected = aggregate.persisted_version();
        let actual = inner.index.get(&id).map_or(0, |r| r.committed_version);
        if self.config.concurrency == ConcurrencyMode::Optimistic && expected != actual {
            warn!(expected, actual, "rejecting save of stale aggregate");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: id.to_string(),
                expected,
                actual,
            });
        }

        aggregate.commit_changes();
        let changes = aggregate.unsaved_changes().to_vec();
        aggregate.mark_persisted(0..=aggregate.version());

        let record = inner
            .index
            .entry(id)
            .or_insert_with(|| EventStoreRecord {
                name: aggregate.aggregate_name().to_owned(),
                committed_version: 0,
                changes: Vec::new(),
            });
        if let Some(last) = changes.last().and_then(Change::version) {
            record.committed_version = record.committed_version.max(last);
        }
        record.changes.extend(changes.iter().cloned());
        inner.log.extend(changes.iter().cloned());

        debug!(
            appended = changes.len(),
            committed_version = record.committed_version,
            "saved aggregate"
        );
        Ok(())
    }

    async fn exists(&self, aggregate: &AggregateRoot<Id, S>) -> Result<bool, DomainError> {
        Ok(self.read()?.index.contains_key(aggregate.aggregate_id()))
    }

    async fn exists_version(
        &self,
        aggregate: &AggregateRoot<Id, S>,
        version: Version,
    ) -> Result<bool, DomainError> {
        Ok(self
            .read()?
            .index
            .get(aggregate.aggregate_id())
            .is_some_and(|r| r.committed_version >= version))
    }

    #[instrument(skip_all, fields(aggregate_id = %aggregate.aggregate_id()))]
    async fn load(&self, aggregate: &mut AggregateRoot<Id, S>) -> Result<(), DomainError> {
        let changes = self.history(aggregate.aggregate_id(), 0, |_| true)?;
        hydrate(aggregate, &changes)?;
        debug!(version = aggregate.version(), "loaded aggregate");
        Ok(())
    }

    #[instrument(skip(self, aggregate), fields(aggregate_id = %aggregate.aggregate_id()))]
    async fn load_version(
        &self,
        aggregate: &mut AggregateRoot<Id, S>,
        version: Version,
    ) -> Result<(), DomainError> {
        let changes = self.history(aggregate.aggregate_id(), version, |c| {
            at_or_before(version, c)
        })?;
        hydrate(aggregate, &changes)?;
        debug!(replayed = changes.len(), "loaded aggregate as of version");
        Ok(())
    }

    #[instrument(skip_all, fields(aggregate_id = %aggregate.aggregate_id()))]
    async fn delete(&self, aggregate: &AggregateRoot<Id, S>) -> Result<(), DomainError> {
        let mut guard = self.write()?;
        let inner = &mut *guard;
        let id = aggregate.aggregate_id();

        if inner.index.remove(id).is_none() {
            debug!("delete of unknown aggregate ignored");
            return Ok(());
        }
        inner.log.retain(|c| !belongs_to(id, c));

        debug!("deleted aggregate");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn search(
        &self,
        criteria: &SearchCriteria<Id>,
    ) -> Result<Vec<AggregateRoot<Id, S>>, DomainError> {
        let matching: Vec<Change<Id>> = self
            .read()?
            .log
            .iter()
            .filter(|c| matches_criteria(criteria, c))
            .cloned()
            .collect();

        let mut order: Vec<Id> = Vec::new();
        let mut groups: HashMap<Id, Vec<Change<Id>>> = HashMap::new();
        for change in matching {
            let Some(reference) = change.aggregate() else {
                continue;
            };
            let id = reference.id.clone();
            if !groups.contains_key(&id) {
                order.push(id.clone());
            }
            groups.entry(id).or_default().push(change);
        }

        let mut aggregates = Vec::with_capacity(order.len());
        for id in order {
            let group = groups.remove(&id).unwrap_or_default();
            let Some(name) = group.first().and_then(Change::aggregate).map(|r| r.name.clone())
            else {
                continue;
            };
            let mut aggregate = (self.factory)(&id, &name);
            hydrate(&mut aggregate, &group)?;
            aggregates.push(aggregate);
        }

        debug!(found = aggregates.len(), "search complete");
        Ok(aggregates)
    }
}

impl<Id: fmt::Debug, S> fmt::Debug for InMemoryEventStore<Id, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
