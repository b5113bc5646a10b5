//! Integration tests for `InMemoryEventStore`.

use std::sync::Arc;

use eventkeel_core::aggregate::{Aggregate, ChangeRecorder};
use eventkeel_core::change::{AggregateRef, Change};
use eventkeel_core::error::{DomainError, IntegrityViolation};
use eventkeel_core::history::hydrate;
use eventkeel_core::repository::{AggregateRepository, SearchCriteria};
use eventkeel_event_store::{ConcurrencyMode, InMemoryEventStore, StoreConfig};
use eventkeel_test_support::{
    WIDGET, WidgetCreated, WidgetRenamed, WidgetState, fixed_now, init_tracing, widget,
    widget_with_id,
};

type WidgetStore = InMemoryEventStore<String, WidgetState>;

/// Store whose search results carry the widget handlers.
fn widget_store() -> WidgetStore {
    init_tracing();
    InMemoryEventStore::with_factory(|id: &String, name: &str| widget_with_id(id.clone(), name))
}

/// Saves a widget with `renames` rename changes after its creation.
async fn save_widget(store: &WidgetStore, id: &str, renames: usize) {
    let mut agg = widget(id);
    agg.raise_change(format!("{id}-created"), "created", WidgetCreated::new("draft"))
        .unwrap();
    for i in 1..=renames {
        agg.raise_change(
            format!("{id}-renamed-{i}"),
            "renamed",
            WidgetRenamed::new(format!("name-{i}")),
        )
        .unwrap();
    }
    store.save(&mut agg).await.unwrap();
}

// --- save + load round-trip ---

#[tokio::test]
async fn test_widget_lifecycle_save_then_load() {
    // Arrange
    let store = widget_store();
    let mut agg = widget("a1");
    agg.raise_change("evt-1", "created", WidgetCreated::new("draft"))
        .unwrap();
    agg.raise_change("evt-2", "renamed", WidgetRenamed::new("gizmo"))
        .unwrap();
    agg.raise_change("evt-3", "renamed", WidgetRenamed::new("gadget"))
        .unwrap();
    agg.commit_changes();
    assert_eq!(agg.version(), 3);

    // Act
    store.save(&mut agg).await.unwrap();
    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();

    // Assert
    assert_eq!(loaded.version(), 3);
    assert!(loaded.pending_changes().is_empty());
}

#[tokio::test]
async fn test_save_commits_pending_changes_on_aggregate() {
    let store = widget_store();
    let mut agg = widget("a1");
    agg.raise_change("evt-1", "created", WidgetCreated::new("draft"))
        .unwrap();
    agg.raise_change("evt-2", "renamed", WidgetRenamed::new("gizmo"))
        .unwrap();

    store.save(&mut agg).await.unwrap();

    assert_eq!(agg.version(), 2);
    assert!(agg.pending_changes().is_empty());
    assert_eq!(store.total_changes().unwrap(), 2);
}

#[tokio::test]
async fn test_load_replays_state_through_handlers() {
    let store = widget_store();
    save_widget(&store, "a1", 2).await;

    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();

    assert_eq!(loaded.version(), 3);
    assert_eq!(
        loaded.state(),
        &WidgetState {
            name: Some("name-2".to_owned()),
            renames: 2,
        }
    );
}

#[tokio::test]
async fn test_raise_after_load_continues_version_sequence() {
    let store = widget_store();
    save_widget(&store, "a1", 0).await;

    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();
    loaded
        .raise_change("evt-next", "renamed", WidgetRenamed::new("x"))
        .unwrap();

    let change = &loaded.pending_changes()[0];
    assert_eq!(change.version(), Some(2));
    assert_eq!(change.occurred_at(), fixed_now());
    assert!(loaded.unsaved_changes().is_empty());
}

#[tokio::test]
async fn test_commit_before_save_still_persists_changes() {
    let store = widget_store();
    let mut agg = widget("a1");
    agg.raise_change("evt-1", "created", WidgetCreated::new("draft"))
        .unwrap();
    agg.commit_changes();
    agg.raise_change("evt-2", "renamed", WidgetRenamed::new("gizmo"))
        .unwrap();

    store.save(&mut agg).await.unwrap();

    assert_eq!(agg.version(), 2);
    assert!(agg.unsaved_changes().is_empty());
    assert_eq!(store.total_changes().unwrap(), 2);
}

#[tokio::test]
async fn test_hydrate_after_commit_keeps_local_change_for_save() {
    // Arrange
    let store = widget_store();
    let mut agg = widget("a1");
    agg.raise_change("evt-1", "created", WidgetCreated::new("draft"))
        .unwrap();
    agg.commit_changes();
    let replayed = Change::builder("evt-2", "renamed")
        .payload(WidgetRenamed::new("gizmo"))
        .occurred_at(fixed_now())
        .aggregate(AggregateRef::new("a1".to_owned(), WIDGET, 2))
        .build()
        .unwrap();
    hydrate(&mut agg, &[replayed]).unwrap();
    assert_eq!(agg.unsaved_changes().len(), 1);

    // Act
    store.save(&mut agg).await.unwrap();

    // Assert
    assert_eq!(store.total_changes().unwrap(), 1);
    assert!(store.exists_version(&agg, 1).await.unwrap());
    assert!(!store.exists_version(&agg, 2).await.unwrap());
    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.state().name.as_deref(), Some("draft"));
}

#[tokio::test]
async fn test_rejected_rename_is_never_stored() {
    let store = widget_store();
    let mut agg = widget("a1");
    agg.raise_change("evt-1", "created", WidgetCreated::new("draft"))
        .unwrap();

    let result = agg.raise_change("evt-2", "renamed", WidgetRenamed::new("  "));
    store.save(&mut agg).await.unwrap();

    assert!(matches!(result, Err(DomainError::Validation(_))));
    assert_eq!(agg.version(), 1);
    assert_eq!(agg.state().name.as_deref(), Some("draft"));
    assert_eq!(store.total_changes().unwrap(), 1);
}

#[tokio::test]
async fn test_successive_saves_extend_the_history() {
    let store = widget_store();
    let mut agg = widget("a1");
    agg.raise_change("evt-1", "created", WidgetCreated::new("draft"))
        .unwrap();
    store.save(&mut agg).await.unwrap();
    agg.raise_change("evt-2", "renamed", WidgetRenamed::new("gizmo"))
        .unwrap();
    store.save(&mut agg).await.unwrap();

    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();

    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.state().name.as_deref(), Some("gizmo"));
}

#[tokio::test]
async fn test_load_unknown_aggregate_returns_not_found() {
    let store = widget_store();
    let mut agg = widget("missing");

    let result = store.load(&mut agg).await;

    match result {
        Err(DomainError::AggregateNotFound(id)) => assert_eq!(id, "missing"),
        other => panic!("expected AggregateNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_load_into_already_advanced_aggregate_is_rejected() {
    let store = widget_store();
    save_widget(&store, "a1", 1).await;
    let mut agg = widget("a1");
    agg.raise_change("local", "created", WidgetCreated::new("local"))
        .unwrap();

    let result = store.load(&mut agg).await;

    assert!(matches!(
        result,
        Err(DomainError::Integrity(IntegrityViolation::UnexpectedVersion {
            index: 0,
            expected: 2,
            actual: 1,
        }))
    ));
}

// --- point-in-time ---

#[tokio::test]
async fn test_load_version_replays_prefix_only() {
    // Arrange
    let store = widget_store();
    save_widget(&store, "a1", 4).await;

    // Act
    let mut agg = widget("a1");
    store.load_version(&mut agg, 3).await.unwrap();

    // Assert
    assert_eq!(agg.version(), 3);
    assert!(agg.pending_changes().is_empty());
    assert_eq!(agg.state().renames, 2);
    assert_eq!(agg.state().name.as_deref(), Some("name-2"));
}

#[tokio::test]
async fn test_load_version_zero_yields_empty_aggregate() {
    let store = widget_store();
    save_widget(&store, "a1", 2).await;

    let mut agg = widget("a1");
    store.load_version(&mut agg, 0).await.unwrap();

    assert_eq!(agg.version(), 0);
    assert_eq!(agg.state(), &WidgetState::default());
}

#[tokio::test]
async fn test_load_version_beyond_committed_returns_version_not_found() {
    let store = widget_store();
    save_widget(&store, "a1", 1).await;

    let mut agg = widget("a1");
    let result = store.load_version(&mut agg, 5).await;

    match result {
        Err(DomainError::VersionNotFound {
            aggregate_id,
            requested,
            committed,
        }) => {
            assert_eq!(aggregate_id, "a1");
            assert_eq!(requested, 5);
            assert_eq!(committed, 2);
        }
        other => panic!("expected VersionNotFound, got {other:?}"),
    }
    assert_eq!(agg.version(), 0);
}

#[tokio::test]
async fn test_load_version_unknown_aggregate_returns_not_found() {
    let store = widget_store();
    let mut agg = widget("missing");

    let result = store.load_version(&mut agg, 1).await;

    assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
}

// --- exists ---

#[tokio::test]
async fn test_exists_tracks_saved_identities() {
    let store = widget_store();
    save_widget(&store, "a1", 0).await;

    assert!(store.exists(&widget("a1")).await.unwrap());
    assert!(!store.exists(&widget("a2")).await.unwrap());
}

#[tokio::test]
async fn test_exists_version_compares_committed_version() {
    let store = widget_store();
    save_widget(&store, "a1", 1).await;
    let probe = widget("a1");

    assert!(store.exists_version(&probe, 0).await.unwrap());
    assert!(store.exists_version(&probe, 2).await.unwrap());
    assert!(!store.exists_version(&probe, 3).await.unwrap());
    assert!(!store.exists_version(&widget("a2"), 0).await.unwrap());
}

#[tokio::test]
async fn test_saving_fresh_aggregate_without_changes_registers_it() {
    let store = widget_store();
    let mut agg = widget("a1");

    store.save(&mut agg).await.unwrap();

    assert!(store.exists(&agg).await.unwrap());
    assert!(store.exists_version(&agg, 0).await.unwrap());
    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();
    assert_eq!(loaded.version(), 0);
}

// --- delete ---

#[tokio::test]
async fn test_delete_returns_identity_to_absent() {
    let store = widget_store();
    save_widget(&store, "a1", 1).await;
    save_widget(&store, "a2", 1).await;

    store.delete(&widget("a1")).await.unwrap();

    assert!(!store.exists(&widget("a1")).await.unwrap());
    assert!(store.exists(&widget("a2")).await.unwrap());
    assert_eq!(store.total_changes().unwrap(), 2);
    let mut loaded = widget("a1");
    assert!(matches!(
        store.load(&mut loaded).await,
        Err(DomainError::AggregateNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_unknown_aggregate_is_a_no_op() {
    let store = widget_store();
    save_widget(&store, "a1", 0).await;

    store.delete(&widget("missing")).await.unwrap();

    assert_eq!(store.total_changes().unwrap(), 1);
}

#[tokio::test]
async fn test_identity_can_be_saved_again_after_delete() {
    let store = widget_store();
    save_widget(&store, "a1", 2).await;
    store.delete(&widget("a1")).await.unwrap();

    save_widget(&store, "a1", 0).await;

    let mut loaded = widget("a1");
    store.load(&mut loaded).await.unwrap();
    assert_eq!(loaded.version(), 1);
}

// --- search ---

#[tokio::test]
async fn test_search_without_criteria_returns_every_aggregate() {
    let store = widget_store();
    for id in ["id-1", "id-2", "id-3"] {
        save_widget(&store, id, 0).await;
    }

    let found = store.search(&SearchCriteria::new()).await.unwrap();

    let ids: Vec<&str> = found.iter().map(|a| a.aggregate_id().as_str()).collect();
    assert_eq!(ids, vec!["id-1", "id-2", "id-3"]);
}

#[tokio::test]
async fn test_search_by_ids_returns_only_requested_aggregates() {
    let store = widget_store();
    for id in ["id-1", "id-2", "id-3"] {
        save_widget(&store, id, 0).await;
    }

    let criteria = SearchCriteria::new().with_ids(["id-1".to_owned(), "id-2".to_owned()]);
    let found = store.search(&criteria).await.unwrap();

    let ids: Vec<&str> = found.iter().map(|a| a.aggregate_id().as_str()).collect();
    assert_eq!(ids, vec!["id-1", "id-2"]);
}

#[tokio::test]
async fn test_search_by_name_filters_on_aggregate_name() {
    let store = widget_store();
    save_widget(&store, "id-1", 0).await;
    let mut gadget = widget_with_id("id-2".to_owned(), "Gadget");
    gadget
        .raise_change("g-1", "created", WidgetCreated::new("g"))
        .unwrap();
    store.save(&mut gadget).await.unwrap();

    let found = store
        .search(&SearchCriteria::new().with_names(["Gadget"]))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].aggregate_id(), "id-2");
    assert_eq!(found[0].aggregate_name(), "Gadget");
}

#[tokio::test]
async fn test_search_by_first_version_rebuilds_each_aggregate_at_that_version() {
    let store = widget_store();
    save_widget(&store, "id-1", 2).await;
    save_widget(&store, "id-2", 0).await;
    save_widget(&store, "id-3", 1).await;

    let found = store
        .search(&SearchCriteria::new().with_versions([1]))
        .await
        .unwrap();

    assert_eq!(found.len(), 3);
    for agg in &found {
        assert_eq!(agg.version(), 1);
        assert_eq!(agg.state().name.as_deref(), Some("draft"));
    }
}

#[tokio::test]
async fn test_search_reflects_only_the_filtered_history() {
    let store = widget_store();
    save_widget(&store, "id-1", 3).await;

    let found = store
        .search(&SearchCriteria::new().with_versions([1, 2]))
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].version(), 2);
    assert_eq!(found[0].state().renames, 1);
}

#[tokio::test]
async fn test_search_with_non_prefix_versions_fails_integrity() {
    let store = widget_store();
    save_widget(&store, "id-1", 2).await;

    let result = store
        .search(&SearchCriteria::new().with_versions([2]))
        .await;

    assert!(matches!(
        result,
        Err(DomainError::Integrity(IntegrityViolation::UnexpectedVersion {
            expected: 1,
            actual: 2,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_search_on_empty_store_returns_nothing() {
    let store = widget_store();

    let found = store.search(&SearchCriteria::new()).await.unwrap();

    assert!(found.is_empty());
}

#[tokio::test]
async fn test_default_factory_rebuilds_versions_without_state() {
    init_tracing();
    let store: WidgetStore = InMemoryEventStore::new();
    save_widget(&store, "id-1", 1).await;

    let found = store.search(&SearchCriteria::new()).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].version(), 2);
    assert_eq!(found[0].state(), &WidgetState::default());
}

// --- concurrency ---

#[tokio::test]
async fn test_permissive_mode_accepts_stale_save() {
    let store = widget_store();
    save_widget(&store, "a1", 0).await;
    let mut stale = widget("a1");
    stale
        .raise_change("stale-1", "created", WidgetCreated::new("other"))
        .unwrap();

    store.save(&mut stale).await.unwrap();

    assert_eq!(store.total_changes().unwrap(), 2);
    assert!(store.exists_version(&stale, 1).await.unwrap());
}

#[tokio::test]
async fn test_optimistic_mode_rejects_stale_save() {
    // Arrange
    let store = widget_store()
        .with_config(StoreConfig::default().with_concurrency(ConcurrencyMode::Optimistic));
    save_widget(&store, "a1", 1).await;
    let mut stale = widget("a1");
    stale
        .raise_change("stale-1", "created", WidgetCreated::new("other"))
        .unwrap();

    // Act
    let result = store.save(&mut stale).await;

    // Assert
    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }) => {
            assert_eq!(aggregate_id, "a1");
            assert_eq!(expected, 0);
            assert_eq!(actual, 2);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(stale.pending_changes().len(), 1);
    assert_eq!(stale.version(), 0);
    assert_eq!(store.total_changes().unwrap(), 2);
}

#[tokio::test]
async fn test_optimistic_mode_accepts_save_from_loaded_aggregate() {
    let store = widget_store()
        .with_config(StoreConfig::default().with_concurrency(ConcurrencyMode::Optimistic));
    save_widget(&store, "a1", 1).await;
    let mut agg = widget("a1");
    store.load(&mut agg).await.unwrap();

    agg.raise_change("evt-3", "renamed", WidgetRenamed::new("next"))
        .unwrap();
    store.save(&mut agg).await.unwrap();

    assert_eq!(agg.version(), 3);
    assert!(store.exists_version(&agg, 3).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_saves_of_distinct_identities_all_land() {
    let store = Arc::new(widget_store());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let id = format!("w-{i}");
                let mut agg = widget(&id);
                agg.raise_change(format!("{id}-1"), "created", WidgetCreated::new("draft"))
                    .unwrap();
                agg.raise_change(format!("{id}-2"), "renamed", WidgetRenamed::new("final"))
                    .unwrap();
                store.save(&mut agg).await.unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.total_changes().unwrap(), 32);
    let found = store.search(&SearchCriteria::new()).await.unwrap();
    assert_eq!(found.len(), 16);
    assert!(found.iter().all(|a| a.version() == 2));
}
