use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use villain_core::db::open_db_in_memory;
use villain_core::{
    ChangeNotifier, ProviderConfig, ProviderError, RepoError, RepoResult,
    SqliteVillainRepository, Villain, VillainId, VillainProvider, VillainQuery,
    VillainRepository, VillainRoute, VillainValues,
};

const COLLECTION: &str = "content://auth/villains";

type Provider = VillainProvider<SqliteVillainRepository>;

fn provider() -> Provider {
    let repo = SqliteVillainRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let config = ProviderConfig {
        scheme: "content".to_string(),
        authority: "auth".to_string(),
    };
    VillainProvider::new(config, repo, Arc::new(ChangeNotifier::new())).unwrap()
}

fn item(id: i64) -> String {
    format!("{COLLECTION}/{id}")
}

fn insert(provider: &Provider, name: &str, series: &str) -> i64 {
    let created = provider
        .insert(COLLECTION, Some(&VillainValues::new(name, series)))
        .unwrap();
    created.last_id().unwrap()
}

fn count_notifications<R: VillainRepository>(provider: &VillainProvider<R>, locator: &str) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    provider
        .register_observer(locator, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    hits
}

#[test]
fn classify_routes_collection_item_and_unknown() {
    let provider = provider();

    assert_eq!(provider.classify(COLLECTION), VillainRoute::Collection);
    assert_eq!(provider.classify(&item(7)), VillainRoute::Item(7));
    assert_eq!(provider.classify("content://auth/other"), VillainRoute::Unmatched);
    assert_eq!(provider.classify("not a locator"), VillainRoute::Unmatched);
}

#[test]
fn collection_query_matches_store_contents_exactly() {
    let provider = provider();
    provider.seed_samples().unwrap();
    insert(&provider, "Joker", "Batman");

    let cursor = provider.query(COLLECTION, &VillainQuery::default()).unwrap();

    assert_eq!(cursor.rows(), provider.repository().select_all().unwrap().as_slice());
    assert_eq!(cursor.len() as u64, provider.repository().count().unwrap());
}

#[test]
fn item_query_returns_exactly_the_addressed_row() {
    let provider = provider();
    let ids: Vec<_> = [("Joker", "Batman"), ("Zod", "Superman")]
        .iter()
        .map(|(name, series)| insert(&provider, name, series))
        .collect();

    for id in ids {
        let cursor = provider.query(&item(id), &VillainQuery::default()).unwrap();
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.rows()[0].id, id);
    }

    let missing = provider.query(&item(999), &VillainQuery::default()).unwrap();
    assert!(missing.is_empty());
}

#[test]
fn insert_returns_item_locator_for_new_row() {
    let provider = provider();

    let created = provider
        .insert(COLLECTION, Some(&VillainValues::new("Joker", "Batman")))
        .unwrap();
    let id = created.last_id().unwrap();
    assert_eq!(created.to_string(), item(id));

    let rows = provider
        .query(&created.to_string(), &VillainQuery::default())
        .unwrap()
        .into_rows();
    assert_eq!(rows, vec![Villain::with_id(id, "Joker", "Batman").unwrap()]);
}

#[test]
fn insert_with_missing_fields_uses_defaults() {
    let provider = provider();

    let created = provider
        .insert(COLLECTION, Some(&VillainValues::default()))
        .unwrap();

    let rows = provider
        .query(&created.to_string(), &VillainQuery::default())
        .unwrap()
        .into_rows();
    assert_eq!(rows[0].name, "");
    assert_eq!(rows[0].series, "");
}

#[test]
fn insert_with_explicit_id_upserts() {
    let provider = provider();
    let id = insert(&provider, "Joker", "Batman");

    let created = provider
        .insert(
            COLLECTION,
            Some(&VillainValues::new("Harley Quinn", "Suicide Squad").id(id)),
        )
        .unwrap();

    assert_eq!(created.last_id(), Some(id));
    assert_eq!(provider.repository().count().unwrap(), 1);
    let stored = provider.repository().select_by_id(id).unwrap().unwrap();
    assert_eq!(stored.name, "Harley Quinn");
}

#[test]
fn insert_on_item_locator_is_illegal() {
    let provider = provider();

    let err = provider
        .insert(&item(5), Some(&VillainValues::new("Joker", "Batman")))
        .unwrap_err();

    assert!(matches!(
        err,
        ProviderError::IllegalOperation {
            operation: "insert",
            ..
        }
    ));
    assert_eq!(provider.repository().count().unwrap(), 0);
}

#[test]
fn insert_without_values_is_invalid_argument() {
    let provider = provider();
    let err = provider.insert(COLLECTION, None).unwrap_err();
    assert!(matches!(err, ProviderError::InvalidArgument(_)));
}

#[test]
fn insert_with_negative_id_is_invalid_argument() {
    let provider = provider();
    let err = provider
        .insert(COLLECTION, Some(&VillainValues::new("a", "b").id(-2)))
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidArgument(_)));
    assert_eq!(provider.repository().count().unwrap(), 0);
}

#[test]
fn update_on_collection_is_illegal() {
    let provider = provider();
    let err = provider
        .update(COLLECTION, Some(&VillainValues::new("a", "b")))
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::IllegalOperation {
            operation: "update",
            ..
        }
    ));
}

#[test]
fn update_missing_row_returns_zero() {
    let provider = provider();
    let count = provider
        .update(&item(404), Some(&VillainValues::new("a", "b")))
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(provider.repository().count().unwrap(), 0);
}

#[test]
fn update_without_values_is_invalid_argument() {
    let provider = provider();
    let id = insert(&provider, "Joker", "Batman");
    let err = provider.update(&item(id), None).unwrap_err();
    assert!(matches!(err, ProviderError::InvalidArgument(_)));
}

#[test]
fn update_replaces_fields_and_ignores_payload_id() {
    let provider = provider();
    let id = insert(&provider, "Joker", "Batman");
    let other = insert(&provider, "Zod", "Superman");

    let count = provider
        .update(
            &item(id),
            Some(&VillainValues::new("Joker", "Suicide Squad").id(other)),
        )
        .unwrap();
    assert_eq!(count, 1);

    let rows = provider
        .query(&item(id), &VillainQuery::default())
        .unwrap()
        .into_rows();
    assert_eq!(rows, vec![Villain::with_id(id, "Joker", "Suicide Squad").unwrap()]);
    let untouched = provider.repository().select_by_id(other).unwrap().unwrap();
    assert_eq!(untouched.name, "Zod");

    let all = provider
        .query(COLLECTION, &VillainQuery::default())
        .unwrap()
        .into_rows();
    assert!(!all.iter().any(|v| v.id == id && v.series == "Batman"));
}

#[test]
fn update_with_partial_values_resets_absent_fields() {
    let provider = provider();
    let id = insert(&provider, "Joker", "Batman");

    let values = VillainValues {
        name: Some("Joker".to_string()),
        ..VillainValues::default()
    };
    provider.update(&item(id), Some(&values)).unwrap();

    let stored = provider.repository().select_by_id(id).unwrap().unwrap();
    assert_eq!(stored.series, "");
}

#[test]
fn delete_on_collection_is_illegal() {
    let provider = provider();
    insert(&provider, "Joker", "Batman");

    let err = provider.delete(COLLECTION).unwrap_err();
    assert!(matches!(
        err,
        ProviderError::IllegalOperation {
            operation: "delete",
            ..
        }
    ));
    assert_eq!(provider.repository().count().unwrap(), 1);
}

#[test]
fn delete_twice_returns_one_then_zero() {
    let provider = provider();
    let id = insert(&provider, "Joker", "Batman");

    assert_eq!(provider.delete(&item(id)).unwrap(), 1);
    assert_eq!(provider.delete(&item(id)).unwrap(), 0);
    assert_eq!(provider.delete(&item(id + 50)).unwrap(), 0);
}

#[test]
fn unknown_locator_fails_every_verb() {
    let provider = provider();
    let unknown = "content://auth/other";
    let values = VillainValues::new("a", "b");

    assert!(matches!(
        provider.query(unknown, &VillainQuery::default()),
        Err(ProviderError::InvalidLocator(_))
    ));
    assert!(matches!(
        provider.resource_type(unknown),
        Err(ProviderError::InvalidLocator(_))
    ));
    assert!(matches!(
        provider.insert(unknown, Some(&values)),
        Err(ProviderError::InvalidLocator(_))
    ));
    assert!(matches!(
        provider.update(unknown, Some(&values)),
        Err(ProviderError::InvalidLocator(_))
    ));
    assert!(matches!(
        provider.delete("garbage"),
        Err(ProviderError::InvalidLocator(_))
    ));
}

#[test]
fn resource_type_distinguishes_collection_and_item() {
    let provider = provider();

    assert_eq!(
        provider.resource_type(COLLECTION).unwrap(),
        "vnd.cursor.dir/auth.villains"
    );
    assert_eq!(
        provider.resource_type(&item(3)).unwrap(),
        "vnd.cursor.item/auth.villains"
    );
}

#[test]
fn mutations_notify_collection_subscribers() {
    let provider = provider();
    let hits = count_notifications(&provider, COLLECTION);

    let id = insert(&provider, "Joker", "Batman");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    provider
        .update(&item(id), Some(&VillainValues::new("Joker", "Arrow")))
        .unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    provider.delete(&item(id)).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[test]
fn no_op_update_and_delete_still_notify() {
    let provider = provider();
    let hits = count_notifications(&provider, COLLECTION);

    assert_eq!(
        provider
            .update(&item(77), Some(&VillainValues::new("a", "b")))
            .unwrap(),
        0
    );
    assert_eq!(provider.delete(&item(77)).unwrap(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn rejected_calls_do_not_notify() {
    let provider = provider();
    let hits = count_notifications(&provider, COLLECTION);

    let _ = provider.insert(&item(1), Some(&VillainValues::new("a", "b")));
    let _ = provider.insert(COLLECTION, None);
    let _ = provider.update(COLLECTION, Some(&VillainValues::new("a", "b")));
    let _ = provider.delete(COLLECTION);

    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn notification_carries_mutated_locator() {
    let provider = provider();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    provider
        .register_observer(COLLECTION, move |changed| {
            sink.lock().unwrap().push(changed.to_string());
        })
        .unwrap();

    let id = insert(&provider, "Joker", "Batman");
    provider.delete(&item(id)).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![COLLECTION.to_string(), item(id)]
    );
}

#[test]
fn unregistered_observer_is_not_notified() {
    let provider = provider();
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let handle = provider
        .register_observer(COLLECTION, move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(provider.unregister_observer(handle));
    insert(&provider, "Joker", "Batman");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn cursors_turn_stale_on_related_changes() {
    let provider = provider();
    let id = insert(&provider, "Joker", "Batman");
    let other = insert(&provider, "Zod", "Superman");

    let collection = provider.query(COLLECTION, &VillainQuery::default()).unwrap();
    let joker = provider.query(&item(id), &VillainQuery::default()).unwrap();
    let zod = provider.query(&item(other), &VillainQuery::default()).unwrap();
    assert!(!collection.is_stale());

    provider
        .update(&item(id), Some(&VillainValues::new("Joker", "Arrow")))
        .unwrap();
    assert!(collection.is_stale());
    assert!(joker.is_stale());
    assert!(!zod.is_stale());

    insert(&provider, "Bane", "Batman");
    assert!(zod.is_stale());
}

#[test]
fn dropping_cursor_releases_subscription() {
    let provider = provider();
    let baseline = provider.notifier().subscriber_count();

    let cursor = provider.query(COLLECTION, &VillainQuery::default()).unwrap();
    assert_eq!(provider.notifier().subscriber_count(), baseline + 1);
    assert_eq!(cursor.notification_locator().to_string(), COLLECTION);

    drop(cursor);
    assert_eq!(provider.notifier().subscriber_count(), baseline);
}

#[test]
fn observer_may_requery_from_callback() {
    let provider = Arc::new(provider());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let reader = Arc::downgrade(&provider);
    let sink = Arc::clone(&observed);
    provider
        .register_observer(COLLECTION, move |_| {
            if let Some(provider) = reader.upgrade() {
                let len = provider
                    .query(COLLECTION, &VillainQuery::default())
                    .unwrap()
                    .len();
                sink.lock().unwrap().push(len);
            }
        })
        .unwrap();

    insert(&provider, "Joker", "Batman");
    insert(&provider, "Zod", "Superman");

    assert_eq!(*observed.lock().unwrap(), vec![1, 2]);
}

#[test]
fn concurrent_inserts_are_all_visible() {
    let provider = Arc::new(provider());
    let hits = count_notifications(&provider, COLLECTION);

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let provider = Arc::clone(&provider);
            thread::spawn(move || {
                let name = format!("villain-{index}");
                insert(&provider, &name, "threads")
            })
        })
        .collect();
    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 8);
    assert_eq!(hits.load(Ordering::SeqCst), 8);
    let rows = provider
        .query(COLLECTION, &VillainQuery::default())
        .unwrap()
        .into_rows();
    assert_eq!(rows.len(), 8);
}

#[test]
fn custom_authority_scopes_locators() {
    let repo = SqliteVillainRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let provider = VillainProvider::new(
        ProviderConfig::default(),
        repo,
        Arc::new(ChangeNotifier::new()),
    )
    .unwrap();

    let collection = provider.collection_locator().to_string();
    assert_eq!(collection, "content://com.developers.villains/villains");
    assert_eq!(provider.classify(COLLECTION), VillainRoute::Unmatched);
    assert_eq!(
        provider.item_locator(4).to_string(),
        format!("{collection}/4")
    );
}

#[test]
fn invalid_authority_is_rejected_at_construction() {
    let repo = SqliteVillainRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let config = ProviderConfig {
        scheme: "content".to_string(),
        authority: "auth/nested".to_string(),
    };

    let result = VillainProvider::new(config, repo, Arc::new(ChangeNotifier::new()));
    assert!(matches!(result, Err(ProviderError::InvalidLocator(_))));
}

#[test]
fn foreign_scheme_or_authority_is_not_served() {
    let provider = provider();
    let hits = count_notifications(&provider, COLLECTION);

    assert_eq!(provider.classify("other://auth/villains"), VillainRoute::Unmatched);
    assert_eq!(provider.classify("other://auth/villains/1"), VillainRoute::Unmatched);
    assert_eq!(provider.classify("content://elsewhere/villains"), VillainRoute::Unmatched);

    let result = provider.insert(
        "other://auth/villains",
        Some(&VillainValues::new("Joker", "Batman")),
    );
    assert!(matches!(result, Err(ProviderError::InvalidLocator(_))));
    assert_eq!(provider.repository().count().unwrap(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    for locator in ["other://auth/villains", "content://elsewhere/villains"] {
        let result = provider.register_observer(locator, |_| {});
        assert!(matches!(result, Err(ProviderError::InvalidLocator(_))));
    }
}

#[test]
fn custom_scheme_delivers_notifications_to_its_own_locators() {
    let repo = SqliteVillainRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let config = ProviderConfig {
        scheme: "villains".to_string(),
        authority: "auth".to_string(),
    };
    let provider = VillainProvider::new(config, repo, Arc::new(ChangeNotifier::new())).unwrap();
    let collection = "villains://auth/villains";
    let hits = count_notifications(&provider, collection);

    let created = provider
        .insert(collection, Some(&VillainValues::new("Joker", "Batman")))
        .unwrap();
    assert_eq!(created.to_string(), format!("{collection}/{}", created.last_id().unwrap()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let cursor = provider.query(collection, &VillainQuery::default()).unwrap();
    provider.delete(&created.to_string()).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(cursor.is_stale());
}

/// Reads go to SQLite; every write fails as if the database lock were lost.
struct BrokenWrites(SqliteVillainRepository);

impl VillainRepository for BrokenWrites {
    fn insert_or_replace(&self, _villain: &Villain) -> RepoResult<VillainId> {
        Err(RepoError::LockPoisoned)
    }

    fn insert_all_or_replace(&self, _villains: &[Villain]) -> RepoResult<Vec<VillainId>> {
        Err(RepoError::LockPoisoned)
    }

    fn select(&self, query: &VillainQuery) -> RepoResult<Vec<Villain>> {
        self.0.select(query)
    }

    fn select_by_id(&self, id: VillainId) -> RepoResult<Option<Villain>> {
        self.0.select_by_id(id)
    }

    fn update(&self, _villain: &Villain) -> RepoResult<usize> {
        Err(RepoError::LockPoisoned)
    }

    fn delete_by_id(&self, _id: VillainId) -> RepoResult<usize> {
        Err(RepoError::LockPoisoned)
    }

    fn delete_all(&self) -> RepoResult<usize> {
        Err(RepoError::LockPoisoned)
    }

    fn count(&self) -> RepoResult<u64> {
        self.0.count()
    }

    fn seed_samples(&self) -> RepoResult<Vec<VillainId>> {
        Err(RepoError::LockPoisoned)
    }
}

#[test]
fn failing_store_surfaces_storage_fault_without_notifying() {
    let inner = SqliteVillainRepository::try_new(open_db_in_memory().unwrap()).unwrap();
    let id = inner
        .insert_or_replace(&Villain::new("Joker", "Batman"))
        .unwrap();
    let config = ProviderConfig {
        scheme: "content".to_string(),
        authority: "auth".to_string(),
    };
    let provider =
        VillainProvider::new(config, BrokenWrites(inner), Arc::new(ChangeNotifier::new()))
            .unwrap();
    let hits = count_notifications(&provider, COLLECTION);
    let cursor = provider.query(COLLECTION, &VillainQuery::default()).unwrap();

    let inserted = provider.insert(COLLECTION, Some(&VillainValues::new("Bane", "Batman")));
    let updated = provider.update(&item(id), Some(&VillainValues::new("Bane", "Batman")));
    let deleted = provider.delete(&item(id));
    let seeded = provider.seed_samples();

    assert!(matches!(inserted, Err(ProviderError::StorageFault(_))));
    assert!(matches!(updated, Err(ProviderError::StorageFault(_))));
    assert!(matches!(deleted, Err(ProviderError::StorageFault(_))));
    assert!(seeded.unwrap_err().is_storage_fault());
    assert_eq!(provider.repository().count().unwrap(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(!cursor.is_stale());
}

#[test]
fn exhausted_id_space_is_a_storage_fault() {
    let provider = provider();
    provider
        .insert(
            COLLECTION,
            Some(&VillainValues::new("Darkseid", "Justice League").id(i64::MAX)),
        )
        .unwrap();
    let hits = count_notifications(&provider, COLLECTION);

    let result = provider.insert(COLLECTION, Some(&VillainValues::new("Joker", "Batman")));

    let err = result.unwrap_err();
    assert!(err.is_storage_fault());
    assert!(!matches!(err, ProviderError::InvalidArgument(_)));
    assert_eq!(provider.repository().count().unwrap(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
