use jiff::{SignedDuration, Timestamp};
use waypoint_core::{LinkRecord, RecordId, ShortCode, VisitEvent, VisitMeta};
use waypoint_store::{LinkStore, SqliteStore, StorageError};

fn record(id: u64, code: &str, alias: Option<&str>, url: &str) -> LinkRecord {
    LinkRecord {
        id: RecordId::from_u64(id),
        original_url: url.to_string(),
        normalized_url: url.to_string(),
        code: ShortCode::new_unchecked(code),
        alias: alias.map(ShortCode::new_unchecked),
        created_at: Timestamp::from_second(id as i64).unwrap(),
        expires_at: None,
        visit_count: 0,
        visit_history: Vec::new(),
        secret: None,
    }
}

#[tokio::test]
async fn insert_get_round_trip() {
    let store = SqliteStore::in_memory().await.unwrap();

    let mut rec = record(1, "abc1234", Some("my-alias"), "https://example.com/a");
    rec.expires_at = Some(Timestamp::from_second(1).unwrap() + SignedDuration::from_hours(1));
    rec.secret = Some("hunter2".to_string());
    store.insert(rec.clone()).await.unwrap();

    let by_id = store.get(RecordId::from_u64(1)).await.unwrap().unwrap();
    assert_eq!(by_id, rec);

    let by_code = store
        .get_by_code(&ShortCode::new_unchecked("abc1234"))
        .await
        .unwrap()
        .unwrap();
    let by_alias = store
        .get_by_code(&ShortCode::new_unchecked("my-alias"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_code.id, by_alias.id);
}

#[tokio::test]
async fn conflicts_cross_the_code_alias_namespace() {
    let store = SqliteStore::in_memory().await.unwrap();
    store
        .insert(record(1, "abc1234", Some("my-alias"), "https://example.com"))
        .await
        .unwrap();

    let err = store
        .insert(record(2, "my-alias", None, "https://other.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    let err = store
        .insert(record(3, "zzz9999", Some("abc1234"), "https://third.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    // The failed inserts must not leave partial rows behind.
    assert_eq!(store.list_all().await.unwrap().len(), 1);
    assert!(store
        .get_by_code(&ShortCode::new_unchecked("zzz9999"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn append_visit_round_trips_history() {
    let store = SqliteStore::in_memory().await.unwrap();
    store
        .insert(record(1, "abc1234", None, "https://example.com"))
        .await
        .unwrap();

    let event = VisitEvent {
        at: Timestamp::from_second(100).unwrap(),
        meta: Some(VisitMeta {
            referrer: Some("https://example.org".to_string()),
            device: Some("desktop".to_string()),
            timezone: Some("Europe/Berlin".to_string()),
            user_agent: Some("curl/8.0".to_string()),
        }),
    };

    let updated = store
        .append_visit(RecordId::from_u64(1), event.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.visit_count, 1);
    assert_eq!(updated.visit_history, vec![event.clone()]);

    let back = store.get(RecordId::from_u64(1)).await.unwrap().unwrap();
    assert_eq!(back.visit_history, vec![event]);

    // Unknown ids are not an error.
    let missing = store
        .append_visit(
            RecordId::from_u64(42),
            VisitEvent {
                at: Timestamp::from_second(0).unwrap(),
                meta: None,
            },
        )
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn update_replaces_and_delete_frees_keys() {
    let store = SqliteStore::in_memory().await.unwrap();
    store
        .insert(record(1, "abc1234", Some("my-alias"), "https://example.com"))
        .await
        .unwrap();

    let mut trimmed = store.get(RecordId::from_u64(1)).await.unwrap().unwrap();
    trimmed.visit_count = 1500;
    assert!(store.update(trimmed).await.unwrap());
    assert!(!store
        .update(record(9, "zzz1234", None, "https://nope.com"))
        .await
        .unwrap());

    assert!(store.delete(RecordId::from_u64(1)).await.unwrap());
    assert!(!store.delete(RecordId::from_u64(1)).await.unwrap());

    // Both keys are reusable once the record is gone.
    store
        .insert(record(2, "abc1234", Some("my-alias"), "https://fresh.com"))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_many_counts_only_existing() {
    let store = SqliteStore::in_memory().await.unwrap();
    store
        .insert(record(1, "aaa1111", None, "https://a.com"))
        .await
        .unwrap();
    store
        .insert(record(2, "bbb2222", None, "https://b.com"))
        .await
        .unwrap();

    let removed = store
        .delete_many(&[
            RecordId::from_u64(1),
            RecordId::from_u64(2),
            RecordId::from_u64(3),
        ])
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn duplicate_lookup_prefers_oldest() {
    let store = SqliteStore::in_memory().await.unwrap();
    store
        .insert(record(5, "old1234", None, "https://example.com/dup"))
        .await
        .unwrap();
    store
        .insert(record(9, "new1234", None, "https://example.com/dup"))
        .await
        .unwrap();

    let found = store
        .get_by_normalized_url("https://example.com/dup")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.code.as_str(), "old1234");
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waypoint.db");

    {
        let store = SqliteStore::connect(&path).await.unwrap();
        store
            .insert(record(1, "abc1234", None, "https://example.com/persist"))
            .await
            .unwrap();
    }

    let reopened = SqliteStore::connect(&path).await.unwrap();
    let back = reopened
        .get_by_code(&ShortCode::new_unchecked("abc1234"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(back.original_url, "https://example.com/persist");
}
