use bson::{Bson, Document, doc};

use listlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::StoreError,
    mutation::{CreateData, CreateOptions, Created, Update},
    query::{IncludeSpec, Predicate, Query, SortDirection},
};
use listlayer_memory::InMemoryStore;

async fn store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .init(&["messages".to_string(), "users".to_string()])
        .await
        .unwrap();
    store
}

async fn insert(store: &InMemoryStore, list: &str, documents: Vec<Document>) {
    store
        .create(list, CreateData::Many(documents), CreateOptions::default())
        .await
        .unwrap();
}

async fn seed_names(store: &InMemoryStore) {
    insert(store, "messages", vec![
        doc! { "id": 1, "type": "A", "name": "john doe" },
        doc! { "id": 2, "type": "B", "name": "jane doe" },
        doc! { "id": 3, "type": "A", "name": "john sage" },
        doc! { "id": 4, "type": "C", "name": "jane sage" },
    ])
    .await;
}

fn ids(rows: &[Document]) -> Vec<i64> {
    rows.iter()
        .map(|row| match row.get("id") {
            Some(Bson::Int32(id)) => i64::from(*id),
            Some(Bson::Int64(id)) => *id,
            other => panic!("unexpected id {other:?}"),
        })
        .collect()
}

fn names(rows: &[Document]) -> Vec<&str> {
    rows.iter().map(|row| row.get_str("name").unwrap()).collect()
}

#[tokio::test]
async fn finds_by_equality() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "type": "A" },
        doc! { "id": 2, "type": "B" },
        doc! { "id": 3, "type": "A" },
    ])
    .await;

    let rows = store
        .find("messages", Query::filtered(Predicate::new().eq("type", "A")))
        .await
        .unwrap();

    assert_eq!(ids(&rows), vec![1, 3]);
    assert_eq!(store.find("messages", Query::new()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn create_assigns_ids_and_returns_documents() {
    let store = store().await;

    let created = store
        .create("messages", doc! { "abc": "def" }.into(), CreateOptions::default())
        .await
        .unwrap();
    let Created::One(message) = created else {
        panic!("expected a single document");
    };
    assert!(matches!(message.get("id"), Some(Bson::String(id)) if !id.is_empty()));

    let generated = message.get("id").cloned().unwrap();
    let found = store
        .find("messages", Query::filtered(Predicate::new().eq("id", generated)))
        .await
        .unwrap();
    assert_eq!(found, vec![message.clone()]);

    let batch = store
        .create(
            "messages",
            vec![doc! { "id": "1", "name": "halback" }, doc! { "id": "2", "name": "pickelback" }].into(),
            CreateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(batch.into_documents().len(), 2);

    let ack = store
        .create("messages", doc! { "abc": "ghi" }.into(), CreateOptions::ack_only())
        .await
        .unwrap();
    assert!(ack.is_ack());

    let rows = store.find("messages", Query::new()).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].get_str("abc").unwrap(), "def");
}

#[tokio::test]
async fn rejects_duplicate_ids_before_inserting() {
    let store = store().await;
    insert(&store, "messages", vec![doc! { "id": 1, "name": "john doe" }]).await;

    let existing = store
        .create("messages", doc! { "id": 1, "name": "again" }.into(), CreateOptions::default())
        .await;
    assert!(matches!(existing, Err(StoreError::DocumentAlreadyExists(_, _))));

    let repeated = store
        .create(
            "messages",
            vec![doc! { "id": 7 }, doc! { "id": 8 }, doc! { "id": 7 }].into(),
            CreateOptions::default(),
        )
        .await;
    assert!(matches!(repeated, Err(StoreError::DocumentAlreadyExists(_, _))));

    assert_eq!(ids(&store.find("messages", Query::new()).await.unwrap()), vec![1]);
}

#[tokio::test]
async fn failed_create_into_new_list_leaves_no_collection() {
    let store = store().await;

    let result = store
        .create("ghost", vec![doc! { "id": 1 }, doc! { "id": 1 }].into(), CreateOptions::default())
        .await;
    assert!(matches!(result, Err(StoreError::DocumentAlreadyExists(_, list)) if list == "ghost"));

    assert_eq!(store.list_collections().await.unwrap(), vec!["messages", "users"]);
    assert!(matches!(
        store.find("ghost", Query::new()).await,
        Err(StoreError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn large_integer_ids_stay_distinct() {
    let store = store().await;
    let big = 9_007_199_254_740_992_i64;

    insert(&store, "events", vec![doc! { "id": big }, doc! { "id": big + 1 }]).await;

    let rows = store
        .find("events", Query::filtered(Predicate::new().eq("id", big + 1)))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec![big + 1]);
}

#[tokio::test]
async fn find_one_returns_first_match_or_none() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "name": "john doe" },
        doc! { "id": 2, "name": "jane doe" },
        doc! { "id": 3, "name": "poppa doe" },
    ])
    .await;

    let jane = store
        .find_one("messages", Query::filtered(Predicate::new().eq("id", 2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(jane.get_str("name").unwrap(), "jane doe");

    let nobody = store
        .find_one("messages", Query::filtered(Predicate::new().eq("id", 9)))
        .await
        .unwrap();
    assert!(nobody.is_none());
}

#[tokio::test]
async fn disjunction_combines_with_siblings() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "type": "B", "name": "john doe" },
        doc! { "id": 2, "type": "B", "name": "jane doe" },
        doc! { "id": 3, "type": "A", "name": "poppa doe" },
        doc! { "id": 4, "type": "A", "name": "poppa doe" },
    ])
    .await;
    let either = || [Predicate::new().eq("type", "A"), Predicate::new().eq("type", "B")];

    let john = store
        .find("messages", Query::filtered(Predicate::new().eq("name", "john doe").or(either())))
        .await
        .unwrap();
    assert_eq!(ids(&john), vec![1]);

    let all = store
        .find("messages", Query::filtered(Predicate::new().or(either())))
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn like_and_not_like_split_the_collection() {
    let store = store().await;
    seed_names(&store).await;

    let sage = store
        .find("messages", Query::filtered(Predicate::new().or([Predicate::new().like("name", "%sage%")])))
        .await
        .unwrap();
    assert_eq!(names(&sage), vec!["john sage", "jane sage"]);

    let not_doe = store
        .find("messages", Query::filtered(Predicate::new().or([Predicate::new().not_like("name", "%doe%")])))
        .await
        .unwrap();
    assert_eq!(names(&not_doe), vec!["john sage", "jane sage"]);
}

#[tokio::test]
async fn range_operators_select_by_id() {
    let store = store().await;
    seed_names(&store).await;

    let find = |predicate: Predicate| {
        let store = store.clone();
        async move { ids(&store.find("messages", Query::filtered(predicate)).await.unwrap()) }
    };

    assert_eq!(find(Predicate::new().gt("id", 2)).await, vec![3, 4]);
    assert_eq!(find(Predicate::new().gte("id", 3)).await, vec![3, 4]);
    assert_eq!(find(Predicate::new().lt("id", 3)).await, vec![1, 2]);
    assert_eq!(find(Predicate::new().lte("id", 2)).await, vec![1, 2]);
    assert_eq!(find(Predicate::new().is_in("type", ["A", "C"])).await, vec![1, 3, 4]);
}

#[tokio::test]
async fn limit_offset_and_order() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": "1", "type": "A", "name": "john doe" },
        doc! { "id": "2", "type": "B", "name": "jane doe" },
        doc! { "id": "3", "type": "A", "name": "john sage" },
        doc! { "id": "4", "type": "C", "name": "jane sage" },
        doc! { "id": "5", "type": "D", "name": "Polly sage" },
    ])
    .await;

    let limited = store
        .find("messages", Query::builder().limit(2).build())
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    let skipped = store
        .find("messages", Query::builder().offset(2).build())
        .await
        .unwrap();
    assert_eq!(skipped.len(), 3);
    assert_eq!(skipped[0].get_str("id").unwrap(), "3");

    let page = store
        .find("messages", Query::builder().offset(1).limit(2).order_by("name", SortDirection::Desc).build())
        .await
        .unwrap();
    assert_eq!(names(&page), vec!["john doe", "jane sage"]);
}

#[tokio::test]
async fn sort_is_stable_for_equal_keys() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "type": "B" },
        doc! { "id": 2, "type": "A" },
        doc! { "id": 3, "type": "B" },
        doc! { "id": 4 },
        doc! { "id": 5, "type": "A" },
    ])
    .await;

    let rows = store
        .find("messages", Query::builder().order_by("type", SortDirection::Asc).build())
        .await
        .unwrap();

    assert_eq!(ids(&rows), vec![4, 2, 5, 1, 3]);
}

#[tokio::test]
async fn update_one_then_find_one_sees_the_change() {
    let store = store().await;
    insert(&store, "messages", vec![doc! { "id": 1, "name": "john doe" }]).await;

    let updated = store
        .update_one("messages", Update::new(Predicate::new().eq("id", 1), doc! { "name": "jane doe" }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.get_str("name").unwrap(), "jane doe");

    let found = store
        .find_one("messages", Query::filtered(Predicate::new().eq("id", 1)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get_str("name").unwrap(), "jane doe");

    let missing = store
        .update_one("messages", Update::new(Predicate::new().eq("id", 9), doc! { "name": "x" }))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn update_many_touches_every_match() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "type": "a", "name": "john doe" },
        doc! { "id": 2, "type": "a", "name": "john doe" },
        doc! { "id": 3, "type": "b", "name": "john doe" },
    ])
    .await;

    let updated = store
        .update_many("messages", Update::new(Predicate::new().eq("type", "a"), doc! { "updated": true }))
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let rows = store
        .find("messages", Query::filtered(Predicate::new().eq("updated", true)))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec![1, 2]);
}

#[tokio::test]
async fn updating_the_id_is_rejected() {
    let store = store().await;
    insert(&store, "messages", vec![doc! { "id": 1 }]).await;

    let result = store
        .update_many("messages", Update::new(Predicate::new(), doc! { "id": 2 }))
        .await;

    assert!(matches!(result, Err(StoreError::InvalidDocument(_))));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = store().await;
    insert(&store, "messages", vec![doc! { "id": 1, "name": "john doe" }, doc! { "id": 2 }]).await;

    assert_eq!(store.delete("messages", Predicate::new().eq("id", 1)).await.unwrap(), 1);
    assert_eq!(store.delete("messages", Predicate::new().eq("id", 1)).await.unwrap(), 0);
    assert_eq!(store.delete("messages", Predicate::new()).await.unwrap(), 1);
    assert!(store.find("messages", Query::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn explicit_join_attaches_related_rows() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "users_id": 1, "message": "cakes are awesome" },
        doc! { "id": 2, "users_id": 2, "message": "I like popsicles" },
    ])
    .await;
    insert(&store, "users", vec![doc! { "id": 1, "name": "jane joe" }, doc! { "id": 2, "name": "Poppa joe" }]).await;

    let rows = store
        .find("messages", Query::builder().include("users", IncludeSpec::new().on("users_id", "id")).build())
        .await
        .unwrap();

    let users = rows[0].get_array("users").unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].as_document().unwrap().get_str("name").unwrap(), "jane joe");
}

#[tokio::test]
async fn belongs_to_join_is_inferred() {
    let store = store().await;
    insert(&store, "users", vec![doc! { "id": 2, "name": "Poppa joe" }]).await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "users_id": 2 },
        doc! { "id": 2, "users_id": 2 },
        doc! { "id": 3, "users_id": 1 },
    ])
    .await;

    let rows = store
        .find("messages", Query::builder().include("users", IncludeSpec::new()).build())
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    for row in &rows[..2] {
        assert_eq!(row.get_array("users").unwrap(), &vec![Bson::Document(doc! { "id": 2, "name": "Poppa joe" })]);
    }
    assert!(rows[2].get_array("users").unwrap().is_empty());
}

#[tokio::test]
async fn has_many_join_is_inferred() {
    let store = store().await;
    insert(&store, "users", vec![doc! { "id": 2, "name": "Poppa joe" }]).await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "users_id": 2, "message": "cakes are awesome" },
        doc! { "id": 2, "users_id": 2, "message": "I like popsicles" },
    ])
    .await;

    let users = store
        .find("users", Query::builder().include("messages", IncludeSpec::new()).build())
        .await
        .unwrap();

    let messages = users[0].get_array("messages").unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].as_document().unwrap().get_str("message").unwrap(), "cakes are awesome");
}

#[tokio::test]
async fn required_join_drops_unmatched_rows_before_paging() {
    let store = store().await;
    insert(&store, "messages", vec![
        doc! { "id": 1, "users_id": 1 },
        doc! { "id": 2, "users_id": 2 },
        doc! { "id": 3, "users_id": 1 },
        doc! { "id": 4, "users_id": 2 },
    ])
    .await;
    insert(&store, "users", vec![doc! { "id": 2, "name": "Poppa joe" }]).await;
    let required = || IncludeSpec::new().on("users_id", "id").required();

    let rows = store
        .find("messages", Query::builder().include("users", required()).build())
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec![2, 4]);
    assert_eq!(rows[0].get_array("users").unwrap().len(), 1);

    let first = store
        .find_one("messages", Query::builder().include("users", required()).build())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ids(&[first]), vec![2]);
}

#[tokio::test]
async fn nested_includes_resolve_recursively() {
    let store = store().await;
    store.create_collection("comments", Vec::new()).await.unwrap();
    insert(&store, "users", vec![doc! { "id": 2, "name": "Poppa joe" }]).await;
    insert(&store, "messages", vec![doc! { "id": 1, "users_id": 2 }]).await;
    insert(&store, "comments", vec![doc! { "id": 5, "messages_id": 1, "text": "yum" }]).await;

    let users = store
        .find(
            "users",
            Query::builder()
                .include("messages", IncludeSpec::new().include("comments", IncludeSpec::new()))
                .build(),
        )
        .await
        .unwrap();

    let message = users[0].get_array("messages").unwrap()[0].as_document().unwrap();
    let comment = message.get_array("comments").unwrap()[0].as_document().unwrap();
    assert_eq!(comment.get_str("text").unwrap(), "yum");
}

#[tokio::test]
async fn include_of_unknown_collection_fails() {
    let store = store().await;
    insert(&store, "messages", vec![doc! { "id": 1 }]).await;

    let result = store
        .find("messages", Query::builder().include("ghosts", IncludeSpec::new()).build())
        .await;

    assert!(matches!(result, Err(StoreError::CollectionNotFound(name)) if name == "ghosts"));
}

#[tokio::test]
async fn nested_create_cascades_into_known_collections() {
    let store = store().await;

    let created = store
        .create(
            "users",
            doc! {
                "id": 2,
                "name": "Poppa joe",
                "messages": [{ "message": "cakes are awesome" }, { "message": "I like popsicles" }],
            }
            .into(),
            CreateOptions::default(),
        )
        .await
        .unwrap();

    let Created::One(user) = created else {
        panic!("expected a single document");
    };
    assert_eq!(user.get_array("messages").unwrap().len(), 2);

    let stored = store
        .find_one("users", Query::filtered(Predicate::new().eq("id", 2)))
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.contains_key("messages"));

    let messages = store
        .find("messages", Query::filtered(Predicate::new().eq("users_id", 2)))
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn nested_create_failure_keeps_parent() {
    let store = store().await;
    insert(&store, "messages", vec![doc! { "id": 5, "message": "already here" }]).await;

    let result = store
        .create(
            "users",
            doc! { "id": 1, "name": "jane doe", "messages": [{ "id": 5, "message": "clash" }] }.into(),
            CreateOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(StoreError::DocumentAlreadyExists(id, list)) if id == "5" && list == "messages"));

    let users = store.find("users", Query::new()).await.unwrap();
    assert_eq!(users, vec![doc! { "id": 1, "name": "jane doe" }]);

    let messages = store.find("messages", Query::new()).await.unwrap();
    assert_eq!(messages, vec![doc! { "id": 5, "message": "already here" }]);
}

#[tokio::test]
async fn collection_administration() {
    let store = store().await;

    store
        .create_collection("cakeman", vec![doc! { "name": "mighty", "description": "mouse" }])
        .await
        .unwrap();
    store
        .create_collection("cakeman", vec![doc! { "name": "ignored" }])
        .await
        .unwrap();
    assert_eq!(store.find("cakeman", Query::new()).await.unwrap().len(), 1);
    assert_eq!(store.list_collections().await.unwrap(), vec!["cakeman", "messages", "users"]);

    store.remove_collection("cakeman").await.unwrap();
    assert!(matches!(
        store.find("cakeman", Query::new()).await,
        Err(StoreError::CollectionNotFound(_))
    ));
    assert!(matches!(
        store.remove_collection("cakeman").await,
        Err(StoreError::CollectionNotFound(_))
    ));

    store.init(&["messages".to_string()]).await.unwrap();
    assert_eq!(store.list_collections().await.unwrap(), vec!["messages", "users"]);
}

#[tokio::test]
async fn create_into_unknown_collection_creates_it() {
    let store = InMemoryStore::new();

    store
        .create("messages", doc! { "abc": "def" }.into(), CreateOptions::default())
        .await
        .unwrap();

    assert_eq!(store.list_collections().await.unwrap(), vec!["messages"]);
    assert!(matches!(
        store.delete("users", Predicate::new()).await,
        Err(StoreError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn snapshot_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");

    let store = InMemoryStore::builder().persist_to(&path).build().await.unwrap();
    store.init(&["messages".to_string()]).await.unwrap();
    insert(&store, "messages", vec![doc! { "id": 1, "name": "john doe" }, doc! { "id": 2, "name": "jane doe" }]).await;
    store.delete("messages", Predicate::new().eq("id", 2)).await.unwrap();
    assert!(store.close().await.unwrap());

    let reopened = InMemoryStore::builder().persist_to(&path).build().await.unwrap();
    let rows = reopened.find("messages", Query::new()).await.unwrap();

    assert_eq!(ids(&rows), vec![1]);
    assert_eq!(rows[0].get_str("name").unwrap(), "john doe");
}

#[tokio::test]
async fn failed_snapshot_write_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir(&data_dir).unwrap();

    let store = InMemoryStore::builder().persist_to(data_dir.join("db.json")).build().await.unwrap();
    insert(&store, "messages", vec![doc! { "id": 1, "name": "john doe" }]).await;

    std::fs::remove_dir_all(&data_dir).unwrap();

    let created = store
        .create("messages", doc! { "id": 2 }.into(), CreateOptions::default())
        .await;
    assert!(matches!(created, Err(StoreError::Persistence(_))));

    let fresh = store
        .create("users", doc! { "id": 1 }.into(), CreateOptions::default())
        .await;
    assert!(matches!(fresh, Err(StoreError::Persistence(_))));

    let updated = store
        .update_many("messages", Update::new(Predicate::new(), doc! { "name": "jane doe" }))
        .await;
    assert!(matches!(updated, Err(StoreError::Persistence(_))));

    let deleted = store.delete("messages", Predicate::new()).await;
    assert!(matches!(deleted, Err(StoreError::Persistence(_))));

    assert_eq!(store.list_collections().await.unwrap(), vec!["messages"]);
    assert_eq!(
        store.find("messages", Query::new()).await.unwrap(),
        vec![doc! { "id": 1, "name": "john doe" }]
    );
}
