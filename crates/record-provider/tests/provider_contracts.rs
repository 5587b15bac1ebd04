//! Behavioral contract tests for `Provider`.
//!
//! Every test runs against `MemoryBackend`, which records the exact calls a
//! provider makes so payloads and queries can be asserted directly.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use record_provider::events;
use record_provider::fakes::{Call, MemoryBackend};
use record_provider::{
    Backend, Document, Metadata, Provider, ProviderError, Query, RealtimeEvent, Record,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const DB: &str = "chat";
const COLLECTION: &str = "messages";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Message {
    #[serde(skip)]
    meta: Metadata,
    user: String,
    message: String,
}

impl Document for Message {
    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.meta
    }
}

fn message(user: &str, text: &str) -> Message {
    Message {
        meta: Metadata::default(),
        user: user.to_string(),
        message: text.to_string(),
    }
}

fn setup() -> (Arc<MemoryBackend>, Provider<Message>) {
    let backend = Arc::new(MemoryBackend::new());
    let provider = Provider::new(backend.clone(), DB, COLLECTION);
    (backend, provider)
}

fn sent_data(call: &Call) -> &Map<String, Value> {
    match call {
        Call::Create { data, .. } | Call::Update { data, .. } => data,
        other => panic!("expected a write call, got {other:?}"),
    }
}

// ===========================================================================
// create
// ===========================================================================

#[tokio::test]
async fn create_without_id_requests_server_generated_id() {
    let (backend, provider) = setup();

    let created = provider.create(&message("ada", "hello")).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::Create {
            database_id,
            collection_id,
            document_id,
            data,
        } => {
            assert_eq!(database_id, DB);
            assert_eq!(collection_id, COLLECTION);
            assert_eq!(document_id, "unique()");
            assert_eq!(
                Value::Object(data.clone()),
                json!({ "user": "ada", "message": "hello" })
            );
        }
        other => panic!("unexpected call {other:?}"),
    }

    assert!(created.id().is_some());
    assert_ne!(created.id(), Some("unique()"));
    assert!(created.created_at().is_some());
    assert_eq!(created.user, "ada");
}

#[tokio::test]
async fn create_uses_record_id_when_present() {
    let (_backend, provider) = setup();
    let mut record = message("ada", "hello");
    record.meta = Metadata::with_id("greeting");

    let created = provider.create(&record).await.unwrap();

    assert_eq!(created.id(), Some("greeting"));
}

#[tokio::test]
async fn create_never_sends_prefixed_fields() {
    let backend = Arc::new(MemoryBackend::new());
    let provider: Provider<Record<Map<String, Value>>> =
        Provider::new(backend.clone(), DB, COLLECTION);
    let fields = json!({
        "title": "draft",
        "$permissions": ["read(\"any\")"],
        "$collectionId": "elsewhere"
    });
    let record = Record::new(fields.as_object().cloned().unwrap());

    let created = provider.create(&record).await.unwrap();

    let calls = backend.calls();
    let data = sent_data(&calls[0]);
    assert!(data.keys().all(|k| !k.starts_with('$')));
    assert_eq!(created.data.get("title"), Some(&json!("draft")));
}

#[tokio::test]
async fn create_surfaces_remote_errors_unchanged() {
    let (_backend, provider) = setup();
    let mut record = message("ada", "hello");
    record.meta = Metadata::with_id("dup");
    provider.create(&record).await.unwrap();

    let err = provider.create(&record).await.unwrap_err();

    match err {
        ProviderError::Api { code, kind, .. } => {
            assert_eq!(code, 409);
            assert_eq!(kind, "document_already_exists");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

// ===========================================================================
// update
// ===========================================================================

#[tokio::test]
async fn update_sends_fields_without_metadata() {
    let (backend, provider) = setup();
    let mut saved = provider.create(&message("ada", "hello")).await.unwrap();
    backend.clear_calls();

    saved.message = "edited".to_string();
    let updated = provider.update(&saved, &[]).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::Update {
            document_id, data, ..
        } => {
            assert_eq!(Some(document_id.as_str()), saved.id());
            assert_eq!(
                Value::Object(data.clone()),
                json!({ "user": "ada", "message": "edited" })
            );
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(updated.message, "edited");
    assert_eq!(updated.id(), saved.id());
}

#[tokio::test]
async fn update_without_id_fails_before_remote_call() {
    let (backend, provider) = setup();

    let err = provider
        .update(&message("ada", "hello"), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::UpdateRequiresId));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn update_ignores_where_clause() {
    let (backend, provider) = setup();
    let saved = provider.create(&message("ada", "hello")).await.unwrap();
    backend.clear_calls();

    let where_clause = vec![Query::equal("user", "bob").to_string()];
    let updated = provider.update(&saved, &where_clause).await.unwrap();

    assert_eq!(updated.user, "ada");
    assert!(matches!(backend.calls()[0], Call::Update { .. }));
}

#[tokio::test]
async fn update_of_missing_document_is_not_found() {
    let (_backend, provider) = setup();
    let mut ghost = message("ada", "hello");
    ghost.meta = Metadata::with_id("ghost");

    let err = provider.update(&ghost, &[]).await.unwrap_err();

    assert!(err.is_not_found());
}

// ===========================================================================
// list / find
// ===========================================================================

#[tokio::test]
async fn list_requests_exact_page_in_server_order() {
    let (backend, provider) = setup();
    for i in 0..6 {
        let mut record = message("ada", &format!("m{i}"));
        record.meta = Metadata::with_id(format!("m{i}"));
        provider.create(&record).await.unwrap();
    }
    backend.clear_calls();

    let page = provider.list(2, 3).await.unwrap();

    match &backend.calls()[0] {
        Call::List { queries, .. } => {
            assert_eq!(
                queries,
                &vec![Query::offset(2).to_string(), Query::limit(3).to_string()]
            );
        }
        other => panic!("unexpected call {other:?}"),
    }
    let texts: Vec<&str> = page.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(texts, vec!["m2", "m3", "m4"]);
}

#[tokio::test]
async fn list_past_the_end_is_empty() {
    let (_backend, provider) = setup();
    provider.create(&message("ada", "only")).await.unwrap();

    assert!(provider.list(5, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn find_forwards_queries_unchanged() {
    let (backend, provider) = setup();
    provider.create(&message("ada", "one")).await.unwrap();
    provider.create(&message("bob", "two")).await.unwrap();
    provider.create(&message("ada", "three")).await.unwrap();
    backend.clear_calls();

    let queries = vec![
        Query::equal("user", "ada").to_string(),
        Query::order_desc("message").to_string(),
    ];
    let found = provider.find(&queries).await.unwrap();

    match &backend.calls()[0] {
        Call::List { queries: sent, .. } => assert_eq!(sent, &queries),
        other => panic!("unexpected call {other:?}"),
    }
    let texts: Vec<&str> = found.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(texts, vec!["three", "one"]);
}

#[tokio::test]
async fn find_surfaces_query_errors() {
    let (_backend, provider) = setup();

    let err = provider
        .find(&["not a query".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Api { code: 400, .. }));
}

// ===========================================================================
// get
// ===========================================================================

#[tokio::test]
async fn get_decodes_metadata() {
    let (backend, provider) = setup();
    backend.seed(
        DB,
        COLLECTION,
        json!({
            "$id": "m1",
            "$collectionId": COLLECTION,
            "$databaseId": DB,
            "$permissions": [],
            "$createdAt": "2024-05-01T08:00:00.000+00:00",
            "$updatedAt": "2024-05-02T08:00:00.000+00:00",
            "user": "ada",
            "message": "seeded"
        }),
    );

    let fetched = provider.get("m1").await.unwrap();

    let created: DateTime<Utc> = "2024-05-01T08:00:00Z".parse().unwrap();
    assert_eq!(fetched.id(), Some("m1"));
    assert_eq!(fetched.created_at(), Some(created));
    assert!(fetched.updated_at().unwrap() > created);
    assert_eq!(fetched.message, "seeded");
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let (_backend, provider) = setup();

    let err = provider.get("nope").await.unwrap_err();

    assert!(err.is_not_found());
}

// ===========================================================================
// remove
// ===========================================================================

#[tokio::test]
async fn remove_by_id_and_by_record_are_identical() {
    let (backend, provider) = setup();
    let mut first = message("ada", "a");
    first.meta = Metadata::with_id("x1");
    let mut second = message("ada", "b");
    second.meta = Metadata::with_id("x2");
    provider.create(&first).await.unwrap();
    provider.create(&second).await.unwrap();
    backend.clear_calls();

    provider.remove("x1").await.unwrap();
    provider.remove(&second).await.unwrap();

    let calls = backend.calls();
    let expected = |id: &str| Call::Delete {
        database_id: DB.to_string(),
        collection_id: COLLECTION.to_string(),
        document_id: id.to_string(),
    };
    assert_eq!(calls, vec![expected("x1"), expected("x2")]);
    assert!(backend.documents(DB, COLLECTION).is_empty());
}

#[tokio::test]
async fn remove_record_without_id_fails_before_remote_call() {
    let (backend, provider) = setup();

    let err = provider.remove(&message("ada", "a")).await.unwrap_err();

    assert!(matches!(err, ProviderError::DeleteRequiresId));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn remove_missing_is_not_found() {
    let (_backend, provider) = setup();

    let err = provider.remove(String::from("nope")).await.unwrap_err();

    assert!(err.is_not_found());
}

// ===========================================================================
// subscribe
// ===========================================================================

#[tokio::test]
async fn subscribe_substitutes_placeholders() {
    let (backend, provider) = setup();

    let sub = provider
        .subscribe("$DB_ID.collections.$COLLECTION_ID.documents", |_| {})
        .await
        .unwrap();

    assert_eq!(
        backend.calls(),
        vec![Call::Subscribe {
            channels: vec!["chat.collections.messages.documents".to_string()],
        }]
    );
    assert_eq!(sub.channels(), ["chat.collections.messages.documents".to_string()]);
}

#[tokio::test]
async fn subscribe_delivers_raw_payloads() {
    let (backend, provider) = setup();
    let seen: Arc<Mutex<Vec<RealtimeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let sub = provider
        .subscribe(events::DOCUMENTS, move |event| {
            sink.lock().unwrap().push(event);
        })
        .await
        .unwrap();
    provider.create(&message("ada", "live")).await.unwrap();

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let payload = &seen[0].payload;
        assert!(payload.get("$id").is_some());
        assert_eq!(payload["$collectionId"], COLLECTION);
        assert_eq!(payload["message"], "live");

        let decoded = provider.decode(payload.clone()).unwrap();
        assert_eq!(decoded.message, "live");
    }

    sub.unsubscribe();
    provider.create(&message("ada", "after")).await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(backend.listener_count(), 0);
}

#[tokio::test]
async fn dropped_subscription_keeps_listening() {
    let (backend, provider) = setup();
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();

    drop(
        provider
            .subscribe(events::CREATE, move |_| *counter.lock().unwrap() += 1)
            .await
            .unwrap(),
    );
    provider.create(&message("ada", "one")).await.unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(backend.listener_count(), 1);
}

// ===========================================================================
// sharing
// ===========================================================================

#[tokio::test]
async fn providers_share_one_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let shared: Arc<dyn Backend> = backend.clone();
    let messages: Provider<Message> = Provider::new(shared.clone(), DB, COLLECTION);
    let archive: Provider<Message> = Provider::new(shared, DB, "archive");

    messages.create(&message("ada", "live")).await.unwrap();
    archive.create(&message("ada", "old")).await.unwrap();
    let cloned = messages.clone();

    assert_eq!(cloned.list(0, 10).await.unwrap().len(), 1);
    assert_eq!(archive.list(0, 10).await.unwrap()[0].message, "old");
    assert_eq!(backend.documents(DB, "archive").len(), 1);
}
