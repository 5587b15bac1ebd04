//! In-memory fake of the database service (testing only)
//!
//! `MemoryBackend` implements [`Backend`] without any network: documents live
//! in a `HashMap` per collection, list queries are evaluated locally, and
//! realtime events are delivered synchronously to registered callbacks.
//! Every call is recorded so tests can assert on exactly what a provider
//! sent.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::backend::{Backend, DocumentList, EventCallback, RealtimeEvent, Subscription};
use crate::error::ProviderError;
use crate::events;
use crate::id::Id;
use crate::mapping::{self, KEY_ID, KEY_UPDATED_AT};
use crate::query::Query;
use crate::Result;

/// Page size applied when a list call carries no `limit` query.
pub const DEFAULT_LIST_LIMIT: usize = 25;

/// A backend call as the fake received it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create {
        database_id: String,
        collection_id: String,
        document_id: String,
        data: Map<String, Value>,
    },
    Update {
        database_id: String,
        collection_id: String,
        document_id: String,
        data: Map<String, Value>,
    },
    List {
        database_id: String,
        collection_id: String,
        queries: Vec<String>,
    },
    Get {
        database_id: String,
        collection_id: String,
        document_id: String,
    },
    Delete {
        database_id: String,
        collection_id: String,
        document_id: String,
    },
    Subscribe {
        channels: Vec<String>,
    },
}

struct Listener {
    id: u64,
    channels: Vec<String>,
    callback: EventCallback,
}

type CollectionKey = (String, String);

/// In-memory backend backed by `HashMap<(database, collection), documents>`.
#[derive(Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<CollectionKey, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    listeners: Arc<Mutex<Vec<Listener>>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("collections", &self.collections.lock().unwrap().len())
            .field("calls", &self.calls.lock().unwrap().len())
            .field("listeners", &self.listeners.lock().unwrap().len())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls received so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Raw stored documents of a collection, in insertion order.
    pub fn documents(&self, database_id: &str, collection_id: &str) -> Vec<Value> {
        self.collections
            .lock()
            .unwrap()
            .get(&key(database_id, collection_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Store a raw document as-is, bypassing call recording and events.
    pub fn seed(&self, database_id: &str, collection_id: &str, document: Value) {
        self.collections
            .lock()
            .unwrap()
            .entry(key(database_id, collection_id))
            .or_default()
            .push(document);
    }

    /// Number of active realtime listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Deliver an event to every listener subscribed to one of its channels.
    ///
    /// Listeners registered with an event pattern (such as
    /// [`events::CREATE`] after substitution) also receive events whose name
    /// matches the pattern.
    pub fn publish(&self, event: RealtimeEvent) {
        let targets: Vec<EventCallback> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|l| listens_to(&l.channels, &event))
            .map(|l| l.callback.clone())
            .collect();

        for callback in targets {
            callback(event.clone());
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn publish_document_event(
        &self,
        database_id: &str,
        collection_id: &str,
        action: &str,
        document: &Value,
    ) {
        let document_id = document[KEY_ID].as_str().unwrap_or_default();
        let collection_channel = events::resolve(events::DOCUMENTS, database_id, collection_id);
        let event = RealtimeEvent {
            events: vec![format!("{collection_channel}.{document_id}.{action}")],
            channels: vec![
                "documents".to_string(),
                format!("{collection_channel}.{document_id}"),
                collection_channel,
            ],
            timestamp: Value::String(now()),
            payload: document.clone(),
        };
        self.publish(event);
    }
}

fn key(database_id: &str, collection_id: &str) -> CollectionKey {
    (database_id.to_string(), collection_id.to_string())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

fn api_error(code: u16, kind: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::Api {
        code,
        kind: kind.to_string(),
        message: message.into(),
    }
}

fn not_found(document_id: &str) -> ProviderError {
    api_error(
        404,
        "document_not_found",
        format!("Document with the requested ID '{document_id}' could not be found."),
    )
}

fn listens_to(channels: &[String], event: &RealtimeEvent) -> bool {
    channels.iter().any(|channel| {
        event.channels.iter().any(|c| c == channel)
            || event.events.iter().any(|name| events::matches(channel, name))
    })
}

fn reject_meta_keys(data: &Map<String, Value>) -> Result<()> {
    match data.keys().find(|k| mapping::is_meta_key(k)) {
        Some(key) => Err(api_error(
            400,
            "document_invalid_structure",
            format!("Invalid document structure: Unknown attribute: \"{key}\""),
        )),
        None => Ok(()),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value> {
        self.record(Call::Create {
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
            data: data.clone(),
        });
        reject_meta_keys(&data)?;

        let id = if document_id == Id::unique().as_str() {
            uuid::Uuid::new_v4().simple().to_string()[..20].to_string()
        } else {
            document_id.to_string()
        };

        let timestamp = now();
        let mut document = data;
        document.insert(KEY_ID.to_string(), json!(id));
        document.insert(mapping::KEY_COLLECTION_ID.to_string(), json!(collection_id));
        document.insert(mapping::KEY_DATABASE_ID.to_string(), json!(database_id));
        document.insert(mapping::KEY_PERMISSIONS.to_string(), json!([]));
        document.insert(mapping::KEY_CREATED_AT.to_string(), json!(timestamp));
        document.insert(KEY_UPDATED_AT.to_string(), json!(timestamp));
        let document = Value::Object(document);

        {
            let mut collections = self.collections.lock().unwrap();
            let docs = collections
                .entry(key(database_id, collection_id))
                .or_default();
            if docs.iter().any(|d| d[KEY_ID] == json!(id)) {
                return Err(api_error(
                    409,
                    "document_already_exists",
                    "Document with the requested ID already exists.",
                ));
            }
            docs.push(document.clone());
        }

        self.publish_document_event(database_id, collection_id, "create", &document);
        Ok(document)
    }

    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value> {
        self.record(Call::Update {
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
            data: data.clone(),
        });
        reject_meta_keys(&data)?;

        let updated = {
            let mut collections = self.collections.lock().unwrap();
            let stored = collections
                .get_mut(&key(database_id, collection_id))
                .and_then(|docs| docs.iter_mut().find(|d| d[KEY_ID] == json!(document_id)))
                .ok_or_else(|| not_found(document_id))?;

            if let Value::Object(fields) = &mut *stored {
                fields.extend(data);
                fields.insert(KEY_UPDATED_AT.to_string(), json!(now()));
            }
            stored.clone()
        };

        self.publish_document_event(database_id, collection_id, "update", &updated);
        Ok(updated)
    }

    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[String],
    ) -> Result<DocumentList> {
        self.record(Call::List {
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
            queries: queries.to_vec(),
        });

        let parsed = queries
            .iter()
            .map(|raw| {
                Query::parse(raw).ok_or_else(|| {
                    api_error(400, "general_query_invalid", format!("Invalid query: {raw}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let documents = self.documents(database_id, collection_id);
        evaluate(documents, &parsed)
    }

    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value> {
        self.record(Call::Get {
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
        });

        self.documents(database_id, collection_id)
            .into_iter()
            .find(|d| d[KEY_ID] == json!(document_id))
            .ok_or_else(|| not_found(document_id))
    }

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<()> {
        self.record(Call::Delete {
            database_id: database_id.to_string(),
            collection_id: collection_id.to_string(),
            document_id: document_id.to_string(),
        });

        let removed = {
            let mut collections = self.collections.lock().unwrap();
            let docs = collections
                .get_mut(&key(database_id, collection_id))
                .ok_or_else(|| not_found(document_id))?;
            let index = docs
                .iter()
                .position(|d| d[KEY_ID] == json!(document_id))
                .ok_or_else(|| not_found(document_id))?;
            docs.remove(index)
        };

        self.publish_document_event(database_id, collection_id, "delete", &removed);
        Ok(())
    }

    async fn subscribe(
        &self,
        channels: Vec<String>,
        callback: EventCallback,
    ) -> Result<Subscription> {
        self.record(Call::Subscribe {
            channels: channels.clone(),
        });

        let id = self.next_listener.fetch_add(1, AtomicOrdering::SeqCst);
        self.listeners.lock().unwrap().push(Listener {
            id,
            channels: channels.clone(),
            callback,
        });

        let listeners = Arc::clone(&self.listeners);
        Ok(Subscription::new(channels, move || {
            listeners.lock().unwrap().retain(|l| l.id != id);
        }))
    }
}

// ---------------------------------------------------------------------------
// Query evaluation
// ---------------------------------------------------------------------------

fn evaluate(mut documents: Vec<Value>, queries: &[Query]) -> Result<DocumentList> {
    let mut limit = DEFAULT_LIST_LIMIT;
    let mut offset = 0usize;
    let mut cursor: Option<(bool, String)> = None;
    let mut select: Option<Vec<String>> = None;

    for query in queries {
        match query.method() {
            "limit" => limit = first_usize(query)?,
            "offset" => offset = first_usize(query)?,
            "cursorAfter" | "cursorBefore" => {
                let id = first_str(query)?.to_string();
                cursor = Some((query.method() == "cursorAfter", id));
            }
            "select" => {
                select = Some(
                    query
                        .values()
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect(),
                )
            }
            "orderAsc" | "orderDesc" => {
                let attribute = attribute(query)?.to_string();
                let descending = query.method() == "orderDesc";
                documents.sort_by(|a, b| {
                    let ord = compare(&a[&attribute], &b[&attribute]).unwrap_or(Ordering::Equal);
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
            method => {
                check_filter(query)?;
                let attribute = attribute(query)?.to_string();
                documents.retain(|d| apply_filter(method, &d[&attribute], query.values()));
            }
        }
    }

    let total = documents.len() as u64;

    if let Some((after, id)) = cursor {
        let position = documents
            .iter()
            .position(|d| d[KEY_ID] == json!(id))
            .ok_or_else(|| not_found(&id))?;
        documents = if after {
            documents.split_off(position + 1)
        } else {
            documents.truncate(position);
            documents
        };
    }

    let mut page: Vec<Value> = documents.into_iter().skip(offset).take(limit).collect();

    if let Some(attributes) = select {
        for document in &mut page {
            if let Value::Object(fields) = document {
                fields.retain(|k, _| mapping::is_meta_key(k) || attributes.contains(k));
            }
        }
    }

    Ok(DocumentList {
        total,
        documents: page,
    })
}

const FILTER_METHODS: &[&str] = &[
    "equal",
    "notEqual",
    "lessThan",
    "lessThanEqual",
    "greaterThan",
    "greaterThanEqual",
    "between",
    "isNull",
    "isNotNull",
    "startsWith",
    "endsWith",
    "search",
    "contains",
];

fn check_filter(query: &Query) -> Result<()> {
    if FILTER_METHODS.contains(&query.method()) {
        Ok(())
    } else {
        Err(api_error(
            400,
            "general_query_invalid",
            format!("Unsupported query method: {}", query.method()),
        ))
    }
}

fn apply_filter(method: &str, value: &Value, values: &[Value]) -> bool {
    match method {
        "equal" => values.contains(value),
        "notEqual" => !values.contains(value),
        "lessThan" => cmp_first(value, values) == Some(Ordering::Less),
        "lessThanEqual" => matches!(
            cmp_first(value, values),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "greaterThan" => cmp_first(value, values) == Some(Ordering::Greater),
        "greaterThanEqual" => matches!(
            cmp_first(value, values),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "between" => match values {
            [low, high] => {
                matches!(compare(value, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(value, high), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        },
        "isNull" => value.is_null(),
        "isNotNull" => !value.is_null(),
        "startsWith" => str_pair(value, values).is_some_and(|(s, p)| s.starts_with(p)),
        "endsWith" => str_pair(value, values).is_some_and(|(s, p)| s.ends_with(p)),
        "search" => str_pair(value, values)
            .is_some_and(|(s, p)| s.to_lowercase().contains(&p.to_lowercase())),
        "contains" => match value {
            Value::Array(items) => values.iter().any(|needle| items.contains(needle)),
            Value::String(s) => values
                .iter()
                .filter_map(Value::as_str)
                .any(|needle| s.contains(needle)),
            _ => false,
        },
        _ => false,
    }
}

fn attribute(query: &Query) -> Result<&str> {
    query.attribute().ok_or_else(|| {
        api_error(
            400,
            "general_query_invalid",
            format!("{} requires an attribute", query.method()),
        )
    })
}

fn first_usize(query: &Query) -> Result<usize> {
    query
        .values()
        .first()
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| {
            api_error(
                400,
                "general_query_invalid",
                format!("{} requires a numeric value", query.method()),
            )
        })
}

fn first_str(query: &Query) -> Result<&str> {
    query
        .values()
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| {
            api_error(
                400,
                "general_query_invalid",
                format!("{} requires a document id", query.method()),
            )
        })
}

fn cmp_first(value: &Value, values: &[Value]) -> Option<Ordering> {
    values.first().and_then(|other| compare(value, other))
}

fn str_pair<'a>(value: &'a Value, values: &'a [Value]) -> Option<(&'a str, &'a str)> {
    Some((value.as_str()?, values.first()?.as_str()?))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
