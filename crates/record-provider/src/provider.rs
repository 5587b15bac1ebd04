//! Provider - typed operations bound to one collection
//!
//! A `Provider<D>` holds a connection handle plus a database and collection
//! id, and maps every operation onto exactly one backend call:
//! - create / update / get / remove for single documents
//! - list (offset + limit paging) and find (caller-supplied queries)
//! - subscribe for raw realtime events
//!
//! Providers keep no state between calls; clone them freely and share one
//! backend between as many providers as needed.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, trace};

use crate::backend::{Backend, EventCallback, RealtimeEvent, Subscription};
use crate::document::Document;
use crate::error::ProviderError;
use crate::events;
use crate::mapping::{self, from_response, to_payload};
use crate::query::Query;
use crate::Result;

/// Target of a `remove` call: a bare id or a record's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    Id(String),
    /// A record that has not been assigned an id
    Unsaved,
}

impl DocumentRef {
    fn into_id(self) -> Option<String> {
        match self {
            DocumentRef::Id(id) => Some(id),
            DocumentRef::Unsaved => None,
        }
    }
}

impl From<&str> for DocumentRef {
    fn from(id: &str) -> Self {
        DocumentRef::Id(id.to_string())
    }
}

impl From<String> for DocumentRef {
    fn from(id: String) -> Self {
        DocumentRef::Id(id)
    }
}

impl<D: Document> From<&D> for DocumentRef {
    fn from(document: &D) -> Self {
        match document.id() {
            Some(id) => DocumentRef::Id(id.to_string()),
            None => DocumentRef::Unsaved,
        }
    }
}

/// Typed access to one remote collection.
pub struct Provider<D> {
    backend: Arc<dyn Backend>,
    database_id: String,
    collection_id: String,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for Provider<D> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            database_id: self.database_id.clone(),
            collection_id: self.collection_id.clone(),
            _document: PhantomData,
        }
    }
}

impl<D> fmt::Debug for Provider<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("database_id", &self.database_id)
            .field("collection_id", &self.collection_id)
            .finish_non_exhaustive()
    }
}

impl<D: Document> Provider<D> {
    /// Bind a record shape to `database_id` / `collection_id`.
    pub fn new(
        backend: Arc<dyn Backend>,
        database_id: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            database_id: database_id.into(),
            collection_id: collection_id.into(),
            _document: PhantomData,
        }
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Create a document from the record's payload.
    ///
    /// Uses the record's id if set, otherwise lets the service generate one.
    #[instrument(skip_all, fields(database = %self.database_id, collection = %self.collection_id))]
    pub async fn create(&self, document: &D) -> Result<D> {
        let payload = to_payload(document)?;
        debug!(document_id = %payload.id, fields = payload.data.len(), "Creating document");

        let response = self
            .backend
            .create_document(
                &self.database_id,
                &self.collection_id,
                &payload.id,
                payload.data,
            )
            .await?;
        from_response(response)
    }

    /// Update the stored document with the record's payload.
    ///
    /// `where_clause` is accepted for signature symmetry with `find` and is
    /// not sent; the document is addressed by the record's id alone.
    #[instrument(skip_all, fields(database = %self.database_id, collection = %self.collection_id))]
    pub async fn update(&self, document: &D, where_clause: &[String]) -> Result<D> {
        let id = document.id().ok_or(ProviderError::UpdateRequiresId)?;
        if !where_clause.is_empty() {
            trace!(queries = where_clause.len(), "Ignoring where clause on update");
        }

        let data = mapping::payload_fields(document)?;
        debug!(document_id = %id, fields = data.len(), "Updating document");

        let response = self
            .backend
            .update_document(&self.database_id, &self.collection_id, id, data)
            .await?;
        from_response(response)
    }

    /// Fetch `count` documents starting at `offset`, in server order.
    #[instrument(skip(self), fields(database = %self.database_id, collection = %self.collection_id))]
    pub async fn list(&self, offset: u64, count: u64) -> Result<Vec<D>> {
        let queries: Vec<String> = vec![Query::offset(offset).into(), Query::limit(count).into()];
        self.fetch(&queries).await
    }

    /// Fetch documents matching the given query expressions.
    ///
    /// The expressions are forwarded unchanged; build them with [`Query`].
    #[instrument(skip_all, fields(database = %self.database_id, collection = %self.collection_id, queries = queries.len()))]
    pub async fn find(&self, queries: &[String]) -> Result<Vec<D>> {
        self.fetch(queries).await
    }

    async fn fetch(&self, queries: &[String]) -> Result<Vec<D>> {
        let list = self
            .backend
            .list_documents(&self.database_id, &self.collection_id, queries)
            .await?;
        debug!(
            total = list.total,
            returned = list.documents.len(),
            "Listed documents"
        );
        list.documents.into_iter().map(from_response).collect()
    }

    /// Fetch one document by id.
    #[instrument(skip(self), fields(database = %self.database_id, collection = %self.collection_id))]
    pub async fn get(&self, id: &str) -> Result<D> {
        let response = self
            .backend
            .get_document(&self.database_id, &self.collection_id, id)
            .await?;
        from_response(response)
    }

    /// Delete a document, given either a record or a bare id.
    #[instrument(skip_all, fields(database = %self.database_id, collection = %self.collection_id))]
    pub async fn remove(&self, target: impl Into<DocumentRef>) -> Result<()> {
        let id = target
            .into()
            .into_id()
            .ok_or(ProviderError::DeleteRequiresId)?;
        debug!(document_id = %id, "Deleting document");

        self.backend
            .delete_document(&self.database_id, &self.collection_id, &id)
            .await
    }

    /// Register `callback` on a realtime channel of this collection.
    ///
    /// `$DB_ID` and `$COLLECTION_ID` in `pattern` are replaced with the bound
    /// ids (see [`events`]). Events reach the callback undecoded, with the
    /// service's `$`-prefixed metadata intact.
    #[instrument(skip(self, callback), fields(database = %self.database_id, collection = %self.collection_id))]
    pub async fn subscribe<F>(&self, pattern: &str, callback: F) -> Result<Subscription>
    where
        F: Fn(RealtimeEvent) + Send + Sync + 'static,
    {
        let channel = events::resolve(pattern, &self.database_id, &self.collection_id);
        info!(channel = %channel, "Subscribing");

        let callback: EventCallback = Arc::new(callback);
        self.backend.subscribe(vec![channel], callback).await
    }

    /// Decode a realtime payload into the record shape.
    pub fn decode(&self, payload: Value) -> Result<D> {
        from_response(payload)
    }
}
