//! Connection-handle abstraction
//!
//! `Backend` is the one seam between providers and the remote service:
//! document CRUD, list queries and realtime subscriptions, all expressed in
//! the service's raw JSON shapes. `Client` talks to a real server;
//! `fakes::MemoryBackend` keeps everything in memory for tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Response of a list call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentList {
    /// Total matching documents on the server (not just this page)
    pub total: u64,
    /// Raw documents in server order
    pub documents: Vec<Value>,
}

/// A realtime notification, exactly as the service sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Event names, e.g. `databases.chat.collections.messages.documents.d1.create`
    #[serde(default)]
    pub events: Vec<String>,
    /// Channels the event was published on
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub timestamp: Value,
    /// The affected resource, including its `$`-prefixed metadata
    #[serde(default)]
    pub payload: Value,
}

/// Callback invoked for every event on a subscribed channel.
pub type EventCallback = Arc<dyn Fn(RealtimeEvent) + Send + Sync>;

/// Handle to an active realtime subscription.
///
/// Dropping the handle leaves the subscription running; call
/// [`Subscription::unsubscribe`] to stop it.
pub struct Subscription {
    channels: Vec<String>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(channels: Vec<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            channels,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Channels this subscription listens on.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Stop receiving events.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

/// Remote document database plus its realtime channel.
///
/// Every method is a single pass-through call; errors come back unchanged.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create a document. `document_id` may be the `unique()` sentinel.
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value>;

    /// Patch an existing document with the given fields.
    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value>;

    /// List documents matching the query expressions, in server order.
    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[String],
    ) -> Result<DocumentList>;

    /// Fetch one document. A missing document is a remote 404 error.
    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value>;

    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<()>;

    /// Register `callback` for events published on any of `channels`.
    async fn subscribe(
        &self,
        channels: Vec<String>,
        callback: EventCallback,
    ) -> Result<Subscription>;
}
