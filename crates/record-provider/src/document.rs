//! Record shapes handled by a `Provider`
//!
//! A record is split into two parts: the service-managed [`Metadata`]
//! (identifier and timestamps) and the user payload. Only the payload is ever
//! serialized into a write request; metadata is filled from responses.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Service-managed fields of a stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Document id; `None` until assigned by the service or the caller
    pub id: Option<String>,
    /// Creation time, populated on read
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time, populated on read
    pub updated_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Metadata carrying only an id, as used for caller-chosen ids.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Capability every record shape bound to a `Provider` must have.
///
/// Implementors keep their `Metadata` out of the serialized payload, usually
/// with `#[serde(skip)]`. The serialized form must be a JSON object.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Message {
///     #[serde(skip)]
///     meta: Metadata,
///     user: String,
///     message: String,
/// }
///
/// impl Document for Message {
///     fn metadata(&self) -> &Metadata { &self.meta }
///     fn metadata_mut(&mut self) -> &mut Metadata { &mut self.meta }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    fn id(&self) -> Option<&str> {
        self.metadata().id.as_deref()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata().created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.metadata().updated_at
    }
}

/// Generic record: any serde payload plus its metadata.
///
/// Use `Record<serde_json::Map<String, Value>>` for untyped collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    #[serde(skip)]
    pub meta: Metadata,
    #[serde(flatten)]
    pub data: T,
}

impl<T> Record<T> {
    /// A new record without an id (the service will assign one).
    pub fn new(data: T) -> Self {
        Self {
            meta: Metadata::default(),
            data,
        }
    }

    /// A record with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, data: T) -> Self {
        Self {
            meta: Metadata::with_id(id),
            data,
        }
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for Record<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> Document for Record<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.meta
    }
}
