//! Translation between record shapes and remote documents
//!
//! - `to_payload`: record -> `{ id, data }` write payload
//! - `from_response`: remote document -> record
//!
//! Remote documents carry service-managed keys prefixed with `$`. Those keys
//! never travel in a write payload; on read, `$id`, `$createdAt` and
//! `$updatedAt` are moved into the record's [`Metadata`] while
//! `$collectionId`, `$databaseId` and `$permissions` are dropped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::document::{Document, Metadata};
use crate::error::ProviderError;
use crate::id::Id;
use crate::Result;

/// Prefix marking service-managed keys.
pub const META_PREFIX: char = '$';

pub const KEY_ID: &str = "$id";
pub const KEY_COLLECTION_ID: &str = "$collectionId";
pub const KEY_DATABASE_ID: &str = "$databaseId";
pub const KEY_PERMISSIONS: &str = "$permissions";
pub const KEY_CREATED_AT: &str = "$createdAt";
pub const KEY_UPDATED_AT: &str = "$updatedAt";

/// A write payload ready for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    /// The record's id, or the `unique()` sentinel when it has none
    pub id: String,
    pub data: Map<String, Value>,
}

/// True for keys the service manages itself.
pub fn is_meta_key(key: &str) -> bool {
    key.starts_with(META_PREFIX)
}

/// Serialize a record's user fields, dropping any `$`-prefixed key.
pub fn payload_fields<D: Document>(document: &D) -> Result<Map<String, Value>> {
    match serde_json::to_value(document)? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .filter(|(key, _)| !is_meta_key(key))
            .collect()),
        other => Err(ProviderError::Serialization(format!(
            "record must serialize to a JSON object, got {}",
            value_kind(&other)
        ))),
    }
}

/// Build the create payload for a record.
pub fn to_payload<D: Document>(document: &D) -> Result<Payload> {
    let id = match document.id() {
        Some(id) => id.to_string(),
        None => Id::unique().into_string(),
    };

    Ok(Payload {
        id,
        data: payload_fields(document)?,
    })
}

/// Decode a remote document into a record.
pub fn from_response<D: Document>(response: Value) -> Result<D> {
    let mut fields = match response {
        Value::Object(fields) => fields,
        other => {
            return Err(ProviderError::Deserialization(format!(
                "expected a document object, got {}",
                value_kind(&other)
            )))
        }
    };

    let id = fields
        .remove(KEY_ID)
        .and_then(|v| v.as_str().map(str::to_owned));
    let created_at = parse_timestamp(KEY_CREATED_AT, fields.remove(KEY_CREATED_AT))?;
    let updated_at = parse_timestamp(KEY_UPDATED_AT, fields.remove(KEY_UPDATED_AT))?;
    fields.remove(KEY_COLLECTION_ID);
    fields.remove(KEY_DATABASE_ID);
    fields.remove(KEY_PERMISSIONS);

    let mut document: D = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ProviderError::Deserialization(e.to_string()))?;
    *document.metadata_mut() = Metadata {
        id,
        created_at,
        updated_at,
    };
    Ok(document)
}

fn parse_timestamp(key: &str, value: Option<Value>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(&raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| ProviderError::Deserialization(format!("{key} '{raw}': {e}"))),
        Some(other) => Err(ProviderError::Deserialization(format!(
            "{key} must be a timestamp string, got {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
