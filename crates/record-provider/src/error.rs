//! Error types for record-provider

use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by providers and backends
#[derive(Error, Debug)]
pub enum ProviderError {
    /// `update` was called on a record without an id
    #[error("Updating a document requires an id")]
    UpdateRequiresId,

    /// `remove` was called on a record without an id
    #[error("Deleting a document requires an id")]
    DeleteRequiresId,

    /// The remote service rejected the request
    #[error("Remote request failed ({code} {kind}): {message}")]
    Api {
        code: u16,
        kind: String,
        message: String,
    },

    /// Transport-level failure talking to the service
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Response could not be decoded into the record shape
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Realtime connection or protocol error
    #[error("Realtime subscription failed: {0}")]
    Realtime(String),

    /// Missing or invalid client configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// True when the remote service reported the document as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Api { code: 404, .. })
    }

    /// True for the local "missing id" preconditions.
    pub fn is_missing_id(&self) -> bool {
        matches!(
            self,
            ProviderError::UpdateRequiresId | ProviderError::DeleteRequiresId
        )
    }
}

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: u16,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl ProviderError {
    pub(crate) fn from_api_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => ProviderError::Api {
                code: if parsed.code == 0 { status } else { parsed.code },
                kind: parsed.kind,
                message: parsed.message,
            },
            Err(_) => ProviderError::Api {
                code: status,
                kind: "unknown".to_string(),
                message: body.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProviderError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ProviderError::Realtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_body_is_parsed() {
        let err = ProviderError::from_api_body(
            404,
            r#"{"message":"Document with the requested ID could not be found.","code":404,"type":"document_not_found","version":"1.5.7"}"#,
        );
        assert!(err.is_not_found());
        match err {
            ProviderError::Api { kind, message, .. } => {
                assert_eq!(kind, "document_not_found");
                assert!(message.contains("could not be found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_keeps_status() {
        let err = ProviderError::from_api_body(502, "Bad Gateway");
        match err {
            ProviderError::Api {
                code,
                kind,
                message,
            } => {
                assert_eq!(code, 502);
                assert_eq!(kind, "unknown");
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_id_messages() {
        assert_eq!(
            ProviderError::UpdateRequiresId.to_string(),
            "Updating a document requires an id"
        );
        assert_eq!(
            ProviderError::DeleteRequiresId.to_string(),
            "Deleting a document requires an id"
        );
        assert!(ProviderError::DeleteRequiresId.is_missing_id());
        assert!(!ProviderError::Http("x".into()).is_missing_id());
    }
}
