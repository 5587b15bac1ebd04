//! HTTP client for the document database REST API
//!
//! Implements [`Backend`] over `reqwest`:
//! - document create / get / update / delete
//! - list with `queries[]` expressions
//! - realtime subscriptions (delegated to [`crate::realtime`])
//!
//! Errors returned by the service are passed through as
//! [`ProviderError::Api`] without retries.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, Url};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::backend::{Backend, DocumentList, EventCallback, Subscription};
use crate::error::ProviderError;
use crate::realtime;
use crate::Result;

/// Response format requested from the service (JSON query syntax).
pub const DEFAULT_RESPONSE_FORMAT: &str = "1.5.0";

const HEADER_PROJECT: &str = "x-appwrite-project";
const HEADER_KEY: &str = "x-appwrite-key";
const HEADER_JWT: &str = "x-appwrite-jwt";
const HEADER_RESPONSE_FORMAT: &str = "x-appwrite-response-format";

/// Connection settings for a database service instance
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API endpoint including the version path (e.g., "https://cloud.appwrite.io/v1")
    pub endpoint: String,
    /// Project id
    pub project: String,
    /// Server API key (optional for public collections)
    pub api_key: Option<String>,
    /// User JWT (optional)
    pub jwt: Option<String>,
    /// Value of the response-format header
    pub response_format: String,
}

impl ClientConfig {
    /// Create a new configuration without credentials
    pub fn new(endpoint: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            project: project.into(),
            api_key: None,
            jwt: None,
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
        }
    }

    /// Authenticate with a server API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Authenticate as a user via JWT
    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = Some(jwt.into());
        self
    }

    /// Override the response-format header
    pub fn with_response_format(mut self, format: impl Into<String>) -> Self {
        self.response_format = format.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - APPWRITE_ENDPOINT (required)
    /// - APPWRITE_PROJECT (required)
    /// - APPWRITE_API_KEY (optional)
    /// - APPWRITE_JWT (optional)
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("APPWRITE_ENDPOINT")
            .map_err(|_| ProviderError::Config("APPWRITE_ENDPOINT not set".to_string()))?;
        let project = std::env::var("APPWRITE_PROJECT")
            .map_err(|_| ProviderError::Config("APPWRITE_PROJECT not set".to_string()))?;

        let mut config = Self::new(endpoint, project);
        config.api_key = std::env::var("APPWRITE_API_KEY").ok();
        config.jwt = std::env::var("APPWRITE_JWT").ok();
        Ok(config)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        insert_header(&mut headers, HEADER_PROJECT, &self.project)?;
        insert_header(&mut headers, HEADER_RESPONSE_FORMAT, &self.response_format)?;
        if let Some(key) = &self.api_key {
            insert_header(&mut headers, HEADER_KEY, key)?;
        }
        if let Some(jwt) = &self.jwt {
            insert_header(&mut headers, HEADER_JWT, jwt)?;
        }
        Ok(headers)
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| ProviderError::Config(format!("invalid value for {name}: {e}")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Connection handle to a database service.
///
/// Cheap to clone; share one `Arc<Client>` between many providers.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    base: Url,
    http: reqwest::Client,
}

impl Client {
    /// Build a client for the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            ProviderError::Config(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ProviderError::Config(format!(
                "endpoint '{}' cannot be used as a base URL",
                config.endpoint
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("record-provider/", env!("CARGO_PKG_VERSION")))
            .default_headers(config.headers()?)
            .build()?;

        info!(endpoint = %config.endpoint, project = %config.project, "Client configured");
        Ok(Self {
            config: Arc::new(config),
            base,
            http,
        })
    }

    /// Build a client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn documents_url(&self, database_id: &str, collection_id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "databases",
                database_id,
                "collections",
                collection_id,
                "documents",
            ]);
        }
        url
    }

    fn document_url(&self, database_id: &str, collection_id: &str, document_id: &str) -> Url {
        let mut url = self.documents_url(database_id, collection_id);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(document_id);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(status = status.as_u16(), error = %e, "Failed to read error body");
                format!("failed to read error body: {e}")
            }
        };
        let err = ProviderError::from_api_body(status.as_u16(), &body);
        debug!(status = status.as_u16(), error = %err, "Request rejected");
        Err(err)
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl Backend for Client {
    #[instrument(skip(self, data))]
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value> {
        debug!("Creating document");
        let body = json!({ "documentId": document_id, "data": data });
        let request = self
            .http
            .post(self.documents_url(database_id, collection_id))
            .json(&body);
        self.send_json(request).await
    }

    #[instrument(skip(self, data))]
    async fn update_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: Map<String, Value>,
    ) -> Result<Value> {
        debug!("Updating document");
        let body = json!({ "data": data });
        let request = self
            .http
            .patch(self.document_url(database_id, collection_id, document_id))
            .json(&body);
        self.send_json(request).await
    }

    #[instrument(skip(self, queries), fields(queries = queries.len()))]
    async fn list_documents(
        &self,
        database_id: &str,
        collection_id: &str,
        queries: &[String],
    ) -> Result<DocumentList> {
        debug!("Listing documents");
        let params: Vec<(&str, &str)> = queries
            .iter()
            .map(|q| ("queries[]", q.as_str()))
            .collect();
        let request = self
            .http
            .get(self.documents_url(database_id, collection_id))
            .query(&params);
        let body = self.send_json(request).await?;
        serde_json::from_value(body).map_err(|e| ProviderError::Deserialization(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn get_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Value> {
        debug!("Getting document");
        let request = self
            .http
            .get(self.document_url(database_id, collection_id, document_id));
        self.send_json(request).await
    }

    #[instrument(skip(self))]
    async fn delete_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
    ) -> Result<()> {
        debug!("Deleting document");
        let request = self
            .http
            .delete(self.document_url(database_id, collection_id, document_id));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self, callback))]
    async fn subscribe(
        &self,
        channels: Vec<String>,
        callback: EventCallback,
    ) -> Result<Subscription> {
        realtime::subscribe(&self.config, channels, callback).await
    }
}
