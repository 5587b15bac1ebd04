//! Record-Provider: typed document access for Appwrite-style databases
//!
//! This crate binds a caller-defined record shape to one remote collection
//! and exposes the usual document operations on it. The remote service owns
//! storage, query evaluation, authentication and realtime fan-out; this crate
//! only shapes requests and responses around single remote calls.
//!
//! ## Key Components
//!
//! - `Provider`: the bound set of operations (create, update, list, find, get,
//!   remove, subscribe) for one database + collection
//! - `Document`: capability trait every record shape implements
//! - `Backend`: the connection-handle seam, implemented by `Client` (REST +
//!   websocket) and `fakes::MemoryBackend` (in-memory, for tests)
//! - `Query`, `Id`, `events`: helpers for building query expressions, ids
//!   and realtime channel patterns
//!
//! ```ignore
//! let client = Arc::new(Client::new(ClientConfig::from_env()?)?);
//! let messages = Provider::<Record<Message>>::new(client, "chat", "messages");
//! let page = messages.list(0, 10).await?;
//! ```

pub mod backend;
mod client;
mod document;
mod error;
pub mod events;
pub mod fakes;
mod id;
pub mod mapping;
mod provider;
mod query;
mod realtime;

pub use backend::{Backend, DocumentList, EventCallback, RealtimeEvent, Subscription};
pub use client::{Client, ClientConfig, DEFAULT_RESPONSE_FORMAT};
pub use document::{Document, Metadata, Record};
pub use error::ProviderError;
pub use id::Id;
pub use provider::{DocumentRef, Provider};
pub use query::Query;

/// Result type for record-provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
