//! crates/casal_core/src/ports.rs
//!
//! Defines the service contracts (traits) the organizer core depends on.
//! These traits form the boundary of the hexagonal architecture: the core never
//! talks to a concrete document database or identity provider directly.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::CollectionName;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, store).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Documents and Snapshots
//=========================================================================================

/// The top-level fields of a stored document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// One document of a snapshot, with the id the store knows it by.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Fields,
}

/// A full point-in-time copy of one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<StoredDocument>,
}

impl Snapshot {
    pub fn document(&self, id: &str) -> Option<&StoredDocument> {
        self.documents.iter().find(|doc| doc.id == id)
    }
}

/// A live query. Dropping the stream unsubscribes; an `Err` item ends it.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = PortResult<Snapshot>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a live query over a whole collection.
    async fn subscribe(&self, collection: CollectionName) -> PortResult<SnapshotStream>;

    /// Reads one document as the store currently holds it; `None` if absent.
    async fn get_document(&self, collection: CollectionName, id: &str)
        -> PortResult<Option<Fields>>;

    /// Overwrites every field of a document, creating it if needed.
    async fn replace_document(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Fields,
    ) -> PortResult<()>;

    /// Overwrites only the given top-level fields, leaving the others intact.
    async fn merge_document(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Fields,
    ) -> PortResult<()>;

    /// Creates a document and returns the id the store assigned to it.
    async fn append_document(&self, collection: CollectionName, fields: Fields)
        -> PortResult<String>;

    async fn delete_document(&self, collection: CollectionName, id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// The identifier of an already-authenticated session, if any.
    async fn current_identity(&self) -> Option<String>;

    /// Exchanges a pre-issued token for an identity.
    async fn sign_in_with_token(&self, token: &str) -> PortResult<String>;

    /// Creates a fresh anonymous identity.
    async fn sign_in_anonymous(&self) -> PortResult<String>;
}
