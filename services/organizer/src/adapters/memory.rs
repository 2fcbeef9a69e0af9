//! services/organizer/src/adapters/memory.rs
//!
//! The Local Fallback Store: an in-process implementation of the
//! `DocumentStore` port used when no backing store is configured. Nothing is
//! persisted and nothing is shared with other clients.

use async_trait::async_trait;
use casal_core::domain::CollectionName;
use casal_core::ports::{
    DocumentStore, Fields, PortError, PortResult, Snapshot, SnapshotStream, StoredDocument,
};
use futures::channel::mpsc::{unbounded, UnboundedSender};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store backed by process memory.
///
/// Subscribing yields the current contents immediately, and every write
/// pushes a fresh snapshot to all open subscriptions of that collection
/// before the write returns.
#[derive(Default)]
pub struct LocalFallbackStore {
    inner: Mutex<LocalState>,
}

#[derive(Default)]
struct LocalState {
    collections: BTreeMap<CollectionName, Vec<StoredDocument>>,
    subscribers: BTreeMap<CollectionName, Vec<UnboundedSender<PortResult<Snapshot>>>>,
}

impl LocalState {
    fn snapshot(&self, collection: CollectionName) -> Snapshot {
        Snapshot {
            documents: self
                .collections
                .get(&collection)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn documents(&mut self, collection: CollectionName) -> &mut Vec<StoredDocument> {
        self.collections.entry(collection).or_default()
    }

    /// Sends the current snapshot to every live subscriber, forgetting the
    /// ones whose stream was dropped.
    fn publish(&mut self, collection: CollectionName) {
        let snapshot = self.snapshot(collection);
        if let Some(senders) = self.subscribers.get_mut(&collection) {
            senders.retain(|sender| sender.unbounded_send(Ok(snapshot.clone())).is_ok());
        }
    }
}

impl LocalFallbackStore {
    /// Creates an empty `LocalFallbackStore`.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> PortResult<MutexGuard<'_, LocalState>> {
        self.inner
            .lock()
            .map_err(|_| PortError::Unexpected("local store lock poisoned".to_string()))
    }

    /// Number of open subscriptions on a collection.
    pub fn subscriber_count(&self, collection: CollectionName) -> usize {
        self.state()
            .map(|state| {
                state
                    .subscribers
                    .get(&collection)
                    .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for LocalFallbackStore {
    async fn subscribe(&self, collection: CollectionName) -> PortResult<SnapshotStream> {
        let (sender, receiver) = unbounded();
        let mut state = self.state()?;
        // The first snapshot is queued before the caller ever polls.
        sender
            .unbounded_send(Ok(state.snapshot(collection)))
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        state.subscribers.entry(collection).or_default().push(sender);
        Ok(Box::pin(receiver))
    }

    async fn get_document(
        &self,
        collection: CollectionName,
        id: &str,
    ) -> PortResult<Option<Fields>> {
        let state = self.state()?;
        Ok(state
            .collections
            .get(&collection)
            .and_then(|documents| documents.iter().find(|doc| doc.id == id))
            .map(|doc| doc.fields.clone()))
    }

    async fn replace_document(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Fields,
    ) -> PortResult<()> {
        let mut state = self.state()?;
        let documents = state.documents(collection);
        match documents.iter_mut().find(|doc| doc.id == id) {
            Some(doc) => doc.fields = fields,
            None => documents.push(StoredDocument {
                id: id.to_string(),
                fields,
            }),
        }
        state.publish(collection);
        Ok(())
    }

    async fn merge_document(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Fields,
    ) -> PortResult<()> {
        let mut state = self.state()?;
        let documents = state.documents(collection);
        match documents.iter_mut().find(|doc| doc.id == id) {
            Some(doc) => doc.fields.extend(fields),
            None => documents.push(StoredDocument {
                id: id.to_string(),
                fields,
            }),
        }
        state.publish(collection);
        Ok(())
    }

    async fn append_document(
        &self,
        collection: CollectionName,
        fields: Fields,
    ) -> PortResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let mut state = self.state()?;
        state.documents(collection).push(StoredDocument {
            id: id.clone(),
            fields,
        });
        state.publish(collection);
        Ok(id)
    }

    async fn delete_document(&self, collection: CollectionName, id: &str) -> PortResult<()> {
        let mut state = self.state()?;
        state.documents(collection).retain(|doc| doc.id != id);
        state.publish(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[tokio::test]
    async fn subscribe_emits_current_state_immediately() {
        let store = LocalFallbackStore::new();
        store
            .replace_document(CollectionName::Lists, "movies", fields(json!({ "items": [] })))
            .await
            .unwrap();

        let mut stream = store.subscribe(CollectionName::Lists).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.documents.len(), 1);
        assert_eq!(first.documents[0].id, "movies");
    }

    #[tokio::test]
    async fn writes_push_new_snapshots_to_subscribers() {
        let store = LocalFallbackStore::new();
        let mut stream = store.subscribe(CollectionName::Trips).await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().documents.is_empty());

        let id = store
            .append_document(CollectionName::Trips, fields(json!({ "name": "Lisbon", "goals": [] })))
            .await
            .unwrap();
        let after_append = stream.next().await.unwrap().unwrap();
        assert_eq!(after_append.documents[0].id, id);

        store
            .merge_document(CollectionName::Trips, &id, fields(json!({ "goals": [1] })))
            .await
            .unwrap();
        let after_merge = stream.next().await.unwrap().unwrap();
        assert_eq!(after_merge.documents[0].fields["name"], json!("Lisbon"));
        assert_eq!(after_merge.documents[0].fields["goals"], json!([1]));

        store.delete_document(CollectionName::Trips, &id).await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().documents.is_empty());
    }

    #[tokio::test]
    async fn replace_overwrites_every_field() {
        let store = LocalFallbackStore::new();
        store
            .replace_document(CollectionName::Moments, "m", fields(json!({ "title": "a", "phrase": "p" })))
            .await
            .unwrap();
        store
            .replace_document(CollectionName::Moments, "m", fields(json!({ "title": "b" })))
            .await
            .unwrap();

        let mut stream = store.subscribe(CollectionName::Moments).await.unwrap();
        let snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(snapshot.documents[0].fields, fields(json!({ "title": "b" })));
    }

    #[tokio::test]
    async fn merge_keeps_fields_it_does_not_name() {
        let store = LocalFallbackStore::new();
        store
            .replace_document(CollectionName::Trips, "t", fields(json!({ "name": "Rome", "goals": [] })))
            .await
            .unwrap();
        store
            .merge_document(CollectionName::Trips, "t", fields(json!({ "goals": [{ "id": "g" }] })))
            .await
            .unwrap();

        let mut stream = store.subscribe(CollectionName::Trips).await.unwrap();
        let snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(
            snapshot.documents[0].fields,
            fields(json!({ "name": "Rome", "goals": [{ "id": "g" }] }))
        );
    }

    #[tokio::test]
    async fn delete_removes_only_the_named_document() {
        let store = LocalFallbackStore::new();
        let keep = store
            .append_document(CollectionName::Moments, fields(json!({ "title": "keep" })))
            .await
            .unwrap();
        let gone = store
            .append_document(CollectionName::Moments, fields(json!({ "title": "gone" })))
            .await
            .unwrap();
        assert_ne!(keep, gone);

        store.delete_document(CollectionName::Moments, &gone).await.unwrap();

        let mut stream = store.subscribe(CollectionName::Moments).await.unwrap();
        let snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(snapshot.documents.len(), 1);
        assert_eq!(snapshot.documents[0].id, keep);
    }

    #[tokio::test]
    async fn get_reads_the_latest_write() {
        let store = LocalFallbackStore::new();
        assert_eq!(store.get_document(CollectionName::Lists, "music").await.unwrap(), None);

        store
            .replace_document(CollectionName::Lists, "music", fields(json!({ "items": [] })))
            .await
            .unwrap();
        store
            .merge_document(CollectionName::Lists, "music", fields(json!({ "items": [1] })))
            .await
            .unwrap();

        let stored = store.get_document(CollectionName::Lists, "music").await.unwrap();
        assert_eq!(stored, Some(fields(json!({ "items": [1] }))));
    }

    #[tokio::test]
    async fn dropped_streams_are_forgotten() {
        let store = LocalFallbackStore::new();
        let stream = store.subscribe(CollectionName::Lists).await.unwrap();
        assert_eq!(store.subscriber_count(CollectionName::Lists), 1);
        drop(stream);
        assert_eq!(store.subscriber_count(CollectionName::Lists), 0);
    }
}
