//! services/organizer/src/adapters/firestore.rs
//!
//! The remote document-store adapter. It implements the `DocumentStore` port on
//! top of the Firestore REST API, emulating live queries by polling.

use async_trait::async_trait;
use casal_core::domain::CollectionName;
use casal_core::ports::{
    DocumentStore, Fields, PortError, PortResult, Snapshot, SnapshotStream, StoredDocument,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use super::{check_status, transport_error, IdToken};

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: &str = "300";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store adapter for the shared `artifacts/{appId}/public/data` namespace.
#[derive(Clone)]
pub struct FirestoreAdapter {
    client: Client,
    data_root: String,
    poll_interval: Duration,
    id_token: IdToken,
    /// Bumped after each successful write so open subscriptions re-poll at once.
    writes: Arc<watch::Sender<u64>>,
}

impl FirestoreAdapter {
    /// Creates a new `FirestoreAdapter`.
    pub fn new(
        client: Client,
        project_id: &str,
        app_id: &str,
        poll_interval: Duration,
        id_token: IdToken,
    ) -> Self {
        Self {
            client,
            data_root: data_root(project_id, app_id),
            poll_interval,
            id_token,
            writes: Arc::new(watch::channel(0).0),
        }
    }

    fn wrote(&self) {
        self.writes.send_modify(|count| *count += 1);
    }

    fn collection_url(&self, collection: CollectionName) -> String {
        format!("{}/{}", self.data_root, collection.as_str())
    }

    fn document_url(&self, collection: CollectionName, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        let request = match self.id_token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(transport_error)?;
        check_status(response).await
    }

    /// Reads every document of a collection, following pagination.
    async fn list_documents(&self, collection: CollectionName) -> PortResult<Snapshot> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let request = self.client.get(self.collection_url(collection)).query(&query);
            let page: ListDocumentsResponse = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;

            documents.extend(page.documents.into_iter().map(DocumentResource::to_domain));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(Snapshot { documents })
    }
}

/// Emulates a live query: calls `list` now, then again whenever `interval`
/// passes or `writes` changes. A snapshot is yielded on the first read and
/// on every change after it. A failed read is yielded once and ends the stream.
fn poll_snapshots<F, Fut>(
    mut list: F,
    interval: Duration,
    mut writes: watch::Receiver<u64>,
) -> SnapshotStream
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = PortResult<Snapshot>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut last: Option<Snapshot> = None;
        loop {
            writes.borrow_and_update();
            match list().await {
                Ok(snapshot) => {
                    if last.as_ref() != Some(&snapshot) {
                        last = Some(snapshot.clone());
                        yield Ok(snapshot);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = writes.changed() => {
                    if changed.is_err() {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }
    })
}

/// The four-segment prefix under which the three collections live.
pub fn data_root(project_id: &str, app_id: &str) -> String {
    format!(
        "{}/projects/{}/databases/(default)/documents/artifacts/{}/public/data",
        FIRESTORE_API, project_id, app_id
    )
}

//=========================================================================================
// "Impure" REST Resource Structs
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<DocumentResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DocumentResource {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}
impl DocumentResource {
    fn id(&self) -> String {
        self.name.rsplit('/').next().unwrap_or_default().to_string()
    }

    fn to_domain(self) -> StoredDocument {
        StoredDocument {
            id: self.id(),
            fields: self.fields.as_ref().map(decode_fields).unwrap_or_default(),
        }
    }
}

//=========================================================================================
// Typed Value Codec
//=========================================================================================

/// Encodes plain JSON fields into Firestore's typed `fields` object.
pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Decodes Firestore's typed `fields` object into plain JSON fields.
pub fn decode_fields(fields: &Value) -> Fields {
    fields
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(key, value)| (key.clone(), decode_value(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|map| map.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "booleanValue" | "doubleValue" | "timestampValue" | "referenceValue" => {
            inner.clone()
        }
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        },
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(inner.get("fields").map(decode_fields).unwrap_or_default()),
        _ => Value::Null,
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for FirestoreAdapter {
    /// Polls the collection on an interval, and right after this adapter's
    /// own writes.
    async fn subscribe(&self, collection: CollectionName) -> PortResult<SnapshotStream> {
        let adapter = self.clone();
        let writes = self.writes.subscribe();
        Ok(poll_snapshots(
            move || {
                let adapter = adapter.clone();
                async move { adapter.list_documents(collection).await }
            },
            self.poll_interval,
            writes,
        ))
    }

    async fn get_document(
        &self,
        collection: CollectionName,
        id: &str,
    ) -> PortResult<Option<Fields>> {
        let request = self.client.get(self.document_url(collection, id));
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(PortError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let resource: DocumentResource = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Some(resource.to_domain().fields))
    }

    async fn replace_document(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Fields,
    ) -> PortResult<()> {
        debug!("Replacing {}/{}", collection, id);
        let request = self
            .client
            .patch(self.document_url(collection, id))
            .json(&json!({ "fields": encode_fields(&fields) }));
        self.send(request).await?;
        self.wrote();
        Ok(())
    }

    async fn merge_document(
        &self,
        collection: CollectionName,
        id: &str,
        fields: Fields,
    ) -> PortResult<()> {
        debug!("Merging {:?} into {}/{}", fields.keys().collect::<Vec<_>>(), collection, id);
        let mask: Vec<(&str, &str)> = fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.as_str()))
            .collect();
        let request = self
            .client
            .patch(self.document_url(collection, id))
            .query(&mask)
            .json(&json!({ "fields": encode_fields(&fields) }));
        self.send(request).await?;
        self.wrote();
        Ok(())
    }

    async fn append_document(
        &self,
        collection: CollectionName,
        fields: Fields,
    ) -> PortResult<String> {
        let request = self
            .client
            .post(self.collection_url(collection))
            .json(&json!({ "fields": encode_fields(&fields) }));
        let created: DocumentResource = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.wrote();
        Ok(created.id())
    }

    async fn delete_document(&self, collection: CollectionName, id: &str) -> PortResult<()> {
        self.send(self.client.delete(self.document_url(collection, id)))
            .await?;
        self.wrote();
        Ok(())
    }
}
