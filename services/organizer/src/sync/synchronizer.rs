//! services/organizer/src/sync/synchronizer.rs
//!
//! The Collection Synchronizer: one live subscription per collection, each
//! running as a background task that folds snapshots into the shared view.

use casal_core::domain::{ChecklistCategory, CollectionName, Moment, Trip};
use casal_core::normalize::{
    checklist_fields, checklist_from_snapshot, moment_from_document, trip_from_document,
    NormalizeError,
};
use casal_core::ports::{DocumentStore, PortError, Snapshot, SnapshotStream, StoredDocument};
use futures::{FutureExt, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::SharedView;

/// Owns the subscription tasks. Dropping it without `shutdown` leaves the
/// tasks running until the store ends their streams.
pub struct SyncHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Cancels every subscription and waits for the tasks to drop their streams.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Subscription task ended abnormally: {}", e);
            }
        }
        info!("All live subscriptions closed.");
    }
}

/// Opens the three subscriptions. A collection whose subscription cannot be
/// opened gets its error recorded; the others still start.
pub async fn start(store: Arc<dyn DocumentStore>, view: SharedView) -> SyncHandle {
    let cancel = CancellationToken::new();
    let mut tasks = Vec::with_capacity(CollectionName::ALL.len());

    for collection in CollectionName::ALL {
        match store.subscribe(collection).await {
            Ok(stream) => {
                debug!("Subscribed to {}", collection);
                tasks.push(tokio::spawn(run_subscription(
                    collection,
                    stream,
                    store.clone(),
                    view.clone(),
                    cancel.child_token(),
                )));
            }
            Err(e) => record_error(&view, collection, &e),
        }
    }

    SyncHandle { cancel, tasks }
}

async fn run_subscription(
    collection: CollectionName,
    mut stream: SnapshotStream,
    store: Arc<dyn DocumentStore>,
    view: SharedView,
    cancel: CancellationToken,
) {
    let mut created = BTreeSet::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(snapshot)) => {
                let (snapshot, tail) = newest_ready(&mut stream, snapshot);
                apply_snapshot(collection, &snapshot, store.as_ref(), &view, &mut created).await;
                match tail {
                    Tail::Open => {}
                    Tail::Failed(e) => {
                        record_error(&view, collection, &e);
                        break;
                    }
                    Tail::Ended => {
                        debug!("Subscription to {} ended by the store", collection);
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                record_error(&view, collection, &e);
                break;
            }
            None => {
                debug!("Subscription to {} ended by the store", collection);
                break;
            }
        }
    }
}

/// What followed the newest snapshot already waiting on a stream.
#[derive(Debug)]
enum Tail {
    Open,
    Failed(PortError),
    Ended,
}

/// Takes every snapshot the stream has ready without waiting and keeps only
/// the newest, so an older queued snapshot never lands after a newer one.
fn newest_ready(stream: &mut SnapshotStream, mut snapshot: Snapshot) -> (Snapshot, Tail) {
    let mut skipped = 0;
    let tail = loop {
        match stream.next().now_or_never() {
            Some(Some(Ok(newer))) => {
                snapshot = newer;
                skipped += 1;
            }
            Some(Some(Err(e))) => break Tail::Failed(e),
            Some(None) => break Tail::Ended,
            None => break Tail::Open,
        }
    };
    if skipped > 0 {
        debug!("Skipped {} superseded snapshots", skipped);
    }
    (snapshot, tail)
}

/// Folds one snapshot into the view and marks the collection as loaded.
///
/// For the checklist collection, every category missing from the snapshot is
/// first created as an empty document, so the view always holds all five.
/// `created` remembers what this subscription already created; a snapshot
/// taken before that write landed must not overwrite it again.
pub async fn apply_snapshot(
    collection: CollectionName,
    snapshot: &Snapshot,
    store: &dyn DocumentStore,
    view: &SharedView,
    created: &mut BTreeSet<ChecklistCategory>,
) {
    match collection {
        CollectionName::Lists => {
            let (mut lists, missing) = checklist_from_snapshot(snapshot);
            for category in missing {
                if created.insert(category) {
                    info!("Creating missing checklist '{}'", category);
                    if let Err(e) = store
                        .replace_document(collection, category.as_str(), checklist_fields(&[]))
                        .await
                    {
                        warn!("Failed to create checklist '{}': {}", category, e);
                    }
                }
                lists.insert(category, Vec::new());
            }
            view.send_if_modified(|current| {
                let newly_loaded = current.load.loaded.insert(collection);
                let changed = newly_loaded || current.lists != lists;
                current.lists = lists;
                changed
            });
        }
        CollectionName::Moments => {
            let moments: Vec<Moment> = normalize_all(&snapshot.documents, moment_from_document);
            view.send_if_modified(|current| {
                let newly_loaded = current.load.loaded.insert(collection);
                let changed = newly_loaded || current.moments != moments;
                current.moments = moments;
                changed
            });
        }
        CollectionName::Trips => {
            let trips: Vec<Trip> = normalize_all(&snapshot.documents, trip_from_document);
            view.send_if_modified(|current| {
                let newly_loaded = current.load.loaded.insert(collection);
                let changed = newly_loaded || current.trips != trips;
                current.trips = trips;
                changed
            });
        }
    }
}

fn normalize_all<T>(
    documents: &[StoredDocument],
    normalize: fn(&StoredDocument) -> Result<T, NormalizeError>,
) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match normalize(doc) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("Skipping document: {}", e);
                None
            }
        })
        .collect()
}

fn record_error(view: &SharedView, collection: CollectionName, e: &PortError) {
    error!("Failed to load {}: {}", collection, e);
    view.send_modify(|current| {
        current
            .load
            .errors
            .insert(collection, format!("Failed to load {}: {}", collection, e));
    });
}
