//! services/organizer/src/sync/mod.rs
//!
//! The organizer session: identity resolution, live collection
//! synchronization, and the mutation coordinator, wired around one shared view.

pub mod coordinator;
pub mod identity;
pub mod synchronizer;

use casal_core::domain::{CollaboratorSession, OrganizerView, SessionMode};
use casal_core::ports::{AuthService, DocumentStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::adapters::LocalFallbackStore;
use coordinator::MutationCoordinator;
use synchronizer::SyncHandle;

/// The live view every component reads from. Writers use `send_modify` and
/// friends, which succeed whether or not anyone is watching.
pub type SharedView = Arc<watch::Sender<OrganizerView>>;

/// Where the session keeps its data.
pub enum Backend {
    /// In-process only; nothing is persisted or shared.
    Local(Arc<LocalFallbackStore>),
    Remote {
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthService>,
    },
}

/// One collaborator's connection to the shared organizer.
pub struct OrganizerSession {
    collaborator: CollaboratorSession,
    view: SharedView,
    coordinator: Arc<MutationCoordinator>,
    sync: Option<SyncHandle>,
}

impl OrganizerSession {
    /// Resolves the collaborator identity, then opens the live subscriptions.
    ///
    /// A failed identity resolution does not return an error: the session
    /// comes up with `fatal_error` set in the view, no subscriptions, and a
    /// coordinator that rejects every mutation.
    pub async fn connect(backend: Backend, auth_token: Option<&str>) -> Self {
        let (sender, _) = watch::channel(OrganizerView::default());
        let view: SharedView = Arc::new(sender);

        let (store, resolved) = match backend {
            Backend::Local(store) => {
                let store: Arc<dyn DocumentStore> = store;
                (store, identity::resolve(None, auth_token).await)
            }
            Backend::Remote { store, auth } => {
                let resolved = identity::resolve(Some(auth.as_ref()), auth_token).await;
                (store, resolved)
            }
        };

        match resolved {
            Ok(collaborator) => {
                info!(
                    "Session ready ({:?}) for {}",
                    collaborator.mode,
                    collaborator.identifier.as_deref().unwrap_or("local collaborator")
                );
                let sync = synchronizer::start(store.clone(), view.clone()).await;
                let coordinator =
                    MutationCoordinator::new(Some(store), collaborator.mode, view.clone());
                Self {
                    collaborator,
                    view,
                    coordinator: Arc::new(coordinator),
                    sync: Some(sync),
                }
            }
            Err(e) => {
                error!("Could not establish a collaborator identity: {}", e);
                view.send_modify(|current| {
                    current.load.fatal_error = Some(format!("Authentication failed: {}", e));
                });
                let collaborator = CollaboratorSession {
                    identifier: None,
                    ready: false,
                    mode: SessionMode::Remote,
                };
                let coordinator = MutationCoordinator::new(None, collaborator.mode, view.clone());
                Self {
                    collaborator,
                    view,
                    coordinator: Arc::new(coordinator),
                    sync: None,
                }
            }
        }
    }

    pub fn view(&self) -> watch::Receiver<OrganizerView> {
        self.view.subscribe()
    }

    pub fn coordinator(&self) -> Arc<MutationCoordinator> {
        self.coordinator.clone()
    }

    pub fn collaborator(&self) -> &CollaboratorSession {
        &self.collaborator
    }

    /// Closes every live subscription. Safe to call on a failed session.
    pub async fn shutdown(self) {
        if let Some(sync) = self.sync {
            sync.shutdown().await;
        }
    }
}
