//! services/organizer/src/web/state.rs
//!
//! Defines the application state shared by every HTTP and WebSocket handler.

use crate::config::Config;
use crate::sync::coordinator::MutationCoordinator;
use casal_core::domain::{CollaboratorSession, OrganizerView};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub collaborator: CollaboratorSession,
    pub coordinator: Arc<MutationCoordinator>,
    pub view: watch::Receiver<OrganizerView>,
    /// Cancelled when the server starts shutting down; live sockets close on it.
    pub shutdown: CancellationToken,
}
