//! services/organizer/src/web/live.rs
//!
//! The `/live` WebSocket: pushes the full state on connect and after every
//! change of the shared view, until the client leaves or the server stops.

use crate::web::{protocol::ServerMessage, rest::StateResponse, state::AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use casal_core::domain::OrganizerView;
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type LiveSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn live_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    info!("Live connection {} opened", connection_id);

    let (mut sender, mut receiver) = socket.split();
    let mut view = app_state.view.clone();

    let fatal_error = view.borrow().load.fatal_error.clone();
    if let Some(message) = fatal_error {
        if let Err(e) = send(&mut sender, &ServerMessage::Error { message }).await {
            debug!("Could not send the session error to {}: {}", connection_id, e);
        }
    }
    if send_state(&mut sender, &mut view, &app_state).await.is_err() {
        warn!("Live connection {} dropped before the first state", connection_id);
        return;
    }

    loop {
        tokio::select! {
            _ = app_state.shutdown.cancelled() => {
                if let Err(e) = send(&mut sender, &ServerMessage::Closing).await {
                    debug!("Could not tell {} the server is closing: {}", connection_id, e);
                }
                break;
            }
            changed = view.changed() => {
                if changed.is_err() {
                    debug!("Shared view closed; ending live connection {}", connection_id);
                    break;
                }
                if send_state(&mut sender, &mut view, &app_state).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => debug!("Ignoring client frame on live connection {}", connection_id),
            }
        }
    }

    if let Err(e) = sender.close().await {
        debug!("Live connection {} did not close cleanly: {}", connection_id, e);
    }
    info!("Live connection {} closed", connection_id);
}

async fn send_state(
    sender: &mut LiveSender,
    view: &mut watch::Receiver<OrganizerView>,
    app_state: &AppState,
) -> Result<(), axum::Error> {
    let state = {
        let current = view.borrow_and_update();
        StateResponse::build(&current, &app_state.collaborator)
    };
    send(sender, &ServerMessage::State(Box::new(state))).await
}

async fn send(sender: &mut LiveSender, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            error!("Failed to serialize live message: {}", e);
            Ok(())
        }
    }
}
