//! services/organizer/src/web/protocol.rs
//!
//! Defines the messages the server pushes over the `/live` WebSocket. The
//! channel is one-way: clients change data through the REST endpoints.

use serde::Serialize;

use super::rest::StateResponse;

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full current state, sent on connect and after every change.
    State(Box<StateResponse>),

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },

    /// The server is shutting down and is about to close the connection.
    Closing,
}
