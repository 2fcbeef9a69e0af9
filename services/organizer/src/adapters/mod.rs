pub mod firebase_auth;
pub mod firestore;
pub mod memory;

pub use firebase_auth::{FirebaseAuthAdapter, IdToken};
pub use firestore::FirestoreAdapter;
pub use memory::LocalFallbackStore;

use casal_core::ports::PortError;
use reqwest::{Response, StatusCode};

/// Maps a transport failure. Not reaching the service at all is `Unavailable`.
pub(crate) fn transport_error(e: reqwest::Error) -> PortError {
    if e.is_connect() || e.is_timeout() {
        PortError::Unavailable(e.to_string())
    } else {
        PortError::Unexpected(e.to_string())
    }
}

/// Turns a non-success HTTP response into the matching `PortError`.
pub(crate) async fn check_status(response: Response) -> Result<Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => PortError::NotFound(body),
        s if s.is_client_error() => PortError::Unauthorized(format!("{}: {}", s, body)),
        s => PortError::Unavailable(format!("{}: {}", s, body)),
    })
}
