//! services/organizer/src/adapters/firebase_auth.rs
//!
//! This module contains the adapter for the Firebase Identity Toolkit REST API.
//! It implements the `AuthService` port from the `core` crate.

use async_trait::async_trait;
use casal_core::ports::{AuthService, PortError, PortResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{check_status, transport_error};

const IDENTITY_TOOLKIT_API: &str = "https://identitytoolkit.googleapis.com/v1";

/// The bearer token of the signed-in collaborator, shared with the store adapter.
pub type IdToken = Arc<RwLock<Option<String>>>;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `AuthService` port using Firebase Auth.
#[derive(Clone)]
pub struct FirebaseAuthAdapter {
    client: Client,
    api_key: String,
    uid: Arc<RwLock<Option<String>>>,
    id_token: IdToken,
}

impl FirebaseAuthAdapter {
    /// Creates a new `FirebaseAuthAdapter`.
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            uid: Arc::new(RwLock::new(None)),
            id_token: Arc::new(RwLock::new(None)),
        }
    }

    /// The token handle the document store attaches to its requests.
    pub fn id_token(&self) -> IdToken {
        self.id_token.clone()
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> PortResult<T> {
        let url = format!("{}/accounts:{}", IDENTITY_TOOLKIT_API, method);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    // TODO: refresh the id token through the securetoken endpoint before it
    // expires; sessions longer than an hour currently lose write access.
    async fn remember(&self, uid: String, id_token: String) -> String {
        *self.id_token.write().await = Some(id_token);
        *self.uid.write().await = Some(uid.clone());
        uid
    }
}

//=========================================================================================
// "Impure" REST Response Structs
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    local_id: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for FirebaseAuthAdapter {
    async fn current_identity(&self) -> Option<String> {
        self.uid.read().await.clone()
    }

    async fn sign_in_with_token(&self, token: &str) -> PortResult<String> {
        let signed_in: SignInResponse = self
            .call(
                "signInWithCustomToken",
                json!({ "token": token, "returnSecureToken": true }),
            )
            .await?;

        // The custom-token exchange does not return the uid; look it up.
        let uid = match signed_in.local_id {
            Some(uid) => uid,
            None => {
                let lookup: LookupResponse = self
                    .call("lookup", json!({ "idToken": &signed_in.id_token }))
                    .await?;
                lookup
                    .users
                    .into_iter()
                    .next()
                    .map(|user| user.local_id)
                    .ok_or_else(|| PortError::NotFound("user for custom token".to_string()))?
            }
        };
        info!("Signed in with custom token as {}", uid);
        Ok(self.remember(uid, signed_in.id_token).await)
    }

    async fn sign_in_anonymous(&self) -> PortResult<String> {
        let signed_in: SignInResponse = self
            .call("signUp", json!({ "returnSecureToken": true }))
            .await?;
        let uid = signed_in
            .local_id
            .ok_or_else(|| PortError::Unexpected("anonymous sign-up returned no uid".to_string()))?;
        info!("Signed in anonymously as {}", uid);
        Ok(self.remember(uid, signed_in.id_token).await)
    }
}
