//! services/organizer/src/sync/identity.rs
//!
//! Resolves the collaborator identity that gates the live subscriptions.

use casal_core::domain::CollaboratorSession;
use casal_core::ports::{AuthService, PortError, PortResult};
use tracing::{info, warn};

/// Obtains a stable collaborator identifier.
///
/// Without an auth collaborator (no store configured) this returns the
/// local-fallback session without awaiting anything. Otherwise it tries, in
/// order: the existing session, the pre-issued token, a new anonymous
/// session. A failed token exchange falls through to anonymous sign-in; a
/// failed anonymous sign-in is fatal and reported as `Unavailable`.
pub async fn resolve(
    auth: Option<&dyn AuthService>,
    token: Option<&str>,
) -> PortResult<CollaboratorSession> {
    let Some(auth) = auth else {
        info!("No backing store configured. Running in local mode; data is neither saved nor shared.");
        return Ok(CollaboratorSession::local_fallback());
    };

    if let Some(uid) = auth.current_identity().await {
        info!("Reusing authenticated session {}", uid);
        return Ok(CollaboratorSession::remote(uid));
    }

    if let Some(token) = token {
        match auth.sign_in_with_token(token).await {
            Ok(uid) => return Ok(CollaboratorSession::remote(uid)),
            Err(e) => warn!("Custom token sign-in failed, trying anonymous: {}", e),
        }
    }

    let uid = auth
        .sign_in_anonymous()
        .await
        .map_err(|e| PortError::Unavailable(format!("anonymous sign-in failed: {}", e)))?;
    Ok(CollaboratorSession::remote(uid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casal_core::domain::SessionMode;
    use futures::FutureExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAuth {
        existing: Option<String>,
        token_works: bool,
        anonymous_works: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeAuth {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthService for FakeAuth {
        async fn current_identity(&self) -> Option<String> {
            self.calls.lock().unwrap().push("current");
            self.existing.clone()
        }

        async fn sign_in_with_token(&self, token: &str) -> PortResult<String> {
            self.calls.lock().unwrap().push("token");
            if self.token_works {
                Ok(format!("uid-{}", token))
            } else {
                Err(PortError::Unauthorized("bad token".to_string()))
            }
        }

        async fn sign_in_anonymous(&self) -> PortResult<String> {
            self.calls.lock().unwrap().push("anonymous");
            if self.anonymous_works {
                Ok("anon-uid".to_string())
            } else {
                Err(PortError::Unavailable("connection refused".to_string()))
            }
        }
    }

    #[test]
    fn no_configuration_resolves_locally_in_one_step() {
        let session = resolve(None, Some("ignored"))
            .now_or_never()
            .expect("local resolution must not suspend")
            .unwrap();
        assert_eq!(session.mode, SessionMode::LocalFallback);
        assert!(session.ready);
        assert_eq!(session.identifier, None);
    }

    #[tokio::test]
    async fn existing_session_is_reused() {
        let auth = FakeAuth {
            existing: Some("known".to_string()),
            ..Default::default()
        };
        let session = resolve(Some(&auth), Some("tok")).await.unwrap();
        assert_eq!(session.identifier.as_deref(), Some("known"));
        assert_eq!(auth.calls(), vec!["current"]);
    }

    #[tokio::test]
    async fn token_is_preferred_over_anonymous() {
        let auth = FakeAuth {
            token_works: true,
            anonymous_works: true,
            ..Default::default()
        };
        let session = resolve(Some(&auth), Some("abc")).await.unwrap();
        assert_eq!(session.identifier.as_deref(), Some("uid-abc"));
        assert_eq!(session.mode, SessionMode::Remote);
        assert_eq!(auth.calls(), vec!["current", "token"]);
    }

    #[tokio::test]
    async fn failed_token_falls_back_to_anonymous() {
        let auth = FakeAuth {
            anonymous_works: true,
            ..Default::default()
        };
        let session = resolve(Some(&auth), Some("expired")).await.unwrap();
        assert_eq!(session.identifier.as_deref(), Some("anon-uid"));
        assert_eq!(auth.calls(), vec!["current", "token", "anonymous"]);
    }

    #[tokio::test]
    async fn anonymous_failure_is_fatal() {
        let auth = FakeAuth::default();
        let result = resolve(Some(&auth), None).await;
        assert!(matches!(result, Err(PortError::Unavailable(_))));
        assert_eq!(auth.calls(), vec!["current", "anonymous"]);
    }
}
