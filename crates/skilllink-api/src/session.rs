//! Session context.
//!
//! A session is opened from a sign-in assertion signed by the auth provider
//! and destroyed on sign-out. Handlers receive it explicitly through the
//! [`CurrentSession`] extractor; there is no process-wide "current user".

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use skilllink_core::{Actor, ProviderKey, ResourceId, Role};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub actor_id: ResourceId,
    /// Unset until the user completes role selection.
    pub role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// The actor for job operations. Requires a selected role.
    pub fn actor(&self) -> Result<Actor, ApiError> {
        self.role
            .map(|role| Actor::new(self.actor_id, role))
            .ok_or_else(|| ApiError::Forbidden("select a role before using jobs".to_string()))
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct Sessions {
    by_token: HashMap<String, Session>,
    /// Role each actor has chosen. An actor keeps it across sessions.
    roles: HashMap<ResourceId, Role>,
}

impl Sessions {
    /// Pin `role` for the actor, or fail if it already has a different one.
    fn pin_role(&mut self, actor_id: ResourceId, role: Role) -> Result<(), ApiError> {
        match self.roles.get(&actor_id) {
            Some(current) if *current != role => Err(ApiError::Conflict(format!(
                "role already set to {}",
                current
            ))),
            _ => {
                self.roles.insert(actor_id, role);
                Ok(())
            }
        }
    }
}

pub struct SessionStore {
    inner: RwLock<Sessions>,
    ttl: Duration,
    provider_key: ProviderKey,
}

impl SessionStore {
    pub fn new(ttl: Duration, provider_key: ProviderKey) -> Self {
        Self {
            inner: RwLock::new(Sessions {
                by_token: HashMap::new(),
                roles: HashMap::new(),
            }),
            ttl,
            provider_key,
        }
    }

    /// Open a session for the actor vouched for by a provider assertion.
    pub async fn sign_in(&self, assertion: &str, role: Option<Role>) -> Result<Session, ApiError> {
        let actor_id = self
            .provider_key
            .verify(assertion, Utc::now())
            .map_err(|e| {
                warn!(error = %e, "Sign-in assertion rejected");
                ApiError::Unauthenticated(e.to_string())
            })?;
        self.create(actor_id, role).await
    }

    /// Open a session for an already authenticated actor. Without an explicit
    /// role the session takes the role the actor chose before, if any.
    pub async fn create(
        &self,
        actor_id: ResourceId,
        role: Option<Role>,
    ) -> Result<Session, ApiError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        inner.by_token.retain(|_, s| !s.is_expired(now));

        if let Some(role) = role {
            inner.pin_role(actor_id, role)?;
        }
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            actor_id,
            role: inner.roles.get(&actor_id).copied(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        inner
            .by_token
            .insert(session.token.clone(), session.clone());
        info!(actor_id = %actor_id, "Session created");
        Ok(session)
    }

    /// Look up a live session. Expired sessions are dropped on sight.
    pub async fn resolve(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        {
            let inner = self.inner.read().await;
            match inner.by_token.get(token) {
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.inner.write().await.by_token.remove(token);
        None
    }

    /// Record the user's role. An actor chooses a role once.
    pub async fn select_role(&self, token: &str, role: Role) -> Result<Session, ApiError> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let actor_id = inner
            .by_token
            .get(token)
            .filter(|s| !s.is_expired(now))
            .map(|s| s.actor_id)
            .ok_or_else(|| ApiError::Unauthenticated("session expired".to_string()))?;

        inner.pin_role(actor_id, role)?;
        let session = inner
            .by_token
            .get_mut(token)
            .ok_or_else(|| ApiError::Unauthenticated("session expired".to_string()))?;
        session.role = Some(role);
        info!(actor_id = %actor_id, role = %role, "Role selected");
        Ok(session.clone())
    }

    pub async fn destroy(&self, token: &str) -> bool {
        let removed = self.inner.write().await.by_token.remove(token);
        if let Some(session) = &removed {
            info!(actor_id = %session.actor_id, "Session destroyed");
        }
        removed.is_some()
    }

    /// Drop every expired session; returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let before = inner.by_token.len();
        inner.by_token.retain(|_, s| !s.is_expired(now));
        let purged = before - inner.by_token.len();
        if purged > 0 {
            debug!(purged, "Expired sessions purged");
        }
        purged
    }

    /// Number of sessions held, live or not yet purged.
    pub async fn len(&self) -> usize {
        self.inner.read().await.by_token.len()
    }
}

/// The authenticated session of the request, from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))?;

        state
            .sessions
            .resolve(token)
            .await
            .map(CurrentSession)
            .ok_or_else(|| ApiError::Unauthenticated("invalid or expired session".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "session-test-provider-key";

    fn store(ttl: Duration) -> SessionStore {
        SessionStore::new(ttl, ProviderKey::new(KEY).unwrap())
    }

    #[tokio::test]
    async fn test_create_resolve_destroy() {
        let store = store(Duration::minutes(5));
        let actor_id = ResourceId::new();
        let session = store.create(actor_id, Some(Role::Client)).await.unwrap();

        let resolved = store.resolve(&session.token).await.unwrap();
        assert_eq!(resolved.actor_id, actor_id);
        assert_eq!(resolved.actor().unwrap(), Actor::client(actor_id));

        assert!(store.destroy(&session.token).await);
        assert!(store.resolve(&session.token).await.is_none());
        assert!(!store.destroy(&session.token).await);
    }

    #[tokio::test]
    async fn test_sign_in_requires_valid_assertion() {
        let store = store(Duration::minutes(5));
        let actor_id = ResourceId::new();

        let assertion = ProviderKey::new(KEY)
            .unwrap()
            .sign(actor_id, Utc::now())
            .unwrap();
        let session = store.sign_in(&assertion, Some(Role::Client)).await.unwrap();
        assert_eq!(session.actor_id, actor_id);

        let forged = ProviderKey::new("not-the-provider-key")
            .unwrap()
            .sign(actor_id, Utc::now())
            .unwrap();
        let err = store.sign_in(&forged, Some(Role::Client)).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
        assert!(matches!(
            store.sign_in("", None).await,
            Err(ApiError::Unauthenticated(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let store = store(Duration::zero());
        let session = store
            .create(ResourceId::new(), Some(Role::Technician))
            .await
            .unwrap();
        assert!(store.resolve(&session.token).await.is_none());
    }

    #[tokio::test]
    async fn test_abandoned_sessions_do_not_accumulate() {
        let store = store(Duration::zero());
        for _ in 0..100 {
            store.create(ResourceId::new(), None).await.unwrap();
        }
        // Each create sweeps the ones before it.
        assert_eq!(store.len().await, 1);
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_live_sessions() {
        let store = store(Duration::minutes(5));
        store.create(ResourceId::new(), None).await.unwrap();
        assert_eq!(store.purge_expired().await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_role_selection_is_one_shot() {
        let store = store(Duration::minutes(5));
        let session = store.create(ResourceId::new(), None).await.unwrap();
        assert!(matches!(session.actor(), Err(ApiError::Forbidden(_))));

        let chosen = store
            .select_role(&session.token, Role::Technician)
            .await
            .unwrap();
        assert_eq!(chosen.role, Some(Role::Technician));

        // Re-selecting the same role is harmless; switching is not.
        assert!(store.select_role(&session.token, Role::Technician).await.is_ok());
        let err = store
            .select_role(&session.token, Role::Client)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_role_survives_new_sessions() {
        let store = store(Duration::minutes(5));
        let actor_id = ResourceId::new();
        store.create(actor_id, Some(Role::Client)).await.unwrap();

        let err = store
            .create(actor_id, Some(Role::Technician))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        // A role-less sign-in picks the pinned role back up.
        let again = store.create(actor_id, None).await.unwrap();
        assert_eq!(again.role, Some(Role::Client));
        let err = store
            .select_role(&again.token, Role::Technician)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
