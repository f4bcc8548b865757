//! Session endpoints: sign-in, role selection, sign-out.
//!
//! Credentials are checked by the upstream auth provider, which hands the
//! client a signed assertion. `POST /auth/sessions` trades that assertion for
//! a session token and rejects anything it cannot verify with 401.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skilllink_core::{ResourceId, Role};

use crate::AppState;
use crate::error::ApiError;
use crate::session::{CurrentSession, Session};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/current", get(current_session).delete(destroy_session))
        .route("/sessions/current/role", put(select_role))
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    actor_id: ResourceId,
    role: Option<Role>,
    expires_at: DateTime<Utc>,
}

impl SessionResponse {
    fn with_token(session: Session) -> Self {
        Self {
            token: Some(session.token),
            actor_id: session.actor_id,
            role: session.role,
            expires_at: session.expires_at,
        }
    }

    fn without_token(session: Session) -> Self {
        Self {
            token: None,
            ..Self::with_token(session)
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    assertion: String,
    #[serde(default)]
    role: Option<Role>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state.sessions.sign_in(&req.assertion, req.role).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::with_token(session))))
}

async fn current_session(CurrentSession(session): CurrentSession) -> Json<SessionResponse> {
    Json(SessionResponse::without_token(session))
}

#[derive(Debug, Deserialize)]
struct SelectRoleRequest {
    role: Role,
}

async fn select_role(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(req): Json<SelectRoleRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.sessions.select_role(&session.token, req.role).await?;
    Ok(Json(SessionResponse::without_token(session)))
}

async fn destroy_session(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> StatusCode {
    state.sessions.destroy(&session.token).await;
    StatusCode::NO_CONTENT
}
