// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers: health, sessions, messages, usage.
//!
//! Session routes verify tenant ownership before acting; the auth-state
//! blob never appears in any response shape.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use wagate_core::{SessionStatus, UsageRecord, WagateError};

use crate::auth::OrgContext;
use crate::error::ApiError;
use crate::limits;
use crate::server::GatewayState;

/// Response body for `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since process start.
    pub uptime: u64,
    /// ISO 8601 server time.
    pub timestamp: String,
}

/// Request body for `POST /api/sessions/create`.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub session_id: String,
    /// Accepted for dashboard compatibility; not used by the core.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sub_account_id: Option<String>,
}

/// Response body for `POST /api/sessions/create`.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_id: String,
}

/// One session row in `GET /api/sessions`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub status: SessionStatus,
    pub phone_number: Option<String>,
    pub created_at: String,
}

/// Response body for `GET /api/sessions/:id/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub phone_number: Option<String>,
    pub reconnect_attempts: u32,
    pub last_seen_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Request body for `POST /api/messages/:session_id/send`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub message: String,
    /// Defaults to `text`; anything else is rejected.
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "text".to_string()
}

/// Response body for `POST /api/messages/:session_id/send`.
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub queue_id: String,
}

/// Generic success acknowledgement.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

/// GET /api/health (unauthenticated).
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string(),
    })
}

/// POST /api/sessions/create
pub async fn create_session(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    limits::check_account_limit(&state.store, &org).await?;

    state
        .supervisor
        .create_session(&body.session_id, &org.id)
        .await?;

    Ok(Json(CreateSessionResponse {
        success: true,
        session_id: body.session_id,
    }))
}

/// GET /api/sessions
pub async fn list_sessions(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    let sessions = state.store.list_sessions(&org.id).await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionInfo {
                session_id: s.session_id,
                status: s.status,
                phone_number: s.phone_number,
                created_at: s.created_at,
            })
            .collect(),
    ))
}

/// GET /api/sessions/:id/status
pub async fn session_status(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = owned_session(&state, &org.id, &session_id).await?;

    // Prefer the live registry view over the persisted row.
    let (status, phone_number) = match state.supervisor.session_status(&session_id).await {
        Some((status, phone)) => (status, phone.or(session.phone_number)),
        None => (session.status, session.phone_number),
    };

    Ok(Json(SessionStatusResponse {
        session_id: session.session_id,
        status,
        phone_number,
        reconnect_attempts: session.reconnect_attempts,
        last_seen_at: session.last_seen_at,
        error_message: session.error_message,
    }))
}

/// POST /api/sessions/:id/disconnect
pub async fn disconnect_session(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path(session_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;

    state.queue.remove_session(&session_id);
    state.supervisor.destroy_session(&session_id).await?;

    Ok(Json(AckResponse { success: true }))
}

/// POST /api/messages/:session_id/send
pub async fn send_message(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path(session_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    if body.to.is_empty() || body.message.is_empty() {
        return Err(ApiError(WagateError::Validation(
            "both 'to' and 'message' are required".into(),
        )));
    }
    owned_session(&state, &org.id, &session_id).await?;
    limits::check_message_limit(&state.store, &org).await?;

    let queue_id = state
        .queue
        .enqueue(&session_id, &org.id, &body.to, &body.message, &body.message_type)
        .await?;

    Ok(Json(SendMessageResponse {
        success: true,
        queue_id,
    }))
}

/// GET /api/usage
pub async fn get_usage(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
) -> Result<Json<UsageRecord>, ApiError> {
    Ok(Json(state.store.month_usage(&org.id).await?))
}

/// Loads the session and verifies it belongs to the caller's org.
///
/// A foreign session id reads the same as a missing one.
pub(crate) async fn owned_session(
    state: &GatewayState,
    org_id: &str,
    session_id: &str,
) -> Result<wagate_core::SessionRecord, ApiError> {
    let session = state
        .store
        .get_session(session_id)
        .await?
        .filter(|s| s.org_id == org_id);
    session.ok_or_else(|| {
        ApiError(WagateError::Validation(format!(
            "unknown session: {session_id}"
        )))
    })
}

/// 404 fallback for unmatched API routes.
pub async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}
