// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group-management route handlers.
//!
//! All mutating operations require the session to be connected; the group
//! listing falls back to the persisted cache when the session is offline.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use wagate_core::{GroupUpdate, WagateError};

use crate::auth::OrgContext;
use crate::error::ApiError;
use crate::handlers::{owned_session, AckResponse};
use crate::server::GatewayState;

/// One group in listing and metadata responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_jid: String,
    pub name: String,
    pub description: Option<String>,
    pub participant_count: u32,
    pub is_admin: bool,
}

impl From<GroupUpdate> for GroupInfo {
    fn from(update: GroupUpdate) -> Self {
        Self {
            group_jid: update.group_jid,
            name: update.name,
            description: update.description,
            participant_count: update.participant_count,
            is_admin: update.is_admin,
        }
    }
}

/// Request body for `POST /api/groups/:session_id/create`.
#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

/// Request body for participant-list operations.
#[derive(Debug, Deserialize)]
pub struct ParticipantsRequest {
    pub participants: Vec<String>,
}

/// Request body for single-participant operations.
#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    pub participant: String,
}

/// Request body for `POST .../broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
}

/// Response body for `POST .../broadcast`.
#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub recipients: usize,
}

/// Request body for `POST .../settings`.
#[derive(Debug, Deserialize)]
pub struct GroupSettingsRequest {
    pub announcement_only: bool,
}

/// GET /api/groups/:session_id/groups
pub async fn list_groups(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<GroupInfo>>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;

    match state.supervisor.list_groups(&session_id).await {
        Ok(groups) => Ok(Json(groups.into_iter().map(GroupInfo::from).collect())),
        // Offline session: serve the persisted cache.
        Err(WagateError::NotConnected { .. }) => {
            let cached = state.store.list_groups(&session_id).await?;
            Ok(Json(
                cached
                    .into_iter()
                    .map(|g| GroupInfo {
                        group_jid: g.group_jid,
                        name: g.name,
                        description: g.description,
                        participant_count: g.participant_count,
                        is_admin: g.is_admin,
                    })
                    .collect(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/groups/:session_id/create
pub async fn create_group(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path(session_id): Path<String>,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Json<GroupInfo>, ApiError> {
    if body.name.is_empty() {
        return Err(ApiError(WagateError::Validation(
            "group name is required".into(),
        )));
    }
    owned_session(&state, &org.id, &session_id).await?;

    let group = state
        .supervisor
        .create_group(&session_id, &body.name, &body.participants)
        .await?;
    Ok(Json(group.into()))
}

/// GET /api/groups/:session_id/:jid/participants
pub async fn group_participants(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    Ok(Json(
        state.supervisor.group_participants(&session_id, &jid).await?,
    ))
}

/// POST /api/groups/:session_id/:jid/add-participants
pub async fn add_participants(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
    Json(body): Json<ParticipantsRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    state
        .supervisor
        .add_participants(&session_id, &jid, &body.participants)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

/// POST /api/groups/:session_id/:jid/remove-participant
pub async fn remove_participant(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
    Json(body): Json<ParticipantRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    state
        .supervisor
        .remove_participant(&session_id, &jid, &body.participant)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

/// POST /api/groups/:session_id/:jid/promote
pub async fn promote(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
    Json(body): Json<ParticipantRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    state
        .supervisor
        .promote(&session_id, &jid, &body.participant)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

/// POST /api/groups/:session_id/:jid/demote
pub async fn demote(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
    Json(body): Json<ParticipantRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    state
        .supervisor
        .demote(&session_id, &jid, &body.participant)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

/// POST /api/groups/:session_id/:jid/leave
pub async fn leave_group(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    state.supervisor.leave_group(&session_id, &jid).await?;
    Ok(Json(AckResponse { success: true }))
}

/// POST /api/groups/:session_id/:jid/broadcast
pub async fn broadcast(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    if body.message.is_empty() {
        return Err(ApiError(WagateError::Validation(
            "broadcast message is required".into(),
        )));
    }
    owned_session(&state, &org.id, &session_id).await?;
    let recipients = state
        .supervisor
        .broadcast_to_group(&session_id, &jid, &body.message)
        .await?;
    Ok(Json(BroadcastResponse {
        success: true,
        recipients,
    }))
}

/// POST /api/groups/:session_id/:jid/settings
pub async fn group_settings(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
    Json(body): Json<GroupSettingsRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    state
        .supervisor
        .update_group_setting(&session_id, &jid, body.announcement_only)
        .await?;
    Ok(Json(AckResponse { success: true }))
}

/// GET /api/groups/:session_id/:jid/metadata
pub async fn group_metadata(
    State(state): State<GatewayState>,
    Extension(OrgContext(org)): Extension<OrgContext>,
    Path((session_id, jid)): Path<(String, String)>,
) -> Result<Json<GroupInfo>, ApiError> {
    owned_session(&state, &org.id, &session_id).await?;
    let group = state.supervisor.group_metadata(&session_id, &jid).await?;
    Ok(Json(group.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_group_request_defaults_participants() {
        let body: CreateGroupRequest = serde_json::from_str(r#"{"name":"Team"}"#).unwrap();
        assert!(body.participants.is_empty());
    }

    #[test]
    fn group_info_serializes_camel_case() {
        let info = GroupInfo {
            group_jid: "g1@g.us".into(),
            name: "Team".into(),
            description: None,
            participant_count: 4,
            is_admin: true,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["groupJid"], "g1@g.us");
        assert_eq!(json["participantCount"], 4);
        assert_eq!(json["isAdmin"], true);
    }

    #[test]
    fn settings_request_parses() {
        let body: GroupSettingsRequest =
            serde_json::from_str(r#"{"announcement_only":true}"#).unwrap();
        assert!(body.announcement_only);
    }
}
