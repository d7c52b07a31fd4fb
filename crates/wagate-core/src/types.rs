// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types used across the Wagate workspace.
//!
//! All timestamps are ISO 8601 strings; JSON blobs (message content, auth
//! state, webhook payloads) travel as serialized strings so records stay
//! `Clone` and storage-agnostic.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a WhatsApp session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Direction of a persisted message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Delivery state of a persisted message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Outcome state of a webhook delivery attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Pending,
    Success,
    Failed,
    Retrying,
}

/// Subscription tier of an organization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Starter,
    Pro,
    Enterprise,
}

/// Which usage counter to bump on a persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    MessageSent,
    MessageReceived,
    ApiCall,
}

/// A tenant: the billing-and-isolation boundary owning sessions and messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique organization identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owner user identifier.
    pub owner_id: String,
    /// Subscription tier.
    pub tier: SubscriptionTier,
    /// Advisory cap on concurrent non-error sessions.
    pub max_accounts: u64,
    /// Advisory cap on messages per calendar month.
    pub max_messages_per_month: u64,
    /// Tenant-configured CRM webhook endpoint.
    pub webhook_url: Option<String>,
    /// CRM API key sent as `Authorization: Bearer` on webhook POSTs.
    pub crm_api_key: Option<String>,
    /// CRM location id sent as `X-Location-Id` on webhook POSTs.
    pub crm_location_id: Option<String>,
    /// Bearer credential accepted by the HTTP edge for this org.
    pub api_token: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// A persisted WhatsApp session row.
///
/// `auth_state` is the opaque credential blob from the WhatsApp client
/// library. It never crosses the process boundary: no API response or
/// event bus payload carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier (`[A-Za-z0-9_-]`, at most 100 chars).
    pub session_id: String,
    /// Owning organization.
    pub org_id: String,
    /// Connected phone number, populated once the client reports open.
    pub phone_number: Option<String>,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Opaque serialized credential bundle (tagged-JSON, see `authstate`).
    pub auth_state: Option<String>,
    /// Most recently emitted QR string.
    pub last_qr: Option<String>,
    /// ISO 8601 timestamp of the last status change.
    pub last_seen_at: String,
    /// Terminal error description, when `status` is `error`.
    pub error_message: Option<String>,
    /// Reconnection attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
}

/// Slice of a session row needed to restore it at process start.
#[derive(Debug, Clone)]
pub struct RestorableSession {
    pub session_id: String,
    pub org_id: String,
    pub auth_state: String,
    pub phone_number: Option<String>,
}

/// A persisted message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Internal row identifier.
    pub id: String,
    /// Parent session.
    pub session_id: String,
    /// Parent organization.
    pub org_id: String,
    /// External message id from the WhatsApp client library.
    pub message_id: String,
    /// Inbound or outbound.
    pub direction: MessageDirection,
    /// Sender in wire form (JID or bare digits).
    pub from_number: String,
    /// Recipient in wire form.
    pub to_number: String,
    /// Message type; only `text` is dispatchable outbound.
    pub message_type: String,
    /// Structured content blob, serialized JSON.
    pub content: String,
    /// Delivery state.
    pub status: MessageStatus,
    /// Whether the message belongs to a group chat.
    pub is_group_message: bool,
    /// Group JID when `is_group_message` is set.
    pub group_jid: Option<String>,
    /// Whether at least one webhook delivery succeeded.
    pub synced_to_crm: bool,
    /// CRM-side message id returned by a successful delivery.
    pub crm_message_id: Option<String>,
    /// ISO 8601 message timestamp.
    pub timestamp: String,
}

/// Input for persisting a new message.
#[derive(Debug, Clone)]
pub struct MessageInput {
    pub session_id: String,
    pub org_id: String,
    pub message_id: String,
    pub direction: MessageDirection,
    pub from_number: String,
    pub to_number: String,
    pub message_type: String,
    pub content: String,
    pub status: MessageStatus,
    pub is_group_message: bool,
    pub group_jid: Option<String>,
    pub timestamp: String,
}

/// A session-scoped WhatsApp group record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub session_id: String,
    pub group_jid: String,
    pub name: String,
    pub description: Option<String>,
    pub participant_count: u32,
    pub is_admin: bool,
}

/// Input for upserting a group record; identical shape to [`GroupRecord`].
pub type GroupInput = GroupRecord;

/// Audit row for a single webhook delivery attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLogRecord {
    /// Auto-increment row id.
    pub id: i64,
    pub org_id: String,
    /// Internal message row id this delivery concerns.
    pub message_id: String,
    pub url: String,
    /// Full envelope that was POSTed, serialized JSON.
    pub payload: String,
    pub http_status: Option<u16>,
    pub response_body: Option<String>,
    /// Zero for the initial attempt, then 1..=max for retries.
    pub retry_count: u32,
    pub status: WebhookStatus,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Input for appending a webhook log row.
#[derive(Debug, Clone)]
pub struct WebhookLogInput {
    pub org_id: String,
    pub message_id: String,
    pub url: String,
    pub payload: String,
    pub http_status: Option<u16>,
    pub response_body: Option<String>,
    pub retry_count: u32,
    pub status: WebhookStatus,
    pub error_message: Option<String>,
}

/// Monthly usage counters for an organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub org_id: String,
    /// First day of the calendar month, `YYYY-MM-01`.
    pub period_start: String,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub active_sessions: u64,
    pub api_calls: u64,
}

/// Input for creating an organization.
#[derive(Debug, Clone)]
pub struct OrganizationInput {
    pub name: String,
    pub owner_id: String,
    pub tier: SubscriptionTier,
    pub max_accounts: u64,
    pub max_messages_per_month: u64,
    pub webhook_url: Option<String>,
    pub crm_api_key: Option<String>,
    pub crm_location_id: Option<String>,
}

// --- WhatsApp connector events ---

/// Why the client socket closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit logout from the phone. Terminal: no reconnect.
    LoggedOut,
    /// Upstream rate limiting; reconnect after a long fixed delay.
    RateLimited,
    /// Transport dropped; reconnect with exponential backoff.
    ConnectionLost,
    /// Anything else the client reported.
    Other(String),
}

/// Kind of an incoming message batch.
///
/// Only `Notify` batches are forwarded to tenants; history syncs and edits
/// are ignored for forwarding purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchType {
    Notify,
    History,
    Append,
    Replace,
}

/// One message as delivered by the WhatsApp client library.
#[derive(Debug, Clone)]
pub struct WaMessage {
    /// External message id.
    pub message_id: String,
    /// Sender JID.
    pub from: String,
    /// Recipient JID (the session's own number for inbound).
    pub to: String,
    /// Message type reported by the client (`text`, `image`, ...).
    pub message_type: String,
    /// Structured content; for text messages `{"text": "..."}`.
    pub content: serde_json::Value,
    pub is_group: bool,
    pub group_jid: Option<String>,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

/// A group metadata update from the client.
#[derive(Debug, Clone)]
pub struct GroupUpdate {
    pub group_jid: String,
    pub name: String,
    pub description: Option<String>,
    pub participant_count: u32,
    pub is_admin: bool,
}

/// Events emitted by a live WhatsApp client connection.
#[derive(Debug, Clone)]
pub enum WaEvent {
    /// A QR string to render for pairing.
    Qr(String),
    /// The credential bundle changed; the new blob must be persisted.
    CredsUpdate(String),
    /// The socket is open and authenticated.
    Open { phone_number: String },
    /// The socket closed.
    Close { reason: DisconnectReason },
    /// A batch of incoming messages.
    Messages {
        batch: BatchType,
        messages: Vec<WaMessage>,
    },
    /// Group metadata changed.
    GroupUpdate(GroupUpdate),
}

/// Connection info published when a session reaches `connected`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectInfo {
    pub session_id: String,
    pub phone_number: String,
}

/// Maximum length of a session id.
pub const SESSION_ID_MAX_LEN: usize = 100;

/// Validates a session id: non-empty, at most 100 chars, `[A-Za-z0-9_-]`.
pub fn validate_session_id(id: &str) -> Result<(), crate::WagateError> {
    if id.is_empty() || id.len() > SESSION_ID_MAX_LEN {
        return Err(crate::WagateError::Validation(format!(
            "session id must be 1-{SESSION_ID_MAX_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(crate::WagateError::Validation(
            "session id may only contain letters, digits, '_' and '-'".into(),
        ));
    }
    Ok(())
}
