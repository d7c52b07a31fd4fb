// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence contract for organizations, sessions, messages, groups,
//! webhook logs, and usage counters.
//!
//! Callers never construct SQL; the store sits behind this trait so tests
//! can supply an in-memory implementation. Upserts (auth state, usage
//! counters) must be atomic with respect to concurrent readers. The store
//! never mutates records on its own initiative.

use async_trait::async_trait;

use crate::error::WagateError;
use crate::types::{
    GroupInput, GroupRecord, MessageInput, MessageRecord, MessageStatus, Organization,
    OrganizationInput, RestorableSession, SessionRecord, SessionStatus, UsageKind, UsageRecord,
    WebhookLogInput, WebhookLogRecord,
};

/// Durable record store for all Wagate entities.
#[async_trait]
pub trait SessionStore: Send + Sync {
    // --- Organizations ---

    /// Creates an organization with a freshly minted API token.
    async fn create_organization(
        &self,
        input: OrganizationInput,
    ) -> Result<Organization, WagateError>;

    async fn get_organization(&self, org_id: &str) -> Result<Option<Organization>, WagateError>;

    /// Resolves an organization from an edge bearer token.
    async fn get_organization_by_token(
        &self,
        api_token: &str,
    ) -> Result<Option<Organization>, WagateError>;

    /// Organizations with a configured webhook URL (backfill targets).
    async fn list_organizations_with_webhooks(&self) -> Result<Vec<Organization>, WagateError>;

    // --- Sessions ---

    /// Inserts a session row with initial status `connecting`.
    ///
    /// Fails with a validation error when the id is already taken.
    async fn create_session(
        &self,
        session_id: &str,
        org_id: &str,
    ) -> Result<SessionRecord, WagateError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, WagateError>;

    async fn list_sessions(&self, org_id: &str) -> Result<Vec<SessionRecord>, WagateError>;

    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>, WagateError>;

    /// Idempotent full overwrite of the credential blob.
    async fn save_auth_state(&self, session_id: &str, blob: &str) -> Result<(), WagateError>;

    async fn delete_auth_state(&self, session_id: &str) -> Result<(), WagateError>;

    /// Updates status and `last_seen_at`; a `None` phone number leaves the
    /// stored number unchanged.
    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        phone_number: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), WagateError>;

    async fn save_qr_code(&self, session_id: &str, qr: &str) -> Result<(), WagateError>;

    /// Sessions worth restoring at process start: status in
    /// {connected, connecting} with a non-null auth blob.
    async fn list_restorable_sessions(&self) -> Result<Vec<RestorableSession>, WagateError>;

    /// Crash recovery: flips `connecting` rows with no credential blob to
    /// `disconnected`. Such rows never reached a pairing and cannot be
    /// restored. Returns the number of rows swept.
    async fn mark_stale_connecting_sessions(&self) -> Result<u64, WagateError>;

    /// Bumps the reconnect counter and returns the new value.
    async fn increment_reconnect_attempts(&self, session_id: &str) -> Result<u32, WagateError>;

    async fn reset_reconnect_attempts(&self, session_id: &str) -> Result<(), WagateError>;

    /// Non-error sessions currently owned by the org.
    async fn count_active_sessions(&self, org_id: &str) -> Result<u64, WagateError>;

    // --- Messages ---

    /// Inserts a message; fails cleanly on duplicate `(message_id, session_id)`.
    async fn save_message(&self, input: MessageInput) -> Result<MessageRecord, WagateError>;

    /// Loads a message by its internal row id.
    async fn get_message(&self, id: &str) -> Result<Option<MessageRecord>, WagateError>;

    /// Marks the message (by internal row id) as delivered to the CRM.
    async fn mark_message_synced(
        &self,
        id: &str,
        crm_message_id: Option<&str>,
    ) -> Result<(), WagateError>;

    async fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
    ) -> Result<(), WagateError>;

    /// Inbound, unsynced, non-failed messages, oldest first.
    async fn list_pending_crm_sync(
        &self,
        org_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, WagateError>;

    // --- Groups ---

    async fn upsert_group(&self, input: GroupInput) -> Result<(), WagateError>;

    async fn list_groups(&self, session_id: &str) -> Result<Vec<GroupRecord>, WagateError>;

    // --- Webhook audit ---

    /// Appends a delivery-attempt row; returns its id.
    async fn log_webhook(&self, input: WebhookLogInput) -> Result<i64, WagateError>;

    async fn list_webhook_logs(
        &self,
        message_id: &str,
    ) -> Result<Vec<WebhookLogRecord>, WagateError>;

    // --- Usage ---

    /// Atomically bumps one monthly counter for the org.
    async fn increment_usage(&self, org_id: &str, kind: UsageKind) -> Result<(), WagateError>;

    /// Overwrites the month's active-session gauge.
    async fn record_active_sessions(&self, org_id: &str, count: u64) -> Result<(), WagateError>;

    /// Current calendar month's counters; zeroed record when absent.
    async fn month_usage(&self, org_id: &str) -> Result<UsageRecord, WagateError>;
}

/// First day of the current calendar month, `YYYY-MM-01`.
pub fn current_period_start() -> String {
    chrono::Utc::now().format("%Y-%m-01").to_string()
}
