// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`SessionStore`] trait.

use async_trait::async_trait;
use tracing::debug;

use wagate_core::{
    GroupInput, GroupRecord, MessageInput, MessageRecord, MessageStatus, Organization,
    OrganizationInput, RestorableSession, SessionRecord, SessionStatus, SessionStore, UsageKind,
    UsageRecord, WagateError, WebhookLogInput, WebhookLogRecord,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed session store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens the database at `path`, running migrations.
    pub async fn open(path: &str) -> Result<Self, WagateError> {
        let db = Database::open(path).await?;
        debug!(path, "sqlite store initialized");
        Ok(Self { db })
    }

    /// Checkpoints and releases the database.
    pub async fn close(&self) -> Result<(), WagateError> {
        self.db.close().await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_organization(
        &self,
        input: OrganizationInput,
    ) -> Result<Organization, WagateError> {
        queries::organizations::create_organization(&self.db, input).await
    }

    async fn get_organization(&self, org_id: &str) -> Result<Option<Organization>, WagateError> {
        queries::organizations::get_organization(&self.db, org_id).await
    }

    async fn get_organization_by_token(
        &self,
        api_token: &str,
    ) -> Result<Option<Organization>, WagateError> {
        queries::organizations::get_organization_by_token(&self.db, api_token).await
    }

    async fn list_organizations_with_webhooks(&self) -> Result<Vec<Organization>, WagateError> {
        queries::organizations::list_organizations_with_webhooks(&self.db).await
    }

    async fn create_session(
        &self,
        session_id: &str,
        org_id: &str,
    ) -> Result<SessionRecord, WagateError> {
        queries::sessions::create_session(&self.db, session_id, org_id).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, WagateError> {
        queries::sessions::get_session(&self.db, session_id).await
    }

    async fn list_sessions(&self, org_id: &str) -> Result<Vec<SessionRecord>, WagateError> {
        queries::sessions::list_sessions(&self.db, org_id).await
    }

    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>, WagateError> {
        queries::sessions::load_auth_state(&self.db, session_id).await
    }

    async fn save_auth_state(&self, session_id: &str, blob: &str) -> Result<(), WagateError> {
        queries::sessions::save_auth_state(&self.db, session_id, blob).await
    }

    async fn delete_auth_state(&self, session_id: &str) -> Result<(), WagateError> {
        queries::sessions::delete_auth_state(&self.db, session_id).await
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        phone_number: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), WagateError> {
        queries::sessions::update_session_status(
            &self.db,
            session_id,
            status,
            phone_number,
            error_message,
        )
        .await
    }

    async fn save_qr_code(&self, session_id: &str, qr: &str) -> Result<(), WagateError> {
        queries::sessions::save_qr_code(&self.db, session_id, qr).await
    }

    async fn list_restorable_sessions(&self) -> Result<Vec<RestorableSession>, WagateError> {
        queries::sessions::list_restorable_sessions(&self.db).await
    }

    async fn mark_stale_connecting_sessions(&self) -> Result<u64, WagateError> {
        queries::sessions::mark_stale_connecting_sessions(&self.db).await
    }

    async fn increment_reconnect_attempts(&self, session_id: &str) -> Result<u32, WagateError> {
        queries::sessions::increment_reconnect_attempts(&self.db, session_id).await
    }

    async fn reset_reconnect_attempts(&self, session_id: &str) -> Result<(), WagateError> {
        queries::sessions::reset_reconnect_attempts(&self.db, session_id).await
    }

    async fn count_active_sessions(&self, org_id: &str) -> Result<u64, WagateError> {
        queries::sessions::count_active_sessions(&self.db, org_id).await
    }

    async fn save_message(&self, input: MessageInput) -> Result<MessageRecord, WagateError> {
        queries::messages::save_message(&self.db, input).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<MessageRecord>, WagateError> {
        queries::messages::get_message(&self.db, id).await
    }

    async fn mark_message_synced(
        &self,
        id: &str,
        crm_message_id: Option<&str>,
    ) -> Result<(), WagateError> {
        queries::messages::mark_message_synced(&self.db, id, crm_message_id).await
    }

    async fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
    ) -> Result<(), WagateError> {
        queries::messages::update_message_status(&self.db, id, status).await
    }

    async fn list_pending_crm_sync(
        &self,
        org_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, WagateError> {
        queries::messages::list_pending_crm_sync(&self.db, org_id, limit).await
    }

    async fn upsert_group(&self, input: GroupInput) -> Result<(), WagateError> {
        queries::groups::upsert_group(&self.db, input).await
    }

    async fn list_groups(&self, session_id: &str) -> Result<Vec<GroupRecord>, WagateError> {
        queries::groups::list_groups(&self.db, session_id).await
    }

    async fn log_webhook(&self, input: WebhookLogInput) -> Result<i64, WagateError> {
        queries::webhooks::log_webhook(&self.db, input).await
    }

    async fn list_webhook_logs(
        &self,
        message_id: &str,
    ) -> Result<Vec<WebhookLogRecord>, WagateError> {
        queries::webhooks::list_webhook_logs(&self.db, message_id).await
    }

    async fn increment_usage(&self, org_id: &str, kind: UsageKind) -> Result<(), WagateError> {
        queries::usage::increment_usage(&self.db, org_id, kind).await
    }

    async fn record_active_sessions(&self, org_id: &str, count: u64) -> Result<(), WagateError> {
        queries::usage::record_active_sessions(&self.db, org_id, count).await
    }

    async fn month_usage(&self, org_id: &str) -> Result<UsageRecord, WagateError> {
        queries::usage::month_usage(&self.db, org_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wagate_core::{MessageDirection, SubscriptionTier};

    fn make_org_input() -> OrganizationInput {
        OrganizationInput {
            name: "Acme".into(),
            owner_id: "user-1".into(),
            tier: SubscriptionTier::Starter,
            max_accounts: 2,
            max_messages_per_month: 500,
            webhook_url: Some("https://hook.test/in".into()),
            crm_api_key: Some("key".into()),
            crm_location_id: None,
        }
    }

    #[tokio::test]
    async fn full_session_lifecycle_through_store() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let store = SqliteStore::open(db_path.to_str().unwrap()).await.unwrap();

        let org = store.create_organization(make_org_input()).await.unwrap();

        // Create + connect.
        let session = store.create_session("s1", &org.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Connecting);
        store.save_qr_code("s1", "qr-blob").await.unwrap();
        store.save_auth_state("s1", r#"{"creds":{}}"#).await.unwrap();
        store
            .update_session_status("s1", SessionStatus::Connected, Some("5551234567"), None)
            .await
            .unwrap();

        // Persist an inbound message and bump usage the way the supervisor does.
        let message = store
            .save_message(MessageInput {
                session_id: "s1".into(),
                org_id: org.id.clone(),
                message_id: "m1".into(),
                direction: MessageDirection::Inbound,
                from_number: "5550001111@s.whatsapp.net".into(),
                to_number: "5551234567@s.whatsapp.net".into(),
                message_type: "text".into(),
                content: r#"{"text":"hi"}"#.into(),
                status: MessageStatus::Delivered,
                is_group_message: false,
                group_jid: None,
                timestamp: "2026-08-01T10:00:00.000Z".into(),
            })
            .await
            .unwrap();
        store
            .increment_usage(&org.id, UsageKind::MessageReceived)
            .await
            .unwrap();

        let usage = store.month_usage(&org.id).await.unwrap();
        assert_eq!(usage.messages_received, 1);

        let pending = store.list_pending_crm_sync(&org.id, 100).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, message.id);

        // Crash-restart recovery view.
        let restorable = store.list_restorable_sessions().await.unwrap();
        assert_eq!(restorable.len(), 1);
        assert_eq!(restorable[0].session_id, "s1");
        assert_eq!(restorable[0].auth_state, r#"{"creds":{}}"#);

        store.close().await.unwrap();
    }
}
