// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`SessionStore`] implementation for tests.
//!
//! State lives in a single std `Mutex`; every method locks, mutates, and
//! releases before returning, mirroring the row-level atomicity the SQLite
//! store provides.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use wagate_core::traits::store::current_period_start;
use wagate_core::{
    GroupInput, GroupRecord, MessageInput, MessageRecord, MessageStatus, Organization,
    OrganizationInput, RestorableSession, SessionRecord, SessionStatus, SessionStore, UsageKind,
    UsageRecord, WagateError, WebhookLogInput, WebhookLogRecord,
};

#[derive(Default)]
struct State {
    organizations: Vec<Organization>,
    sessions: HashMap<String, SessionRecord>,
    messages: Vec<MessageRecord>,
    groups: HashMap<(String, String), GroupRecord>,
    webhook_logs: Vec<WebhookLogRecord>,
    usage: HashMap<(String, String), UsageRecord>,
    next_log_id: i64,
}

/// In-memory store; cheap to construct per test.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> String {
        chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock poisoned")
    }

    /// Test convenience: seeds a session row directly (e.g. a pre-crash
    /// `connected` row for restore scenarios).
    pub fn seed_session(&self, record: SessionRecord) {
        self.lock()
            .sessions
            .insert(record.session_id.clone(), record);
    }

    /// Test convenience: every persisted message for a session, in
    /// insertion order.
    pub fn messages_for_session(&self, session_id: &str) -> Vec<MessageRecord> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_organization(
        &self,
        input: OrganizationInput,
    ) -> Result<Organization, WagateError> {
        let org = Organization {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            owner_id: input.owner_id,
            tier: input.tier,
            max_accounts: input.max_accounts,
            max_messages_per_month: input.max_messages_per_month,
            webhook_url: input.webhook_url,
            crm_api_key: input.crm_api_key,
            crm_location_id: input.crm_location_id,
            api_token: Uuid::new_v4().simple().to_string(),
            created_at: Self::now(),
        };
        self.lock().organizations.push(org.clone());
        Ok(org)
    }

    async fn get_organization(&self, org_id: &str) -> Result<Option<Organization>, WagateError> {
        Ok(self
            .lock()
            .organizations
            .iter()
            .find(|o| o.id == org_id)
            .cloned())
    }

    async fn get_organization_by_token(
        &self,
        api_token: &str,
    ) -> Result<Option<Organization>, WagateError> {
        Ok(self
            .lock()
            .organizations
            .iter()
            .find(|o| o.api_token == api_token)
            .cloned())
    }

    async fn list_organizations_with_webhooks(&self) -> Result<Vec<Organization>, WagateError> {
        Ok(self
            .lock()
            .organizations
            .iter()
            .filter(|o| o.webhook_url.is_some())
            .cloned()
            .collect())
    }

    async fn create_session(
        &self,
        session_id: &str,
        org_id: &str,
    ) -> Result<SessionRecord, WagateError> {
        let mut state = self.lock();
        if state.sessions.contains_key(session_id) {
            return Err(WagateError::Validation(format!(
                "session id already exists: {session_id}"
            )));
        }
        let now = Self::now();
        let record = SessionRecord {
            session_id: session_id.to_string(),
            org_id: org_id.to_string(),
            phone_number: None,
            status: SessionStatus::Connecting,
            auth_state: None,
            last_qr: None,
            last_seen_at: now.clone(),
            error_message: None,
            reconnect_attempts: 0,
            created_at: now,
        };
        state
            .sessions
            .insert(session_id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, WagateError> {
        Ok(self.lock().sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self, org_id: &str) -> Result<Vec<SessionRecord>, WagateError> {
        let mut sessions: Vec<SessionRecord> = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.org_id == org_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>, WagateError> {
        Ok(self
            .lock()
            .sessions
            .get(session_id)
            .and_then(|s| s.auth_state.clone()))
    }

    async fn save_auth_state(&self, session_id: &str, blob: &str) -> Result<(), WagateError> {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.auth_state = Some(blob.to_string());
        }
        Ok(())
    }

    async fn delete_auth_state(&self, session_id: &str) -> Result<(), WagateError> {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.auth_state = None;
        }
        Ok(())
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        phone_number: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<(), WagateError> {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.status = status;
            if let Some(phone) = phone_number {
                session.phone_number = Some(phone.to_string());
            }
            session.error_message = error_message.map(|s| s.to_string());
            session.last_seen_at = Self::now();
        }
        Ok(())
    }

    async fn save_qr_code(&self, session_id: &str, qr: &str) -> Result<(), WagateError> {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.last_qr = Some(qr.to_string());
        }
        Ok(())
    }

    async fn list_restorable_sessions(&self) -> Result<Vec<RestorableSession>, WagateError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| {
                matches!(
                    s.status,
                    SessionStatus::Connected | SessionStatus::Connecting
                ) && s.auth_state.is_some()
            })
            .map(|s| RestorableSession {
                session_id: s.session_id.clone(),
                org_id: s.org_id.clone(),
                auth_state: s.auth_state.clone().unwrap_or_default(),
                phone_number: s.phone_number.clone(),
            })
            .collect())
    }

    async fn mark_stale_connecting_sessions(&self) -> Result<u64, WagateError> {
        let mut swept = 0;
        for session in self.lock().sessions.values_mut() {
            if session.status == SessionStatus::Connecting && session.auth_state.is_none() {
                session.status = SessionStatus::Disconnected;
                session.last_seen_at = Self::now();
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn increment_reconnect_attempts(&self, session_id: &str) -> Result<u32, WagateError> {
        let mut state = self.lock();
        let session = state.sessions.get_mut(session_id).ok_or_else(|| {
            WagateError::Validation(format!("unknown session: {session_id}"))
        })?;
        session.reconnect_attempts += 1;
        Ok(session.reconnect_attempts)
    }

    async fn reset_reconnect_attempts(&self, session_id: &str) -> Result<(), WagateError> {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.reconnect_attempts = 0;
        }
        Ok(())
    }

    async fn count_active_sessions(&self, org_id: &str) -> Result<u64, WagateError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| s.org_id == org_id && s.status != SessionStatus::Error)
            .count() as u64)
    }

    async fn save_message(&self, input: MessageInput) -> Result<MessageRecord, WagateError> {
        let mut state = self.lock();
        if state
            .messages
            .iter()
            .any(|m| m.message_id == input.message_id && m.session_id == input.session_id)
        {
            return Err(WagateError::Validation(format!(
                "duplicate message {} for session {}",
                input.message_id, input.session_id
            )));
        }
        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            session_id: input.session_id,
            org_id: input.org_id,
            message_id: input.message_id,
            direction: input.direction,
            from_number: input.from_number,
            to_number: input.to_number,
            message_type: input.message_type,
            content: input.content,
            status: input.status,
            is_group_message: input.is_group_message,
            group_jid: input.group_jid,
            synced_to_crm: false,
            crm_message_id: None,
            timestamp: input.timestamp,
        };
        state.messages.push(record.clone());
        Ok(record)
    }

    async fn get_message(&self, id: &str) -> Result<Option<MessageRecord>, WagateError> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn mark_message_synced(
        &self,
        id: &str,
        crm_message_id: Option<&str>,
    ) -> Result<(), WagateError> {
        if let Some(message) = self.lock().messages.iter_mut().find(|m| m.id == id) {
            message.synced_to_crm = true;
            message.crm_message_id = crm_message_id.map(|s| s.to_string());
        }
        Ok(())
    }

    async fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
    ) -> Result<(), WagateError> {
        if let Some(message) = self.lock().messages.iter_mut().find(|m| m.id == id) {
            message.status = status;
        }
        Ok(())
    }

    async fn list_pending_crm_sync(
        &self,
        org_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, WagateError> {
        let mut pending: Vec<MessageRecord> = self
            .lock()
            .messages
            .iter()
            .filter(|m| {
                m.org_id == org_id
                    && m.direction == wagate_core::MessageDirection::Inbound
                    && !m.synced_to_crm
                    && m.status != MessageStatus::Failed
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn upsert_group(&self, input: GroupInput) -> Result<(), WagateError> {
        self.lock().groups.insert(
            (input.session_id.clone(), input.group_jid.clone()),
            input,
        );
        Ok(())
    }

    async fn list_groups(&self, session_id: &str) -> Result<Vec<GroupRecord>, WagateError> {
        let mut groups: Vec<GroupRecord> = self
            .lock()
            .groups
            .values()
            .filter(|g| g.session_id == session_id)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn log_webhook(&self, input: WebhookLogInput) -> Result<i64, WagateError> {
        let mut state = self.lock();
        state.next_log_id += 1;
        let id = state.next_log_id;
        state.webhook_logs.push(WebhookLogRecord {
            id,
            org_id: input.org_id,
            message_id: input.message_id,
            url: input.url,
            payload: input.payload,
            http_status: input.http_status,
            response_body: input.response_body,
            retry_count: input.retry_count,
            status: input.status,
            error_message: input.error_message,
            created_at: Self::now(),
        });
        Ok(id)
    }

    async fn list_webhook_logs(
        &self,
        message_id: &str,
    ) -> Result<Vec<WebhookLogRecord>, WagateError> {
        Ok(self
            .lock()
            .webhook_logs
            .iter()
            .filter(|l| l.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn increment_usage(&self, org_id: &str, kind: UsageKind) -> Result<(), WagateError> {
        let period = current_period_start();
        let mut state = self.lock();
        let record = state
            .usage
            .entry((org_id.to_string(), period.clone()))
            .or_insert_with(|| UsageRecord {
                org_id: org_id.to_string(),
                period_start: period,
                ..Default::default()
            });
        match kind {
            UsageKind::MessageSent => record.messages_sent += 1,
            UsageKind::MessageReceived => record.messages_received += 1,
            UsageKind::ApiCall => record.api_calls += 1,
        }
        Ok(())
    }

    async fn record_active_sessions(&self, org_id: &str, count: u64) -> Result<(), WagateError> {
        let period = current_period_start();
        let mut state = self.lock();
        let record = state
            .usage
            .entry((org_id.to_string(), period.clone()))
            .or_insert_with(|| UsageRecord {
                org_id: org_id.to_string(),
                period_start: period,
                ..Default::default()
            });
        record.active_sessions = count;
        Ok(())
    }

    async fn month_usage(&self, org_id: &str) -> Result<UsageRecord, WagateError> {
        let period = current_period_start();
        Ok(self
            .lock()
            .usage
            .get(&(org_id.to_string(), period.clone()))
            .cloned()
            .unwrap_or(UsageRecord {
                org_id: org_id.to_string(),
                period_start: period,
                ..Default::default()
            }))
    }
}
