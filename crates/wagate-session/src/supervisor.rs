// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session supervisor: creates, restores, and tears down WhatsApp client
//! sessions, wiring lifecycle events to persistence and the event bus.
//!
//! The supervisor is the single owner of live handles. Each session gets
//! one event consumer task reading the client's mailbox, so events for a
//! session are processed in arrival order and never concurrently with
//! each other. No back-pointer from handle to supervisor exists; the
//! consumer task holds an `Arc` of the supervisor instead.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wagate_config::model::ReconnectConfig;
use wagate_core::jid::to_wire_jid;
use wagate_core::types::validate_session_id;
use wagate_core::{
    BatchType, ConnectInfo, DisconnectReason, EventSink, GroupUpdate, MessageDirection,
    MessageInput, MessageRecord, MessageStatus, SessionRecord, SessionStatus, SessionStore,
    UsageKind, WaConnector, WaEvent, WaMessage, WagateError,
};

use crate::reconnect::ReconnectController;
use crate::registry::SessionRegistry;

/// Supervises the fleet of WhatsApp client sessions for all tenants.
pub struct SessionSupervisor {
    store: Arc<dyn SessionStore>,
    connector: Arc<dyn WaConnector>,
    sink: Arc<dyn EventSink>,
    registry: SessionRegistry,
    reconnect: ReconnectController,
    /// Feed into the webhook delivery pipeline; `None` disables forwarding.
    webhook_tx: Option<mpsc::Sender<MessageRecord>>,
    cancel: CancellationToken,
    /// Self-reference for spawning consumer tasks and reconnect timers.
    weak_self: Weak<SessionSupervisor>,
}

impl SessionSupervisor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        connector: Arc<dyn WaConnector>,
        sink: Arc<dyn EventSink>,
        reconnect_config: ReconnectConfig,
        webhook_tx: Option<mpsc::Sender<MessageRecord>>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            store,
            connector,
            sink,
            registry: SessionRegistry::new(),
            reconnect: ReconnectController::new(reconnect_config),
            webhook_tx,
            cancel,
            weak_self: weak_self.clone(),
        })
    }

    /// Upgrades the self-reference.
    ///
    /// Cannot fail while a `&self` method is running: the borrow keeps the
    /// owning `Arc` alive.
    fn strong(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("supervisor is alive")
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub(crate) fn reconnect(&self) -> &ReconnectController {
        &self.reconnect
    }

    /// Creates a brand-new session for an organization.
    ///
    /// Persists the row (initial status `connecting`), registers the
    /// handle, and subscribes to the client's event streams. A connect
    /// failure parks the fresh row in `error`.
    pub async fn create_session(
        &self,
        session_id: &str,
        org_id: &str,
    ) -> Result<SessionRecord, WagateError> {
        validate_session_id(session_id)?;
        if self.registry.contains(session_id).await {
            return Err(WagateError::Validation(format!(
                "session already registered: {session_id}"
            )));
        }

        let record = self.store.create_session(session_id, org_id).await?;

        if let Err(e) = self.start_session(session_id, org_id, None).await {
            error!(session_id, error = %e, "session start failed");
            self.store
                .update_session_status(
                    session_id,
                    SessionStatus::Error,
                    None,
                    Some(&e.to_string()),
                )
                .await
                .ok();
            return Err(e);
        }

        info!(session_id, org_id, "session created");
        Ok(record)
    }

    /// Restores every restorable session at process start.
    ///
    /// Rows stuck in `connecting` with no credential blob (a crash
    /// mid-pairing) are swept to `disconnected` first; they cannot be
    /// restored and would otherwise hold an account slot forever.
    /// Failures are isolated per session: the failing session's status
    /// flips to `error` with the failure message; others continue.
    pub async fn restore_all(&self) -> usize {
        match self.store.mark_stale_connecting_sessions().await {
            Ok(0) => {}
            Ok(swept) => info!(swept, "stale connecting sessions marked disconnected"),
            Err(e) => warn!(error = %e, "stale session sweep failed"),
        }

        let restorable = match self.store.list_restorable_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "failed to list restorable sessions");
                return 0;
            }
        };

        let mut restored = 0;
        for session in restorable {
            if self.registry.contains(&session.session_id).await {
                continue;
            }
            match self
                .start_session(
                    &session.session_id,
                    &session.org_id,
                    Some(session.auth_state.clone()),
                )
                .await
            {
                Ok(()) => {
                    restored += 1;
                    debug!(session_id = session.session_id.as_str(), "session restored");
                }
                Err(e) => {
                    warn!(session_id = session.session_id.as_str(), error = %e,
                        "session restore failed");
                    self.store
                        .update_session_status(
                            &session.session_id,
                            SessionStatus::Error,
                            None,
                            Some(&e.to_string()),
                        )
                        .await
                        .ok();
                }
            }
        }
        info!(count = restored, "session restore complete");
        restored
    }

    /// Opens a client for the session and spawns its event consumer.
    ///
    /// Shared by fresh creates, restore-all, and reconnect attempts.
    pub(crate) async fn start_session(
        &self,
        session_id: &str,
        org_id: &str,
        auth_state: Option<String>,
    ) -> Result<(), WagateError> {
        let connection = self.connector.connect(session_id, auth_state).await?;

        self.registry.upsert(session_id, connection.client).await;
        self.store
            .update_session_status(session_id, SessionStatus::Connecting, None, None)
            .await?;

        let supervisor = self.strong();
        let session_id = session_id.to_string();
        let org_id = org_id.to_string();
        tokio::spawn(async move {
            supervisor
                .run_events(session_id, org_id, connection.events)
                .await;
        });
        Ok(())
    }

    /// Per-session mailbox consumer: processes client events in arrival
    /// order until the socket closes or the process shuts down.
    async fn run_events(
        self: Arc<Self>,
        session_id: String,
        org_id: String,
        mut events: mpsc::Receiver<WaEvent>,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(session_id = session_id.as_str(), "event consumer cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if self
                            .handle_event(&session_id, &org_id, event)
                            .await
                            .is_break()
                        {
                            break;
                        }
                    }
                    None => {
                        debug!(session_id = session_id.as_str(), "event stream ended");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_event(
        &self,
        session_id: &str,
        org_id: &str,
        event: WaEvent,
    ) -> ControlFlow<()> {
        match event {
            WaEvent::Qr(qr) => {
                if let Err(e) = self.store.save_qr_code(session_id, &qr).await {
                    warn!(session_id, error = %e, "failed to persist QR");
                }
                self.sink.on_qr(session_id, &qr);
                ControlFlow::Continue(())
            }
            WaEvent::CredsUpdate(blob) => {
                // Fire-and-forget: credential saves must not block the
                // event stream; failures surface in the logs only.
                let store = self.store.clone();
                let session_id = session_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = store.save_auth_state(&session_id, &blob).await {
                        error!(session_id = session_id.as_str(), error = %e,
                            "failed to persist auth state");
                    }
                });
                ControlFlow::Continue(())
            }
            WaEvent::Open { phone_number } => {
                self.handle_open(session_id, org_id, phone_number).await;
                ControlFlow::Continue(())
            }
            WaEvent::Close { reason } => {
                self.handle_close(session_id, org_id, reason).await;
                // The socket is gone; this consumer ends. A reconnect
                // spawns a fresh consumer for the new socket.
                ControlFlow::Break(())
            }
            WaEvent::Messages { batch, messages } => {
                if batch == BatchType::Notify {
                    for message in messages {
                        self.handle_inbound(session_id, org_id, message).await;
                    }
                } else {
                    debug!(session_id, ?batch, "ignoring non-notify batch");
                }
                ControlFlow::Continue(())
            }
            WaEvent::GroupUpdate(update) => {
                self.sink.on_group_update(session_id, &update);
                if let Err(e) = self
                    .store
                    .upsert_group(group_input(session_id, &update))
                    .await
                {
                    warn!(session_id, error = %e, "group upsert failed");
                }
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_open(&self, session_id: &str, org_id: &str, phone_number: String) {
        self.registry
            .set_status(
                session_id,
                SessionStatus::Connected,
                Some(phone_number.clone()),
            )
            .await;
        if let Err(e) = self
            .store
            .update_session_status(session_id, SessionStatus::Connected, Some(&phone_number), None)
            .await
        {
            error!(session_id, error = %e, "failed to persist connected status");
        }
        if let Err(e) = self.store.reset_reconnect_attempts(session_id).await {
            warn!(session_id, error = %e, "failed to reset reconnect counter");
        }
        self.reconnect.cancel(session_id);

        // Advisory gauge; failures must not affect the session.
        match self.store.count_active_sessions(org_id).await {
            Ok(count) => {
                if let Err(e) = self.store.record_active_sessions(org_id, count).await {
                    debug!(org_id, error = %e, "active session gauge update failed");
                }
            }
            Err(e) => debug!(org_id, error = %e, "active session count failed"),
        }

        info!(session_id, phone_number = phone_number.as_str(), "session connected");
        self.sink.on_connection_status(
            session_id,
            SessionStatus::Connected,
            Some(&ConnectInfo {
                session_id: session_id.to_string(),
                phone_number,
            }),
        );
    }

    async fn handle_close(&self, session_id: &str, org_id: &str, reason: DisconnectReason) {
        if let Err(e) = self
            .store
            .update_session_status(session_id, SessionStatus::Disconnected, None, None)
            .await
        {
            error!(session_id, error = %e, "failed to persist disconnected status");
        }

        if reason == DisconnectReason::LoggedOut {
            // Terminal: the phone revoked this session. Drop the handle
            // and do not reconnect.
            info!(session_id, "session logged out");
            self.registry.deregister(session_id).await;
            self.sink
                .on_connection_status(session_id, SessionStatus::Disconnected, None);
            return;
        }

        info!(session_id, ?reason, "session disconnected");
        self.registry
            .set_status(session_id, SessionStatus::Disconnected, None)
            .await;
        self.sink
            .on_connection_status(session_id, SessionStatus::Disconnected, None);
        self.reconnect
            .schedule(self.strong(), session_id, org_id, reason);
    }

    /// Persists one inbound message and fans it out: usage counter, event
    /// bus, webhook pipeline. A duplicate external id is skipped quietly.
    async fn handle_inbound(&self, session_id: &str, org_id: &str, message: WaMessage) {
        let input = MessageInput {
            session_id: session_id.to_string(),
            org_id: org_id.to_string(),
            message_id: message.message_id.clone(),
            direction: MessageDirection::Inbound,
            from_number: message.from.clone(),
            to_number: message.to.clone(),
            message_type: message.message_type.clone(),
            content: message.content.to_string(),
            status: MessageStatus::Delivered,
            is_group_message: message.is_group,
            group_jid: message.group_jid.clone(),
            timestamp: message.timestamp.clone(),
        };

        let record = match self.store.save_message(input).await {
            Ok(record) => record,
            Err(WagateError::Validation(msg)) => {
                debug!(session_id, message_id = message.message_id.as_str(),
                    reason = msg.as_str(), "skipping duplicate inbound message");
                return;
            }
            Err(e) => {
                error!(session_id, message_id = message.message_id.as_str(), error = %e,
                    "failed to persist inbound message");
                return;
            }
        };

        if let Err(e) = self
            .store
            .increment_usage(org_id, UsageKind::MessageReceived)
            .await
        {
            warn!(org_id, error = %e, "usage increment failed");
        }

        self.sink.on_message(session_id, &record);

        if let Some(tx) = &self.webhook_tx {
            if tx.send(record).await.is_err() {
                warn!(session_id, "webhook pipeline closed, dropping delivery");
            }
        }
    }

    /// Sends a text message through a connected session.
    ///
    /// Bare numbers are formatted to `<digits>@s.whatsapp.net`; group JIDs
    /// pass through. Returns the external message id.
    pub async fn send_text(
        &self,
        session_id: &str,
        target: &str,
        text: &str,
    ) -> Result<String, WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        let jid = to_wire_jid(target)?;
        client.send_text(&jid, text).await
    }

    /// Cached connection state for the API edge.
    pub async fn session_status(
        &self,
        session_id: &str,
    ) -> Option<(SessionStatus, Option<String>)> {
        self.registry.status(session_id).await
    }

    /// The session's own number, once connected.
    pub async fn session_phone(&self, session_id: &str) -> Option<String> {
        self.registry.phone_number(session_id).await
    }

    // --- Group operations (same connected-session precondition as send) ---

    pub async fn create_group(
        &self,
        session_id: &str,
        name: &str,
        participants: &[String],
    ) -> Result<GroupUpdate, WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        let jids = wire_jids(participants)?;
        let group = client.create_group(name, &jids).await?;
        if let Err(e) = self
            .store
            .upsert_group(group_input(session_id, &group))
            .await
        {
            warn!(session_id, error = %e, "group upsert failed");
        }
        Ok(group)
    }

    pub async fn group_metadata(
        &self,
        session_id: &str,
        group_jid: &str,
    ) -> Result<GroupUpdate, WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        let group = client.group_metadata(group_jid).await?;
        if let Err(e) = self
            .store
            .upsert_group(group_input(session_id, &group))
            .await
        {
            warn!(session_id, error = %e, "group upsert failed");
        }
        Ok(group)
    }

    pub async fn group_participants(
        &self,
        session_id: &str,
        group_jid: &str,
    ) -> Result<Vec<String>, WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client.group_participants(group_jid).await
    }

    pub async fn add_participants(
        &self,
        session_id: &str,
        group_jid: &str,
        participants: &[String],
    ) -> Result<(), WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client
            .add_participants(group_jid, &wire_jids(participants)?)
            .await
    }

    pub async fn remove_participant(
        &self,
        session_id: &str,
        group_jid: &str,
        participant: &str,
    ) -> Result<(), WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client
            .remove_participant(group_jid, &to_wire_jid(participant)?)
            .await
    }

    pub async fn promote(
        &self,
        session_id: &str,
        group_jid: &str,
        participant: &str,
    ) -> Result<(), WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client.promote(group_jid, &to_wire_jid(participant)?).await
    }

    pub async fn demote(
        &self,
        session_id: &str,
        group_jid: &str,
        participant: &str,
    ) -> Result<(), WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client.demote(group_jid, &to_wire_jid(participant)?).await
    }

    pub async fn leave_group(&self, session_id: &str, group_jid: &str) -> Result<(), WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client.leave_group(group_jid).await
    }

    pub async fn update_group_setting(
        &self,
        session_id: &str,
        group_jid: &str,
        announcement_only: bool,
    ) -> Result<(), WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        client
            .update_group_setting(group_jid, announcement_only)
            .await
    }

    /// Refreshes and returns the session's group list from the client.
    pub async fn list_groups(
        &self,
        session_id: &str,
    ) -> Result<Vec<GroupUpdate>, WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        let groups = client.list_groups().await?;
        for group in &groups {
            if let Err(e) = self.store.upsert_group(group_input(session_id, group)).await {
                warn!(session_id, error = %e, "group upsert failed");
            }
        }
        Ok(groups)
    }

    /// Sends a text to every member of a group individually.
    ///
    /// Returns the number of successful sends.
    pub async fn broadcast_to_group(
        &self,
        session_id: &str,
        group_jid: &str,
        text: &str,
    ) -> Result<usize, WagateError> {
        let client = self.registry.connected_client(session_id).await?;
        let participants = client.group_participants(group_jid).await?;
        let mut sent = 0;
        for participant in &participants {
            match client.send_text(participant, text).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!(session_id, participant = participant.as_str(), error = %e,
                        "broadcast send failed");
                }
            }
        }
        Ok(sent)
    }

    /// Permanent teardown: logout, deregister, drop credentials.
    ///
    /// Logout failures are swallowed; an already-dead socket is
    /// acceptable here.
    pub async fn destroy_session(&self, session_id: &str) -> Result<(), WagateError> {
        self.reconnect.cancel(session_id);

        if let Some(handle) = self.registry.deregister(session_id).await {
            if let Err(e) = handle.client.logout().await {
                debug!(session_id, error = %e, "logout failed during destroy");
            }
        }

        self.store.delete_auth_state(session_id).await?;
        self.store
            .update_session_status(session_id, SessionStatus::Disconnected, None, None)
            .await?;
        self.sink
            .on_connection_status(session_id, SessionStatus::Disconnected, None);

        info!(session_id, "session destroyed");
        Ok(())
    }

    /// Drops the registry entry for a session parked in `error` and
    /// publishes the terminal status.
    pub async fn park_session(&self, session_id: &str) {
        self.registry.deregister(session_id).await;
        self.sink
            .on_connection_status(session_id, SessionStatus::Error, None);
    }

    /// Cancels all per-session tasks and timers (process shutdown).
    pub fn shutdown(&self) {
        self.reconnect.cancel_all();
        self.cancel.cancel();
    }
}

fn group_input(session_id: &str, update: &GroupUpdate) -> wagate_core::GroupInput {
    wagate_core::GroupRecord {
        session_id: session_id.to_string(),
        group_jid: update.group_jid.clone(),
        name: update.name.clone(),
        description: update.description.clone(),
        participant_count: update.participant_count,
        is_admin: update.is_admin,
    }
}

fn wire_jids(targets: &[String]) -> Result<Vec<String>, WagateError> {
    targets.iter().map(|t| to_wire_jid(t)).collect()
}
