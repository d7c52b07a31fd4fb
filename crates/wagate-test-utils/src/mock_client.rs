// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable WhatsApp connector for deterministic testing.
//!
//! Tests drive a session by emitting [`WaEvent`]s through the connector and
//! assert on the sends captured by the per-session [`MockClient`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use wagate_core::{GroupUpdate, WaClient, WaConnection, WaConnector, WaEvent, WagateError};

/// Per-session scripted client: captures outbound commands and serves
/// canned group metadata.
pub struct MockClient {
    session_id: String,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
    logged_out: AtomicBool,
    groups: Mutex<Vec<GroupUpdate>>,
    participants: Mutex<HashMap<String, Vec<String>>>,
}

impl MockClient {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            groups: Mutex::new(Vec::new()),
            participants: Mutex::new(HashMap::new()),
        }
    }

    /// All `(jid, text)` pairs passed to `send_text`, in order.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("mock lock").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("mock lock").len()
    }

    /// Makes every subsequent `send_text` fail with a client error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn was_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Seeds the canned group list returned by `list_groups`.
    pub fn seed_group(&self, group: GroupUpdate, participants: Vec<String>) {
        self.participants
            .lock()
            .expect("mock lock")
            .insert(group.group_jid.clone(), participants);
        self.groups.lock().expect("mock lock").push(group);
    }
}

#[async_trait]
impl WaClient for MockClient {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, WagateError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(WagateError::Client {
                message: format!("scripted send failure for {}", self.session_id),
                source: None,
            });
        }
        self.sent
            .lock()
            .expect("mock lock")
            .push((jid.to_string(), text.to_string()));
        Ok(format!("wamid-{}", Uuid::new_v4().simple()))
    }

    async fn logout(&self) -> Result<(), WagateError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_group(
        &self,
        name: &str,
        participant_jids: &[String],
    ) -> Result<GroupUpdate, WagateError> {
        let group = GroupUpdate {
            group_jid: format!("{}@g.us", Uuid::new_v4().simple()),
            name: name.to_string(),
            description: None,
            participant_count: participant_jids.len() as u32 + 1,
            is_admin: true,
        };
        self.seed_group(group.clone(), participant_jids.to_vec());
        Ok(group)
    }

    async fn group_metadata(&self, group_jid: &str) -> Result<GroupUpdate, WagateError> {
        self.groups
            .lock()
            .expect("mock lock")
            .iter()
            .find(|g| g.group_jid == group_jid)
            .cloned()
            .ok_or_else(|| WagateError::Client {
                message: format!("unknown group: {group_jid}"),
                source: None,
            })
    }

    async fn group_participants(&self, group_jid: &str) -> Result<Vec<String>, WagateError> {
        Ok(self
            .participants
            .lock()
            .expect("mock lock")
            .get(group_jid)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_participants(
        &self,
        group_jid: &str,
        participant_jids: &[String],
    ) -> Result<(), WagateError> {
        let mut participants = self.participants.lock().expect("mock lock");
        participants
            .entry(group_jid.to_string())
            .or_default()
            .extend(participant_jids.iter().cloned());
        Ok(())
    }

    async fn remove_participant(
        &self,
        group_jid: &str,
        participant_jid: &str,
    ) -> Result<(), WagateError> {
        if let Some(members) = self
            .participants
            .lock()
            .expect("mock lock")
            .get_mut(group_jid)
        {
            members.retain(|p| p != participant_jid);
        }
        Ok(())
    }

    async fn promote(&self, _group_jid: &str, _participant_jid: &str) -> Result<(), WagateError> {
        Ok(())
    }

    async fn demote(&self, _group_jid: &str, _participant_jid: &str) -> Result<(), WagateError> {
        Ok(())
    }

    async fn leave_group(&self, group_jid: &str) -> Result<(), WagateError> {
        self.groups
            .lock()
            .expect("mock lock")
            .retain(|g| g.group_jid != group_jid);
        Ok(())
    }

    async fn update_group_setting(
        &self,
        _group_jid: &str,
        _announcement_only: bool,
    ) -> Result<(), WagateError> {
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupUpdate>, WagateError> {
        Ok(self.groups.lock().expect("mock lock").clone())
    }
}

#[derive(Default)]
struct ConnectorState {
    clients: HashMap<String, Arc<MockClient>>,
    event_senders: HashMap<String, mpsc::Sender<WaEvent>>,
    fail_connect: HashMap<String, u32>,
    last_auth: HashMap<String, Option<String>>,
}

/// Scriptable [`WaConnector`].
///
/// Each `connect` call creates a fresh [`MockClient`] and event channel;
/// tests then inject [`WaEvent`]s with [`MockConnector::emit`].
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<ConnectorState>,
    connect_count: AtomicU32,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects an event into the session's live event stream.
    ///
    /// Returns false when the session has no live consumer.
    pub async fn emit(&self, session_id: &str, event: WaEvent) -> bool {
        let sender = {
            let state = self.state.lock().expect("mock lock");
            state.event_senders.get(session_id).cloned()
        };
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// The most recent client created for the session.
    pub fn client(&self, session_id: &str) -> Option<Arc<MockClient>> {
        self.state
            .lock()
            .expect("mock lock")
            .clients
            .get(session_id)
            .cloned()
    }

    /// Total successful `connect` calls across all sessions.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Makes the next `count` connect calls for the session fail.
    pub fn fail_next_connects(&self, session_id: &str, count: u32) {
        self.state
            .lock()
            .expect("mock lock")
            .fail_connect
            .insert(session_id.to_string(), count);
    }

    /// The auth blob the last connect for this session was seeded with.
    pub fn last_auth_state(&self, session_id: &str) -> Option<String> {
        self.state
            .lock()
            .expect("mock lock")
            .last_auth
            .get(session_id)
            .cloned()
            .flatten()
    }
}

#[async_trait]
impl WaConnector for MockConnector {
    async fn connect(
        &self,
        session_id: &str,
        auth_state: Option<String>,
    ) -> Result<WaConnection, WagateError> {
        let mut state = self.state.lock().expect("mock lock");

        if let Some(remaining) = state.fail_connect.get_mut(session_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(WagateError::Client {
                    message: format!("scripted connect failure for {session_id}"),
                    source: None,
                });
            }
        }

        let client = Arc::new(MockClient::new(session_id));
        let (tx, rx) = mpsc::channel(64);
        state.clients.insert(session_id.to_string(), client.clone());
        state.event_senders.insert(session_id.to_string(), tx);
        state
            .last_auth
            .insert(session_id.to_string(), auth_state);
        drop(state);

        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(WaConnection { client, events: rx })
    }
}
