// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Abstraction over the WhatsApp-Web client library.
//!
//! The supervisor never talks to the wire protocol directly: a
//! [`WaConnector`] produces a [`WaConnection`] — a command handle plus an
//! event stream — seeded from an optional credential blob. Event delivery
//! order on the receiver is the client's delivery order; the supervisor
//! consumes it from a single task per session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WagateError;
use crate::types::{GroupUpdate, WaEvent};

/// A live client connection: the command handle and its event stream.
pub struct WaConnection {
    pub client: Arc<dyn WaClient>,
    pub events: mpsc::Receiver<WaEvent>,
}

/// Factory for WhatsApp client connections.
#[async_trait]
pub trait WaConnector: Send + Sync {
    /// Opens a client for `session_id`, seeded from `auth_state` when
    /// present (resuming without a QR scan) or starting a fresh pairing
    /// flow otherwise.
    async fn connect(
        &self,
        session_id: &str,
        auth_state: Option<String>,
    ) -> Result<WaConnection, WagateError>;
}

/// Command surface of a live WhatsApp client.
///
/// All methods require the underlying socket to be open; implementations
/// surface a closed socket as [`WagateError::Client`].
#[async_trait]
pub trait WaClient: Send + Sync {
    /// Sends a text message to a wire JID. Returns the external message id.
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, WagateError>;

    /// Logs the session out, invalidating its credentials.
    async fn logout(&self) -> Result<(), WagateError>;

    // --- Group operations ---

    /// Creates a group and returns its metadata.
    async fn create_group(
        &self,
        name: &str,
        participant_jids: &[String],
    ) -> Result<GroupUpdate, WagateError>;

    async fn group_metadata(&self, group_jid: &str) -> Result<GroupUpdate, WagateError>;

    /// Participant JIDs of a group.
    async fn group_participants(&self, group_jid: &str) -> Result<Vec<String>, WagateError>;

    async fn add_participants(
        &self,
        group_jid: &str,
        participant_jids: &[String],
    ) -> Result<(), WagateError>;

    async fn remove_participant(
        &self,
        group_jid: &str,
        participant_jid: &str,
    ) -> Result<(), WagateError>;

    async fn promote(&self, group_jid: &str, participant_jid: &str) -> Result<(), WagateError>;

    async fn demote(&self, group_jid: &str, participant_jid: &str) -> Result<(), WagateError>;

    async fn leave_group(&self, group_jid: &str) -> Result<(), WagateError>;

    /// Toggles the announcement-only setting on a group.
    async fn update_group_setting(
        &self,
        group_jid: &str,
        announcement_only: bool,
    ) -> Result<(), WagateError>;

    /// Groups the session participates in.
    async fn list_groups(&self) -> Result<Vec<GroupUpdate>, WagateError>;
}
