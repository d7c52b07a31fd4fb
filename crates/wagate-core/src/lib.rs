// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wagate WhatsApp-to-CRM gateway.
//!
//! This crate provides the foundational trait definitions, error types,
//! and domain model used throughout the Wagate workspace: the persistence
//! contract ([`SessionStore`]), the WhatsApp client abstraction
//! ([`WaConnector`] / [`WaClient`]), and the event bus ([`EventSink`]).

pub mod authstate;
pub mod error;
pub mod jid;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{LimitKind, WagateError};
pub use traits::{EventSink, SessionStore, WaClient, WaConnection, WaConnector};
pub use types::{
    BatchType, ConnectInfo, DisconnectReason, GroupInput, GroupRecord, GroupUpdate,
    MessageDirection, MessageInput, MessageRecord, MessageStatus, Organization,
    OrganizationInput, RestorableSession, SessionRecord, SessionStatus, SubscriptionTier,
    UsageKind, UsageRecord, WaEvent, WaMessage, WebhookLogInput, WebhookLogRecord, WebhookStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = WagateError::Config("test".into());
        let _validation = WagateError::Validation("test".into());
        let _auth = WagateError::Auth("test".into());
        let _limit = WagateError::LimitExceeded {
            kind: LimitKind::Message,
            current: 10,
            limit: 10,
        };
        let _not_connected = WagateError::NotConnected {
            session_id: "s1".into(),
        };
        let _storage = WagateError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _client = WagateError::Client {
            message: "test".into(),
            source: None,
        };
        let _webhook = WagateError::Webhook {
            message: "test".into(),
            source: None,
        };
        let _timeout = WagateError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        let _internal = WagateError::Internal("test".into());
    }

    #[test]
    fn null_sink_is_inert() {
        use traits::events::NullSink;
        let sink = NullSink;
        sink.on_qr("s1", "qr-data");
        sink.on_connection_status("s1", SessionStatus::Connected, None);
    }
}
