// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback connector for development and demos.
//!
//! Production deployments implement [`WaConnector`] over a real
//! WhatsApp-Web client library and hand it to `serve::run_serve_with`.
//! This driver emits a synthetic pairing QR, connects immediately with a
//! number derived from the session id, and accepts (but does not
//! transmit) outbound sends.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use wagate_core::{GroupUpdate, WaClient, WaConnection, WaConnector, WaEvent, WagateError};

/// Development loopback connector.
#[derive(Default)]
pub struct LoopbackConnector;

impl LoopbackConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WaConnector for LoopbackConnector {
    async fn connect(
        &self,
        session_id: &str,
        auth_state: Option<String>,
    ) -> Result<WaConnection, WagateError> {
        let (tx, rx) = mpsc::channel(16);
        let phone_number = synthetic_number(session_id);

        // Fresh pairings see a QR first; restored sessions connect silently.
        if auth_state.is_none() {
            tx.send(WaEvent::Qr(format!("wagate-dev:{session_id}")))
                .await
                .ok();
            tx.send(WaEvent::CredsUpdate(
                serde_json::json!({ "loopback": { "session": session_id } }).to_string(),
            ))
            .await
            .ok();
        }
        tx.send(WaEvent::Open {
            phone_number: phone_number.clone(),
        })
        .await
        .ok();

        info!(session_id, phone_number = phone_number.as_str(), "loopback session opened");
        Ok(WaConnection {
            client: Arc::new(LoopbackClient {
                session_id: session_id.to_string(),
            }),
            events: rx,
        })
    }
}

struct LoopbackClient {
    session_id: String,
}

#[async_trait]
impl WaClient for LoopbackClient {
    async fn send_text(&self, jid: &str, _text: &str) -> Result<String, WagateError> {
        info!(
            session_id = self.session_id.as_str(),
            jid, "loopback send (not transmitted)"
        );
        Ok(format!("loopback-{}", Uuid::new_v4().simple()))
    }

    async fn logout(&self) -> Result<(), WagateError> {
        Ok(())
    }

    async fn create_group(
        &self,
        _name: &str,
        _participant_jids: &[String],
    ) -> Result<GroupUpdate, WagateError> {
        Err(unsupported())
    }

    async fn group_metadata(&self, _group_jid: &str) -> Result<GroupUpdate, WagateError> {
        Err(unsupported())
    }

    async fn group_participants(&self, _group_jid: &str) -> Result<Vec<String>, WagateError> {
        Err(unsupported())
    }

    async fn add_participants(
        &self,
        _group_jid: &str,
        _participant_jids: &[String],
    ) -> Result<(), WagateError> {
        Err(unsupported())
    }

    async fn remove_participant(
        &self,
        _group_jid: &str,
        _participant_jid: &str,
    ) -> Result<(), WagateError> {
        Err(unsupported())
    }

    async fn promote(&self, _group_jid: &str, _participant_jid: &str) -> Result<(), WagateError> {
        Err(unsupported())
    }

    async fn demote(&self, _group_jid: &str, _participant_jid: &str) -> Result<(), WagateError> {
        Err(unsupported())
    }

    async fn leave_group(&self, _group_jid: &str) -> Result<(), WagateError> {
        Err(unsupported())
    }

    async fn update_group_setting(
        &self,
        _group_jid: &str,
        _announcement_only: bool,
    ) -> Result<(), WagateError> {
        Err(unsupported())
    }

    async fn list_groups(&self) -> Result<Vec<GroupUpdate>, WagateError> {
        Ok(Vec::new())
    }
}

fn unsupported() -> WagateError {
    WagateError::Client {
        message: "group operations are not supported by the loopback driver".into(),
        source: None,
    }
}

/// Stable ten-digit number derived from the session id.
fn synthetic_number(session_id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    format!("555{:07}", hasher.finish() % 10_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_connect_emits_qr_then_open() {
        let connector = LoopbackConnector::new();
        let mut conn = connector.connect("dev-1", None).await.unwrap();

        assert!(matches!(conn.events.recv().await, Some(WaEvent::Qr(_))));
        assert!(matches!(
            conn.events.recv().await,
            Some(WaEvent::CredsUpdate(_))
        ));
        assert!(matches!(
            conn.events.recv().await,
            Some(WaEvent::Open { .. })
        ));
    }

    #[tokio::test]
    async fn restored_connect_skips_the_qr() {
        let connector = LoopbackConnector::new();
        let mut conn = connector
            .connect("dev-1", Some("{}".into()))
            .await
            .unwrap();
        assert!(matches!(
            conn.events.recv().await,
            Some(WaEvent::Open { .. })
        ));
    }

    #[test]
    fn synthetic_numbers_are_stable_and_distinct() {
        assert_eq!(synthetic_number("a"), synthetic_number("a"));
        assert_ne!(synthetic_number("a"), synthetic_number("b"));
        assert_eq!(synthetic_number("a").len(), 10);
    }
}
