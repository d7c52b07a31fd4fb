// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local table of live session handles.
//!
//! The registry is the only globally shared mutable structure in the
//! workspace. The lock is never held across an await that performs I/O:
//! readers clone the client `Arc` out and call into it after release.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use wagate_core::{SessionStatus, WaClient, WagateError};

/// A live session handle: the client socket plus cached connection state.
#[derive(Clone)]
pub struct SessionHandle {
    pub client: Arc<dyn WaClient>,
    pub status: SessionStatus,
    pub phone_number: Option<String>,
    /// ISO 8601 registration timestamp.
    pub created_at: String,
}

/// Process-wide mapping `session_id -> live handle`.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh handle with status `connecting`.
    ///
    /// Fails if the id is already registered.
    pub async fn register(
        &self,
        session_id: &str,
        client: Arc<dyn WaClient>,
    ) -> Result<(), WagateError> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(session_id) {
            return Err(WagateError::Validation(format!(
                "session already registered: {session_id}"
            )));
        }
        inner.insert(
            session_id.to_string(),
            SessionHandle {
                client,
                status: SessionStatus::Connecting,
                phone_number: None,
                created_at: now_iso(),
            },
        );
        Ok(())
    }

    /// Replaces the client socket on an existing handle (reconnect) or
    /// registers a fresh one, resetting status to `connecting`.
    pub async fn upsert(&self, session_id: &str, client: Arc<dyn WaClient>) {
        let mut inner = self.inner.write().await;
        match inner.get_mut(session_id) {
            Some(handle) => {
                handle.client = client;
                handle.status = SessionStatus::Connecting;
            }
            None => {
                inner.insert(
                    session_id.to_string(),
                    SessionHandle {
                        client,
                        status: SessionStatus::Connecting,
                        phone_number: None,
                        created_at: now_iso(),
                    },
                );
            }
        }
    }

    /// Removes and returns the handle. Explicit, supervisor-driven.
    pub async fn deregister(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.write().await.remove(session_id)
    }

    /// Updates cached status; `Some(phone)` also records the number.
    pub async fn set_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        phone_number: Option<String>,
    ) {
        if let Some(handle) = self.inner.write().await.get_mut(session_id) {
            handle.status = status;
            if phone_number.is_some() {
                handle.phone_number = phone_number;
            }
        }
    }

    /// Cached `(status, phone)` for the session.
    pub async fn status(&self, session_id: &str) -> Option<(SessionStatus, Option<String>)> {
        self.inner
            .read()
            .await
            .get(session_id)
            .map(|h| (h.status, h.phone_number.clone()))
    }

    /// The client, only when the session is registered and `connected`.
    pub async fn connected_client(
        &self,
        session_id: &str,
    ) -> Result<Arc<dyn WaClient>, WagateError> {
        let inner = self.inner.read().await;
        match inner.get(session_id) {
            Some(handle) if handle.status == SessionStatus::Connected => {
                Ok(handle.client.clone())
            }
            _ => Err(WagateError::NotConnected {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// Cached phone number, when connected.
    pub async fn phone_number(&self, session_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .get(session_id)
            .and_then(|h| h.phone_number.clone())
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Registered session ids (snapshot).
    pub async fn session_ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}

fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_test_utils::MockConnector;
    use wagate_core::WaConnector;

    async fn make_client() -> Arc<dyn WaClient> {
        let connector = MockConnector::new();
        let conn = connector.connect("s1", None).await.unwrap();
        conn.client
    }

    #[tokio::test]
    async fn register_rejects_duplicates() {
        let registry = SessionRegistry::new();
        let client = make_client().await;

        registry.register("s1", client.clone()).await.unwrap();
        let result = registry.register("s1", client).await;
        assert!(matches!(result, Err(WagateError::Validation(_))));
    }

    #[tokio::test]
    async fn connected_client_requires_connected_status() {
        let registry = SessionRegistry::new();
        let client = make_client().await;
        registry.register("s1", client).await.unwrap();

        // Still connecting.
        assert!(matches!(
            registry.connected_client("s1").await,
            Err(WagateError::NotConnected { .. })
        ));

        registry
            .set_status("s1", SessionStatus::Connected, Some("5551234567".into()))
            .await;
        assert!(registry.connected_client("s1").await.is_ok());
        assert_eq!(
            registry.phone_number("s1").await.as_deref(),
            Some("5551234567")
        );

        // Unknown session.
        assert!(matches!(
            registry.connected_client("nope").await,
            Err(WagateError::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn upsert_resets_status_to_connecting() {
        let registry = SessionRegistry::new();
        let client = make_client().await;
        registry.register("s1", client.clone()).await.unwrap();
        registry
            .set_status("s1", SessionStatus::Connected, Some("555".into()))
            .await;

        registry.upsert("s1", client).await;
        let (status, phone) = registry.status("s1").await.unwrap();
        assert_eq!(status, SessionStatus::Connecting);
        // Phone survives the socket swap.
        assert_eq!(phone.as_deref(), Some("555"));
    }

    #[tokio::test]
    async fn deregister_is_explicit() {
        let registry = SessionRegistry::new();
        let client = make_client().await;
        registry.register("s1", client).await.unwrap();
        assert_eq!(registry.len().await, 1);

        assert!(registry.deregister("s1").await.is_some());
        assert!(registry.is_empty().await);
        assert!(registry.deregister("s1").await.is_none());
    }
}
