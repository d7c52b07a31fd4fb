// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket rooms: the live [`EventSink`] implementation.
//!
//! Clients join per-session rooms (`{"type":"join_session","session_id":...}`)
//! and receive `qr_updated`, `connection_status`, `new_message`, and
//! `group_update` events. Fan-out is best-effort: sends are non-blocking
//! and slow subscribers drop events rather than stalling the supervisor.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use wagate_core::{ConnectInfo, EventSink, GroupUpdate, MessageRecord, SessionStatus};

use crate::server::GatewayState;

/// Per-connection outbound queue depth before events drop.
const SUBSCRIBER_BUFFER: usize = 64;

struct RoomMember {
    conn_id: String,
    tx: mpsc::Sender<String>,
}

/// Session-keyed WebSocket rooms.
#[derive(Default)]
pub struct WsRooms {
    rooms: DashMap<String, Vec<RoomMember>>,
}

impl WsRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a session room.
    pub fn join(&self, session_id: &str, conn_id: &str, tx: mpsc::Sender<String>) {
        let mut room = self.rooms.entry(session_id.to_string()).or_default();
        // Re-joining replaces the previous subscription.
        room.retain(|m| m.conn_id != conn_id);
        room.push(RoomMember {
            conn_id: conn_id.to_string(),
            tx,
        });
        debug!(session_id, conn_id, "joined session room");
    }

    /// Drops a connection from every room (socket closed).
    pub fn leave_all(&self, conn_id: &str) {
        for mut room in self.rooms.iter_mut() {
            room.retain(|m| m.conn_id != conn_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    /// Subscriber count for a session room.
    pub fn room_size(&self, session_id: &str) -> usize {
        self.rooms.get(session_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Best-effort fan-out; a full subscriber buffer drops the event.
    fn publish(&self, session_id: &str, payload: serde_json::Value) {
        let Some(room) = self.rooms.get(session_id) else {
            return;
        };
        let text = payload.to_string();
        for member in room.iter() {
            if member.tx.try_send(text.clone()).is_err() {
                debug!(
                    session_id,
                    conn_id = member.conn_id.as_str(),
                    "dropping event for slow subscriber"
                );
            }
        }
    }
}

impl EventSink for WsRooms {
    fn on_qr(&self, session_id: &str, qr: &str) {
        self.publish(
            session_id,
            serde_json::json!({ "type": "qr_updated", "qr": qr }),
        );
    }

    fn on_connection_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        info: Option<&ConnectInfo>,
    ) {
        let mut payload = serde_json::json!({
            "type": "connection_status",
            "status": status.to_string(),
        });
        if let Some(info) = info {
            payload["phoneNumber"] = serde_json::Value::String(info.phone_number.clone());
        }
        self.publish(session_id, payload);
    }

    fn on_message(&self, session_id: &str, message: &MessageRecord) {
        self.publish(
            session_id,
            serde_json::json!({
                "type": "new_message",
                "from": message.from_number,
                "message": extract_text(&message.content),
                "timestamp": message.timestamp,
            }),
        );
    }

    fn on_group_update(&self, session_id: &str, update: &GroupUpdate) {
        self.publish(
            session_id,
            serde_json::json!({
                "type": "group_update",
                "groupJid": update.group_jid,
                "name": update.name,
                "participantCount": update.participant_count,
            }),
        );
    }
}

fn extract_text(content: &str) -> String {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| v.get("text").and_then(|t| t.as_str()).map(String::from))
        .unwrap_or_else(|| content.to_string())
}

/// Client -> server control frame.
///
/// Wire shape: `{"type":"join_session","sessionId":"..."}` — camelCase
/// fields, matching every other payload this edge emits.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsIncoming {
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handles one WebSocket connection: a sender task forwarding room events
/// plus a read loop for join requests.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let conn_id = uuid::Uuid::new_v4().to_string();

    let (tx, mut rx) = mpsc::channel::<String>(SUBSCRIBER_BUFFER);

    let sender_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = ws_receiver.next().await {
        match frame {
            Message::Text(text) => {
                let text_str: &str = &text;
                match serde_json::from_str::<WsIncoming>(text_str) {
                    Ok(WsIncoming::JoinSession { session_id }) => {
                        state.rooms.join(&session_id, &conn_id, tx.clone());
                    }
                    Err(e) => {
                        warn!(conn_id = conn_id.as_str(), error = %e,
                            "invalid WebSocket frame");
                    }
                }
            }
            Message::Close(_) => break,
            _ => {} // Ping/pong handled by the protocol layer.
        }
    }

    state.rooms.leave_all(&conn_id);
    sender_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_and_publish_delivers_to_room() {
        let rooms = WsRooms::new();
        let (tx, mut rx) = mpsc::channel(8);
        rooms.join("s1", "conn-1", tx);
        assert_eq!(rooms.room_size("s1"), 1);

        rooms.on_qr("s1", "qr-data");
        let payload: serde_json::Value =
            serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(payload["type"], "qr_updated");
        assert_eq!(payload["qr"], "qr-data");
    }

    #[tokio::test]
    async fn events_are_scoped_to_their_room() {
        let rooms = WsRooms::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        rooms.join("s1", "conn-1", tx1);
        rooms.join("s2", "conn-2", tx2);

        rooms.on_qr("s1", "qr-for-s1");
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn connection_status_carries_phone_when_connected() {
        let rooms = WsRooms::new();
        let (tx, mut rx) = mpsc::channel(8);
        rooms.join("s1", "conn-1", tx);

        rooms.on_connection_status(
            "s1",
            SessionStatus::Connected,
            Some(&ConnectInfo {
                session_id: "s1".into(),
                phone_number: "5551234567".into(),
            }),
        );
        let payload: serde_json::Value =
            serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(payload["status"], "connected");
        assert_eq!(payload["phoneNumber"], "5551234567");
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let rooms = WsRooms::new();
        let (tx, _rx) = mpsc::channel(1);
        rooms.join("s1", "conn-1", tx);

        // Second publish overflows the buffer; it must not block or panic.
        rooms.on_qr("s1", "first");
        rooms.on_qr("s1", "second");
    }

    #[tokio::test]
    async fn leave_all_empties_rooms() {
        let rooms = WsRooms::new();
        let (tx, _rx) = mpsc::channel(8);
        rooms.join("s1", "conn-1", tx.clone());
        rooms.join("s2", "conn-1", tx);

        rooms.leave_all("conn-1");
        assert_eq!(rooms.room_size("s1"), 0);
        assert_eq!(rooms.room_size("s2"), 0);
    }

    #[test]
    fn join_frame_parses_camel_case_field() {
        let frame: WsIncoming =
            serde_json::from_str(r#"{"type":"join_session","sessionId":"s1"}"#).unwrap();
        match frame {
            WsIncoming::JoinSession { session_id } => assert_eq!(session_id, "s1"),
        }
    }

    #[test]
    fn join_frame_rejects_snake_case_field() {
        let result =
            serde_json::from_str::<WsIncoming>(r#"{"type":"join_session","session_id":"s1"}"#);
        assert!(result.is_err(), "only the documented camelCase field joins");
    }
}
