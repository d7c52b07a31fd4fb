// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event-bus sink that records every publication for test assertions.

use std::sync::Mutex;

use wagate_core::{ConnectInfo, EventSink, GroupUpdate, MessageRecord, SessionStatus};

/// One recorded event-bus publication.
#[derive(Debug, Clone)]
pub enum RecordedEvent {
    Qr {
        session_id: String,
        qr: String,
    },
    ConnectionStatus {
        session_id: String,
        status: SessionStatus,
        phone_number: Option<String>,
    },
    Message {
        session_id: String,
        message_id: String,
        from: String,
    },
    GroupUpdate {
        session_id: String,
        group_jid: String,
    },
}

/// Captures all events published by the supervisor.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("sink lock").clone()
    }

    /// QR strings published for the session, in order.
    pub fn qr_codes(&self, session_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Qr { session_id: sid, qr } if sid == session_id => Some(qr),
                _ => None,
            })
            .collect()
    }

    /// Status transitions published for the session, in order.
    pub fn statuses(&self, session_id: &str) -> Vec<(SessionStatus, Option<String>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::ConnectionStatus {
                    session_id: sid,
                    status,
                    phone_number,
                } if sid == session_id => Some((status, phone_number)),
                _ => None,
            })
            .collect()
    }

    /// External message ids published for the session, in order.
    pub fn message_ids(&self, session_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordedEvent::Message {
                    session_id: sid,
                    message_id,
                    ..
                } if sid == session_id => Some(message_id),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().expect("sink lock").push(event);
    }
}

impl EventSink for RecordingSink {
    fn on_qr(&self, session_id: &str, qr: &str) {
        self.push(RecordedEvent::Qr {
            session_id: session_id.to_string(),
            qr: qr.to_string(),
        });
    }

    fn on_connection_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        info: Option<&ConnectInfo>,
    ) {
        self.push(RecordedEvent::ConnectionStatus {
            session_id: session_id.to_string(),
            status,
            phone_number: info.map(|i| i.phone_number.clone()),
        });
    }

    fn on_message(&self, session_id: &str, message: &MessageRecord) {
        self.push(RecordedEvent::Message {
            session_id: session_id.to_string(),
            message_id: message.message_id.clone(),
            from: message.from_number.clone(),
        });
    }

    fn on_group_update(&self, session_id: &str, update: &GroupUpdate) {
        self.push(RecordedEvent::GroupUpdate {
            session_id: session_id.to_string(),
            group_jid: update.group_jid.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_publication_order() {
        let sink = RecordingSink::new();
        sink.on_qr("s1", "qr-1");
        sink.on_connection_status(
            "s1",
            SessionStatus::Connected,
            Some(&ConnectInfo {
                session_id: "s1".into(),
                phone_number: "5551234567".into(),
            }),
        );

        assert_eq!(sink.qr_codes("s1"), vec!["qr-1"]);
        let statuses = sink.statuses("s1");
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, SessionStatus::Connected);
        assert_eq!(statuses[0].1.as_deref(), Some("5551234567"));
    }

    #[test]
    fn sessions_are_filtered() {
        let sink = RecordingSink::new();
        sink.on_qr("s1", "a");
        sink.on_qr("s2", "b");
        assert_eq!(sink.qr_codes("s1"), vec!["a"]);
        assert_eq!(sink.qr_codes("s2"), vec!["b"]);
    }
}
