// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publish-only event bus the supervisor uses to notify external
//! subscribers (the WebSocket edge).
//!
//! Delivery is best-effort: implementations must not block core progress
//! on slow subscribers — fan-out uses non-blocking sends and drops on
//! backpressure.

use crate::types::{ConnectInfo, GroupUpdate, MessageRecord, SessionStatus};

/// Per-session event topics fanned out to external subscribers.
pub trait EventSink: Send + Sync {
    /// A new pairing QR was emitted.
    fn on_qr(&self, session_id: &str, qr: &str);

    /// The session's connection status changed.
    fn on_connection_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        info: Option<&ConnectInfo>,
    );

    /// An inbound message was persisted.
    fn on_message(&self, session_id: &str, message: &MessageRecord);

    /// Group metadata changed.
    fn on_group_update(&self, session_id: &str, update: &GroupUpdate);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_qr(&self, _session_id: &str, _qr: &str) {}

    fn on_connection_status(
        &self,
        _session_id: &str,
        _status: SessionStatus,
        _info: Option<&ConnectInfo>,
    ) {
    }

    fn on_message(&self, _session_id: &str, _message: &MessageRecord) {}

    fn on_group_update(&self, _session_id: &str, _update: &GroupUpdate) {}
}
