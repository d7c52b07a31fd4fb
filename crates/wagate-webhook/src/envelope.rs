// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical webhook envelope POSTed to a tenant's CRM endpoint.
//!
//! Phone numbers are normalized to E.164 before leaving the process.

use serde::Serialize;

use wagate_core::jid::normalize_e164;
use wagate_core::MessageRecord;

/// Envelope type tag for inbound WhatsApp messages.
pub const ENVELOPE_TYPE: &str = "whatsapp_message";

/// The JSON body POSTed to `org.webhook_url`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// ISO 8601 timestamp of the envelope build.
    pub timestamp: String,
    pub data: EnvelopeData,
}

/// Message payload within the envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeData {
    /// Sender, E.164.
    pub from: String,
    /// Recipient, E.164.
    pub to: String,
    /// Extracted message text.
    pub message: String,
    pub message_id: String,
    pub message_type: String,
    pub is_group_message: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_jid: Option<String>,
}

impl WebhookEnvelope {
    /// Builds the envelope for a persisted inbound message.
    pub fn from_message(message: &MessageRecord) -> Self {
        Self {
            envelope_type: ENVELOPE_TYPE.to_string(),
            timestamp: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
            data: EnvelopeData {
                from: normalize_e164(&message.from_number),
                to: normalize_e164(&message.to_number),
                message: extract_text(&message.content),
                message_id: message.message_id.clone(),
                message_type: message.message_type.clone(),
                is_group_message: message.is_group_message,
                group_jid: message.group_jid.clone(),
            },
        }
    }
}

/// Pulls the human-readable text out of a content blob.
///
/// Content is stored as JSON (`{"text": "..."}` for text messages); a blob
/// that does not parse or has no text field is forwarded verbatim.
fn extract_text(content: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => value
            .get("text")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .unwrap_or_else(|| content.to_string()),
        Err(_) => content.to_string(),
    }
}
