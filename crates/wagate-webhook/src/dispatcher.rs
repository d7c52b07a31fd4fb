// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-least-once webhook delivery with bounded retries and durable audit.
//!
//! The dispatcher consumes persisted inbound messages from an mpsc feed,
//! so initial POSTs happen in arrival order. A failed initial attempt
//! moves the message into a spawned retry task (delays `base * 2^n`);
//! retries for distinct messages interleave freely. Every attempt writes
//! one webhook-log row. Retry timers are in-process only: deliveries lost
//! at shutdown are rediscovered by the periodic backfill job.

use std::sync::{Arc, Weak};
use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wagate_config::model::WebhookConfig;
use wagate_core::{
    MessageRecord, MessageStatus, Organization, SessionStore, WagateError, WebhookLogInput,
    WebhookStatus,
};

use crate::envelope::WebhookEnvelope;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a single POST attempt.
enum Attempt {
    /// 2xx; carries the CRM-side message id when the response body has one.
    Delivered(Option<String>),
    /// Non-2xx or transport failure; eligible for retry.
    Failed,
}

/// Forwards inbound messages to tenant webhooks with retries and audit.
pub struct WebhookDispatcher {
    store: Arc<dyn SessionStore>,
    config: WebhookConfig,
    client: reqwest::Client,
    cancel: CancellationToken,
    /// Self-reference handed to spawned retry tails.
    weak_self: Weak<WebhookDispatcher>,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: WebhookConfig,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, WagateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WagateError::Webhook {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Arc::new_cyclic(|weak_self| Self {
            store,
            config,
            client,
            cancel,
            weak_self: weak_self.clone(),
        }))
    }

    /// Upgrades the self-reference; the running `&self` borrow keeps the
    /// owning `Arc` alive.
    fn strong(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("dispatcher is alive")
    }

    /// Consumes the supervisor's inbound feed until shutdown.
    ///
    /// The initial attempt for each message happens inline (preserving
    /// arrival order); the retry tail is spawned.
    pub async fn run(self: Arc<Self>, mut feed: mpsc::Receiver<MessageRecord>) {
        info!("webhook dispatcher running");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = feed.recv() => match message {
                    Some(message) => self.dispatch(message).await,
                    None => break,
                }
            }
        }
        info!("webhook dispatcher stopped");
    }

    /// Delivers one message: inline initial attempt, spawned retry tail.
    pub async fn dispatch(&self, message: MessageRecord) {
        let org = match self.org_for(&message).await {
            Some(org) => org,
            None => return,
        };
        let url = match org.webhook_url.clone() {
            Some(url) => url,
            None => {
                debug!(org_id = org.id.as_str(), "no webhook url configured");
                return;
            }
        };

        match self.attempt(&org, &url, &message, 0).await {
            Attempt::Delivered(crm_id) => {
                self.mark_delivered(&message, crm_id.as_deref()).await;
            }
            Attempt::Failed => {
                let dispatcher = self.strong();
                tokio::spawn(async move {
                    dispatcher.retry_tail(org, url, message).await;
                });
            }
        }
    }

    /// One delivery attempt for the backfill job (no retry tail).
    pub async fn dispatch_once(&self, org: &Organization, message: &MessageRecord) {
        let url = match org.webhook_url.clone() {
            Some(url) => url,
            None => return,
        };
        if let Attempt::Delivered(crm_id) = self.attempt(org, &url, message, 0).await {
            self.mark_delivered(message, crm_id.as_deref()).await;
        }
    }

    /// Retries with exponential backoff; exhaustion fails the message.
    async fn retry_tail(self: Arc<Self>, org: Organization, url: String, message: MessageRecord) {
        for retry in 1..=self.config.max_retries {
            let delay = Duration::from_secs(
                self.config
                    .base_delay_secs
                    .saturating_mul(1u64 << (retry - 1)),
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return,
            }

            if let Attempt::Delivered(crm_id) = self.attempt(&org, &url, &message, retry).await {
                self.mark_delivered(&message, crm_id.as_deref()).await;
                return;
            }
        }

        warn!(
            message_id = message.message_id.as_str(),
            org_id = org.id.as_str(),
            retries = self.config.max_retries,
            "webhook retries exhausted, failing message"
        );
        if let Err(e) = self
            .store
            .update_message_status(&message.id, MessageStatus::Failed)
            .await
        {
            error!(message_id = message.message_id.as_str(), error = %e,
                "failed to persist failed status");
        }
    }

    /// POSTs the envelope once and writes the audit row for the attempt.
    async fn attempt(
        &self,
        org: &Organization,
        url: &str,
        message: &MessageRecord,
        retry_count: u32,
    ) -> Attempt {
        let envelope = WebhookEnvelope::from_message(message);
        let body = match serde_json::to_string(&envelope) {
            Ok(body) => body,
            Err(e) => {
                error!(message_id = message.message_id.as_str(), error = %e,
                    "envelope serialization failed");
                return Attempt::Failed;
            }
        };

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.clone());
        if let Some(api_key) = &org.crm_api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        if let Some(location_id) = &org.crm_location_id {
            request = request.header("X-Location-Id", location_id);
        }
        if let Some(secret) = &self.config.secret {
            request = request.header("X-Webhook-Signature", sign_body(secret, &body));
        }

        let (attempt, log) = match request.send().await {
            Ok(response) => {
                let status = response.status();
                let response_body = response.text().await.unwrap_or_default();
                if status.is_success() {
                    let crm_id = extract_crm_id(&response_body);
                    (
                        Attempt::Delivered(crm_id),
                        WebhookLogInput {
                            org_id: org.id.clone(),
                            message_id: message.id.clone(),
                            url: url.to_string(),
                            payload: body,
                            http_status: Some(status.as_u16()),
                            response_body: Some(response_body),
                            retry_count,
                            status: WebhookStatus::Success,
                            error_message: None,
                        },
                    )
                } else {
                    debug!(
                        message_id = message.message_id.as_str(),
                        status = status.as_u16(),
                        retry_count,
                        "webhook endpoint returned error"
                    );
                    (
                        Attempt::Failed,
                        WebhookLogInput {
                            org_id: org.id.clone(),
                            message_id: message.id.clone(),
                            url: url.to_string(),
                            payload: body,
                            http_status: Some(status.as_u16()),
                            response_body: Some(response_body),
                            retry_count,
                            status: WebhookStatus::Failed,
                            error_message: Some(format!("HTTP {status}")),
                        },
                    )
                }
            }
            Err(e) => {
                debug!(message_id = message.message_id.as_str(), error = %e, retry_count,
                    "webhook request failed");
                (
                    Attempt::Failed,
                    WebhookLogInput {
                        org_id: org.id.clone(),
                        message_id: message.id.clone(),
                        url: url.to_string(),
                        payload: body,
                        http_status: None,
                        response_body: None,
                        retry_count,
                        status: WebhookStatus::Failed,
                        error_message: Some(e.to_string()),
                    },
                )
            }
        };

        if let Err(e) = self.store.log_webhook(log).await {
            error!(message_id = message.message_id.as_str(), error = %e,
                "failed to write webhook audit row");
        }
        attempt
    }

    async fn mark_delivered(&self, message: &MessageRecord, crm_id: Option<&str>) {
        if let Err(e) = self.store.mark_message_synced(&message.id, crm_id).await {
            error!(message_id = message.message_id.as_str(), error = %e,
                "failed to mark message synced");
        }
        debug!(
            message_id = message.message_id.as_str(),
            "webhook delivered"
        );
    }

    async fn org_for(&self, message: &MessageRecord) -> Option<Organization> {
        match self.store.get_organization(&message.org_id).await {
            Ok(Some(org)) => Some(org),
            Ok(None) => {
                warn!(org_id = message.org_id.as_str(), "organization vanished");
                None
            }
            Err(e) => {
                error!(org_id = message.org_id.as_str(), error = %e,
                    "organization lookup failed");
                None
            }
        }
    }
}

/// HMAC-SHA256 signature (hex) over the raw request body.
fn sign_body(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Pulls a CRM message id out of a 2xx response body, when present.
fn extract_crm_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("id")
        .or_else(|| value.get("messageId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_and_deterministic() {
        let a = sign_body("secret", r#"{"x":1}"#);
        let b = sign_body("secret", r#"{"x":1}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other = sign_body("other-secret", r#"{"x":1}"#);
        assert_ne!(a, other);
    }

    #[test]
    fn crm_id_extraction_prefers_id_field() {
        assert_eq!(extract_crm_id(r#"{"id":"crm-1"}"#).as_deref(), Some("crm-1"));
        assert_eq!(
            extract_crm_id(r#"{"messageId":"crm-2"}"#).as_deref(),
            Some("crm-2")
        );
        assert!(extract_crm_id("ok").is_none());
        assert!(extract_crm_id(r#"{"other":1}"#).is_none());
    }
}
