// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session outbound message queue with token-bucket rate limiting.
//!
//! Each session gets a FIFO and one single-flight worker. The worker
//! consults the session's [`TokenBucket`] (default 20/min, even refill)
//! before every send, paces consecutive sends, and retries failed items
//! up to a per-item attempt cap by re-appending them at the tail.
//!
//! Outbound messages are persisted only after a successful send attempt.

pub mod bucket;

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use wagate_config::model::QueueConfig;
use wagate_core::jid::to_wire_jid;
use wagate_core::{
    MessageDirection, MessageInput, MessageRecord, MessageStatus, SessionStore, UsageKind,
    WagateError,
};
use wagate_session::SessionSupervisor;

pub use bucket::TokenBucket;

/// One queued outbound send.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Locally unique tag returned to the caller.
    pub queue_id: String,
    /// Raw target (bare number or JID); formatted at send time.
    pub target: String,
    pub text: String,
    pub message_type: String,
    /// ISO 8601 enqueue timestamp.
    pub enqueued_at: String,
    pub attempts: u32,
}

struct SessionQueue {
    items: Arc<Mutex<VecDeque<QueuedMessage>>>,
    notify: Arc<Notify>,
    worker: JoinHandle<()>,
}

/// Per-session FIFO dispatch with token-bucket rate limiting.
pub struct OutboundQueue {
    supervisor: Arc<SessionSupervisor>,
    store: Arc<dyn SessionStore>,
    config: QueueConfig,
    sessions: DashMap<String, SessionQueue>,
    cancel: CancellationToken,
    /// Self-reference handed to spawned workers.
    weak_self: Weak<OutboundQueue>,
}

impl OutboundQueue {
    pub fn new(
        supervisor: Arc<SessionSupervisor>,
        store: Arc<dyn SessionStore>,
        config: QueueConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            supervisor,
            store,
            config,
            sessions: DashMap::new(),
            cancel,
            weak_self: weak_self.clone(),
        })
    }

    /// Upgrades the self-reference; the running `&self` borrow keeps the
    /// owning `Arc` alive.
    fn strong(&self) -> Arc<Self> {
        self.weak_self.upgrade().expect("queue is alive")
    }

    /// Appends a text send to the session's FIFO. Returns the queue id.
    ///
    /// Only `text` messages are dispatchable; anything else is rejected.
    pub async fn enqueue(
        &self,
        session_id: &str,
        org_id: &str,
        target: &str,
        text: &str,
        message_type: &str,
    ) -> Result<String, WagateError> {
        if message_type != "text" {
            return Err(WagateError::Validation(format!(
                "unsupported outbound message type: {message_type}"
            )));
        }
        // Reject malformed targets at the edge instead of burning worker
        // attempts on them.
        to_wire_jid(target)?;
        if text.is_empty() {
            return Err(WagateError::Validation("empty message text".into()));
        }

        let item = QueuedMessage {
            queue_id: Uuid::new_v4().to_string(),
            target: target.to_string(),
            text: text.to_string(),
            message_type: message_type.to_string(),
            enqueued_at: now_iso(),
            attempts: 0,
        };
        let queue_id = item.queue_id.clone();

        let entry = self.session_entry(session_id, org_id);
        entry.0.lock().await.push_back(item);
        entry.1.notify_one();

        debug!(session_id, queue_id = queue_id.as_str(), "message enqueued");
        Ok(queue_id)
    }

    /// Enqueues a batch of `(target, text)` sends.
    ///
    /// No transactional guarantee across the batch: items enqueued before
    /// a validation failure stay queued.
    pub async fn enqueue_bulk(
        &self,
        session_id: &str,
        org_id: &str,
        items: &[(String, String)],
    ) -> Result<Vec<String>, WagateError> {
        let mut queue_ids = Vec::with_capacity(items.len());
        for (target, text) in items {
            let queue_id = self
                .enqueue(session_id, org_id, target, text, "text")
                .await?;
            queue_ids.push(queue_id);
        }
        Ok(queue_ids)
    }

    /// Sends immediately, bypassing the queue and the token bucket.
    ///
    /// Emergency-only: this ignores the per-session rate limit entirely.
    pub async fn send_immediate(
        &self,
        session_id: &str,
        org_id: &str,
        target: &str,
        text: &str,
    ) -> Result<MessageRecord, WagateError> {
        let external_id = self.supervisor.send_text(session_id, target, text).await?;
        self.persist_outbound(session_id, org_id, target, text, &external_id)
            .await
    }

    /// Queued items for the session (pending, not yet dispatched).
    pub async fn pending_count(&self, session_id: &str) -> usize {
        match self.sessions.get(session_id) {
            Some(entry) => entry.items.lock().await.len(),
            None => 0,
        }
    }

    /// Cancels the session's worker and drops its queue.
    pub fn remove_session(&self, session_id: &str) {
        if let Some((_, queue)) = self.sessions.remove(session_id) {
            queue.worker.abort();
            info!(session_id, "outbound queue removed");
        }
    }

    /// Aborts every worker (process shutdown).
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.remove_session(&id);
        }
    }

    /// Returns the session's queue handles, spawning the worker on first use.
    fn session_entry(&self, session_id: &str, org_id: &str) -> (Arc<Mutex<VecDeque<QueuedMessage>>>, Arc<Notify>) {
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let items: Arc<Mutex<VecDeque<QueuedMessage>>> =
                    Arc::new(Mutex::new(VecDeque::new()));
                let notify = Arc::new(Notify::new());
                let worker = tokio::spawn(run_worker(
                    self.strong(),
                    session_id.to_string(),
                    org_id.to_string(),
                    items.clone(),
                    notify.clone(),
                ));
                SessionQueue {
                    items,
                    notify,
                    worker,
                }
            });
        (entry.items.clone(), entry.notify.clone())
    }

    async fn persist_outbound(
        &self,
        session_id: &str,
        org_id: &str,
        target: &str,
        text: &str,
        external_id: &str,
    ) -> Result<MessageRecord, WagateError> {
        let wire_jid = to_wire_jid(target)?;
        let from_number = self
            .supervisor
            .session_phone(session_id)
            .await
            .unwrap_or_default();
        let record = self
            .store
            .save_message(MessageInput {
                session_id: session_id.to_string(),
                org_id: org_id.to_string(),
                message_id: external_id.to_string(),
                direction: MessageDirection::Outbound,
                from_number,
                to_number: wire_jid,
                message_type: "text".to_string(),
                content: serde_json::json!({ "text": text }).to_string(),
                status: MessageStatus::Sent,
                is_group_message: wagate_core::jid::is_group_jid(target),
                group_jid: wagate_core::jid::is_group_jid(target).then(|| target.to_string()),
                timestamp: now_iso(),
            })
            .await?;
        if let Err(e) = self.store.increment_usage(org_id, UsageKind::MessageSent).await {
            warn!(org_id, error = %e, "usage increment failed");
        }
        Ok(record)
    }
}

/// Single-flight worker loop for one session's FIFO.
async fn run_worker(
    queue: Arc<OutboundQueue>,
    session_id: String,
    org_id: String,
    items: Arc<Mutex<VecDeque<QueuedMessage>>>,
    notify: Arc<Notify>,
) {
    let mut bucket = TokenBucket::new(queue.config.messages_per_minute);
    let cancel = queue.cancel.clone();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Peek the head; park until signalled when empty.
        let head = { items.lock().await.front().cloned() };
        let item = match head {
            Some(item) => item,
            None => {
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = cancel.cancelled() => break,
                }
                continue;
            }
        };

        // Rate limit: when the bucket is dry, sleep a full window and re-peek.
        if !bucket.try_acquire() {
            debug!(
                session_id = session_id.as_str(),
                "token bucket exhausted, sleeping"
            );
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                _ = cancel.cancelled() => break,
            }
            continue;
        }

        match queue
            .supervisor
            .send_text(&session_id, &item.target, &item.text)
            .await
        {
            Ok(external_id) => {
                items.lock().await.pop_front();
                if let Err(e) = queue
                    .persist_outbound(&session_id, &org_id, &item.target, &item.text, &external_id)
                    .await
                {
                    error!(session_id = session_id.as_str(), error = %e,
                        "failed to persist outbound message");
                }
                debug!(
                    session_id = session_id.as_str(),
                    queue_id = item.queue_id.as_str(),
                    "message dispatched"
                );
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(
                        queue.config.delay_between_messages_secs,
                    )) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            Err(e) => {
                let mut locked = items.lock().await;
                if let Some(mut failed) = locked.pop_front() {
                    failed.attempts += 1;
                    if failed.attempts >= queue.config.max_attempts {
                        warn!(
                            session_id = session_id.as_str(),
                            queue_id = failed.queue_id.as_str(),
                            attempts = failed.attempts,
                            error = %e,
                            "dropping message after repeated send failures"
                        );
                    } else {
                        debug!(
                            session_id = session_id.as_str(),
                            queue_id = failed.queue_id.as_str(),
                            attempts = failed.attempts,
                            error = %e,
                            "send failed, requeueing at tail"
                        );
                        locked.push_back(failed);
                    }
                }
                drop(locked);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(queue.config.failure_delay_secs)) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }
    debug!(session_id = session_id.as_str(), "queue worker stopped");
}

fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
