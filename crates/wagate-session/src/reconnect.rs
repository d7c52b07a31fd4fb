// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervised reconnection with exponential backoff.
//!
//! One scheduled timer per session: a disconnect that arrives while a
//! timer is already pending is a no-op. The attempt counter is persisted
//! through the store so a restart does not grant a crashed session a
//! fresh backoff budget. The supervisor's connection-open handler resets
//! the counter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wagate_config::model::ReconnectConfig;
use wagate_core::{DisconnectReason, SessionStatus};

use crate::supervisor::SessionSupervisor;

/// Terminal reason recorded when the attempt cap is hit.
pub const MAX_ATTEMPTS_MESSAGE: &str = "Max reconnection attempts exceeded";

/// Schedules one-shot reconnect timers per session.
pub struct ReconnectController {
    config: ReconnectConfig,
    timers: DashMap<String, JoinHandle<()>>,
}

impl ReconnectController {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            timers: DashMap::new(),
        }
    }

    /// Backoff delay for the given pre-increment attempt counter.
    ///
    /// `min(base * 2^attempts, max)`; a rate-limited disconnect overrides
    /// the exponential schedule with a long fixed delay.
    pub fn compute_delay(&self, attempts: u32, reason: &DisconnectReason) -> Duration {
        if *reason == DisconnectReason::RateLimited {
            return Duration::from_secs(self.config.rate_limit_delay_secs);
        }
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        let delay = self
            .config
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.config.max_delay_secs);
        Duration::from_secs(delay)
    }

    /// Whether a timer is currently pending for the session.
    pub fn has_pending(&self, session_id: &str) -> bool {
        self.timers.contains_key(session_id)
    }

    /// Handles a non-logout disconnect.
    ///
    /// Spawns the reconnect cycle for the session: cap check, backoff
    /// sleep, then a fresh client via the supervisor. A no-op while a
    /// timer for the session is already pending.
    pub fn schedule(
        &self,
        supervisor: Arc<SessionSupervisor>,
        session_id: &str,
        org_id: &str,
        reason: DisconnectReason,
    ) {
        // The entry guard holds the shard lock across spawn + insert, so the
        // cycle task cannot observe the map before its own handle is stored.
        match self.timers.entry(session_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(session_id, "reconnect timer already pending");
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let handle = tokio::spawn(reconnect_cycle(
                    supervisor,
                    session_id.to_string(),
                    org_id.to_string(),
                    reason,
                ));
                slot.insert(handle);
            }
        }
    }

    fn remove_timer(&self, session_id: &str) {
        self.timers.remove(session_id);
    }

    /// Cancels a pending timer for the session, if any.
    pub fn cancel(&self, session_id: &str) {
        if let Some((_, handle)) = self.timers.remove(session_id) {
            handle.abort();
            debug!(session_id, "reconnect timer cancelled");
        }
    }

    /// Cancels every pending timer (process shutdown).
    pub fn cancel_all(&self) {
        let ids: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cancel(&id);
        }
    }
}

/// One reconnect cycle: cap check, persist counter, backoff, restart.
///
/// Boxed because the failure path recurses through
/// [`ReconnectController::schedule`].
fn reconnect_cycle(
    supervisor: Arc<SessionSupervisor>,
    session_id: String,
    org_id: String,
    reason: DisconnectReason,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let store = supervisor.store();

        let attempts = match store.get_session(&session_id).await {
            Ok(Some(session)) => session.reconnect_attempts,
            Ok(None) => {
                warn!(
                    session_id = session_id.as_str(),
                    "reconnect requested for unknown session"
                );
                supervisor.reconnect().remove_timer(&session_id);
                return;
            }
            Err(e) => {
                warn!(session_id = session_id.as_str(), error = %e,
                    "failed to read reconnect counter");
                supervisor.reconnect().remove_timer(&session_id);
                return;
            }
        };

        let max_attempts = supervisor.reconnect().config.max_attempts;
        if attempts >= max_attempts {
            info!(
                session_id = session_id.as_str(),
                attempts, "reconnect attempt cap reached, parking session"
            );
            if let Err(e) = store
                .update_session_status(
                    &session_id,
                    SessionStatus::Error,
                    None,
                    Some(MAX_ATTEMPTS_MESSAGE),
                )
                .await
            {
                warn!(session_id = session_id.as_str(), error = %e,
                    "failed to persist error status");
            }
            supervisor.park_session(&session_id).await;
            supervisor.reconnect().remove_timer(&session_id);
            return;
        }

        let delay = supervisor.reconnect().compute_delay(attempts, &reason);

        if let Err(e) = store.increment_reconnect_attempts(&session_id).await {
            warn!(session_id = session_id.as_str(), error = %e,
                "failed to persist reconnect counter");
        }
        if let Err(e) = store
            .update_session_status(&session_id, SessionStatus::Connecting, None, None)
            .await
        {
            warn!(session_id = session_id.as_str(), error = %e,
                "failed to persist connecting status");
        }
        supervisor
            .registry()
            .set_status(&session_id, SessionStatus::Connecting, None)
            .await;

        info!(
            session_id = session_id.as_str(),
            attempt = attempts + 1,
            delay_secs = delay.as_secs(),
            "reconnect scheduled"
        );

        tokio::time::sleep(delay).await;
        supervisor.reconnect().remove_timer(&session_id);

        let auth_state = match store.load_auth_state(&session_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(session_id = session_id.as_str(), error = %e,
                    "failed to load auth state for reconnect");
                None
            }
        };

        match supervisor
            .start_session(&session_id, &org_id, auth_state)
            .await
        {
            Ok(()) => {
                debug!(
                    session_id = session_id.as_str(),
                    "reconnect attempt started"
                );
            }
            Err(e) => {
                warn!(session_id = session_id.as_str(), error = %e,
                    "reconnect attempt failed");
                // Recurse with the incremented counter.
                supervisor.reconnect().schedule(
                    supervisor.clone(),
                    &session_id,
                    &org_id,
                    DisconnectReason::ConnectionLost,
                );
            }
        }
    })
}
