// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic CRM backfill.
//!
//! In-process retry timers die with the process; this job is the
//! authoritative recovery path. Every tick it walks each webhook-enabled
//! organization's pending (inbound, unsynced, non-failed) messages and
//! re-attempts delivery once per message. Persistent failures surface
//! again on the next tick.

use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wagate_core::SessionStore;

use crate::dispatcher::WebhookDispatcher;

/// Messages processed per org per tick.
const SYNC_BATCH_LIMIT: u32 = 100;

/// Runs the backfill loop until cancelled.
pub async fn run_sync_loop(
    dispatcher: Arc<WebhookDispatcher>,
    store: Arc<dyn SessionStore>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    // The immediate first tick would race session restoration at boot.
    interval.tick().await;

    info!(interval_secs, "webhook sync job running");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sync_pending_messages(&dispatcher, &store).await;
            }
            _ = cancel.cancelled() => {
                info!("webhook sync job stopped");
                break;
            }
        }
    }
}

/// One backfill pass over every webhook-enabled organization.
pub async fn sync_pending_messages(
    dispatcher: &Arc<WebhookDispatcher>,
    store: &Arc<dyn SessionStore>,
) {
    let orgs = match store.list_organizations_with_webhooks().await {
        Ok(orgs) => orgs,
        Err(e) => {
            warn!(error = %e, "failed to list webhook organizations");
            return;
        }
    };

    for org in orgs {
        let pending = match store.list_pending_crm_sync(&org.id, SYNC_BATCH_LIMIT).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(org_id = org.id.as_str(), error = %e, "pending sync query failed");
                continue;
            }
        };
        if pending.is_empty() {
            continue;
        }
        debug!(
            org_id = org.id.as_str(),
            count = pending.len(),
            "backfilling pending webhook deliveries"
        );
        for message in pending {
            dispatcher.dispatch_once(&org, &message).await;
        }
    }
}
