// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook delivery pipeline for the Wagate gateway.
//!
//! - [`envelope`]: the canonical JSON envelope with E.164 numbers.
//! - [`dispatcher`]: ordered initial delivery, bounded exponential retry,
//!   append-only audit log.
//! - [`sync`]: periodic backfill from the pending-CRM-sync backlog.

pub mod dispatcher;
pub mod envelope;
pub mod sync;

pub use dispatcher::WebhookDispatcher;
pub use envelope::{EnvelopeData, WebhookEnvelope};
pub use sync::{run_sync_loop, sync_pending_messages};
